/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use super::types::*;
use crate::tools::error::AppError;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Precedence {
    Apply,
    Discard,
}

impl RideStatus {
    /// Position in the forward lifecycle order. `CANCELLED` sits below `COMPLETED`
    /// so the order is total and a lifecycle-maximal status always exists.
    pub fn rank(&self) -> u8 {
        match self {
            RideStatus::PENDING => 0,
            RideStatus::ACCEPTED => 1,
            RideStatus::ARRIVED => 2,
            RideStatus::ONGOING => 3,
            RideStatus::CANCELLED => 4,
            RideStatus::COMPLETED => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::COMPLETED | RideStatus::CANCELLED)
    }

    /// Claimed by a driver and not yet concluded.
    pub fn is_claimed(&self) -> bool {
        matches!(
            self,
            RideStatus::ACCEPTED | RideStatus::ARRIVED | RideStatus::ONGOING
        )
    }
}

/// Decides whether a report about a booking may replace what is held for it.
///
/// Equal ranks apply so that a later frame for the same lifecycle point can
/// refresh descriptive fields (eta, fare corrections).
pub fn reconcile(current: Option<RideStatus>, incoming: RideStatus) -> Precedence {
    match current {
        Some(current) if incoming.rank() < current.rank() => Precedence::Discard,
        _ => Precedence::Apply,
    }
}

/// Client side precondition check for a driver transition.
pub fn permits(current: Option<RideStatus>, event: &RideEvent) -> Result<(), AppError> {
    let kind = event.kind();
    let allowed = match (current, event) {
        (Some(RideStatus::ACCEPTED), RideEvent::Arrived) => true,
        (Some(RideStatus::ARRIVED), RideEvent::Start) => true,
        (Some(RideStatus::ONGOING), RideEvent::Complete { .. }) => true,
        (Some(RideStatus::ACCEPTED | RideStatus::ARRIVED), RideEvent::Cancel { .. }) => true,
        _ => false,
    };

    if !allowed {
        return Err(AppError::IllegalTransition {
            event: kind,
            status: current,
        });
    }

    if let RideEvent::Cancel { reason } = event {
        if reason.trim().is_empty() {
            return Err(AppError::ValidationFailure(
                "Please provide a cancellation reason".to_string(),
            ));
        }
    }

    Ok(())
}
