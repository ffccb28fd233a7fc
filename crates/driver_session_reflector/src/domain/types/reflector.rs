/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use crate::common::types::*;
use crate::tools::error::AppError;
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tokio::sync::oneshot;

/// What a failure recorded in the last error slot was trying to do.
#[derive(Debug, Clone, Copy, Display, AsRefStr, Serialize, Eq, Hash, PartialEq)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    RefreshPending,
    RefreshActive,
    RefreshHistory,
    Accept,
    Arrived,
    Start,
    Complete,
    Cancel,
}

impl From<RideEventKind> for Operation {
    fn from(kind: RideEventKind) -> Self {
        match kind {
            RideEventKind::Accept => Operation::Accept,
            RideEventKind::Arrived => Operation::Arrived,
            RideEventKind::Start => Operation::Start,
            RideEventKind::Complete => Operation::Complete,
            RideEventKind::Cancel => Operation::Cancel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationError {
    pub operation: Operation,
    pub error: AppError,
}

/// Snapshot published to the rendering layer after every state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideSessionView {
    pub pending: Vec<RideSession>,
    pub active: Option<RideSession>,
    pub history: Vec<RideSession>,
    pub last_error: Option<OperationError>,
    pub push_connected: bool,
    pub polling: bool,
    pub requires_reauthentication: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Connected,
    Update(RideSession),
    Disconnected(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    RefreshPending,
    RefreshActive,
    RefreshHistory,
    Accept(BookingId),
    Advance(RideEvent),
    SetBrowsing(bool),
    Logout,
    Shutdown,
}

pub type Reply = oneshot::Sender<Result<(), AppError>>;

#[derive(Debug)]
pub struct Command {
    pub intent: Intent,
    pub reply: Reply,
}

/// A backend call decided by the state core, carried out off the event loop.
///
/// `seq` and `epoch` are the stamps the result is checked against when it returns.
#[derive(Debug, Clone, PartialEq)]
pub enum RideRequest {
    Pending {
        vehicle_type: VehicleType,
        seq: u64,
    },
    Active {
        epoch: u64,
    },
    Accept(BookingId),
    Transition {
        booking_id: BookingId,
        event: RideEvent,
    },
    History,
}

impl RideRequest {
    pub fn operation(&self) -> Operation {
        match self {
            RideRequest::Pending { .. } => Operation::RefreshPending,
            RideRequest::Active { .. } => Operation::RefreshActive,
            RideRequest::Accept(_) => Operation::Accept,
            RideRequest::Transition { event, .. } => Operation::from(event.kind()),
            RideRequest::History => Operation::RefreshHistory,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Pending {
        seq: u64,
        result: Result<Vec<RideSession>, AppError>,
    },
    Active {
        epoch: u64,
        result: Result<Option<RideSession>, AppError>,
    },
    Accept {
        booking_id: BookingId,
        result: Result<RideSession, AppError>,
    },
    Transition {
        booking_id: BookingId,
        event: RideEventKind,
        result: Result<RideSession, AppError>,
    },
    History(Result<Vec<RideSession>, AppError>),
}

/// How the state core settled an intent.
#[derive(Debug, PartialEq)]
pub enum Step {
    /// Answered without waiting on the backend, optionally with calls to issue
    /// that nobody waits on.
    Settled(Result<(), AppError>, Vec<RideRequest>),
    /// Answered once the response to this request has been applied.
    Awaiting(RideRequest),
}

/// Effect of applying a completion.
#[derive(Debug, PartialEq)]
pub struct Applied {
    pub result: Result<(), AppError>,
    pub follow_ups: Vec<RideRequest>,
}

impl Applied {
    pub fn settled() -> Self {
        Applied {
            result: Ok(()),
            follow_ups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Display, AsRefStr, Eq, PartialEq)]
#[strum(serialize_all = "snake_case")]
pub enum PushOutcome {
    Applied,
    Discarded,
    Ignored,
    Connection,
}
