/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use crate::common::{lifecycle::*, types::*};
use crate::domain::types::reflector::*;
use crate::tools::error::AppError;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

/// State of one driver session.
///
/// Every mutation goes through the handlers below, which never touch the network.
/// They return the backend calls to issue instead, and each call comes back as a
/// [`Completion`] stamped with what it was issued against.
#[derive(Debug)]
pub struct ReflectorState {
    vehicle_type: VehicleType,
    pending: Vec<RideSession>,
    active: Option<RideSession>,
    history: Vec<RideSession>,
    concluded: FxHashMap<BookingId, RideStatus>,
    last_error: Option<OperationError>,
    epoch: u64,
    pending_seq: u64,
    applied_pending_seq: u64,
    accept_in_flight: Option<BookingId>,
    browsing: bool,
    push_connected: bool,
    requires_reauthentication: bool,
    stopped: bool,
}

impl ReflectorState {
    pub fn new(vehicle_type: VehicleType) -> Self {
        ReflectorState {
            vehicle_type,
            pending: Vec::new(),
            active: None,
            history: Vec::new(),
            concluded: FxHashMap::default(),
            last_error: None,
            epoch: 0,
            pending_seq: 0,
            applied_pending_seq: 0,
            accept_in_flight: None,
            browsing: false,
            push_connected: false,
            requires_reauthentication: false,
            stopped: false,
        }
    }

    pub fn view(&self) -> RideSessionView {
        RideSessionView {
            pending: self.pending.clone(),
            active: self.active.clone(),
            history: self.history.clone(),
            last_error: self.last_error.clone(),
            push_connected: self.push_connected,
            polling: self.polling(),
            requires_reauthentication: self.requires_reauthentication,
        }
    }

    pub fn pending(&self) -> &[RideSession] {
        &self.pending
    }

    pub fn active(&self) -> Option<&RideSession> {
        self.active.as_ref()
    }

    pub fn history(&self) -> &[RideSession] {
        &self.history
    }

    pub fn last_error(&self) -> Option<&OperationError> {
        self.last_error.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Polling is the fallback for a missing push channel and stops for good once
    /// the backend has refused our credentials.
    pub fn polling(&self) -> bool {
        !self.push_connected && !self.requires_reauthentication && !self.stopped
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Latest known status of a booking, whether it is still held or already concluded.
    pub fn status_of(&self, booking_id: &BookingId) -> Option<RideStatus> {
        match &self.active {
            Some(held) if &held.booking_id == booking_id => Some(held.status),
            _ => self.concluded.get(booking_id).copied(),
        }
    }

    fn held_status(&self) -> Option<RideStatus> {
        self.active.as_ref().map(|held| held.status)
    }

    fn holds_claimed(&self) -> bool {
        self.held_status()
            .map(|status| status.is_claimed())
            .unwrap_or(false)
    }

    fn next_pending_request(&mut self) -> RideRequest {
        self.pending_seq += 1;
        RideRequest::Pending {
            vehicle_type: self.vehicle_type.to_owned(),
            seq: self.pending_seq,
        }
    }

    fn active_request(&self) -> RideRequest {
        RideRequest::Active { epoch: self.epoch }
    }

    /// Initial load once the session starts.
    pub fn bootstrap(&mut self) -> Vec<RideRequest> {
        vec![
            self.next_pending_request(),
            self.active_request(),
            RideRequest::History,
        ]
    }

    pub fn on_tick(&mut self) -> Vec<RideRequest> {
        if !self.polling() {
            return Vec::new();
        }

        let mut requests = Vec::new();
        if !self.holds_claimed() || self.browsing {
            requests.push(self.next_pending_request());
        }
        if self.holds_claimed() {
            requests.push(self.active_request());
        }
        requests
    }

    pub fn on_intent(&mut self, intent: Intent) -> Step {
        if self.stopped {
            return Step::Settled(Err(AppError::ReflectorStopped), Vec::new());
        }

        match intent {
            Intent::RefreshPending => Step::Awaiting(self.next_pending_request()),
            Intent::RefreshActive => Step::Awaiting(self.active_request()),
            Intent::RefreshHistory => Step::Awaiting(RideRequest::History),
            Intent::Accept(booking_id) => {
                if self.accept_in_flight.is_some() || self.holds_claimed() {
                    let status = self.held_status();
                    return self.reject(
                        RideEventKind::Accept,
                        AppError::IllegalTransition {
                            event: RideEventKind::Accept,
                            status,
                        },
                    );
                }
                self.accept_in_flight = Some(booking_id.to_owned());
                Step::Awaiting(RideRequest::Accept(booking_id))
            }
            Intent::Advance(event) => {
                if let Err(err) = permits(self.held_status(), &event) {
                    return self.reject(event.kind(), err);
                }
                match &self.active {
                    Some(held) => Step::Awaiting(RideRequest::Transition {
                        booking_id: held.booking_id.to_owned(),
                        event,
                    }),
                    None => self.reject(
                        event.kind(),
                        AppError::IllegalTransition {
                            event: event.kind(),
                            status: None,
                        },
                    ),
                }
            }
            Intent::SetBrowsing(browsing) => {
                let started = browsing && !self.browsing;
                self.browsing = browsing;
                let follow_ups = if started && !self.requires_reauthentication {
                    vec![self.next_pending_request()]
                } else {
                    Vec::new()
                };
                Step::Settled(Ok(()), follow_ups)
            }
            Intent::Logout | Intent::Shutdown => {
                self.teardown();
                Step::Settled(Ok(()), Vec::new())
            }
        }
    }

    /// Drops everything held. The state accepts no further intents afterwards.
    pub fn teardown(&mut self) {
        let vehicle_type = self.vehicle_type.to_owned();
        *self = ReflectorState::new(vehicle_type);
        self.stopped = true;
    }

    pub fn on_completion(&mut self, completion: Completion) -> Applied {
        if self.stopped {
            return Applied {
                result: Err(AppError::ReflectorStopped),
                follow_ups: Vec::new(),
            };
        }

        match completion {
            Completion::Pending { seq, result } => self.apply_pending(seq, result),
            Completion::Active { epoch, result } => self.apply_active(epoch, result),
            Completion::Accept { booking_id, result } => self.apply_accept(booking_id, result),
            Completion::Transition {
                booking_id,
                event,
                result,
            } => self.apply_transition(booking_id, event, result),
            Completion::History(result) => self.apply_history(result),
        }
    }

    fn apply_pending(&mut self, seq: u64, result: Result<Vec<RideSession>, AppError>) -> Applied {
        if seq < self.applied_pending_seq {
            info!(tag = "[Pending Refresh Overtaken]", seq = %seq, applied = %self.applied_pending_seq);
            return Applied {
                result: result.map(|_| ()),
                follow_ups: Vec::new(),
            };
        }
        match result {
            Ok(rides) => {
                self.applied_pending_seq = seq;
                let held = self
                    .active
                    .as_ref()
                    .filter(|held| held.status.is_claimed())
                    .map(|held| held.booking_id.to_owned());
                self.pending = rides
                    .into_iter()
                    .filter(|ride| Some(&ride.booking_id) != held.as_ref())
                    .filter(|ride| !self.concluded.contains_key(&ride.booking_id))
                    .collect();
                self.clear_error(Operation::RefreshPending);
                Applied::settled()
            }
            Err(err) => self.fail(Operation::RefreshPending, err),
        }
    }

    fn apply_active(
        &mut self,
        epoch: u64,
        result: Result<Option<RideSession>, AppError>,
    ) -> Applied {
        if epoch != self.epoch {
            info!(tag = "[Active Refresh Overtaken]", epoch = %epoch, current = %self.epoch);
            return Applied::settled();
        }

        match result {
            Ok(None) => {
                if let Some(held) = self.active.take() {
                    info!(tag = "[Active Ride Cleared]", booking_id = %held.booking_id, status = %held.status);
                }
                self.clear_error(Operation::RefreshActive);
                Applied::settled()
            }
            Ok(Some(session)) => {
                if self.concluded.contains_key(&session.booking_id) {
                    info!(tag = "[Concluded Ride Reported Active]", booking_id = %session.booking_id);
                } else {
                    let same_booking = self
                        .active
                        .as_ref()
                        .map(|held| held.booking_id == session.booking_id)
                        .unwrap_or(false);
                    if same_booking {
                        self.merge_held(session);
                    } else {
                        self.hold(session);
                    }
                }
                self.clear_error(Operation::RefreshActive);
                Applied::settled()
            }
            Err(err) => self.fail(Operation::RefreshActive, err),
        }
    }

    fn apply_accept(
        &mut self,
        booking_id: BookingId,
        result: Result<RideSession, AppError>,
    ) -> Applied {
        self.accept_in_flight = None;

        match result {
            Ok(session) => {
                self.epoch += 1;
                self.pending.retain(|ride| ride.booking_id != booking_id);
                let same_booking = self
                    .active
                    .as_ref()
                    .map(|held| held.booking_id == session.booking_id)
                    .unwrap_or(false);
                if same_booking {
                    self.merge_held(session);
                } else {
                    self.hold(session);
                }
                self.clear_error(Operation::Accept);
                Applied::settled()
            }
            Err(err) => {
                let mut applied = self.fail(Operation::Accept, err.to_owned());
                if let AppError::ConflictFailure(_) = err {
                    warn!(tag = "[Accept Conflict]", booking_id = %booking_id);
                    applied.follow_ups.push(self.next_pending_request());
                }
                applied
            }
        }
    }

    fn apply_transition(
        &mut self,
        booking_id: BookingId,
        event: RideEventKind,
        result: Result<RideSession, AppError>,
    ) -> Applied {
        let operation = Operation::from(event);
        match result {
            Ok(session) => {
                self.clear_error(operation);
                let still_held = self
                    .active
                    .as_ref()
                    .map(|held| held.booking_id == booking_id)
                    .unwrap_or(false);
                if !still_held {
                    info!(tag = "[Transition Outlived Session]", booking_id = %booking_id, event = %event);
                    return Applied::settled();
                }

                self.epoch += 1;
                let concluded = self.merge_held(session);
                let follow_ups = match (concluded, event) {
                    (true, RideEventKind::Complete) => vec![RideRequest::History],
                    (true, RideEventKind::Cancel) => vec![self.next_pending_request()],
                    _ => Vec::new(),
                };
                Applied {
                    result: Ok(()),
                    follow_ups,
                }
            }
            Err(err) => self.fail(operation, err),
        }
    }

    fn apply_history(&mut self, result: Result<Vec<RideSession>, AppError>) -> Applied {
        match result {
            Ok(rides) => {
                self.history = rides;
                self.clear_error(Operation::RefreshHistory);
                Applied::settled()
            }
            Err(err) => self.fail(Operation::RefreshHistory, err),
        }
    }

    pub fn on_push(&mut self, event: PushEvent) -> (PushOutcome, Vec<RideRequest>) {
        if self.stopped {
            return (PushOutcome::Ignored, Vec::new());
        }

        match event {
            PushEvent::Connected => {
                self.push_connected = true;
                info!(tag = "[Push Connected]", polling = %self.polling());
                (PushOutcome::Connection, Vec::new())
            }
            PushEvent::Disconnected(reason) => {
                let was_connected = std::mem::replace(&mut self.push_connected, false);
                // catch up on whatever was missed while the channel was down
                let follow_ups = if was_connected {
                    warn!(tag = "[Push Disconnected]", reason = %reason);
                    self.on_tick()
                } else {
                    Vec::new()
                };
                (PushOutcome::Connection, follow_ups)
            }
            PushEvent::Update(session) => (self.apply_push(session), Vec::new()),
        }
    }

    fn apply_push(&mut self, session: RideSession) -> PushOutcome {
        if self.concluded.contains_key(&session.booking_id) {
            return PushOutcome::Ignored;
        }

        let held = self
            .active
            .as_ref()
            .map(|held| (held.booking_id == session.booking_id, held.status));

        match held {
            Some((true, status)) => match reconcile(Some(status), session.status) {
                Precedence::Discard => PushOutcome::Discarded,
                Precedence::Apply => {
                    self.merge_held(session);
                    PushOutcome::Applied
                }
            },
            Some((false, _)) => PushOutcome::Ignored,
            None if matches!(session.status, RideStatus::PENDING | RideStatus::ACCEPTED) => {
                self.hold(session);
                PushOutcome::Applied
            }
            None => PushOutcome::Ignored,
        }
    }

    /// Merges a report for the held booking. Returns whether it concluded the session.
    fn merge_held(&mut self, session: RideSession) -> bool {
        if reconcile(self.held_status(), session.status) == Precedence::Discard {
            return false;
        }
        if session.status.is_terminal() {
            self.conclude(session);
            return true;
        }
        self.hold(session);
        false
    }

    fn hold(&mut self, session: RideSession) {
        if session.status.is_terminal() {
            self.conclude(session);
            return;
        }
        if session.status.is_claimed() {
            self.pending
                .retain(|ride| ride.booking_id != session.booking_id);
        }
        // any change of occupant or status makes older active reads stale
        let moved = self
            .active
            .as_ref()
            .map(|held| held.booking_id != session.booking_id || held.status != session.status)
            .unwrap_or(true);
        if moved {
            self.epoch += 1;
        }
        self.active = Some(session);
    }

    fn conclude(&mut self, session: RideSession) {
        info!(tag = "[Ride Concluded]", booking_id = %session.booking_id, status = %session.status);
        self.epoch += 1;
        self.active = None;
        self.concluded
            .insert(session.booking_id.to_owned(), session.status);
        self.pending
            .retain(|ride| ride.booking_id != session.booking_id);
        self.history
            .retain(|ride| ride.booking_id != session.booking_id);
        self.history.insert(0, session);
    }

    fn fail(&mut self, operation: Operation, error: AppError) -> Applied {
        warn!(tag = "[Operation Failed]", operation = %operation, error_code = %error.code(), error = %error.message());
        if error.is_auth_failure() {
            self.requires_reauthentication = true;
        }
        self.last_error = Some(OperationError {
            operation,
            error: error.to_owned(),
        });
        Applied {
            result: Err(error),
            follow_ups: Vec::new(),
        }
    }

    /// Local refusal: recorded under its operation, nothing else moves.
    fn reject(&mut self, kind: RideEventKind, error: AppError) -> Step {
        self.last_error = Some(OperationError {
            operation: Operation::from(kind),
            error: error.to_owned(),
        });
        Step::Settled(Err(error), Vec::new())
    }

    fn clear_error(&mut self, operation: Operation) {
        if self
            .last_error
            .as_ref()
            .map(|last| last.operation == operation)
            .unwrap_or(false)
        {
            self.last_error = None;
        }
    }
}
