/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use crate::common::types::{RideEvent, RideEventKind};
use crate::domain::{action::reflector::ReflectorState, types::reflector::*};
use crate::environment::SessionContext;
use crate::outbound::external::RideApi;
use crate::tools::error::AppError;
use crate::{push_update, transition};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
    time::{interval, MissedTickBehavior},
};
use tracing::{error, info, warn};

type InFlight = JoinSet<(Completion, Option<Reply>)>;

async fn perform(api: &dyn RideApi, request: RideRequest) -> Completion {
    match request {
        RideRequest::Pending { vehicle_type, seq } => Completion::Pending {
            seq,
            result: api.pending_rides(&vehicle_type).await,
        },
        RideRequest::Active { epoch } => Completion::Active {
            epoch,
            result: api.active_ride().await,
        },
        RideRequest::Accept(booking_id) => {
            let result = api.accept(&booking_id).await;
            Completion::Accept { booking_id, result }
        }
        RideRequest::Transition { booking_id, event } => {
            let result = match &event {
                RideEvent::Arrived => api.arrived(&booking_id).await,
                RideEvent::Start => api.start(&booking_id).await,
                RideEvent::Complete { final_location } => {
                    api.complete(&booking_id, final_location.as_ref()).await
                }
                RideEvent::Cancel { reason } => api.cancel(&booking_id, reason).await,
            };
            Completion::Transition {
                booking_id,
                event: event.kind(),
                result,
            }
        }
        RideRequest::History => Completion::History(api.history().await),
    }
}

fn dispatch(
    in_flight: &mut InFlight,
    api: &Arc<dyn RideApi>,
    request: RideRequest,
    reply: Option<Reply>,
) {
    info!(tag = "[Ride Request Issued]", operation = %request.operation());
    let api = api.to_owned();
    in_flight.spawn(async move { (perform(api.as_ref(), request).await, reply) });
}

fn publish(view: &watch::Sender<RideSessionView>, state: &ReflectorState) {
    let next = state.view();
    view.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

fn settle(reply: Option<Reply>, result: Result<(), AppError>) {
    if let Some(reply) = reply {
        // the caller may have stopped waiting
        let _ = reply.send(result);
    }
}

fn event_of(intent: &Intent) -> Option<RideEventKind> {
    match intent {
        Intent::Accept(_) => Some(RideEventKind::Accept),
        Intent::Advance(event) => Some(event.kind()),
        _ => None,
    }
}

fn event_of_completion(completion: &Completion) -> Option<(RideEventKind, bool)> {
    match completion {
        Completion::Accept { result, .. } => Some((RideEventKind::Accept, result.is_ok())),
        Completion::Transition { event, result, .. } => Some((*event, result.is_ok())),
        _ => None,
    }
}

/// Owns the state of one driver session and is the only place it changes.
///
/// Intents, push events, poll ticks and answers from the backend are taken one at a
/// time. Backend calls run on their own tasks so the loop never waits on the
/// network, and every change is published to `view`.
///
/// Runs until logout, shutdown, or every handle is dropped. Calls still in flight
/// are aborted then and their callers get `ReflectorStopped`.
pub async fn run_reflector(
    api: Arc<dyn RideApi>,
    context: SessionContext,
    poll_interval: Duration,
    mut commands: mpsc::Receiver<Command>,
    mut push_events: mpsc::Receiver<PushEvent>,
    view: watch::Sender<RideSessionView>,
) {
    let mut state = ReflectorState::new(context.vehicle_type.to_owned());
    let mut in_flight: InFlight = JoinSet::new();
    let mut push_open = true;

    let mut timer = interval(poll_interval.max(Duration::from_millis(10)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately, bootstrap covers it
    timer.tick().await;

    info!(tag = "[Reflector Started]", driver_id = %context.driver_id.0, vehicle_type = %context.vehicle_type.0);
    for request in state.bootstrap() {
        dispatch(&mut in_flight, &api, request, None);
    }
    publish(&view, &state);

    loop {
        // answered only after the change is visible in the published view
        let mut answers: Vec<(Option<Reply>, Result<(), AppError>)> = Vec::new();
        let mut stopping = false;

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command { intent, reply }) => {
                    let event = event_of(&intent);
                    stopping = matches!(intent, Intent::Logout | Intent::Shutdown);
                    if intent == Intent::Logout {
                        context.invalidate();
                    }

                    match state.on_intent(intent) {
                        Step::Settled(result, follow_ups) => {
                            if let (Some(event), Err(err)) = (event, result.as_ref()) {
                                warn!(tag = "[Transition Rejected]", event = %event, error = %err.message());
                                transition!(event.to_string().as_str(), "rejected");
                            }
                            answers.push((Some(reply), result));
                            for request in follow_ups {
                                dispatch(&mut in_flight, &api, request, None);
                            }
                        }
                        Step::Awaiting(request) => {
                            dispatch(&mut in_flight, &api, request, Some(reply));
                        }
                    }
                }
                None => stopping = true,
            },
            event = push_events.recv(), if push_open => match event {
                Some(event) => {
                    let (outcome, follow_ups) = state.on_push(event);
                    if outcome != PushOutcome::Connection {
                        push_update!(outcome.as_ref());
                    }
                    for request in follow_ups {
                        dispatch(&mut in_flight, &api, request, None);
                    }
                }
                None => push_open = false,
            },
            _ = timer.tick() => {
                for request in state.on_tick() {
                    dispatch(&mut in_flight, &api, request, None);
                }
            },
            Some(joined) = in_flight.join_next() => match joined {
                Ok((completion, reply)) => {
                    if let Some((event, confirmed)) = event_of_completion(&completion) {
                        transition!(event.to_string().as_str(), if confirmed { "confirmed" } else { "failed" });
                    }
                    let applied = state.on_completion(completion);
                    answers.push((reply, applied.result));
                    for request in applied.follow_ups {
                        dispatch(&mut in_flight, &api, request, None);
                    }
                }
                Err(err) => {
                    error!(tag = "[Ride Request Task Failed]", error = %err);
                }
            },
        }

        publish(&view, &state);
        for (reply, result) in answers {
            settle(reply, result);
        }
        if stopping {
            break;
        }
    }

    in_flight.abort_all();
    commands.close();
    state.teardown();
    publish(&view, &state);
    info!(tag = "[Reflector Stopped]", driver_id = %context.driver_id.0);
}
