/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use crate::support::*;
use driver_session_reflector::{
    common::types::*,
    domain::{
        api::handle::{spawn_reflector, Reflector},
        types::reflector::{Operation, PushEvent},
    },
    tools::error::AppError,
};
use std::{sync::Arc, time::Duration};

const QUIET: Duration = Duration::from_secs(3600);

/// Starts a reflector and waits for its initial load to reach the backend.
async fn start(api: &Arc<RecordingApi>, poll_interval: Duration) -> anyhow::Result<Reflector> {
    let config = config("http://127.0.0.1:9/api", poll_interval)?;
    let reflector = spawn_reflector(&config, context(), api.to_owned());
    wait_for_calls(api, "history", 1).await?;
    Ok(reflector)
}

fn held(reflector: &Reflector) -> Option<(String, RideStatus)> {
    reflector
        .handle
        .view()
        .active
        .map(|ride| (ride.booking_id.0, ride.status))
}

fn pending_ids(reflector: &Reflector) -> Vec<String> {
    reflector
        .handle
        .view()
        .pending
        .into_iter()
        .map(|ride| ride.booking_id.0)
        .collect()
}

#[tokio::test]
async fn accepting_a_pending_ride_makes_it_active() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A", "B"]));
    let reflector = start(&api, QUIET).await?;

    reflector.handle.refresh_pending().await?;
    assert_eq!(pending_ids(&reflector), vec!["A", "B"]);

    reflector.handle.accept_ride(BookingId::from("A")).await?;

    assert_eq!(held(&reflector), Some(("A".to_string(), RideStatus::ACCEPTED)));
    assert_eq!(pending_ids(&reflector), vec!["B"]);
    assert!(api.calls().contains(&"pending:sedan".to_string()));
    Ok(())
}

#[tokio::test]
async fn second_accept_is_rejected_without_a_call() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A", "B"]));
    let reflector = start(&api, QUIET).await?;
    reflector.handle.accept_ride(BookingId::from("A")).await?;

    let result = reflector.handle.accept_ride(BookingId::from("B")).await;

    assert_eq!(
        result,
        Err(AppError::IllegalTransition {
            event: RideEventKind::Accept,
            status: Some(RideStatus::ACCEPTED)
        })
    );
    assert_eq!(api.count("accept:B"), 0);
    assert_eq!(held(&reflector), Some(("A".to_string(), RideStatus::ACCEPTED)));
    Ok(())
}

#[tokio::test]
async fn illegal_and_invalid_transitions_never_reach_the_backend() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A"]));
    let reflector = start(&api, QUIET).await?;
    reflector.handle.accept_ride(BookingId::from("A")).await?;

    let complete = reflector.handle.complete(None).await;
    let cancel = reflector.handle.cancel("   ").await;

    assert!(matches!(complete, Err(AppError::IllegalTransition { .. })));
    assert!(matches!(cancel, Err(AppError::ValidationFailure(_))));
    assert_eq!(
        reflector.handle.view().last_error.map(|last| last.operation),
        Some(Operation::Cancel)
    );
    assert_eq!(api.count("complete"), 0);
    assert_eq!(api.count("cancel"), 0);
    assert_eq!(held(&reflector), Some(("A".to_string(), RideStatus::ACCEPTED)));
    Ok(())
}

#[tokio::test]
async fn full_ride_moves_into_history() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A"]));
    let reflector = start(&api, QUIET).await?;
    let handle = &reflector.handle;

    handle.accept_ride(BookingId::from("A")).await?;
    handle.arrived().await?;
    assert_eq!(held(&reflector), Some(("A".to_string(), RideStatus::ARRIVED)));
    handle.start().await?;
    assert_eq!(held(&reflector), Some(("A".to_string(), RideStatus::ONGOING)));
    handle
        .complete(Some(Point {
            lat: Latitude(13.19),
            lon: Longitude(77.7),
        }))
        .await?;

    let view = handle.view();
    assert_eq!(view.active, None);
    assert_eq!(view.history.first().map(|ride| ride.status), Some(RideStatus::COMPLETED));
    assert!(api.calls().contains(&"complete:A@13.19,77.7".to_string()));

    // the completed ride triggers a history refresh
    wait_for_calls(&api, "history", 2).await?;
    Ok(())
}

#[tokio::test]
async fn cancelled_ride_refreshes_pending() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A", "B"]));
    let reflector = start(&api, QUIET).await?;
    reflector.handle.refresh_pending().await?;
    reflector.handle.accept_ride(BookingId::from("A")).await?;
    let before = api.count("pending");

    reflector.handle.cancel("Customer unreachable").await?;

    assert_eq!(held(&reflector), None);
    assert!(api
        .calls()
        .contains(&"cancel:A:Customer unreachable".to_string()));
    wait_for_calls(&api, "pending", before + 1).await?;
    Ok(())
}

#[tokio::test]
async fn pushes_advance_the_ride_and_stale_ones_are_dropped() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A"]));
    let reflector = start(&api, QUIET).await?;
    reflector.handle.accept_ride(BookingId::from("A")).await?;

    reflector
        .push_events
        .send(PushEvent::Update(ride("A", RideStatus::ONGOING)))
        .await?;
    wait_until(&reflector.handle, |view| {
        view.active.as_ref().map(|ride| ride.status) == Some(RideStatus::ONGOING)
    })
    .await?;

    reflector
        .push_events
        .send(PushEvent::Update(ride("A", RideStatus::ACCEPTED)))
        .await?;
    // same lifecycle point, only the eta moves
    let mut marker = ride("A", RideStatus::ONGOING);
    marker.eta_minutes = Some(7);
    reflector.push_events.send(PushEvent::Update(marker)).await?;

    let view = wait_until(&reflector.handle, |view| {
        view.active.as_ref().and_then(|ride| ride.eta_minutes) == Some(7)
    })
    .await?;
    assert_eq!(view.active.map(|ride| ride.status), Some(RideStatus::ONGOING));
    Ok(())
}

#[tokio::test]
async fn concluded_ride_is_not_resurrected_by_push() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A"]));
    let reflector = start(&api, QUIET).await?;
    let handle = &reflector.handle;
    handle.accept_ride(BookingId::from("A")).await?;
    handle.arrived().await?;
    handle.start().await?;
    handle.complete(None).await?;

    reflector
        .push_events
        .send(PushEvent::Update(ride("A", RideStatus::ACCEPTED)))
        .await?;
    reflector
        .push_events
        .send(PushEvent::Update(ride("C", RideStatus::PENDING)))
        .await?;

    // C is only taken when the slot is still empty after the stale frame
    let view = wait_until(handle, |view| view.active.is_some()).await?;
    assert_eq!(
        view.active.map(|ride| ride.booking_id),
        Some(BookingId::from("C"))
    );
    Ok(())
}

#[tokio::test]
async fn accept_conflict_refreshes_pending() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A", "B"]));
    let reflector = start(&api, QUIET).await?;
    reflector.handle.refresh_pending().await?;
    let before = api.count("pending");
    api.fail_next(
        "accept",
        AppError::ConflictFailure("Ride already accepted".to_string()),
    );

    let result = reflector.handle.accept_ride(BookingId::from("A")).await;

    assert!(matches!(result, Err(AppError::ConflictFailure(_))));
    let view = reflector.handle.view();
    assert_eq!(view.active, None);
    assert_eq!(
        view.last_error.map(|last| last.operation),
        Some(Operation::Accept)
    );
    wait_for_calls(&api, "pending", before + 1).await?;
    Ok(())
}

#[tokio::test]
async fn failed_refresh_keeps_stale_list_and_success_clears_error() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A", "B"]));
    let reflector = start(&api, QUIET).await?;
    reflector.handle.refresh_pending().await?;

    api.fail_next(
        "pending",
        AppError::NetworkFailure("connection refused".to_string()),
    );
    let result = reflector.handle.refresh_pending().await;

    assert!(matches!(result, Err(ref err) if err.is_retryable()));
    assert_eq!(pending_ids(&reflector), vec!["A", "B"]);
    assert_eq!(
        reflector.handle.view().last_error.map(|last| last.operation),
        Some(Operation::RefreshPending)
    );

    reflector.handle.refresh_pending().await?;
    assert_eq!(reflector.handle.view().last_error, None);
    Ok(())
}

#[tokio::test]
async fn unauthorized_backend_requires_reauthentication() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A"]));
    let reflector = start(&api, QUIET).await?;
    reflector.handle.refresh_pending().await?;

    api.fail_next("pending", AppError::AuthFailure("Token expired".to_string()));
    let result = reflector.handle.refresh_pending().await;

    assert!(matches!(result, Err(AppError::AuthFailure(_))));
    let view = reflector.handle.view();
    assert!(view.requires_reauthentication);
    assert!(!view.polling);
    Ok(())
}

#[tokio::test]
async fn backend_without_active_ride_clears_the_slot() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A"]));
    let reflector = start(&api, QUIET).await?;
    reflector.handle.accept_ride(BookingId::from("A")).await?;

    api.set_active(None);
    reflector.handle.refresh_active().await?;

    assert_eq!(held(&reflector), None);
    assert_eq!(reflector.handle.view().last_error, None);
    Ok(())
}

#[tokio::test]
async fn push_connection_pauses_polling_and_disconnect_resumes_it() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A"]));
    let reflector = start(&api, Duration::from_millis(20)).await?;
    wait_for_calls(&api, "pending", 2).await?;

    reflector.push_events.send(PushEvent::Connected).await?;
    wait_until(&reflector.handle, |view| view.push_connected && !view.polling).await?;
    // let a poll that was already in flight land
    tokio::time::sleep(Duration::from_millis(50)).await;
    let paused_at = api.count("pending");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(api.count("pending"), paused_at);

    reflector
        .push_events
        .send(PushEvent::Disconnected("connection reset".to_string()))
        .await?;
    wait_until(&reflector.handle, |view| view.polling).await?;
    wait_for_calls(&api, "pending", paused_at + 2).await?;
    Ok(())
}

#[tokio::test]
async fn logout_stops_the_reflector() -> anyhow::Result<()> {
    let api = Arc::new(RecordingApi::with_pending(&["A"]));
    let Reflector {
        handle,
        push_events,
        task,
    } = start(&api, QUIET).await?;
    handle.accept_ride(BookingId::from("A")).await?;

    handle.logout().await?;
    task.await?;

    let view = handle.view();
    assert_eq!(view.active, None);
    assert!(!view.polling);
    assert_eq!(
        handle.refresh_pending().await,
        Err(AppError::ReflectorStopped)
    );
    assert!(push_events.is_closed());
    Ok(())
}
