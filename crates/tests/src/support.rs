/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use anyhow::anyhow;
use async_trait::async_trait;
use driver_session_reflector::{
    common::types::*,
    domain::{api::handle::ReflectorHandle, types::reflector::RideSessionView},
    environment::{ReflectorConfig, SessionContext},
    outbound::external::RideApi,
    tools::error::AppError,
};
use reqwest::Url;
use std::{collections::HashMap, sync::Mutex, time::Duration};

pub fn ride(id: &str, status: RideStatus) -> RideSession {
    RideSession {
        booking_id: BookingId::from(id),
        booking_code: Some(format!("NFX-{id}")),
        status,
        customer: Customer {
            name: "Asha".to_string(),
            phone: "+91-9000000001".to_string(),
        },
        pickup: Place {
            address: "MG Road".to_string(),
            location: None,
        },
        dropoff: Place {
            address: "Airport".to_string(),
            location: None,
        },
        distance_km: Some(31.5),
        fare: Some(640.0),
        passenger_count: 1,
        vehicle_type: Some(VehicleType("sedan".to_string())),
        cancellation_reason: None,
        eta_minutes: None,
        created_at: None,
        accepted_at: None,
    }
}

pub fn context() -> SessionContext {
    SessionContext::new(
        DriverId("17".to_string()),
        VehicleType("sedan".to_string()),
        Token("jwt".to_string()),
    )
}

pub fn config(api_base_url: &str, poll_interval: Duration) -> anyhow::Result<ReflectorConfig> {
    let mut config = ReflectorConfig::new(
        Url::parse(api_base_url)?,
        Url::parse("ws://127.0.0.1:9/ws")?,
    );
    config.poll_interval = poll_interval;
    config.request_timeout = Duration::from_secs(2);
    Ok(config)
}

pub async fn wait_until(
    handle: &ReflectorHandle,
    predicate: impl Fn(&RideSessionView) -> bool,
) -> anyhow::Result<RideSessionView> {
    let mut view = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let current = view.borrow_and_update();
                if predicate(&current) {
                    return Ok::<_, anyhow::Error>(current.clone());
                }
            }
            view.changed()
                .await
                .map_err(|_| anyhow!("reflector stopped"))?;
        }
    })
    .await?
}

pub async fn wait_for_calls(
    api: &RecordingApi,
    prefix: &str,
    count: usize,
) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while api.count(prefix) < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

/// In-memory backend that agrees with every transition and remembers what it was asked.
#[derive(Default)]
pub struct RecordingApi {
    calls: Mutex<Vec<String>>,
    pending: Mutex<Vec<RideSession>>,
    active: Mutex<Option<RideSession>>,
    history: Mutex<Vec<RideSession>>,
    failures: Mutex<HashMap<&'static str, AppError>>,
}

impl RecordingApi {
    pub fn with_pending(ids: &[&str]) -> Self {
        let api = RecordingApi::default();
        *api.pending.lock().expect("pending lock") = ids
            .iter()
            .map(|id| ride(id, RideStatus::PENDING))
            .collect();
        api
    }

    /// Makes the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: &'static str, error: AppError) {
        self.failures
            .lock()
            .expect("failures lock")
            .insert(operation, error);
    }

    pub fn set_active(&self, active: Option<RideSession>) {
        *self.active.lock().expect("active lock") = active;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, operation: &'static str, call: String) -> Result<(), AppError> {
        self.calls.lock().expect("calls lock").push(call);
        match self.failures.lock().expect("failures lock").remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn moved_to(&self, booking_id: &BookingId, status: RideStatus) -> RideSession {
        let session = ride(&booking_id.0, status);
        if status.is_terminal() {
            self.set_active(None);
            self.history
                .lock()
                .expect("history lock")
                .insert(0, session.to_owned());
        } else {
            self.set_active(Some(session.to_owned()));
        }
        session
    }
}

#[async_trait]
impl RideApi for RecordingApi {
    async fn pending_rides(
        &self,
        vehicle_type: &VehicleType,
    ) -> Result<Vec<RideSession>, AppError> {
        self.record("pending", format!("pending:{}", vehicle_type.0))?;
        Ok(self.pending.lock().expect("pending lock").clone())
    }

    async fn active_ride(&self) -> Result<Option<RideSession>, AppError> {
        self.record("active", "active".to_string())?;
        Ok(self.active.lock().expect("active lock").clone())
    }

    async fn accept(&self, booking_id: &BookingId) -> Result<RideSession, AppError> {
        self.record("accept", format!("accept:{booking_id}"))?;
        self.pending
            .lock()
            .expect("pending lock")
            .retain(|ride| &ride.booking_id != booking_id);
        Ok(self.moved_to(booking_id, RideStatus::ACCEPTED))
    }

    async fn arrived(&self, booking_id: &BookingId) -> Result<RideSession, AppError> {
        self.record("arrived", format!("arrived:{booking_id}"))?;
        Ok(self.moved_to(booking_id, RideStatus::ARRIVED))
    }

    async fn start(&self, booking_id: &BookingId) -> Result<RideSession, AppError> {
        self.record("start", format!("start:{booking_id}"))?;
        Ok(self.moved_to(booking_id, RideStatus::ONGOING))
    }

    async fn complete(
        &self,
        booking_id: &BookingId,
        final_location: Option<&Point>,
    ) -> Result<RideSession, AppError> {
        let at = final_location
            .map(|Point { lat, lon }| format!("@{},{}", lat.0, lon.0))
            .unwrap_or_default();
        self.record("complete", format!("complete:{booking_id}{at}"))?;
        Ok(self.moved_to(booking_id, RideStatus::COMPLETED))
    }

    async fn cancel(&self, booking_id: &BookingId, reason: &str) -> Result<RideSession, AppError> {
        self.record("cancel", format!("cancel:{booking_id}:{reason}"))?;
        Ok(self.moved_to(booking_id, RideStatus::CANCELLED))
    }

    async fn history(&self) -> Result<Vec<RideSession>, AppError> {
        self.record("history", "history".to_string())?;
        Ok(self.history.lock().expect("history lock").clone())
    }
}
