/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use super::types::*;
use crate::common::{types::*, utils::join_path};
use crate::environment::{ReflectorConfig, SessionContext};
use crate::tools::callapi::{call_api, call_api_optional};
use crate::tools::error::AppError;
use async_trait::async_trait;
use reqwest::{Client, Method, Url};

/// Backend ride lifecycle endpoints used by the driver client.
#[async_trait]
pub trait RideApi: Send + Sync + 'static {
    async fn pending_rides(&self, vehicle_type: &VehicleType)
        -> Result<Vec<RideSession>, AppError>;

    /// `Ok(None)` when the backend reports no active ride for the driver.
    async fn active_ride(&self) -> Result<Option<RideSession>, AppError>;

    async fn accept(&self, booking_id: &BookingId) -> Result<RideSession, AppError>;

    async fn arrived(&self, booking_id: &BookingId) -> Result<RideSession, AppError>;

    async fn start(&self, booking_id: &BookingId) -> Result<RideSession, AppError>;

    async fn complete(
        &self,
        booking_id: &BookingId,
        final_location: Option<&Point>,
    ) -> Result<RideSession, AppError>;

    async fn cancel(&self, booking_id: &BookingId, reason: &str) -> Result<RideSession, AppError>;

    async fn history(&self) -> Result<Vec<RideSession>, AppError>;
}

pub struct HttpRideApi {
    client: Client,
    api_base_url: Url,
    context: SessionContext,
}

impl HttpRideApi {
    pub fn new(config: &ReflectorConfig, context: SessionContext) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| AppError::InvalidConfiguration(err.to_string()))?;

        Ok(HttpRideApi {
            client,
            api_base_url: config.api_base_url.to_owned(),
            context,
        })
    }

    fn url(&self, path: &str) -> Result<Url, AppError> {
        join_path(&self.api_base_url, path)
            .map_err(|err| AppError::InvalidRequest(format!("Invalid Url {path} : {err}")))
    }

    async fn put_transition(
        &self,
        url: Url,
        body: Option<CancelRideRequest>,
    ) -> Result<RideSession, AppError> {
        let bearer = self.context.bearer()?;
        call_api::<RideLifecycleResponse, CancelRideRequest>(
            &self.client,
            Method::PUT,
            &url,
            vec![("authorization", bearer.as_str())],
            body,
        )
        .await
        .map(RideSession::from)
    }

    async fn get_list(&self, url: Url) -> Result<Vec<RideSession>, AppError> {
        let bearer = self.context.bearer()?;
        let rides = call_api::<Vec<RideLifecycleResponse>, ()>(
            &self.client,
            Method::GET,
            &url,
            vec![("authorization", bearer.as_str())],
            None,
        )
        .await?;
        Ok(rides.into_iter().map(RideSession::from).collect())
    }
}

#[async_trait]
impl RideApi for HttpRideApi {
    async fn pending_rides(
        &self,
        vehicle_type: &VehicleType,
    ) -> Result<Vec<RideSession>, AppError> {
        let mut url = self.url("rides/pending")?;
        url.query_pairs_mut()
            .append_pair("vehicleType", vehicle_type.0.as_str());
        self.get_list(url).await
    }

    async fn active_ride(&self) -> Result<Option<RideSession>, AppError> {
        let bearer = self.context.bearer()?;
        let ride = call_api_optional::<RideLifecycleResponse, ()>(
            &self.client,
            Method::GET,
            &self.url("rides/active")?,
            vec![("authorization", bearer.as_str())],
            None,
        )
        .await?;
        Ok(ride.map(RideSession::from))
    }

    async fn accept(&self, booking_id: &BookingId) -> Result<RideSession, AppError> {
        let url = self.url(&format!("rides/{booking_id}/accept"))?;
        // the backend answers an already claimed ride with a plain 400
        self.put_transition(url, None).await.map_err(|err| match err {
            AppError::RequestRejected(400, message) => AppError::ConflictFailure(message),
            err => err,
        })
    }

    async fn arrived(&self, booking_id: &BookingId) -> Result<RideSession, AppError> {
        let url = self.url(&format!("rides/{booking_id}/arrived"))?;
        self.put_transition(url, None).await
    }

    async fn start(&self, booking_id: &BookingId) -> Result<RideSession, AppError> {
        let url = self.url(&format!("rides/{booking_id}/start"))?;
        self.put_transition(url, None).await
    }

    async fn complete(
        &self,
        booking_id: &BookingId,
        final_location: Option<&Point>,
    ) -> Result<RideSession, AppError> {
        let mut url = self.url(&format!("rides/{booking_id}/complete"))?;
        if let Some(Point {
            lat: Latitude(lat),
            lon: Longitude(lon),
        }) = final_location
        {
            url.query_pairs_mut()
                .append_pair("finalLat", &lat.to_string())
                .append_pair("finalLng", &lon.to_string());
        }
        self.put_transition(url, None).await
    }

    async fn cancel(&self, booking_id: &BookingId, reason: &str) -> Result<RideSession, AppError> {
        let url = self.url(&format!("rides/{booking_id}/cancel"))?;
        self.put_transition(
            url,
            Some(CancelRideRequest {
                reason: reason.to_string(),
            }),
        )
        .await
    }

    async fn history(&self) -> Result<Vec<RideSession>, AppError> {
        self.get_list(self.url("rides/driver/history")?).await
    }
}
