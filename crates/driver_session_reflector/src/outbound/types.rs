/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use serde::{Deserialize, Serialize};

use crate::common::{types::*, utils::deserialize_optional_datetime};
use chrono::NaiveDateTime;

// Ride lifecycle payload, shared by every REST response and by push frames
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RideLifecycleResponse {
    pub booking_id: BookingId,
    pub booking_code: Option<String>,
    pub status: RideStatus,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub pickup_address: Option<String>,
    pub pickup_lat: Option<f64>,
    pub pickup_lng: Option<f64>,
    #[serde(default)]
    pub drop_address: Option<String>,
    pub drop_lat: Option<f64>,
    pub drop_lng: Option<f64>,
    pub distance: Option<f64>,
    pub fare: Option<f64>,
    pub passenger_count: Option<u32>,
    pub vehicle_type: Option<String>,
    pub cancellation_reason: Option<String>,
    pub eta_minutes: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub accepted_at: Option<NaiveDateTime>,
}

fn place(address: Option<String>, lat: Option<f64>, lng: Option<f64>) -> Place {
    Place {
        address: address.unwrap_or_default(),
        location: match (lat, lng) {
            (Some(lat), Some(lng)) => Some(Point {
                lat: Latitude(lat),
                lon: Longitude(lng),
            }),
            _ => None,
        },
    }
}

impl From<RideLifecycleResponse> for RideSession {
    fn from(response: RideLifecycleResponse) -> Self {
        RideSession {
            booking_id: response.booking_id,
            booking_code: response.booking_code,
            status: response.status,
            customer: Customer {
                name: response.customer_name.unwrap_or_default(),
                phone: response.customer_phone.unwrap_or_default(),
            },
            pickup: place(
                response.pickup_address,
                response.pickup_lat,
                response.pickup_lng,
            ),
            dropoff: place(response.drop_address, response.drop_lat, response.drop_lng),
            distance_km: response.distance,
            fare: response.fare,
            passenger_count: response.passenger_count.unwrap_or(1).max(1),
            vehicle_type: response.vehicle_type.map(VehicleType),
            cancellation_reason: response.cancellation_reason,
            eta_minutes: response.eta_minutes,
            created_at: response.created_at,
            accepted_at: response.accepted_at,
        }
    }
}

// Driver cancellation
#[derive(Serialize, Deserialize, Debug)]
pub struct CancelRideRequest {
    pub reason: String,
}

// Push channel subscription, sent once the socket is open
#[derive(Serialize, Debug)]
pub struct SubscribeFrame {
    pub action: String,
    pub destination: String,
}

// Push frames arrive either wrapped (`{"body": "<json>"}`) or as the bare payload
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum PushFrame {
    Envelope { body: String },
    Bare(RideLifecycleResponse),
}
