/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Serialize, Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct BookingId(pub String);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookingId {
    fn from(value: &str) -> Self {
        BookingId(value.to_string())
    }
}

// The backend keys bookings by a numeric id while the push channel has been seen
// sending it quoted, so both shapes are accepted and kept as an opaque string.
impl<'de> Deserialize<'de> for BookingId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{Error, Unexpected};

        struct BookingIdVisitor;

        #[allow(clippy::needless_lifetimes)]
        impl<'de> serde::de::Visitor<'de> for BookingIdVisitor {
            type Value = BookingId;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a non-empty booking id as an integer or a string")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
                Ok(BookingId(v.to_string()))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
                Ok(BookingId(v.to_string()))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                if value.trim().is_empty() {
                    return Err(Error::invalid_value(Unexpected::Str(value), &self));
                }
                Ok(BookingId(value.to_string()))
            }
        }

        deserializer.deserialize_any(BookingIdVisitor)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Eq, Hash, PartialEq)]
pub struct DriverId(pub String);

#[derive(Deserialize, Serialize, Clone, Debug, Eq, Hash, PartialEq)]
pub struct VehicleType(pub String);

#[derive(Deserialize, Clone, Eq, PartialEq)]
pub struct Token(pub String);

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(****)")
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Copy)]
pub struct Latitude(pub f64);

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Copy)]
pub struct Longitude(pub f64);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Point {
    pub lat: Latitude,
    pub lon: Longitude,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Place {
    pub address: String,
    pub location: Option<Point>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Customer {
    pub name: String,
    pub phone: String,
}

/// Ride lifecycle as seen by the driver client.
///
/// The backend leaks some of its internal booking statuses onto the wire, those
/// are folded into the six client statuses on deserialization.
#[derive(
    Debug, Clone, Copy, EnumString, EnumIter, Display, Serialize, Deserialize, Eq, Hash, PartialEq,
)]
pub enum RideStatus {
    #[strum(to_string = "PENDING", serialize = "BROADCASTED")]
    #[serde(alias = "BROADCASTED")]
    PENDING,
    ACCEPTED,
    ARRIVED,
    #[strum(to_string = "ONGOING", serialize = "STARTED", serialize = "IN_PROGRESS")]
    #[serde(alias = "STARTED", alias = "IN_PROGRESS")]
    ONGOING,
    COMPLETED,
    #[strum(
        to_string = "CANCELLED",
        serialize = "CANCELLED_BY_CUSTOMER",
        serialize = "CANCELLED_BY_DRIVER",
        serialize = "CANCELLED_BY_ADMIN",
        serialize = "EXPIRED"
    )]
    #[serde(
        alias = "CANCELLED_BY_CUSTOMER",
        alias = "CANCELLED_BY_DRIVER",
        alias = "CANCELLED_BY_ADMIN",
        alias = "EXPIRED"
    )]
    CANCELLED,
}

#[derive(Debug, Clone, Copy, Display, EnumIter, Serialize, Deserialize, Eq, Hash, PartialEq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideEventKind {
    Accept,
    Arrived,
    Start,
    Complete,
    Cancel,
}

/// Driver-issued transition on the held ride.
#[derive(Debug, Clone, PartialEq)]
pub enum RideEvent {
    Arrived,
    Start,
    Complete { final_location: Option<Point> },
    Cancel { reason: String },
}

impl RideEvent {
    pub fn kind(&self) -> RideEventKind {
        match self {
            RideEvent::Arrived => RideEventKind::Arrived,
            RideEvent::Start => RideEventKind::Start,
            RideEvent::Complete { .. } => RideEventKind::Complete,
            RideEvent::Cancel { .. } => RideEventKind::Cancel,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideSession {
    pub booking_id: BookingId,
    pub booking_code: Option<String>,
    pub status: RideStatus,
    pub customer: Customer,
    pub pickup: Place,
    pub dropoff: Place,
    pub distance_km: Option<f64>,
    pub fare: Option<f64>,
    pub passenger_count: u32,
    pub vehicle_type: Option<VehicleType>,
    pub cancellation_reason: Option<String>,
    pub eta_minutes: Option<u32>,
    pub created_at: Option<NaiveDateTime>,
    pub accepted_at: Option<NaiveDateTime>,
}
