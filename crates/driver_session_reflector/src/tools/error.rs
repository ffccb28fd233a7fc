/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::common::types::{RideEventKind, RideStatus};
use serde::Serialize;

/// Failures surfaced by the reflector and its collaborators.
///
/// The first five variants are the taxonomy the rendering layer reacts to; the
/// rest describe local plumbing failures (encoding, configuration, teardown).
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum AppError {
    #[error("NETWORK_FAILURE")]
    NetworkFailure(String),
    #[error("AUTH_FAILURE")]
    AuthFailure(String),
    #[error("CONFLICT_FAILURE")]
    ConflictFailure(String),
    #[error("ILLEGAL_TRANSITION")]
    IllegalTransition {
        event: RideEventKind,
        status: Option<RideStatus>,
    },
    #[error("VALIDATION_FAILURE")]
    ValidationFailure(String),
    #[error("REQUEST_REJECTED")]
    RequestRejected(u16, String),
    #[error("SERIALIZATION_ERROR")]
    SerializationError(String),
    #[error("DESERIALIZATION_ERROR")]
    DeserializationError(String),
    #[error("INVALID_REQUEST")]
    InvalidRequest(String),
    #[error("INVALID_CONFIGURATION")]
    InvalidConfiguration(String),
    #[error("REFLECTOR_STOPPED")]
    ReflectorStopped,
}

impl AppError {
    pub fn message(&self) -> String {
        match self {
            AppError::NetworkFailure(err) => format!("Network Failure : {err}"),
            AppError::AuthFailure(err) => {
                format!("Authentication Failed, please login again : {err}")
            }
            AppError::ConflictFailure(err) => format!("Ride Conflict : {err}"),
            AppError::IllegalTransition {
                event,
                status: Some(status),
            } => {
                format!("Illegal Transition : Event - {event}, Ride Status - {status}")
            }
            AppError::IllegalTransition {
                event,
                status: None,
            } => {
                format!("Illegal Transition : Event - {event}, No Active Ride")
            }
            AppError::ValidationFailure(err) => err.to_string(),
            AppError::RequestRejected(status, err) => {
                format!("Request Rejected ({status}) : {err}")
            }
            AppError::SerializationError(err) => err.to_string(),
            AppError::DeserializationError(err) => err.to_string(),
            AppError::InvalidRequest(err) => err.to_string(),
            AppError::InvalidConfiguration(err) => {
                format!("Invalid Configuration : {err}")
            }
            AppError::ReflectorStopped => "Ride session reflector is stopped".to_string(),
        }
    }

    pub fn code(&self) -> String {
        match self {
            AppError::NetworkFailure(_) => "NETWORK_FAILURE",
            AppError::AuthFailure(_) => "AUTH_FAILURE",
            AppError::ConflictFailure(_) => "CONFLICT_FAILURE",
            AppError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            AppError::ValidationFailure(_) => "VALIDATION_FAILURE",
            AppError::RequestRejected(_, _) => "REQUEST_REJECTED",
            AppError::SerializationError(_) => "SERIALIZATION_ERROR",
            AppError::DeserializationError(_) => "DESERIALIZATION_ERROR",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            AppError::ReflectorStopped => "REFLECTOR_STOPPED",
        }
        .to_string()
    }

    /// Transient failures that the next poll may recover from.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::NetworkFailure(_))
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, AppError::AuthFailure(_))
    }
}
