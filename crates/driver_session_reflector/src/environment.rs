/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use std::{
    env::var,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    common::types::{DriverId, Token, VehicleType},
    tools::{error::AppError, logger::LoggerConfig},
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub logger_cfg: LoggerConfig,
    pub api_base_url: String,
    pub push_url: String,
    pub poll_interval: u64,
    pub request_timeout: u64,
    pub push_reconnect_delay: u64,
    pub push_reconnect_max_attempts: u32,
    pub command_buffer: usize,
}

pub fn read_dhall_config(config_path: &str) -> Result<AppConfig, AppError> {
    serde_dhall::from_file(config_path)
        .parse::<AppConfig>()
        .map_err(|err| AppError::InvalidConfiguration(format!("Error reading config: {err}")))
}

/// Validated runtime settings of one reflector.
#[derive(Debug, Clone)]
pub struct ReflectorConfig {
    pub api_base_url: Url,
    pub push_url: Url,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub push_reconnect_delay: Duration,
    pub push_reconnect_max_attempts: u32,
    pub command_buffer: usize,
}

impl ReflectorConfig {
    /// Defaults mirror the driver dashboard: ten second polling and request timeout.
    pub fn new(api_base_url: Url, push_url: Url) -> Self {
        ReflectorConfig {
            api_base_url,
            push_url,
            poll_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            push_reconnect_delay: Duration::from_secs(5),
            push_reconnect_max_attempts: 5,
            command_buffer: 64,
        }
    }
}

impl TryFrom<&AppConfig> for ReflectorConfig {
    type Error = AppError;

    fn try_from(app_config: &AppConfig) -> Result<Self, Self::Error> {
        let api_base_url = Url::parse(&app_config.api_base_url).map_err(|err| {
            AppError::InvalidConfiguration(format!("api_base_url : {err}"))
        })?;
        let push_url = Url::parse(&app_config.push_url)
            .map_err(|err| AppError::InvalidConfiguration(format!("push_url : {err}")))?;

        if !matches!(push_url.scheme(), "ws" | "wss") {
            return Err(AppError::InvalidConfiguration(format!(
                "push_url must be a ws:// or wss:// url, got {push_url}"
            )));
        }

        if app_config.poll_interval == 0 || app_config.command_buffer == 0 {
            return Err(AppError::InvalidConfiguration(
                "poll_interval and command_buffer must be positive".to_string(),
            ));
        }

        Ok(ReflectorConfig {
            api_base_url,
            push_url,
            poll_interval: Duration::from_secs(app_config.poll_interval),
            request_timeout: Duration::from_secs(app_config.request_timeout),
            push_reconnect_delay: Duration::from_secs(app_config.push_reconnect_delay),
            push_reconnect_max_attempts: app_config.push_reconnect_max_attempts,
            command_buffer: app_config.command_buffer,
        })
    }
}

/// Who the reflector acts for. Built once at login and handed to the reflector,
/// invalidated on logout so every collaborator holding a clone stops using it.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub driver_id: DriverId,
    pub vehicle_type: VehicleType,
    token: Token,
    invalidated: Arc<AtomicBool>,
}

impl SessionContext {
    pub fn new(driver_id: DriverId, vehicle_type: VehicleType, token: Token) -> Self {
        SessionContext {
            driver_id,
            vehicle_type,
            token,
            invalidated: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let read = |key: &str| {
            var(key)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::InvalidConfiguration(format!("{key} is not set")))
        };

        Ok(SessionContext::new(
            DriverId(read("DRIVER_ID")?),
            VehicleType(var("VEHICLE_TYPE").unwrap_or_else(|_| "sedan".to_string())),
            Token(read("AUTH_TOKEN")?),
        ))
    }

    pub fn bearer(&self) -> Result<String, AppError> {
        if !self.is_valid() {
            return Err(AppError::AuthFailure(
                "Session has been logged out".to_string(),
            ));
        }
        let Token(token) = &self.token;
        Ok(format!("Bearer {token}"))
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn is_valid(&self) -> bool {
        !self.invalidated.load(Ordering::Relaxed)
    }

    pub fn invalidate(&self) {
        if !self.invalidated.swap(true, Ordering::Relaxed) {
            info!(tag = "[Session Invalidated]", driver_id = %self.driver_id.0);
        }
    }
}
