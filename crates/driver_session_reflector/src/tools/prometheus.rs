/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
#![allow(clippy::expect_used)]

use prometheus::{
    opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

pub static CALL_EXTERNAL_API: once_cell::sync::Lazy<HistogramVec> =
    once_cell::sync::Lazy::new(|| {
        register_histogram_vec!(
            opts!("external_request_duration", "Outgoing backend API requests").into(),
            &["method", "host", "service", "status"]
        )
        .expect("Failed to register call external API metrics")
    });

pub static PUSH_UPDATES: once_cell::sync::Lazy<IntCounterVec> = once_cell::sync::Lazy::new(|| {
    register_int_counter_vec!(
        opts!("push_updates", "Push channel ride updates by outcome"),
        &["outcome"]
    )
    .expect("Failed to register push updates metrics")
});

pub static TRANSITIONS: once_cell::sync::Lazy<IntCounterVec> = once_cell::sync::Lazy::new(|| {
    register_int_counter_vec!(
        opts!("ride_transitions", "Driver ride transitions by event and outcome"),
        &["event", "outcome"]
    )
    .expect("Failed to register ride transitions metrics")
});

/// Observes the duration of an outgoing backend request.
///
/// # Arguments
///
/// * `$method` - HTTP method of the request.
/// * `$host` - Scheme, host and port of the target.
/// * `$path` - Path of the request.
/// * `$status` - Response status, or `UNKNOWN` when the request never got one.
/// * `$start` - `Instant` the request was issued at.
#[macro_export]
macro_rules! call_external_api {
    ($method:expr, $host:expr, $path:expr, $status:expr, $start:expr) => {
        let duration = $start.elapsed().as_secs_f64();
        CALL_EXTERNAL_API
            .with_label_values(&[$method, $host, $path, $status])
            .observe(duration);
    };
}

#[macro_export]
macro_rules! push_update {
    ($outcome:expr) => {
        $crate::tools::prometheus::PUSH_UPDATES
            .with_label_values(&[$outcome])
            .inc();
    };
}

#[macro_export]
macro_rules! transition {
    ($event:expr, $outcome:expr) => {
        $crate::tools::prometheus::TRANSITIONS
            .with_label_values(&[$event, $outcome])
            .inc();
    };
}

/// Renders every metric in the default registry in the text exposition format.
pub fn gather_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(tag = "[Metrics Encoding Failed]", error = %err);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
