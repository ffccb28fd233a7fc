/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::call_external_api;
use crate::tools::error::AppError;
use crate::tools::prometheus::CALL_EXTERNAL_API;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;
use tracing::{error, info};

#[derive(Deserialize, Debug, Default)]
struct ErrorResponse {
    message: Option<String>,
}

/// Sends an asynchronous API request and deserializes a successful response body into `T`.
///
/// Headers are given as key-value pairs, and the body (if any) is serialized to JSON.
/// Non-success statuses are mapped onto the client error taxonomy:
///
/// * `401` / `403` - `AppError::AuthFailure`
/// * `409` - `AppError::ConflictFailure`
/// * any other `4xx` - `AppError::RequestRejected` with the server message
/// * `5xx`, timeouts and transport errors - `AppError::NetworkFailure`
///
/// # Example
///
/// ```ignore
/// let url = Url::parse("http://localhost:8080/api/rides/driver/history").unwrap();
/// let history: Vec<RideLifecycleResponse> =
///     call_api(&client, Method::GET, &url, vec![("authorization", "Bearer TOKEN123")], None::<()>).await?;
/// ```
pub async fn call_api<T, U>(
    client: &Client,
    method: Method,
    url: &Url,
    headers: Vec<(&str, &str)>,
    body: Option<U>,
) -> Result<T, AppError>
where
    T: DeserializeOwned,
    U: Serialize + Debug,
{
    let resp = send_request(client, method, url, headers, body, &[]).await?;
    decode_body(resp).await
}

/// Same as [`call_api`] but treats `204 No Content` and `404 Not Found` as an absent
/// resource, which is how the backend answers "no active ride".
pub async fn call_api_optional<T, U>(
    client: &Client,
    method: Method,
    url: &Url,
    headers: Vec<(&str, &str)>,
    body: Option<U>,
) -> Result<Option<T>, AppError>
where
    T: DeserializeOwned,
    U: Serialize + Debug,
{
    let empty_statuses = [StatusCode::NO_CONTENT, StatusCode::NOT_FOUND];
    let resp = send_request(client, method, url, headers, body, &empty_statuses).await?;

    if empty_statuses.contains(&resp.status()) {
        return Ok(None);
    }

    Ok(Some(decode_body(resp).await?))
}

async fn decode_body<T>(resp: Response) -> Result<T, AppError>
where
    T: DeserializeOwned,
{
    let text = resp
        .text()
        .await
        .map_err(|err| AppError::NetworkFailure(err.to_string()))?;
    serde_json::from_str::<T>(&text).map_err(|err| AppError::DeserializationError(err.to_string()))
}

async fn send_request<U>(
    client: &Client,
    method: Method,
    url: &Url,
    headers: Vec<(&str, &str)>,
    body: Option<U>,
    empty_statuses: &[StatusCode],
) -> Result<Response, AppError>
where
    U: Serialize + Debug,
{
    let start_time = std::time::Instant::now();

    let mut header_map = HeaderMap::new();

    for (header_key, header_value) in headers {
        let header_name = HeaderName::from_str(header_key)
            .map_err(|_| AppError::InvalidRequest(format!("Invalid Header Name : {header_key}")))?;
        let header_value = HeaderValue::from_str(header_value)
            .map_err(|_| AppError::InvalidRequest(format!("Invalid Header Value : {header_key}")))?;

        header_map.insert(header_name, header_value);
    }

    let mut request = client
        .request(method.to_owned(), url.to_owned())
        .headers(header_map.to_owned());

    if let Some(body) = &body {
        let body = serde_json::to_string(body)
            .map_err(|err| AppError::SerializationError(err.to_string()))?;
        request = request
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
    }

    let resp = request.send().await;

    let url_str = format!(
        "{}://{}:{}",
        url.scheme(),
        url.host_str().unwrap_or(""),
        url.port_or_known_default().unwrap_or(80)
    );

    let status = match resp.as_ref() {
        Ok(resp) => resp.status().as_str().to_string(),
        Err(err) => err
            .status()
            .map(|status| status.to_string())
            .unwrap_or("UNKNOWN".to_string()),
    };

    call_external_api!(
        method.as_str(),
        url_str.as_str(),
        url.path(),
        status.as_str(),
        start_time
    );

    match resp {
        Ok(resp) => {
            if resp.status().is_success() || empty_statuses.contains(&resp.status()) {
                info!(tag = "[OUTGOING API]", request_method = %method, request_body = format!("{:?}", body), request_url = %url, status = %resp.status(), latency = format!("{:?}ms", start_time.elapsed().as_millis()));
                Ok(resp)
            } else {
                let status = resp.status();
                let message = resp
                    .json::<ErrorResponse>()
                    .await
                    .unwrap_or_default()
                    .message
                    .unwrap_or_else(|| status.to_string());
                error!(tag = "[OUTGOING API - ERROR]", request_method = %method, request_body = format!("{:?}", body), request_url = %url, status = %status, error = %message, latency = format!("{:?}ms", start_time.elapsed().as_millis()));
                Err(error_from_status(status, message))
            }
        }
        Err(err) => {
            error!(tag = "[OUTGOING API - ERROR]", request_method = %method, request_body = format!("{:?}", body), request_url = %url, error = format!("{:?}", err), latency = format!("{:?}ms", start_time.elapsed().as_millis()));
            Err(AppError::NetworkFailure(err.to_string()))
        }
    }
}

pub fn error_from_status(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::AuthFailure(message),
        StatusCode::CONFLICT => AppError::ConflictFailure(message),
        status if status.is_client_error() => AppError::RequestRejected(status.as_u16(), message),
        status => AppError::NetworkFailure(format!("{status} : {message}")),
    }
}
