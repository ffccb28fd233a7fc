/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use crate::common::types::{DriverId, RideSession, Token};
use crate::domain::types::reflector::PushEvent;
use crate::environment::{ReflectorConfig, SessionContext};
use crate::outbound::types::{PushFrame, RideLifecycleResponse, SubscribeFrame};
use crate::tools::error::AppError;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use std::time::Duration;
use tokio::{net::TcpStream, sync::mpsc::Sender, time::sleep};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{error, info, warn};

type PushStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a connected session ended.
enum SessionEnd {
    Closed(String),
    ReflectorGone,
}

pub fn topic(driver_id: &DriverId) -> String {
    format!("/topic/driver/{}", driver_id.0)
}

/// Parses one text frame into the ride it reports.
pub fn decode_frame(text: &str) -> Result<RideSession, AppError> {
    let frame = serde_json::from_str::<PushFrame>(text)
        .map_err(|err| AppError::DeserializationError(err.to_string()))?;
    let response = match frame {
        PushFrame::Envelope { body } => serde_json::from_str::<RideLifecycleResponse>(&body)
            .map_err(|err| AppError::DeserializationError(err.to_string()))?,
        PushFrame::Bare(response) => response,
    };
    Ok(RideSession::from(response))
}

fn push_url(base: &Url, Token(token): &Token) -> Url {
    let mut url = base.to_owned();
    url.query_pairs_mut().append_pair("token", token);
    url
}

async fn connect(push_url: &Url, context: &SessionContext) -> Result<PushStream, AppError> {
    let bearer = context.bearer()?;
    let mut request = push_url
        .as_str()
        .into_client_request()
        .map_err(|err| AppError::InvalidRequest(err.to_string()))?;
    request.headers_mut().insert(
        "authorization",
        HeaderValue::from_str(&bearer)
            .map_err(|_| AppError::InvalidRequest("Invalid Header Value : authorization".to_string()))?,
    );

    let (stream, _) = connect_async(request)
        .await
        .map_err(|err| AppError::NetworkFailure(format!("WebSocket connection failed: {err}")))?;
    Ok(stream)
}

async fn run_session(
    stream: PushStream,
    context: &SessionContext,
    sender: &Sender<PushEvent>,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    let subscribe = SubscribeFrame {
        action: "SUBSCRIBE".to_string(),
        destination: topic(&context.driver_id),
    };
    let subscribe = match serde_json::to_string(&subscribe) {
        Ok(subscribe) => subscribe,
        Err(err) => return SessionEnd::Closed(err.to_string()),
    };
    if let Err(err) = write.send(Message::Text(subscribe)).await {
        return SessionEnd::Closed(format!("Subscribe failed: {err}"));
    }

    if sender.send(PushEvent::Connected).await.is_err() {
        return SessionEnd::ReflectorGone;
    }
    info!(tag = "[Push Subscribed]", destination = %topic(&context.driver_id));

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                    Ok(session) => {
                        if sender.send(PushEvent::Update(session)).await.is_err() {
                            return SessionEnd::ReflectorGone;
                        }
                    }
                    Err(err) => {
                        warn!(tag = "[Push Frame Skipped]", error = %err.message(), frame = %text);
                    }
                },
                Some(Ok(Message::Close(close))) => {
                    let reason = close
                        .map(|close| close.reason.to_string())
                        .unwrap_or_else(|| "closed by server".to_string());
                    return SessionEnd::Closed(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return SessionEnd::Closed(err.to_string()),
                None => return SessionEnd::Closed("stream ended".to_string()),
            },
            _ = sender.closed() => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::ReflectorGone;
            },
        }
    }
}

/// Keeps the driver subscribed to their push topic until the reflector behind
/// `sender` goes away or the session context is invalidated.
///
/// Every lost or failed connection is reported as [`PushEvent::Disconnected`] so the
/// reflector can fall back to polling. Reconnects are attempted after
/// `push_reconnect_delay`, and the channel gives up after
/// `push_reconnect_max_attempts` consecutive failed attempts.
pub async fn run_push_channel(
    config: ReflectorConfig,
    context: SessionContext,
    sender: Sender<PushEvent>,
) {
    let push_url = push_url(&config.push_url, context.token());
    let mut failures: u32 = 0;

    loop {
        if !context.is_valid() || sender.is_closed() {
            info!(tag = "[Push Channel Stopped]");
            break;
        }

        let connected = tokio::select! {
            connected = connect(&push_url, &context) => connected,
            _ = sender.closed() => {
                info!(tag = "[Push Channel Stopped]");
                break;
            },
        };

        let reason = match connected {
            Ok(stream) => {
                failures = 0;
                match run_session(stream, &context, &sender).await {
                    SessionEnd::Closed(reason) => reason,
                    SessionEnd::ReflectorGone => {
                        info!(tag = "[Push Channel Stopped]");
                        break;
                    }
                }
            }
            Err(err) => {
                failures += 1;
                err.message()
            }
        };

        warn!(tag = "[Push Disconnected]", reason = %reason, failures = %failures);
        if sender.send(PushEvent::Disconnected(reason)).await.is_err() {
            break;
        }

        if failures >= config.push_reconnect_max_attempts.max(1) {
            error!(tag = "[Push Channel Given Up]", attempts = %failures);
            break;
        }

        tokio::select! {
            _ = sleep(reconnect_delay(&config)) => {},
            _ = sender.closed() => break,
        }
    }
}

fn reconnect_delay(config: &ReflectorConfig) -> Duration {
    config.push_reconnect_delay.max(Duration::from_millis(100))
}
