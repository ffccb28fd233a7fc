/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use crate::common::types::{BookingId, Point, RideEvent};
use crate::domain::types::reflector::*;
use crate::environment::{ReflectorConfig, SessionContext};
use crate::outbound::external::RideApi;
use crate::reflector::run_reflector;
use crate::tools::error::AppError;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

/// Entry point for the rendering layer.
///
/// Every intent resolves once its effect has been applied to the published view,
/// or with the error that was surfaced for it.
#[derive(Debug, Clone)]
pub struct ReflectorHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<RideSessionView>,
}

impl ReflectorHandle {
    async fn send(&self, intent: Intent) -> Result<(), AppError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(Command { intent, reply })
            .await
            .map_err(|_| AppError::ReflectorStopped)?;
        answer.await.map_err(|_| AppError::ReflectorStopped)?
    }

    pub async fn refresh_pending(&self) -> Result<(), AppError> {
        self.send(Intent::RefreshPending).await
    }

    pub async fn refresh_active(&self) -> Result<(), AppError> {
        self.send(Intent::RefreshActive).await
    }

    pub async fn refresh_history(&self) -> Result<(), AppError> {
        self.send(Intent::RefreshHistory).await
    }

    pub async fn accept_ride(&self, booking_id: BookingId) -> Result<(), AppError> {
        self.send(Intent::Accept(booking_id)).await
    }

    pub async fn advance(&self, event: RideEvent) -> Result<(), AppError> {
        self.send(Intent::Advance(event)).await
    }

    pub async fn arrived(&self) -> Result<(), AppError> {
        self.advance(RideEvent::Arrived).await
    }

    pub async fn start(&self) -> Result<(), AppError> {
        self.advance(RideEvent::Start).await
    }

    pub async fn complete(&self, final_location: Option<Point>) -> Result<(), AppError> {
        self.advance(RideEvent::Complete { final_location }).await
    }

    pub async fn cancel(&self, reason: impl Into<String>) -> Result<(), AppError> {
        self.advance(RideEvent::Cancel {
            reason: reason.into(),
        })
        .await
    }

    pub async fn set_browsing_pending(&self, browsing: bool) -> Result<(), AppError> {
        self.send(Intent::SetBrowsing(browsing)).await
    }

    /// Invalidates the session context and stops the reflector.
    pub async fn logout(&self) -> Result<(), AppError> {
        self.send(Intent::Logout).await
    }

    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.send(Intent::Shutdown).await
    }

    pub fn view(&self) -> RideSessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RideSessionView> {
        self.view.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }
}

pub struct Reflector {
    pub handle: ReflectorHandle,
    /// Feed for the push channel, or any other source of server pushed updates.
    pub push_events: mpsc::Sender<PushEvent>,
    pub task: JoinHandle<()>,
}

/// Starts a reflector for one driver session on the current runtime.
pub fn spawn_reflector(
    config: &ReflectorConfig,
    context: SessionContext,
    api: Arc<dyn RideApi>,
) -> Reflector {
    let (commands, command_receiver) = mpsc::channel(config.command_buffer.max(1));
    let (push_events, push_receiver) = mpsc::channel(config.command_buffer.max(1));
    let (view_sender, view) = watch::channel(RideSessionView::default());

    let task = tokio::spawn(run_reflector(
        api,
        context,
        config.poll_interval,
        command_receiver,
        push_receiver,
        view_sender,
    ));

    Reflector {
        handle: ReflectorHandle { commands, view },
        push_events,
        task,
    }
}
