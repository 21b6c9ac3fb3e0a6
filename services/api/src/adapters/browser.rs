//! services/api/src/adapters/browser.rs
//!
//! Implements the browser-capability ports over the WebSocket connection.
//! The server cannot touch the student's browser directly, so fullscreen
//! requests are relayed as protocol messages for the client script to act on.

use crate::web::protocol::ServerMessage;
use async_trait::async_trait;
use exam_core::ports::{FullscreenControl, PortError, PortResult};
use tokio::sync::mpsc::UnboundedSender;

/// Relays fullscreen commands to the connected client.
///
/// Sending only proves the message was queued; whether the browser honors it
/// comes back later as a `FullscreenChange` event. A closed outbox means the
/// client is gone, which surfaces as `Unavailable`.
pub struct WsFullscreenAdapter {
    outbox: UnboundedSender<ServerMessage>,
}

impl WsFullscreenAdapter {
    pub fn new(outbox: UnboundedSender<ServerMessage>) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl FullscreenControl for WsFullscreenAdapter {
    async fn request_fullscreen(&self) -> PortResult<()> {
        self.outbox
            .send(ServerMessage::RequestFullscreen)
            .map_err(|_| PortError::Unavailable("Client connection is closed".to_string()))
    }

    async fn exit_fullscreen(&self) -> PortResult<()> {
        self.outbox
            .send(ServerMessage::ExitFullscreen)
            .map_err(|_| PortError::Unavailable("Client connection is closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fullscreen_commands_are_relayed_to_the_outbox() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let adapter = WsFullscreenAdapter::new(tx);

        adapter.request_fullscreen().await.unwrap();
        adapter.exit_fullscreen().await.unwrap();

        assert!(matches!(rx.recv().await, Some(ServerMessage::RequestFullscreen)));
        assert!(matches!(rx.recv().await, Some(ServerMessage::ExitFullscreen)));
    }

    #[tokio::test]
    async fn closed_outbox_reports_unavailable() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let adapter = WsFullscreenAdapter::new(tx);
        assert!(matches!(
            adapter.request_fullscreen().await,
            Err(PortError::Unavailable(_))
        ));
    }
}
