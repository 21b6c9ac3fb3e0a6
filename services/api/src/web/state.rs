//! services/api/src/web/state.rs
//!
//! Defines the application's shared and connection-specific states.

use crate::config::Config;
use crate::web::protocol::ServerMessage;
use exam_core::policy::SecurityPolicy;
use exam_core::ports::{ExamStore, SnapshotStore};
use exam_core::session::ExamSessionEngine;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ExamStore>,
    pub local: Arc<dyn SnapshotStore>,
    pub config: Arc<Config>,
    pub policy: SecurityPolicy,
}

//=========================================================================================
// ExamConnection (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single, active WebSocket connection: the session engine
/// plus the plumbing the dispatch loop and the timer task share.
pub struct ExamConnection {
    pub engine: Arc<Mutex<ExamSessionEngine>>,
    /// Queue of outbound protocol messages, drained by the writer task.
    pub outbox: UnboundedSender<ServerMessage>,
    /// Cancels the countdown task when the connection closes.
    pub timer_token: CancellationToken,
}

impl ExamConnection {
    pub fn new(engine: ExamSessionEngine, outbox: UnboundedSender<ServerMessage>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            outbox,
            timer_token: CancellationToken::new(),
        }
    }

    /// Queues one message for the client. A send failure means the client is
    /// gone; the dispatch loop will notice on its next read.
    pub fn send(&self, message: ServerMessage) {
        if self.outbox.send(message).is_err() {
            warn!("Dropped outbound message; client connection is closed");
        }
    }
}
