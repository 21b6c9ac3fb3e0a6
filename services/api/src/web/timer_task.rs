//! services/api/src/web/timer_task.rs
//!
//! This module contains the asynchronous "worker" function responsible for
//! the exam countdown.

use crate::web::protocol::ServerMessage;
use exam_core::session::{ExamSessionEngine, TickOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The main asynchronous task for the exam countdown.
///
/// Ticks the session engine once per second and streams the remaining time
/// to the client. When the timer reaches zero the engine performs the
/// terminal transition itself; this task only reports it. Designed to be
/// gracefully cancelled via a `CancellationToken` when the connection closes.
pub async fn countdown_process(
    engine: Arc<Mutex<ExamSessionEngine>>,
    outbox: UnboundedSender<ServerMessage>,
    cancellation_token: CancellationToken,
) {
    info!("Countdown task started.");
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    // The first tick of a tokio interval fires immediately; consume it so
    // the countdown starts a full second after the exam begins.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                info!("Countdown task cancelled.");
                return;
            }
            _ = interval.tick() => {}
        }

        let outcome = {
            let mut engine = engine.lock().await;
            engine.tick().await
        };

        match outcome {
            TickOutcome::Ticked { remaining_seconds } => {
                if outbox.send(ServerMessage::Tick { remaining_seconds }).is_err() {
                    info!("Client gone; stopping countdown task.");
                    return;
                }
            }
            TickOutcome::Ended(outcome) => {
                info!("Exam time expired.");
                let _ = outbox.send(ServerMessage::from_outcome(&outcome));
                return;
            }
            // The session ended through another path; nothing left to count.
            TickOutcome::Ignored => return,
        }
    }
}
