//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! It owns one exam session engine and translates between the wire protocol
//! and the engine's transitions.

use crate::{
    adapters::WsFullscreenAdapter,
    web::{
        protocol::{ClientMessage, PublicQuestion, ServerMessage},
        state::{AppState, ExamConnection},
        timer_task::countdown_process,
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use exam_core::session::{AccessOutcome, ExamSessionEngine, SignalOutcome, StartOutcome};
use futures::StreamExt;
use futures::SinkExt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New WebSocket connection established.");

    let (mut sender, mut receiver) = socket.split();

    // All outbound traffic funnels through one queue so the timer task and
    // the fullscreen adapter can write without sharing the sink.
    let (outbox_tx, mut outbox_rx) = tokio::sync::mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbox_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // --- 1. Initialization Phase ---
    let connection = match init_connection(&app_state, &mut receiver, &outbox_tx).await {
        Some(connection) => connection,
        None => {
            drop(outbox_tx);
            let _ = writer.await;
            return;
        }
    };

    // --- 2. Main Message Loop ---
    loop {
        if let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_text_message(text.to_string(), &connection).await;
                }
                Message::Close(_) => {
                    info!("Client sent close message.");
                    break;
                }
                _ => {}
            }
        } else {
            info!("Client disconnected.");
            break;
        }
    }

    // --- 3. Cleanup ---
    // The snapshot written on every tick is what a reconnect resumes from;
    // an in-progress session is deliberately left untouched here.
    connection.timer_token.cancel();
    drop(connection);
    drop(outbox_tx);
    let _ = writer.await;
    info!("WebSocket connection closed.");
}

/// Performs the handshake: the first message must identify the exam and the
/// student. Returns `None` when the connection cannot proceed.
async fn init_connection(
    app_state: &Arc<AppState>,
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    outbox_tx: &tokio::sync::mpsc::UnboundedSender<ServerMessage>,
) -> Option<ExamConnection> {
    let send = |message: ServerMessage| {
        let _ = outbox_tx.send(message);
    };

    let Some(Ok(Message::Text(init_json))) = receiver.next().await else {
        error!("Client disconnected before sending Init message.");
        return None;
    };

    let (exam_id, admission_id) = match serde_json::from_str::<ClientMessage>(&init_json) {
        Ok(ClientMessage::Init { exam_id, admission_id }) => (exam_id, admission_id),
        _ => {
            error!("First message was not a valid Init message.");
            send(ServerMessage::Error {
                message: "The first message must identify the exam and student.".to_string(),
            });
            return None;
        }
    };
    info!("Initializing exam {} for admission {}", exam_id, admission_id);

    let exam = match app_state.store.read_exam(exam_id).await {
        Ok(exam) => exam,
        Err(e) => {
            error!("Failed to load exam {}: {:?}", exam_id, e);
            send(ServerMessage::Error {
                message: "Failed to load exam data.".to_string(),
            });
            return None;
        }
    };
    if !exam.available {
        info!("Exam {} is not available.", exam_id);
        send(ServerMessage::Error {
            message: "This exam is not currently available.".to_string(),
        });
        return None;
    }

    let fullscreen = Arc::new(WsFullscreenAdapter::new(outbox_tx.clone()));

    // A durable snapshot means an interrupted attempt to pick back up.
    let snapshot = match app_state.local.load(exam_id, &admission_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("Could not read session snapshot, starting fresh: {e}");
            None
        }
    };

    let requires_access_code = exam
        .access_code
        .as_deref()
        .map(|code| !code.trim().is_empty())
        .unwrap_or(false);
    let title = exam.title.clone();

    let connection = match snapshot {
        Some(snapshot) => {
            let remaining = snapshot.remaining_seconds;
            let engine = ExamSessionEngine::resume(
                exam,
                admission_id,
                app_state.policy,
                snapshot,
                app_state.store.clone(),
                app_state.local.clone(),
                fullscreen,
            )
            .await;

            // A dismissal or submission recorded since the snapshot was
            // written blocks the resume; the engine comes back ended.
            if let Some(outcome) = engine.outcome().cloned() {
                let connection = ExamConnection::new(engine, outbox_tx.clone());
                connection.send(ServerMessage::SessionReady {
                    exam_id,
                    title,
                    requires_access_code,
                    resumed: false,
                    remaining_seconds: None,
                });
                connection.send(ServerMessage::from_outcome(&outcome));
                return Some(connection);
            }

            let questions: Vec<PublicQuestion> = engine
                .exam()
                .questions
                .iter()
                .map(PublicQuestion::from_question)
                .collect();

            let connection = ExamConnection::new(engine, outbox_tx.clone());
            connection.send(ServerMessage::SessionReady {
                exam_id,
                title,
                requires_access_code,
                resumed: true,
                remaining_seconds: Some(remaining),
            });
            connection.send(ServerMessage::ExamStarted {
                questions,
                remaining_seconds: remaining,
                warning: None,
            });
            spawn_countdown(&connection);
            connection
        }
        None => {
            let engine = ExamSessionEngine::new(
                exam,
                admission_id,
                app_state.policy,
                app_state.store.clone(),
                app_state.local.clone(),
                fullscreen,
            )
            .await;
            let connection = ExamConnection::new(engine, outbox_tx.clone());
            connection.send(ServerMessage::SessionReady {
                exam_id,
                title,
                requires_access_code,
                resumed: false,
                remaining_seconds: None,
            });
            connection
        }
    };

    Some(connection)
}

fn spawn_countdown(connection: &ExamConnection) {
    let engine = connection.engine.clone();
    let outbox = connection.outbox.clone();
    let token = connection.timer_token.clone();
    tokio::spawn(async move {
        countdown_process(engine, outbox, token).await;
    });
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(text: String, connection: &ExamConnection) {
    match serde_json::from_str::<ClientMessage>(&text) {
        Ok(client_msg) => match client_msg {
            ClientMessage::SubmitAccessCode { code } => {
                let outcome = {
                    let mut engine = connection.engine.lock().await;
                    engine.submit_access_code(&code)
                };
                connection.send(match outcome {
                    AccessOutcome::Granted => ServerMessage::AccessGranted,
                    AccessOutcome::Denied => ServerMessage::AccessDenied,
                    AccessOutcome::NotConfigured => ServerMessage::AccessUnavailable,
                });
            }
            ClientMessage::StartExam => {
                let (outcome, questions) = {
                    let mut engine = connection.engine.lock().await;
                    let outcome = engine.start().await;
                    let questions: Vec<PublicQuestion> = engine
                        .exam()
                        .questions
                        .iter()
                        .map(PublicQuestion::from_question)
                        .collect();
                    (outcome, questions)
                };
                match outcome {
                    StartOutcome::Started { remaining_seconds, fullscreen_warning } => {
                        info!("Exam started; {} seconds on the clock.", remaining_seconds);
                        connection.send(ServerMessage::ExamStarted {
                            questions,
                            remaining_seconds,
                            warning: fullscreen_warning,
                        });
                        spawn_countdown(connection);
                    }
                    StartOutcome::AlreadySubmitted => {
                        connection.send(ServerMessage::AlreadySubmitted);
                    }
                    StartOutcome::Cancelled { reason } => {
                        connection.send(ServerMessage::ExamCancelled { reason });
                    }
                    StartOutcome::NotReady => {
                        warn!("StartExam received before the access gate was passed.");
                        connection.send(ServerMessage::Error {
                            message: "The exam cannot be started yet.".to_string(),
                        });
                    }
                }
            }
            ClientMessage::Answer { question_id, value } => {
                let mut engine = connection.engine.lock().await;
                if !engine.record_answer(question_id, value) {
                    warn!("Answer ignored; the session is not in progress.");
                }
            }
            ClientMessage::SetFlag { index, flagged } => {
                let mut engine = connection.engine.lock().await;
                if !engine.set_flag(index, flagged) {
                    warn!("Flag update ignored for index {}.", index);
                }
            }
            ClientMessage::BrowserEvent { event } => {
                let outcome = {
                    let mut engine = connection.engine.lock().await;
                    engine.observe_signal(&event.to_signal()).await
                };
                report_signal(connection, outcome);
            }
            ClientMessage::ClipboardReport { has_image } => {
                if !has_image {
                    return;
                }
                let outcome = {
                    let mut engine = connection.engine.lock().await;
                    engine.confirm_clipboard_image().await
                };
                report_signal(connection, outcome);
            }
            ClientMessage::EndExam => {
                info!("EndExam message received.");
                connection.timer_token.cancel();
                let outcome = {
                    let mut engine = connection.engine.lock().await;
                    engine.end_exam().await
                };
                match outcome {
                    Some(outcome) => connection.send(ServerMessage::from_outcome(&outcome)),
                    None => {
                        warn!("EndExam received before the exam was in progress.");
                        connection.send(ServerMessage::Error {
                            message: "The exam is not in progress.".to_string(),
                        });
                    }
                }
            }
            ClientMessage::Init { .. } => {
                warn!("Received subsequent Init message, which is ignored.");
            }
        },
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
        }
    }
}

/// Relays what one observed signal did back to the client. The outcome's
/// `suppress_default` is not relayed: cancelling a browser default only works
/// synchronously in the client's own handler (see `BrowserEventPayload`).
fn report_signal(connection: &ExamConnection, outcome: SignalOutcome) {
    for kind in &outcome.recorded {
        connection.send(ServerMessage::violation_noted(
            *kind,
            outcome.screenshot_count,
            outcome.tab_switch_count,
        ));
    }
    if outcome.probe_requested {
        connection.send(ServerMessage::CheckClipboard);
    }
    if let Some(ended) = outcome.ended {
        connection.timer_token.cancel();
        connection.send(ServerMessage::from_outcome(&ended));
    }
}
