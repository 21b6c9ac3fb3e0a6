//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the
//! API server for the proctored exam application.

use exam_core::domain::{Question, ScoreReport, ViolationKind};
use exam_core::policy::{BrowserSignal, Modifiers};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identifies the exam and the student. This must be the first message
    /// sent on the connection.
    Init { exam_id: Uuid, admission_id: String },

    /// An attempt at the exam's access code.
    SubmitAccessCode { code: String },

    /// The student pressed "start exam" after passing the access-code gate.
    StartExam,

    /// Records or replaces the student's answer to one question.
    Answer { question_id: Uuid, value: String },

    /// Marks or unmarks a question (by its position) for review.
    SetFlag { index: usize, flagged: bool },

    /// A raw browser event forwarded for integrity monitoring.
    BrowserEvent { event: BrowserEventPayload },

    /// The client's reply to a `CheckClipboard` request.
    ClipboardReport { has_image: bool },

    /// The student pressed "end exam".
    EndExam,
}

/// The wire form of a raw browser event. Mirrors the DOM events the client
/// script forwards while an exam is in progress.
///
/// Suppressing a browser default (preventDefault on a copy attempt or a
/// blocked shortcut) must happen synchronously in the client's event handler,
/// before the event is forwarded; the round trip through the server arrives
/// too late to cancel anything. The server only classifies and records.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrowserEventPayload {
    Copy,
    Paste,
    KeyDown {
        key: String,
        code: String,
        #[serde(default)]
        alt: bool,
        #[serde(default)]
        ctrl: bool,
        #[serde(default)]
        meta: bool,
        #[serde(default)]
        shift: bool,
    },
    KeyUp { key: String, code: String },
    VisibilityHidden,
    Blur,
    FullscreenChange { fullscreen: bool },
}

impl BrowserEventPayload {
    /// Converts the wire form into the core's signal type.
    pub fn to_signal(&self) -> BrowserSignal {
        match self {
            BrowserEventPayload::Copy => BrowserSignal::Copy,
            BrowserEventPayload::Paste => BrowserSignal::Paste,
            BrowserEventPayload::KeyDown { key, code, alt, ctrl, meta, shift } => {
                BrowserSignal::KeyDown {
                    key: key.clone(),
                    code: code.clone(),
                    modifiers: Modifiers {
                        alt: *alt,
                        ctrl: *ctrl,
                        meta: *meta,
                        shift: *shift,
                    },
                }
            }
            BrowserEventPayload::KeyUp { key, code } => BrowserSignal::KeyUp {
                key: key.clone(),
                code: code.clone(),
            },
            BrowserEventPayload::VisibilityHidden => BrowserSignal::VisibilityHidden,
            BrowserEventPayload::Blur => BrowserSignal::WindowBlur,
            BrowserEventPayload::FullscreenChange { fullscreen } => {
                BrowserSignal::FullscreenChange { fullscreen: *fullscreen }
            }
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// A question as exposed to the student: the answer key never crosses the wire.
#[derive(Serialize, Debug, Clone)]
pub struct PublicQuestion {
    pub id: Uuid,
    pub prompt: String,
    pub options: Option<Vec<String>>,
    pub points: u32,
}

impl PublicQuestion {
    pub fn from_question(question: &Question) -> Self {
        Self {
            id: question.id,
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            points: question.points(),
        }
    }
}

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms session setup. `remaining_seconds` is set when an interrupted
    /// session was restored from its snapshot.
    SessionReady {
        exam_id: Uuid,
        title: String,
        requires_access_code: bool,
        resumed: bool,
        remaining_seconds: Option<u32>,
    },

    /// The submitted access code matched.
    AccessGranted,

    /// The submitted access code did not match.
    AccessDenied,

    /// No access code is configured for this exam; entry is blocked.
    AccessUnavailable,

    /// The exam is now in progress. Sent on a successful start or resume.
    ExamStarted {
        questions: Vec<PublicQuestion>,
        remaining_seconds: u32,
        warning: Option<String>,
    },

    /// One second of exam time elapsed.
    Tick { remaining_seconds: u32 },

    /// A violation was recorded; the client shows the running counts.
    ViolationNoted {
        kind: String,
        screenshot_count: u32,
        tab_switch_count: u32,
    },

    /// Asks the client to inspect the clipboard for a captured image and
    /// reply with a `ClipboardReport`.
    CheckClipboard,

    /// Asks the client to (re-)enter fullscreen.
    RequestFullscreen,

    /// Asks the client to leave fullscreen, sent when the session ends.
    ExitFullscreen,

    /// The session ended normally, by submission or by the timer.
    ExamEnded {
        outcome: EndedOutcome,
        score: u32,
        total: u32,
    },

    /// The session was terminated for repeated violations, or entry was
    /// refused because of a prior termination.
    ExamCancelled { reason: String },

    /// A submission already exists for this student and exam.
    AlreadySubmitted,

    /// Reports a fatal error to the client, which should display an error message.
    Error { message: String },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndedOutcome {
    Submitted,
    TimeExpired,
}

impl ServerMessage {
    /// The terminal message matching a finished session's outcome.
    pub fn from_outcome(outcome: &exam_core::domain::SessionOutcome) -> Self {
        use exam_core::domain::SessionOutcome;
        match outcome {
            SessionOutcome::Submitted(report) => {
                ServerMessage::exam_ended(EndedOutcome::Submitted, report)
            }
            SessionOutcome::TimeExpired(report) => {
                ServerMessage::exam_ended(EndedOutcome::TimeExpired, report)
            }
            SessionOutcome::Dismissed { reason, .. } => {
                ServerMessage::ExamCancelled { reason: reason.clone() }
            }
            SessionOutcome::AlreadySubmitted => ServerMessage::AlreadySubmitted,
            SessionOutcome::Cancelled { reason } => {
                ServerMessage::ExamCancelled { reason: reason.clone() }
            }
        }
    }

    pub fn violation_noted(
        kind: ViolationKind,
        screenshot_count: u32,
        tab_switch_count: u32,
    ) -> Self {
        ServerMessage::ViolationNoted {
            kind: kind.as_str().to_string(),
            screenshot_count,
            tab_switch_count,
        }
    }

    pub fn exam_ended(outcome: EndedOutcome, report: &ScoreReport) -> Self {
        ServerMessage::ExamEnded {
            outcome,
            score: report.score,
            total: report.total,
        }
    }
}
