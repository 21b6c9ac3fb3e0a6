//! crates/exam_core/src/domain.rs
//!
//! Defines the pure, core data structures for the exam session engine.
//! The types that cross a persistence boundary carry serde derives; nothing
//! here knows about any particular database or wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A single exam question, immutable for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: Uuid,
    pub prompt: String,
    /// Ordered answer options for multiple-choice questions. `None` means the
    /// question takes a free-text answer.
    pub options: Option<Vec<String>>,
    /// The expected answer, compared after normalization. `None` means the
    /// question is never scored.
    pub correct_answer: Option<String>,
    /// Point value. Absent or non-numeric stored values map to `None`.
    pub points: Option<u32>,
}

impl Question {
    /// The question's point value, defaulting to 1 when none is configured.
    pub fn points(&self) -> u32 {
        self.points.unwrap_or(1)
    }
}

/// An exam as configured by the admin subsystem. Read once at session start
/// and treated as read-only afterwards.
#[derive(Debug, Clone)]
pub struct ExamDefinition {
    pub id: Uuid,
    pub title: String,
    pub duration_minutes: u32,
    /// The admin-configured access code gating entry. `None` means no code
    /// was configured and the exam cannot be entered at all.
    pub access_code: Option<String>,
    pub available: bool,
    pub questions: Vec<Question>,
}

/// The kinds of suspicious client-side signals the monitor classifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    Copy,
    Paste,
    Screenshot,
    TabSwitch,
    FullscreenExit,
}

impl ViolationKind {
    /// The wire/audit name of this violation kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::Copy => "copy",
            ViolationKind::Paste => "paste",
            ViolationKind::Screenshot => "screenshot",
            ViolationKind::TabSwitch => "tab-switch",
            ViolationKind::FullscreenExit => "exit-fullscreen",
        }
    }

    /// Whether this kind is persisted server-side as an incident.
    ///
    /// Fullscreen exits are recorded locally but deliberately never written
    /// to the incident log, and never count toward forced termination.
    pub fn persisted_server_side(&self) -> bool {
        !matches!(self, ViolationKind::FullscreenExit)
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded violation. Entries are append-only for the lifetime of a
/// session: they are never deduplicated, retracted, or mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub at: DateTime<Utc>,
}

/// The lifecycle phase of a single exam attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamPhase {
    AwaitingAccessCode,
    AwaitingStart,
    InProgress,
    Ended,
}

/// A persisted audit record of a detected violation or a forced termination.
#[derive(Debug, Clone)]
pub struct Incident {
    pub exam_id: Uuid,
    pub admission_id: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted exam submission. At most one row exists per
/// (exam, admission) pair; writes use upsert semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub exam_id: Uuid,
    pub admission_id: String,
    pub score: u32,
    pub total: u32,
    pub answers: BTreeMap<Uuid, String>,
    pub created_at: DateTime<Utc>,
}

/// The durable snapshot that makes an in-progress session survive a page
/// reload. Answers and violations are intentionally not part of it; the
/// in-memory session is their source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub exam_id: Uuid,
    pub admission_id: String,
    pub remaining_seconds: u32,
    pub started_at: DateTime<Utc>,
}

/// The result of scoring a session, computed exactly once at the terminal
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreReport {
    pub score: u32,
    pub total: u32,
}

/// How a session reached its terminal phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The student ended the exam explicitly.
    Submitted(ScoreReport),
    /// The countdown reached zero.
    TimeExpired(ScoreReport),
    /// The monitor's policy threshold was breached and the attempt was
    /// forcibly terminated.
    Dismissed { reason: String, report: ScoreReport },
    /// A submission already existed for this (exam, admission) pair.
    AlreadySubmitted,
    /// A prior incident exists for this (exam, admission) pair.
    Cancelled { reason: String },
}

impl SessionOutcome {
    /// The score report attached to this outcome, when one was computed.
    pub fn report(&self) -> Option<ScoreReport> {
        match self {
            SessionOutcome::Submitted(r)
            | SessionOutcome::TimeExpired(r)
            | SessionOutcome::Dismissed { report: r, .. } => Some(*r),
            _ => None,
        }
    }
}
