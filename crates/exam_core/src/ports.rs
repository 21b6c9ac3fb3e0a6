//! crates/exam_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the exam session engine.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of specific external implementations such as the
//! backing store or the browser capabilities the client mediates.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{ExamDefinition, Incident, Question, SessionSnapshot, Submission};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (database,
/// network, browser APIs).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Capability unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The persistence collaborator. Backing store unspecified; any store
/// implementing these operations suffices.
#[async_trait]
pub trait ExamStore: Send + Sync {
    // --- Exam content (read-only to the core) ---
    async fn read_exam(&self, exam_id: Uuid) -> PortResult<ExamDefinition>;

    async fn read_questions(&self, exam_id: Uuid) -> PortResult<Vec<Question>>;

    async fn read_access_code(&self, exam_id: Uuid) -> PortResult<Option<String>>;

    // --- Per-student records ---
    /// The admin-granted retake override for one (exam, admission) pair.
    async fn read_retake_flag(&self, exam_id: Uuid, admission_id: &str) -> PortResult<bool>;

    async fn find_submission(
        &self,
        exam_id: Uuid,
        admission_id: &str,
    ) -> PortResult<Option<Submission>>;

    async fn find_incident(
        &self,
        exam_id: Uuid,
        admission_id: &str,
    ) -> PortResult<Option<Incident>>;

    // --- One-way writes ---
    /// Records an audit incident. Callers treat this as fire-and-forget:
    /// a failure is logged, never surfaced to the student.
    async fn record_incident(
        &self,
        exam_id: Uuid,
        admission_id: &str,
        reason: &str,
    ) -> PortResult<()>;

    /// Inserts or updates the submission row for its (exam, admission) pair.
    /// Implementations must never produce duplicate rows for the same pair.
    async fn upsert_submission(&self, submission: &Submission) -> PortResult<()>;
}

/// Durable local storage for the resumable session snapshot and for
/// submissions that could not be written to the store.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &SessionSnapshot) -> PortResult<()>;

    async fn load(&self, exam_id: Uuid, admission_id: &str)
        -> PortResult<Option<SessionSnapshot>>;

    async fn clear(&self, exam_id: Uuid, admission_id: &str) -> PortResult<()>;

    /// Appends a submission payload to the local pending queue so an admin
    /// can recover it after a failed `upsert_submission`.
    async fn queue_pending_submission(&self, submission: &Submission) -> PortResult<()>;
}

/// The browser's fullscreen capability, mediated by the client.
#[async_trait]
pub trait FullscreenControl: Send + Sync {
    async fn request_fullscreen(&self) -> PortResult<()>;

    async fn exit_fullscreen(&self) -> PortResult<()>;
}

/// Best-effort inspection of the system clipboard for screenshot evidence.
#[async_trait]
pub trait ClipboardProbe: Send + Sync {
    /// Returns `Ok(true)` only when an image entry was positively found.
    /// Permission denial or an unsupported environment should be reported as
    /// `Ok(false)`; callers additionally degrade any `Err` to "no evidence".
    async fn contains_image(&self) -> PortResult<bool>;
}
