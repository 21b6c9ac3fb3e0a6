//! services/api/src/adapters/local_store.rs
//!
//! A filesystem implementation of the `SnapshotStore` port. Session snapshots
//! live as one JSON file per (exam, admission) pair; submissions that could
//! not reach the database queue up in a single JSON file for later replay.

use async_trait::async_trait;
use exam_core::domain::{SessionSnapshot, Submission};
use exam_core::ports::{PortError, PortResult, SnapshotStore};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

const PENDING_FILE: &str = "pending_submissions.json";

/// Stores session state as JSON files under a configured directory.
#[derive(Clone)]
pub struct LocalStateAdapter {
    dir: PathBuf,
}

impl LocalStateAdapter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates the state directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), std::io::Error> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    fn snapshot_path(&self, exam_id: Uuid, admission_id: &str) -> PathBuf {
        self.dir
            .join(format!("session_{}_{}.json", exam_id, sanitize(admission_id)))
    }

    fn pending_path(&self) -> PathBuf {
        self.dir.join(PENDING_FILE)
    }

    async fn read_pending(&self, path: &Path) -> Vec<Submission> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Pending submission queue is corrupt, resetting: {e}");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    /// Drains the pending submission queue, returning its contents. Used at
    /// startup to replay submissions that missed the database.
    pub async fn take_pending_submissions(&self) -> PortResult<Vec<Submission>> {
        let path = self.pending_path();
        let pending = self.read_pending(&path).await;
        if !pending.is_empty() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        }
        Ok(pending)
    }
}

fn sanitize(admission_id: &str) -> String {
    admission_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl SnapshotStore for LocalStateAdapter {
    async fn save(&self, snapshot: &SessionSnapshot) -> PortResult<()> {
        let path = self.snapshot_path(snapshot.exam_id, &snapshot.admission_id);
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn load(
        &self,
        exam_id: Uuid,
        admission_id: &str,
    ) -> PortResult<Option<SessionSnapshot>> {
        let path = self.snapshot_path(exam_id, admission_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PortError::Unavailable(e.to_string())),
        };
        // An unreadable snapshot is discarded; the student starts fresh
        // rather than being locked out.
        match serde_json::from_slice::<SessionSnapshot>(&bytes) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!("Discarding corrupt session snapshot at {path:?}: {e}");
                Ok(None)
            }
        }
    }

    async fn clear(&self, exam_id: Uuid, admission_id: &str) -> PortResult<()> {
        let path = self.snapshot_path(exam_id, admission_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unavailable(e.to_string())),
        }
    }

    async fn queue_pending_submission(&self, submission: &Submission) -> PortResult<()> {
        let path = self.pending_path();
        let mut pending = self.read_pending(&path).await;
        pending.push(submission.clone());
        let json = serde_json::to_vec_pretty(&pending)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
