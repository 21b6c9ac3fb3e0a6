//! crates/exam_core/src/test_support.rs
//!
//! In-memory fakes for the port traits, shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{ExamDefinition, Incident, Question, SessionSnapshot, Submission};
use crate::ports::{
    ClipboardProbe, ExamStore, FullscreenControl, PortError, PortResult, SnapshotStore,
};

//=========================================================================================
// FakeStore
//=========================================================================================

#[derive(Default)]
struct StoreInner {
    retake: bool,
    existing_submission: Option<Submission>,
    existing_incident: Option<Incident>,
    fail_retake_read: bool,
    fail_finds: bool,
    fail_incident_writes: bool,
    fail_upserts: bool,
    incidents: Vec<(Uuid, String, String)>,
    upserts: Vec<Submission>,
}

/// A scriptable in-memory `ExamStore` that counts writes.
#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<StoreInner>,
}

impl FakeStore {
    pub fn set_retake(&self, retake: bool) {
        self.inner.lock().unwrap().retake = retake;
    }

    pub fn set_existing_submission(&self, submission: Submission) {
        self.inner.lock().unwrap().existing_submission = Some(submission);
    }

    pub fn set_existing_incident(&self, exam_id: Uuid, admission_id: &str, reason: &str) {
        self.inner.lock().unwrap().existing_incident = Some(Incident {
            exam_id,
            admission_id: admission_id.to_string(),
            reason: reason.to_string(),
            created_at: Utc::now(),
        });
    }

    pub fn fail_retake_read(&self, fail: bool) {
        self.inner.lock().unwrap().fail_retake_read = fail;
    }

    pub fn fail_finds(&self, fail: bool) {
        self.inner.lock().unwrap().fail_finds = fail;
    }

    pub fn fail_incident_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_incident_writes = fail;
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.inner.lock().unwrap().fail_upserts = fail;
    }

    pub fn incident_writes(&self) -> usize {
        self.inner.lock().unwrap().incidents.len()
    }

    pub fn incident_reasons(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .incidents
            .iter()
            .map(|(_, _, reason)| reason.clone())
            .collect()
    }

    pub fn upsert_count(&self) -> usize {
        self.inner.lock().unwrap().upserts.len()
    }

    pub fn last_upsert(&self) -> Option<Submission> {
        self.inner.lock().unwrap().upserts.last().cloned()
    }
}

#[async_trait]
impl ExamStore for FakeStore {
    // The engine receives its ExamDefinition directly; the content reads
    // exist to satisfy the trait.
    async fn read_exam(&self, exam_id: Uuid) -> PortResult<ExamDefinition> {
        Err(PortError::NotFound(format!("Exam {exam_id} not found")))
    }

    async fn read_questions(&self, _exam_id: Uuid) -> PortResult<Vec<Question>> {
        Ok(Vec::new())
    }

    async fn read_access_code(&self, _exam_id: Uuid) -> PortResult<Option<String>> {
        Ok(None)
    }

    async fn read_retake_flag(&self, _exam_id: Uuid, _admission_id: &str) -> PortResult<bool> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_retake_read {
            return Err(PortError::Unexpected("retake read failed".to_string()));
        }
        Ok(inner.retake)
    }

    async fn find_submission(
        &self,
        _exam_id: Uuid,
        _admission_id: &str,
    ) -> PortResult<Option<Submission>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_finds {
            return Err(PortError::Unexpected("find failed".to_string()));
        }
        Ok(inner.existing_submission.clone())
    }

    async fn find_incident(
        &self,
        _exam_id: Uuid,
        _admission_id: &str,
    ) -> PortResult<Option<Incident>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_finds {
            return Err(PortError::Unexpected("find failed".to_string()));
        }
        Ok(inner.existing_incident.clone())
    }

    async fn record_incident(
        &self,
        exam_id: Uuid,
        admission_id: &str,
        reason: &str,
    ) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_incident_writes {
            return Err(PortError::Unexpected("incident write failed".to_string()));
        }
        inner
            .incidents
            .push((exam_id, admission_id.to_string(), reason.to_string()));
        Ok(())
    }

    async fn upsert_submission(&self, submission: &Submission) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_upserts {
            return Err(PortError::Unexpected("upsert failed".to_string()));
        }
        inner.upserts.push(submission.clone());
        Ok(())
    }
}

//=========================================================================================
// FakeLocal (SnapshotStore)
//=========================================================================================

#[derive(Default)]
struct LocalInner {
    snapshots: HashMap<(Uuid, String), SessionSnapshot>,
    pending: Vec<Submission>,
    saves: usize,
    clears: usize,
    fail_saves: bool,
}

#[derive(Default)]
pub struct FakeLocal {
    inner: Mutex<LocalInner>,
}

impl FakeLocal {
    pub fn fail_saves(&self, fail: bool) {
        self.inner.lock().unwrap().fail_saves = fail;
    }

    pub fn snapshot_for(&self, exam_id: Uuid, admission_id: &str) -> Option<SessionSnapshot> {
        self.inner
            .lock()
            .unwrap()
            .snapshots
            .get(&(exam_id, admission_id.to_string()))
            .cloned()
    }

    pub fn save_count(&self) -> usize {
        self.inner.lock().unwrap().saves
    }

    pub fn clear_count(&self) -> usize {
        self.inner.lock().unwrap().clears
    }

    pub fn pending(&self) -> Vec<Submission> {
        self.inner.lock().unwrap().pending.clone()
    }
}

#[async_trait]
impl SnapshotStore for FakeLocal {
    async fn save(&self, snapshot: &SessionSnapshot) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_saves {
            return Err(PortError::Unexpected("save failed".to_string()));
        }
        inner.saves += 1;
        inner.snapshots.insert(
            (snapshot.exam_id, snapshot.admission_id.clone()),
            snapshot.clone(),
        );
        Ok(())
    }

    async fn load(
        &self,
        exam_id: Uuid,
        admission_id: &str,
    ) -> PortResult<Option<SessionSnapshot>> {
        Ok(self.snapshot_for(exam_id, admission_id))
    }

    async fn clear(&self, exam_id: Uuid, admission_id: &str) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.clears += 1;
        inner
            .snapshots
            .remove(&(exam_id, admission_id.to_string()));
        Ok(())
    }

    async fn queue_pending_submission(&self, submission: &Submission) -> PortResult<()> {
        self.inner.lock().unwrap().pending.push(submission.clone());
        Ok(())
    }
}

//=========================================================================================
// FakeFullscreen / FakeClipboard
//=========================================================================================

#[derive(Default)]
struct FullscreenInner {
    enters: usize,
    exits: usize,
    fail: bool,
}

#[derive(Default)]
pub struct FakeFullscreen {
    inner: Mutex<FullscreenInner>,
}

impl FakeFullscreen {
    pub fn fail(&self, fail: bool) {
        self.inner.lock().unwrap().fail = fail;
    }

    pub fn enter_calls(&self) -> usize {
        self.inner.lock().unwrap().enters
    }

    pub fn exit_calls(&self) -> usize {
        self.inner.lock().unwrap().exits
    }
}

#[async_trait]
impl FullscreenControl for FakeFullscreen {
    async fn request_fullscreen(&self) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail {
            return Err(PortError::Unavailable("fullscreen rejected".to_string()));
        }
        inner.enters += 1;
        Ok(())
    }

    async fn exit_fullscreen(&self) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail {
            return Err(PortError::Unavailable("fullscreen rejected".to_string()));
        }
        inner.exits += 1;
        Ok(())
    }
}

/// A clipboard probe with a scripted result.
pub enum FakeClipboard {
    ImageFound,
    Empty,
    Unavailable,
}

#[async_trait]
impl ClipboardProbe for FakeClipboard {
    async fn contains_image(&self) -> PortResult<bool> {
        match self {
            FakeClipboard::ImageFound => Ok(true),
            FakeClipboard::Empty => Ok(false),
            FakeClipboard::Unavailable => {
                Err(PortError::Unavailable("clipboard read denied".to_string()))
            }
        }
    }
}
