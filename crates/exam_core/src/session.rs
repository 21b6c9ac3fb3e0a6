//! crates/exam_core/src/session.rs
//!
//! The exam session state machine. One `ExamSessionEngine` governs a single
//! attempt for one student: the access-code gate, the pre-entry checks, the
//! countdown, answer and flag mutation, breach-driven dismissal, and the
//! idempotent terminal transition.
//!
//! Concurrency discipline: the engine expects to live behind a mutex on a
//! single event loop. Every public method performs one synchronous state
//! transition relative to its caller; asynchronous continuations re-check
//! the phase before mutating anything.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    ExamDefinition, ExamPhase, ScoreReport, SessionOutcome, SessionSnapshot, Submission,
    Violation,
};
use crate::monitor::IntegrityMonitor;
use crate::policy::{BreachKind, BrowserSignal, SecurityPolicy};
use crate::ports::{ExamStore, FullscreenControl, SnapshotStore};
use crate::scoring::score_exam;

/// Result of the access-code gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    Granted,
    Denied,
    /// No code is configured for this exam: entry is permanently blocked
    /// until an administrator sets one.
    NotConfigured,
}

/// Result of the `start` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started {
        remaining_seconds: u32,
        /// Set when the fullscreen request was rejected; the exam continues
        /// without fullscreen and the student sees a one-time warning.
        fullscreen_warning: Option<String>,
    },
    /// A submission already exists for this pair; redirected instead of
    /// starting.
    AlreadySubmitted,
    /// A prior incident exists for this pair; redirected with its reason.
    Cancelled { reason: String },
    /// The session is not awaiting the start action.
    NotReady,
}

/// Result of one countdown tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Ticked { remaining_seconds: u32 },
    Ended(SessionOutcome),
    /// The session was not in progress; the tick raced a terminal
    /// transition and no-ops.
    Ignored,
}

/// What observing one signal did to the session, for the caller's UI.
#[derive(Debug, Default)]
pub struct SignalOutcome {
    pub recorded: Vec<crate::domain::ViolationKind>,
    pub suppress_default: bool,
    pub probe_requested: bool,
    pub fullscreen_lost: bool,
    pub screenshot_count: u32,
    pub tab_switch_count: u32,
    pub violation_total: usize,
    /// Set when this signal completed the terminal transition.
    pub ended: Option<SessionOutcome>,
}

/// What caused the terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndTrigger {
    Manual,
    TimeExpired,
    Breach(BreachKind),
}

pub struct ExamSessionEngine {
    exam: ExamDefinition,
    admission_id: String,
    phase: ExamPhase,
    remaining_seconds: u32,
    started_at: Option<DateTime<Utc>>,
    answers: BTreeMap<Uuid, String>,
    flagged: BTreeSet<usize>,
    retake_allowed: bool,
    monitor: IntegrityMonitor,
    store: Arc<dyn ExamStore>,
    local: Arc<dyn SnapshotStore>,
    outcome: Option<SessionOutcome>,
}

impl ExamSessionEngine {
    /// Creates a fresh session at the access-code gate.
    ///
    /// The retake flag is fetched once here; a read failure is treated as
    /// "no override" rather than blocking the student.
    pub async fn new(
        exam: ExamDefinition,
        admission_id: String,
        policy: SecurityPolicy,
        store: Arc<dyn ExamStore>,
        local: Arc<dyn SnapshotStore>,
        fullscreen: Arc<dyn FullscreenControl>,
    ) -> Self {
        let retake_allowed = match store.read_retake_flag(exam.id, &admission_id).await {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!("Failed to read retake flag, assuming disabled: {e}");
                false
            }
        };

        let monitor = IntegrityMonitor::new(
            exam.id,
            admission_id.clone(),
            policy,
            retake_allowed,
            store.clone(),
            fullscreen,
        );

        Self {
            exam,
            admission_id,
            phase: ExamPhase::AwaitingAccessCode,
            remaining_seconds: 0,
            started_at: None,
            answers: BTreeMap::new(),
            flagged: BTreeSet::new(),
            retake_allowed,
            monitor,
            store,
            local,
            outcome: None,
        }
    }

    /// Reconstructs an in-progress session from a durable snapshot after a
    /// page reload: same remaining time, monitoring re-activated, fullscreen
    /// re-requested. Violations restart empty; the in-memory list is their
    /// source of truth for one browser session.
    ///
    /// The pre-entry checks run here exactly as on a fresh start: a dismissed
    /// or already-submitted student reloading a stale snapshot lands in
    /// `Ended` with the matching outcome, not back in the exam.
    pub async fn resume(
        exam: ExamDefinition,
        admission_id: String,
        policy: SecurityPolicy,
        snapshot: SessionSnapshot,
        store: Arc<dyn ExamStore>,
        local: Arc<dyn SnapshotStore>,
        fullscreen: Arc<dyn FullscreenControl>,
    ) -> Self {
        let mut engine = Self::new(exam, admission_id, policy, store, local, fullscreen).await;

        if let Some(outcome) = engine.pre_entry_block().await {
            info!(
                "Refusing to resume exam {} for {}: {:?}",
                engine.exam.id, engine.admission_id, outcome
            );
            return engine;
        }

        engine.phase = ExamPhase::InProgress;
        engine.remaining_seconds = snapshot.remaining_seconds;
        engine.started_at = Some(snapshot.started_at);
        engine.monitor.activate(true);
        if let Err(e) = engine.monitor.enter_fullscreen().await {
            warn!("Could not re-enter fullscreen on resume: {e}");
        }
        info!(
            "Resumed exam {} for {} with {}s remaining",
            engine.exam.id, engine.admission_id, engine.remaining_seconds
        );
        engine
    }

    //=====================================================================================
    // Gate and start
    //=====================================================================================

    /// Checks a submitted access code against the exam's configured code.
    /// Trimmed, case-insensitive exact match.
    pub fn submit_access_code(&mut self, entered: &str) -> AccessOutcome {
        match self.phase {
            ExamPhase::AwaitingAccessCode => {}
            // Already through the gate.
            ExamPhase::AwaitingStart | ExamPhase::InProgress => return AccessOutcome::Granted,
            ExamPhase::Ended => return AccessOutcome::Denied,
        }

        let configured = self
            .exam
            .access_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty());
        let Some(expected) = configured else {
            return AccessOutcome::NotConfigured;
        };

        let entered = entered.trim();
        if entered.is_empty() {
            return AccessOutcome::Denied;
        }
        if entered.to_lowercase() == expected.to_lowercase() {
            self.phase = ExamPhase::AwaitingStart;
            AccessOutcome::Granted
        } else {
            AccessOutcome::Denied
        }
    }

    /// The `start` action: pre-entry checks, then fullscreen, monitoring,
    /// and the countdown.
    ///
    /// Check read failures are logged and treated as "no record found" so a
    /// backend hiccup never locks a student out; only an actually-found
    /// record redirects.
    pub async fn start(&mut self) -> StartOutcome {
        if self.phase != ExamPhase::AwaitingStart {
            return StartOutcome::NotReady;
        }

        match self.pre_entry_block().await {
            Some(SessionOutcome::Cancelled { reason }) => {
                return StartOutcome::Cancelled { reason };
            }
            Some(_) => return StartOutcome::AlreadySubmitted,
            None => {}
        }

        let fullscreen_warning = match self.monitor.enter_fullscreen().await {
            Ok(()) => None,
            Err(e) => {
                warn!("Fullscreen request rejected, continuing without: {e}");
                Some("Failed to enter fullscreen mode".to_string())
            }
        };

        self.monitor.activate(true);
        self.remaining_seconds = self.exam.duration_minutes * 60;
        self.started_at = Some(Utc::now());
        self.phase = ExamPhase::InProgress;
        self.save_snapshot().await;
        info!("Exam {} started for {}", self.exam.id, self.admission_id);

        StartOutcome::Started {
            remaining_seconds: self.remaining_seconds,
            fullscreen_warning,
        }
    }

    /// The pre-entry checks shared by `start` and `resume`. A found record
    /// flips the session into `Ended` with the matching outcome; the retake
    /// override skips both checks.
    async fn pre_entry_block(&mut self) -> Option<SessionOutcome> {
        if self.retake_allowed {
            return None;
        }

        match self.store.find_submission(self.exam.id, &self.admission_id).await {
            Ok(Some(_)) => {
                self.phase = ExamPhase::Ended;
                self.outcome = Some(SessionOutcome::AlreadySubmitted);
                return self.outcome.clone();
            }
            Ok(None) => {}
            Err(e) => warn!("Submission check failed, continuing: {e}"),
        }

        match self.store.find_incident(self.exam.id, &self.admission_id).await {
            Ok(Some(incident)) => {
                self.phase = ExamPhase::Ended;
                self.outcome = Some(SessionOutcome::Cancelled { reason: incident.reason });
                return self.outcome.clone();
            }
            Ok(None) => {}
            Err(e) => warn!("Incident check failed, continuing: {e}"),
        }

        None
    }

    //=====================================================================================
    // In-progress mutation
    //=====================================================================================

    /// One countdown tick. Idempotent against a terminal transition racing
    /// it: outside `InProgress` the tick is ignored.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.phase != ExamPhase::InProgress {
            return TickOutcome::Ignored;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            let outcome = self.finish(EndTrigger::TimeExpired).await;
            return TickOutcome::Ended(outcome);
        }

        self.save_snapshot().await;
        TickOutcome::Ticked {
            remaining_seconds: self.remaining_seconds,
        }
    }

    /// Inserts or overwrites the student's response. Keys are never removed.
    /// Returns whether the answer was applied.
    pub fn record_answer(&mut self, question_id: Uuid, value: String) -> bool {
        if self.phase != ExamPhase::InProgress {
            return false;
        }
        self.answers.insert(question_id, value);
        true
    }

    /// Marks or unmarks a question index for review. Flagged questions score
    /// 0 regardless of correctness.
    pub fn set_flag(&mut self, index: usize, flagged: bool) -> bool {
        if self.phase != ExamPhase::InProgress || index >= self.exam.questions.len() {
            return false;
        }
        if flagged {
            self.flagged.insert(index);
        } else {
            self.flagged.remove(&index);
        }
        true
    }

    //=====================================================================================
    // Monitoring
    //=====================================================================================

    /// Feeds one raw browser signal through the monitor and applies the
    /// escalation policy.
    pub async fn observe_signal(&mut self, signal: &BrowserSignal) -> SignalOutcome {
        if self.phase != ExamPhase::InProgress {
            return SignalOutcome::default();
        }
        let observation = self.monitor.observe(signal).await;
        self.apply_observation(observation).await
    }

    /// The continuation of an asynchronous clipboard probe that found an
    /// image. Re-checks the phase: a confirmation arriving after the session
    /// ended is discarded, not applied.
    pub async fn confirm_clipboard_image(&mut self) -> SignalOutcome {
        if self.phase != ExamPhase::InProgress {
            return SignalOutcome::default();
        }
        match self.monitor.confirm_clipboard_image().await {
            Some(observation) => self.apply_observation(observation).await,
            None => SignalOutcome::default(),
        }
    }

    async fn apply_observation(
        &mut self,
        observation: crate::monitor::Observation,
    ) -> SignalOutcome {
        let mut outcome = SignalOutcome {
            recorded: observation.recorded,
            suppress_default: observation.suppress_default,
            probe_requested: observation.probe_requested,
            fullscreen_lost: observation.fullscreen_lost,
            ..SignalOutcome::default()
        };

        if observation.fullscreen_lost {
            // Silent best-effort re-entry; the student is never blocked on it.
            if let Err(e) = self.monitor.enter_fullscreen().await {
                warn!("Fullscreen re-entry failed: {e}");
            }
        }

        if let Some(breach) = observation.breach {
            if !self.retake_allowed {
                let ended = self.finish(EndTrigger::Breach(breach)).await;
                outcome.ended = Some(ended);
            }
        }

        outcome.screenshot_count = self.monitor.screenshot_count();
        outcome.tab_switch_count = self.monitor.tab_switch_count();
        outcome.violation_total = self.monitor.violations().len();
        outcome
    }

    //=====================================================================================
    // Termination
    //=====================================================================================

    /// The explicit "end exam" action. Only an `InProgress` session can be
    /// submitted; before the exam has started there is nothing to score and
    /// no submission row may be written, so the request is refused. An
    /// already-ended session returns its cached outcome.
    pub async fn end_exam(&mut self) -> Option<SessionOutcome> {
        if self.phase == ExamPhase::InProgress {
            return Some(self.finish(EndTrigger::Manual).await);
        }
        if self.outcome.is_some() {
            return self.outcome.clone();
        }
        warn!("EndExam ignored; the session never entered progress.");
        None
    }

    /// The single terminal transition. Idempotent: the first caller flips
    /// the phase and performs the score/persist sequence; any racing caller
    /// observes `Ended` and gets the cached outcome.
    ///
    /// The transition to `Ended` completes regardless of persistence
    /// failures; a failed submission write falls back to the local pending
    /// queue.
    async fn finish(&mut self, trigger: EndTrigger) -> SessionOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        self.phase = ExamPhase::Ended;
        // Listeners must be gone before any further effect so no violation
        // can land on an ended session.
        self.monitor.activate(false);

        let report = score_exam(&self.exam.questions, &self.answers, &self.flagged);
        let submission = Submission {
            exam_id: self.exam.id,
            admission_id: self.admission_id.clone(),
            score: report.score,
            total: report.total,
            answers: self.answers.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.upsert_submission(&submission).await {
            warn!("Submission upsert failed, queueing locally: {e}");
            if let Err(e) = self.local.queue_pending_submission(&submission).await {
                warn!("Failed to queue pending submission: {e}");
            }
        }

        let outcome = match trigger {
            EndTrigger::Manual => SessionOutcome::Submitted(report),
            EndTrigger::TimeExpired => SessionOutcome::TimeExpired(report),
            EndTrigger::Breach(kind) => {
                let reason = self.monitor.policy().breach_reason(kind);
                if let Err(e) = self
                    .store
                    .record_incident(self.exam.id, &self.admission_id, &reason)
                    .await
                {
                    warn!("Failed to record dismissal incident: {e}");
                }
                SessionOutcome::Dismissed { reason, report }
            }
        };

        if let Err(e) = self.monitor.exit_fullscreen().await {
            warn!("Could not exit fullscreen: {e}");
        }

        // The snapshot is cleared only for a normal/explicit end. A
        // dismissed session keeps it; the recorded incident is what blocks
        // re-entry.
        if matches!(trigger, EndTrigger::Manual | EndTrigger::TimeExpired) {
            if let Err(e) = self.local.clear(self.exam.id, &self.admission_id).await {
                warn!("Failed to clear session snapshot: {e}");
            }
        }

        info!(
            "Exam {} ended for {} ({:?}): {}/{}",
            self.exam.id, self.admission_id, trigger, report.score, report.total
        );
        self.outcome = Some(outcome.clone());
        outcome
    }

    async fn save_snapshot(&self) {
        let snapshot = self.snapshot();
        if let Err(e) = self.local.save(&snapshot).await {
            warn!("Failed to persist session snapshot: {e}");
        }
    }

    //=====================================================================================
    // Read-only accessors
    //=====================================================================================

    pub fn exam(&self) -> &ExamDefinition {
        &self.exam
    }

    pub fn admission_id(&self) -> &str {
        &self.admission_id
    }

    pub fn phase(&self) -> ExamPhase {
        self.phase
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn retake_allowed(&self) -> bool {
        self.retake_allowed
    }

    pub fn answers(&self) -> &BTreeMap<Uuid, String> {
        &self.answers
    }

    pub fn flagged(&self) -> &BTreeSet<usize> {
        &self.flagged
    }

    pub fn violations(&self) -> &[Violation] {
        self.monitor.violations()
    }

    pub fn screenshot_count(&self) -> u32 {
        self.monitor.screenshot_count()
    }

    pub fn tab_switch_count(&self) -> u32 {
        self.monitor.tab_switch_count()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.monitor.is_fullscreen()
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    /// The durable snapshot for the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            exam_id: self.exam.id,
            admission_id: self.admission_id.clone(),
            remaining_seconds: self.remaining_seconds,
            started_at: self.started_at.unwrap_or_else(Utc::now),
        }
    }

    /// The score the session would receive right now. Pure; does not
    /// transition anything.
    pub fn preview_score(&self) -> ScoreReport {
        score_exam(&self.exam.questions, &self.answers, &self.flagged)
    }
}
