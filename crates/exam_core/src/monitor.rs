//! crates/exam_core/src/monitor.rs
//!
//! The in-browser exam integrity monitor. It observes browser-level signals
//! while a session is active, classifies them into violations, keeps the
//! append-only violation list, and requests incident persistence for the
//! kinds that are audited server-side.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{Violation, ViolationKind};
use crate::policy::{classify, BreachKind, BrowserSignal, SecurityPolicy, SignalAction};
use crate::ports::{ExamStore, FullscreenControl, PortResult};

//=========================================================================================
// Listener Registration Table
//=========================================================================================

/// The browser events the monitor listens to while active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    Copy,
    Paste,
    KeyDown,
    KeyUp,
    VisibilityChange,
    Blur,
    FullscreenChange,
}

impl EventKind {
    /// The DOM event name this listener is registered under.
    pub fn dom_name(&self) -> &'static str {
        match self {
            EventKind::Copy => "copy",
            EventKind::Paste => "paste",
            EventKind::KeyDown => "keydown",
            EventKind::KeyUp => "keyup",
            EventKind::VisibilityChange => "visibilitychange",
            EventKind::Blur => "blur",
            EventKind::FullscreenChange => "fullscreenchange",
        }
    }

    fn of(signal: &BrowserSignal) -> EventKind {
        match signal {
            BrowserSignal::Copy => EventKind::Copy,
            BrowserSignal::Paste => EventKind::Paste,
            BrowserSignal::KeyDown { .. } => EventKind::KeyDown,
            BrowserSignal::KeyUp { .. } => EventKind::KeyUp,
            BrowserSignal::VisibilityHidden => EventKind::VisibilityChange,
            BrowserSignal::WindowBlur => EventKind::Blur,
            BrowserSignal::FullscreenChange { .. } => EventKind::FullscreenChange,
        }
    }
}

/// Every event the monitor registers for, in registration order.
pub const MONITORED_EVENTS: [EventKind; 7] = [
    EventKind::Copy,
    EventKind::Paste,
    EventKind::KeyDown,
    EventKind::KeyUp,
    EventKind::VisibilityChange,
    EventKind::Blur,
    EventKind::FullscreenChange,
];

/// An explicit listener-registration table keyed by event kind.
///
/// Installed and torn down atomically so that listener lifetime exactly
/// tracks session-active lifetime: a signal whose listener is not attached is
/// dropped before classification.
#[derive(Debug)]
pub struct ListenerTable {
    attached: BTreeMap<EventKind, bool>,
}

impl ListenerTable {
    fn new() -> Self {
        Self {
            attached: MONITORED_EVENTS.iter().map(|kind| (*kind, false)).collect(),
        }
    }

    fn attach_all(&mut self) {
        for slot in self.attached.values_mut() {
            *slot = true;
        }
    }

    fn detach_all(&mut self) {
        for slot in self.attached.values_mut() {
            *slot = false;
        }
    }

    pub fn is_attached(&self, kind: EventKind) -> bool {
        self.attached.get(&kind).copied().unwrap_or(false)
    }

    pub fn any_attached(&self) -> bool {
        self.attached.values().any(|attached| *attached)
    }
}

//=========================================================================================
// Monitor Output
//=========================================================================================

/// What happened when the monitor processed one signal. The caller reacts to
/// this; the monitor's only other observable effects are the violation list
/// and the incident writes.
#[derive(Debug, Default)]
pub struct Observation {
    /// Violations appended by this signal, in order.
    pub recorded: Vec<ViolationKind>,
    /// A best-effort clipboard image probe should be scheduled.
    pub probe_requested: bool,
    /// The browser default action should be suppressed.
    pub suppress_default: bool,
    /// The fullscreen element became null; re-entry should be requested.
    pub fullscreen_lost: bool,
    /// The policy limit is now reached or exceeded in some category.
    pub breach: Option<BreachKind>,
}

//=========================================================================================
// The Integrity Monitor
//=========================================================================================

pub struct IntegrityMonitor {
    exam_id: Uuid,
    admission_id: String,
    policy: SecurityPolicy,
    retake_allowed: bool,
    listeners: ListenerTable,
    violations: Vec<Violation>,
    is_fullscreen: bool,
    store: Arc<dyn ExamStore>,
    fullscreen: Arc<dyn FullscreenControl>,
}

impl IntegrityMonitor {
    pub fn new(
        exam_id: Uuid,
        admission_id: String,
        policy: SecurityPolicy,
        retake_allowed: bool,
        store: Arc<dyn ExamStore>,
        fullscreen: Arc<dyn FullscreenControl>,
    ) -> Self {
        Self {
            exam_id,
            admission_id,
            policy,
            retake_allowed,
            listeners: ListenerTable::new(),
            violations: Vec::new(),
            is_fullscreen: false,
            store,
            fullscreen,
        }
    }

    /// Attaches or detaches every listener in one step. Detaching happens
    /// synchronously before any further state mutation, so no violation can
    /// be recorded for a session that is not active.
    pub fn activate(&mut self, active: bool) {
        if active {
            self.listeners.attach_all();
        } else {
            self.listeners.detach_all();
        }
    }

    pub fn is_active(&self) -> bool {
        self.listeners.any_attached()
    }

    pub fn listeners(&self) -> &ListenerTable {
        &self.listeners
    }

    /// Processes one raw browser signal.
    ///
    /// Violations are appended synchronously; incident persistence is
    /// requested afterwards and its failure swallowed, so a transient write
    /// failure never interrupts exam-taking.
    pub async fn observe(&mut self, signal: &BrowserSignal) -> Observation {
        let mut observation = Observation::default();

        if !self.listeners.is_attached(EventKind::of(signal)) {
            return observation;
        }

        if let BrowserSignal::FullscreenChange { fullscreen } = signal {
            self.is_fullscreen = *fullscreen;
        }

        match classify(signal) {
            SignalAction::Record(kind) => {
                self.record_violation(kind, &mut observation).await;
                if kind == ViolationKind::FullscreenExit {
                    observation.fullscreen_lost = true;
                }
            }
            SignalAction::RecordAndProbe(kind) => {
                self.record_violation(kind, &mut observation).await;
                observation.probe_requested = true;
            }
            SignalAction::Probe => observation.probe_requested = true,
            SignalAction::Suppress => observation.suppress_default = true,
            SignalAction::Ignore => {}
        }

        observation.breach = self.current_breach();
        observation
    }

    /// The continuation of an asynchronous clipboard probe that found an
    /// image. Re-checks that the monitor is still active: a late-arriving
    /// confirmation for a deactivated session is discarded.
    pub async fn confirm_clipboard_image(&mut self) -> Option<Observation> {
        if !self.is_active() {
            return None;
        }
        let mut observation = Observation::default();
        self.record_violation(ViolationKind::Screenshot, &mut observation)
            .await;
        observation.breach = self.current_breach();
        Some(observation)
    }

    async fn record_violation(&mut self, kind: ViolationKind, observation: &mut Observation) {
        self.violations.push(Violation { kind, at: Utc::now() });
        observation.recorded.push(kind);

        // Fullscreen exits stay local; a retake override suppresses the
        // server-side audit trail entirely.
        if kind.persisted_server_side() && !self.retake_allowed {
            let reason = format!("{kind} detected");
            if let Err(e) = self
                .store
                .record_incident(self.exam_id, &self.admission_id, &reason)
                .await
            {
                warn!("Failed to record {kind} incident: {e}");
            }
        }
    }

    fn current_breach(&self) -> Option<BreachKind> {
        self.policy
            .breach(self.screenshot_count(), self.tab_switch_count())
    }

    /// Idempotent request to enter fullscreen. Failures are reported to the
    /// caller but are non-fatal.
    pub async fn enter_fullscreen(&mut self) -> PortResult<()> {
        if self.is_fullscreen {
            return Ok(());
        }
        self.fullscreen.request_fullscreen().await?;
        self.is_fullscreen = true;
        Ok(())
    }

    /// Idempotent request to leave fullscreen.
    pub async fn exit_fullscreen(&mut self) -> PortResult<()> {
        if !self.is_fullscreen {
            return Ok(());
        }
        self.fullscreen.exit_fullscreen().await?;
        self.is_fullscreen = false;
        Ok(())
    }

    // --- Read-only derived values ---

    /// The append-only violation list, in recording order.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn count_of(&self, kind: ViolationKind) -> u32 {
        self.violations.iter().filter(|v| v.kind == kind).count() as u32
    }

    pub fn screenshot_count(&self) -> u32 {
        self.count_of(ViolationKind::Screenshot)
    }

    pub fn tab_switch_count(&self) -> u32 {
        self.count_of(ViolationKind::TabSwitch)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.is_fullscreen
    }

    pub fn policy(&self) -> SecurityPolicy {
        self.policy
    }
}

/// Runs the best-effort clipboard image probe.
///
/// Permission denial and unsupported environments degrade to "no evidence
/// found"; a probe failure must never itself produce a violation or error.
pub async fn probe_finds_image(probe: &dyn crate::ports::ClipboardProbe) -> bool {
    match probe.contains_image().await {
        Ok(found) => found,
        Err(e) => {
            warn!("Clipboard probe unavailable: {e}");
            false
        }
    }
}
