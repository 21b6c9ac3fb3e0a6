pub mod domain;
pub mod monitor;
pub mod policy;
pub mod ports;
pub mod scoring;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use domain::{
    ExamDefinition, ExamPhase, Incident, Question, ScoreReport, SessionOutcome, SessionSnapshot,
    Submission, Violation, ViolationKind,
};
pub use monitor::{EventKind, IntegrityMonitor, ListenerTable, Observation};
pub use policy::{BreachKind, BrowserSignal, Modifiers, SecurityPolicy, SignalAction};
pub use ports::{ClipboardProbe, ExamStore, FullscreenControl, PortError, PortResult, SnapshotStore};
pub use scoring::score_exam;
pub use session::{
    AccessOutcome, ExamSessionEngine, SignalOutcome, StartOutcome, TickOutcome,
};
