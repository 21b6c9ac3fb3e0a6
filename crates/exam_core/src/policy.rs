//! crates/exam_core/src/policy.rs
//!
//! Pure classification of raw browser signals into violations, plus the
//! escalation policy that decides when a session must be terminated.

use crate::domain::ViolationKind;

/// Modifier keys held during a keyboard event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

/// A raw browser-level signal forwarded by the client while a session is
/// active. This is the monitor's only input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserSignal {
    /// A clipboard `copy` event fired on the document.
    Copy,
    /// A clipboard `paste` event fired on the document.
    Paste,
    KeyDown {
        key: String,
        code: String,
        modifiers: Modifiers,
    },
    /// Some platforms only report PrintScreen on key release.
    KeyUp { key: String, code: String },
    /// The page's visibility transitioned to hidden.
    VisibilityHidden,
    /// The window lost focus without the page becoming hidden.
    WindowBlur,
    FullscreenChange { fullscreen: bool },
}

/// What the monitor should do with a classified signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Record a violation of the given kind.
    Record(ViolationKind),
    /// Record a violation and follow up with a best-effort clipboard image
    /// probe, since the signal may correspond to a screen capture.
    RecordAndProbe(ViolationKind),
    /// No violation, but run the clipboard probe: some capture tools steal
    /// focus without firing a reliable keyboard event.
    Probe,
    /// Suppress the browser default without recording anything.
    Suppress,
    /// Not a violation.
    Ignore,
}

/// Key names/codes associated with the platform print-screen key,
/// compared case-insensitively.
const PRINT_SCREEN_KEYS: [&str; 1] = ["printscreen"];
const PRINT_SCREEN_CODES: [&str; 2] = ["printscreen", "printscrn"];

/// Digits used by the macOS capture shortcuts (Cmd+Shift+3/4/5).
const MAC_CAPTURE_DIGITS: [&str; 3] = ["3", "4", "5"];

fn is_print_screen(key: &str, code: &str) -> bool {
    PRINT_SCREEN_KEYS.contains(&key) || PRINT_SCREEN_CODES.contains(&code)
}

/// Classifies one raw browser signal.
///
/// Screenshot detection is a heuristic union: fixed print-screen key names,
/// known OS capture shortcuts, and (via the returned probe actions) a
/// clipboard-content inspection triggered opportunistically on focus loss.
pub fn classify(signal: &BrowserSignal) -> SignalAction {
    match signal {
        BrowserSignal::Copy => SignalAction::Record(ViolationKind::Copy),
        BrowserSignal::Paste => SignalAction::Record(ViolationKind::Paste),
        BrowserSignal::KeyDown { key, code, modifiers } => {
            let key = key.to_lowercase();
            let code = code.to_lowercase();

            if is_print_screen(&key, &code)
                || (modifiers.alt && (is_print_screen(&key, &code) || code.contains("print")))
            {
                return SignalAction::RecordAndProbe(ViolationKind::Screenshot);
            }

            // Windows snip shortcut: Win+Shift+S (Meta or Ctrl accepted).
            if (modifiers.meta || modifiers.ctrl) && modifiers.shift && key == "s" {
                return SignalAction::RecordAndProbe(ViolationKind::Screenshot);
            }

            // macOS capture shortcuts: Cmd+Shift+3/4/5.
            if modifiers.meta && modifiers.shift && MAC_CAPTURE_DIGITS.contains(&key.as_str()) {
                return SignalAction::RecordAndProbe(ViolationKind::Screenshot);
            }

            // Find-in-page and view-source are blocked but not violations.
            if (modifiers.ctrl || modifiers.meta) && (key == "f" || key == "u") {
                return SignalAction::Suppress;
            }

            SignalAction::Ignore
        }
        BrowserSignal::KeyUp { key, code } => {
            let key = key.to_lowercase();
            let code = code.to_lowercase();
            if is_print_screen(&key, &code) {
                SignalAction::RecordAndProbe(ViolationKind::Screenshot)
            } else {
                SignalAction::Ignore
            }
        }
        BrowserSignal::VisibilityHidden => SignalAction::RecordAndProbe(ViolationKind::TabSwitch),
        BrowserSignal::WindowBlur => SignalAction::Probe,
        BrowserSignal::FullscreenChange { fullscreen } => {
            if *fullscreen {
                SignalAction::Ignore
            } else {
                SignalAction::Record(ViolationKind::FullscreenExit)
            }
        }
    }
}

//=========================================================================================
// Escalation Policy
//=========================================================================================

/// Which violation category breached the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreachKind {
    Screenshots,
    TabSwitches,
}

/// Policy thresholds for forced termination.
///
/// The limit applies independently to the screenshot count and the
/// tab-switch count; fullscreen exits never contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityPolicy {
    pub violation_limit: u32,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self { violation_limit: 6 }
    }
}

impl SecurityPolicy {
    /// Checks the current counts against the limit. Screenshots are checked
    /// before tab switches, so a simultaneous double breach reports the
    /// screenshot category.
    pub fn breach(&self, screenshot_count: u32, tab_switch_count: u32) -> Option<BreachKind> {
        if screenshot_count >= self.violation_limit {
            Some(BreachKind::Screenshots)
        } else if tab_switch_count >= self.violation_limit {
            Some(BreachKind::TabSwitches)
        } else {
            None
        }
    }

    /// The audit reason recorded when a breach forces termination.
    pub fn breach_reason(&self, kind: BreachKind) -> String {
        match kind {
            BreachKind::Screenshots => format!("taking {} screenshots", self.violation_limit),
            BreachKind::TabSwitches => format!("switching tabs {} times", self.violation_limit),
        }
    }
}
