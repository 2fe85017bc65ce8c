//! Events pushed to subscribed IPC clients
//!
//! Covers fired shortcuts, recording session transitions and binding
//! changes made while the daemon runs.

use serde::{Deserialize, Serialize};

use crate::hotkey::{Action, ChordSpec};
use crate::session::SessionState;

/// Events broadcast by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShortcutEvent {
    /// A bound chord was pressed
    ActionFired { action: Action },

    /// The recording session changed state
    SessionChanged {
        from: SessionState,
        to: SessionState,
        /// Milliseconds spent in `from`
        duration_ms: u64,
    },

    /// An action was rebound or cleared
    BindingChanged {
        action: Action,
        chord: Option<ChordSpec>,
    },
}

impl std::fmt::Display for ShortcutEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShortcutEvent::ActionFired { action } => write!(f, "ACTION_FIRED ({action})"),
            ShortcutEvent::SessionChanged { from, to, duration_ms } => {
                write!(f, "SESSION_CHANGED ({from} -> {to}, {duration_ms}ms)")
            }
            ShortcutEvent::BindingChanged { action, chord: Some(chord) } => {
                write!(f, "BINDING_CHANGED ({action} = {chord})")
            }
            ShortcutEvent::BindingChanged { action, chord: None } => {
                write!(f, "BINDING_CHANGED ({action} unbound)")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ShortcutEvent::BindingChanged {
            action: Action::Pause,
            chord: Some(ChordSpec::parse("alt+f9").unwrap()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("binding_changed"));
        assert!(json.contains("\"pause\""));
        assert!(json.contains("Alt+F9"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"action_fired","action":"toggle"}"#;
        let event: ShortcutEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, ShortcutEvent::ActionFired { action: Action::Toggle });
    }

    #[test]
    fn test_display() {
        let event = ShortcutEvent::SessionChanged {
            from: SessionState::Recording,
            to: SessionState::Idle,
            duration_ms: 1500,
        };
        assert_eq!(event.to_string(), "SESSION_CHANGED (Recording -> Idle, 1500ms)");
    }
}
