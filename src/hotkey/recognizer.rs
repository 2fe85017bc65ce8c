//! Per-reader chord edge detection
//!
//! Tracks which keys are held on one device and decides, on each key event,
//! whether a bound chord has just been pressed.

use std::collections::HashSet;

use evdev::Key;
use tracing::trace;

use super::bindings::{Action, SharedBindings};
use super::chord::ChordSpec;
use super::keys::{self, Modifiers};

/// Matches key events from a single device against the active bindings
pub struct ChordRecognizer {
    /// Keys currently held on this device, modifiers included
    held: HashSet<Key>,
    bindings: SharedBindings,
}

impl ChordRecognizer {
    pub fn new(bindings: SharedBindings) -> Self {
        Self {
            held: HashSet::new(),
            bindings,
        }
    }

    /// Forget all held keys
    pub fn reset(&mut self) {
        self.held.clear();
    }

    pub fn held(&self) -> &HashSet<Key> {
        &self.held
    }

    /// Record a kernel autorepeat of `key`; never fires
    ///
    /// A key that was already down when the reader opened first shows up as a
    /// repeat, so it becomes held without producing a press edge.
    pub fn process_repeat(&mut self, key: Key) {
        if self.held.insert(key) {
            trace!(?key, "autorepeat of a key not seen pressed");
        }
    }

    /// Feed one key event; returns the actions fired by it, in table order
    ///
    /// A chord fires only on the 0→1 transition of its base key while exactly
    /// its modifiers are held. Repeated presses of a held key never fire.
    pub fn process(&mut self, key: Key, pressed: bool) -> Vec<Action> {
        let was_held = if pressed {
            !self.held.insert(key)
        } else {
            self.held.remove(&key);
            return Vec::new();
        };

        if was_held || keys::is_modifier(key) {
            return Vec::new();
        }

        let chord = ChordSpec::new(Modifiers::from_held(&self.held), key);
        let table = self.bindings.snapshot();
        let fired: Vec<Action> = table.actions_for(&chord).collect();

        if !fired.is_empty() {
            trace!(%chord, ?fired, "chord matched");
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::bindings::{BindingTable, ShortcutStrings};

    fn recognizer(strings: ShortcutStrings) -> (ChordRecognizer, SharedBindings) {
        let shared = SharedBindings::new(BindingTable::from_strings(&strings).unwrap());
        (ChordRecognizer::new(shared.clone()), shared)
    }

    fn ctrl_f1() -> (ChordRecognizer, SharedBindings) {
        recognizer(ShortcutStrings {
            toggle: "Ctrl+F1".into(),
            ..Default::default()
        })
    }

    #[test]
    fn test_fires_when_modifier_held_first() {
        let (mut rec, _) = ctrl_f1();
        assert!(rec.process(Key::KEY_LEFTCTRL, true).is_empty());
        assert_eq!(rec.process(Key::KEY_F1, true), vec![Action::Toggle]);
    }

    #[test]
    fn test_right_modifier_counts() {
        let (mut rec, _) = ctrl_f1();
        rec.process(Key::KEY_RIGHTCTRL, true);
        assert_eq!(rec.process(Key::KEY_F1, true), vec![Action::Toggle]);
    }

    #[test]
    fn test_autorepeat_does_not_refire() {
        let (mut rec, _) = ctrl_f1();
        rec.process(Key::KEY_LEFTCTRL, true);
        assert_eq!(rec.process(Key::KEY_F1, true).len(), 1);
        assert!(rec.process(Key::KEY_F1, true).is_empty());
        assert!(rec.process(Key::KEY_F1, true).is_empty());
    }

    #[test]
    fn test_base_key_before_modifier_does_not_fire() {
        let (mut rec, _) = ctrl_f1();
        assert!(rec.process(Key::KEY_F1, true).is_empty());
        assert!(rec.process(Key::KEY_LEFTCTRL, true).is_empty());
        // still held, so a repeat is not an edge
        assert!(rec.process(Key::KEY_F1, true).is_empty());
    }

    #[test]
    fn test_modifier_released_before_base_key() {
        let (mut rec, _) = ctrl_f1();
        rec.process(Key::KEY_LEFTCTRL, true);
        rec.process(Key::KEY_LEFTCTRL, false);
        assert!(rec.process(Key::KEY_F1, true).is_empty());
    }

    #[test]
    fn test_exact_modifier_match() {
        let (mut rec, _) = ctrl_f1();
        // superset
        rec.process(Key::KEY_LEFTCTRL, true);
        rec.process(Key::KEY_LEFTSHIFT, true);
        assert!(rec.process(Key::KEY_F1, true).is_empty());
        rec.process(Key::KEY_F1, false);
        rec.process(Key::KEY_LEFTSHIFT, false);
        rec.process(Key::KEY_LEFTCTRL, false);
        // subset
        assert!(rec.process(Key::KEY_F1, true).is_empty());
    }

    #[test]
    fn test_release_then_press_fires_again() {
        let (mut rec, _) = ctrl_f1();
        rec.process(Key::KEY_LEFTCTRL, true);
        assert_eq!(rec.process(Key::KEY_F1, true).len(), 1);
        rec.process(Key::KEY_F1, false);
        assert_eq!(rec.process(Key::KEY_F1, true).len(), 1);
    }

    #[test]
    fn test_releasing_modifier_after_press_is_fine() {
        let (mut rec, _) = ctrl_f1();
        rec.process(Key::KEY_LEFTCTRL, true);
        assert_eq!(rec.process(Key::KEY_F1, true).len(), 1);
        assert!(rec.process(Key::KEY_LEFTCTRL, false).is_empty());
        assert!(rec.process(Key::KEY_F1, false).is_empty());
        assert!(rec.held().is_empty());
    }

    #[test]
    fn test_shared_chord_fans_out() {
        let (mut rec, shared) = recognizer(ShortcutStrings {
            toggle: "F13".into(),
            stop: "F13".into(),
            ..Default::default()
        });
        assert_eq!(shared.snapshot().validate().len(), 1);
        assert_eq!(rec.process(Key::KEY_F13, true), vec![Action::Toggle, Action::Stop]);
    }

    #[test]
    fn test_sees_rebinds_on_next_event() {
        let (mut rec, shared) = recognizer(ShortcutStrings {
            toggle: "F13".into(),
            pause: "Alt+F9".into(),
            ..Default::default()
        });

        shared.update(Action::Pause, None);
        rec.process(Key::KEY_LEFTALT, true);
        assert!(rec.process(Key::KEY_F9, true).is_empty());
        rec.process(Key::KEY_F9, false);

        shared.update(Action::Toggle, Some(ChordSpec::parse("Alt+F9").unwrap()));
        assert_eq!(rec.process(Key::KEY_F9, true), vec![Action::Toggle]);
    }

    #[test]
    fn test_scenario_f13_and_alt_f9() {
        let (mut rec, _) = recognizer(ShortcutStrings {
            toggle: "F13".into(),
            pause: "Alt+F9".into(),
            ..Default::default()
        });

        assert_eq!(rec.process(Key::KEY_F13, true), vec![Action::Toggle]);
        assert!(rec.process(Key::KEY_F13, false).is_empty());

        rec.process(Key::KEY_LEFTALT, true);
        assert_eq!(rec.process(Key::KEY_F9, true), vec![Action::Pause]);
        rec.process(Key::KEY_F9, false);
        rec.process(Key::KEY_LEFTALT, false);

        assert_eq!(rec.process(Key::KEY_F13, true), vec![Action::Toggle]);
    }

    #[test]
    fn test_reset_clears_held_keys() {
        let (mut rec, _) = ctrl_f1();
        rec.process(Key::KEY_LEFTCTRL, true);
        rec.process(Key::KEY_F1, true);
        rec.reset();
        assert!(rec.held().is_empty());
        assert!(rec.process(Key::KEY_F1, true).is_empty());
    }

    #[test]
    fn test_repeat_of_unseen_key_never_fires() {
        let (mut rec, _) = recognizer(ShortcutStrings {
            toggle: "F13".into(),
            ..Default::default()
        });

        rec.process_repeat(Key::KEY_F13);
        rec.process_repeat(Key::KEY_F13);
        assert!(rec.held().contains(&Key::KEY_F13));
        assert!(rec.process(Key::KEY_F13, true).is_empty());

        rec.process(Key::KEY_F13, false);
        assert_eq!(rec.process(Key::KEY_F13, true), vec![Action::Toggle]);
    }
}
