//! Modifier and base key definitions
//!
//! Maps the Linux input key codes this crate cares about (the four modifier
//! families and the F1–F20 function row) to the names used in chord strings,
//! and tracks which modifiers a set of held keys amounts to.

use std::fmt;

use evdev::Key;

/// Left/right key codes for each modifier family
pub mod codes {
    use evdev::Key;

    /// Both Control keys
    pub const CTRL: [Key; 2] = [Key::KEY_LEFTCTRL, Key::KEY_RIGHTCTRL];
    /// Both Alt keys (right Alt is AltGr on many layouts)
    pub const ALT: [Key; 2] = [Key::KEY_LEFTALT, Key::KEY_RIGHTALT];
    /// Both Shift keys
    pub const SHIFT: [Key; 2] = [Key::KEY_LEFTSHIFT, Key::KEY_RIGHTSHIFT];
    /// Both Super/Meta keys
    pub const SUPER: [Key; 2] = [Key::KEY_LEFTMETA, Key::KEY_RIGHTMETA];
}

/// Function keys that may be used as the base key of a chord, indexed by number - 1.
///
/// F13–F20 are absent from most physical keyboards, which makes them safe to
/// capture globally without shadowing anything the focused application uses.
const FUNCTION_KEYS: [Key; 20] = [
    Key::KEY_F1,
    Key::KEY_F2,
    Key::KEY_F3,
    Key::KEY_F4,
    Key::KEY_F5,
    Key::KEY_F6,
    Key::KEY_F7,
    Key::KEY_F8,
    Key::KEY_F9,
    Key::KEY_F10,
    Key::KEY_F11,
    Key::KEY_F12,
    Key::KEY_F13,
    Key::KEY_F14,
    Key::KEY_F15,
    Key::KEY_F16,
    Key::KEY_F17,
    Key::KEY_F18,
    Key::KEY_F19,
    Key::KEY_F20,
];

/// One of the four modifier families a chord can require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Super,
}

impl Modifier {
    /// Canonical display order
    pub const ALL: [Modifier; 4] = [Modifier::Ctrl, Modifier::Alt, Modifier::Shift, Modifier::Super];

    /// Parse a modifier token from a chord string (case-insensitive)
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "alt" | "option" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            "super" | "meta" | "win" => Some(Modifier::Super),
            _ => None,
        }
    }

    /// The modifier family a key code belongs to, if any
    pub fn of_key(key: Key) -> Option<Self> {
        if codes::CTRL.contains(&key) {
            Some(Modifier::Ctrl)
        } else if codes::ALT.contains(&key) {
            Some(Modifier::Alt)
        } else if codes::SHIFT.contains(&key) {
            Some(Modifier::Shift)
        } else if codes::SUPER.contains(&key) {
            Some(Modifier::Super)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Modifier::Ctrl => "Ctrl",
            Modifier::Alt => "Alt",
            Modifier::Shift => "Shift",
            Modifier::Super => "Super",
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check whether a key code is one of the modifier keys
pub fn is_modifier(key: Key) -> bool {
    Modifier::of_key(key).is_some()
}

/// Tracks which modifier families are held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    /// Either Control key is held
    pub ctrl: bool,
    /// Either Alt key is held
    pub alt: bool,
    /// Either Shift key is held
    pub shift: bool,
    /// Either Super key is held
    pub super_key: bool,
}

impl Modifiers {
    /// Collapse a set of held key codes into modifier families
    pub fn from_held<'a>(held: impl IntoIterator<Item = &'a Key>) -> Self {
        let mut modifiers = Self::default();
        for key in held {
            if let Some(modifier) = Modifier::of_key(*key) {
                modifiers.insert(modifier);
            }
        }
        modifiers
    }

    pub fn insert(&mut self, modifier: Modifier) {
        match modifier {
            Modifier::Ctrl => self.ctrl = true,
            Modifier::Alt => self.alt = true,
            Modifier::Shift => self.shift = true,
            Modifier::Super => self.super_key = true,
        }
    }

    pub fn contains(&self, modifier: Modifier) -> bool {
        match modifier {
            Modifier::Ctrl => self.ctrl,
            Modifier::Alt => self.alt,
            Modifier::Shift => self.shift,
            Modifier::Super => self.super_key,
        }
    }

    /// Check if no modifiers are held
    pub fn is_empty(&self) -> bool {
        !self.ctrl && !self.alt && !self.shift && !self.super_key
    }

    /// Held modifiers in canonical order
    pub fn iter(&self) -> impl Iterator<Item = Modifier> + '_ {
        Modifier::ALL.into_iter().filter(|m| self.contains(*m))
    }
}

/// Look up the key code for function key `F<number>`
pub fn function_key(number: u8) -> Option<Key> {
    let index = usize::from(number).checked_sub(1)?;
    FUNCTION_KEYS.get(index).copied()
}

/// The function key number of a key code, if it is F1–F20
pub fn function_key_number(key: Key) -> Option<u8> {
    FUNCTION_KEYS
        .iter()
        .position(|k| *k == key)
        .map(|index| index as u8 + 1)
}

/// Parse a base key token such as `f13` (case-insensitive)
pub fn base_key_from_token(token: &str) -> Option<Key> {
    let lower = token.to_ascii_lowercase();
    let digits = lower.strip_prefix('f')?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    function_key(digits.parse().ok()?)
}

/// Display name of a base key, e.g. `F13`
pub fn base_key_name(key: Key) -> String {
    match function_key_number(key) {
        Some(number) => format!("F{number}"),
        None => format!("{key:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_modifiers() {
        let modifiers = Modifiers::default();
        assert!(modifiers.is_empty());
        assert_eq!(modifiers.iter().count(), 0);
    }

    #[test]
    fn test_left_and_right_collapse() {
        let held = [Key::KEY_RIGHTCTRL, Key::KEY_LEFTALT, Key::KEY_F1];
        let modifiers = Modifiers::from_held(held.iter());
        assert!(modifiers.ctrl);
        assert!(modifiers.alt);
        assert!(!modifiers.shift);
        assert!(!modifiers.super_key);
    }

    #[test]
    fn test_canonical_order() {
        let mut modifiers = Modifiers::default();
        modifiers.insert(Modifier::Super);
        modifiers.insert(Modifier::Ctrl);
        modifiers.insert(Modifier::Shift);
        let order: Vec<_> = modifiers.iter().collect();
        assert_eq!(order, vec![Modifier::Ctrl, Modifier::Shift, Modifier::Super]);
    }

    #[test]
    fn test_function_key_table() {
        assert_eq!(function_key(1), Some(Key::KEY_F1));
        assert_eq!(function_key(12), Some(Key::KEY_F12));
        assert_eq!(function_key(13), Some(Key::KEY_F13));
        assert_eq!(function_key(20), Some(Key::KEY_F20));
        assert_eq!(function_key(0), None);
        assert_eq!(function_key(21), None);
        assert_eq!(function_key_number(Key::KEY_F20), Some(20));
        assert_eq!(function_key_number(Key::KEY_A), None);
    }

    #[test]
    fn test_base_key_tokens() {
        assert_eq!(base_key_from_token("F9"), Some(Key::KEY_F9));
        assert_eq!(base_key_from_token("f13"), Some(Key::KEY_F13));
        assert_eq!(base_key_from_token("F21"), None);
        assert_eq!(base_key_from_token("F01"), None);
        assert_eq!(base_key_from_token("F"), None);
        assert_eq!(base_key_from_token("space"), None);
    }

    #[test]
    fn test_modifier_tokens() {
        assert_eq!(Modifier::from_token("CTRL"), Some(Modifier::Ctrl));
        assert_eq!(Modifier::from_token("meta"), Some(Modifier::Super));
        assert_eq!(Modifier::from_token("hyper"), None);
        assert!(is_modifier(Key::KEY_RIGHTMETA));
        assert!(!is_modifier(Key::KEY_F13));
    }
}
