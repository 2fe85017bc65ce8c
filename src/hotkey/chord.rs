//! Chord strings such as `Ctrl+F1` or `Super+F20`
//!
//! Parsing is case-insensitive and accepts the modifiers in any order;
//! formatting always produces `Ctrl+Alt+Shift+Super+<Key>` so two chords can be
//! compared after a round-trip.

use std::fmt;
use std::str::FromStr;

use evdev::Key;
use serde::{Deserialize, Serialize};

use super::keys::{self, Modifier, Modifiers};

/// Errors from parsing a chord string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChordParseError {
    #[error("chord string is empty")]
    Empty,

    #[error("chord '{0}' contains an empty token")]
    EmptyToken(String),

    #[error("unrecognized key '{0}' (expected Ctrl, Alt, Shift, Super or F1-F20)")]
    UnknownToken(String),

    #[error("chord '{0}' has no base key")]
    MissingKey(String),

    #[error("chord '{0}' has more than one base key")]
    MultipleKeys(String),
}

/// A normalized chord: the exact modifier set plus one base key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChordSpec {
    pub modifiers: Modifiers,
    pub key: Key,
}

impl ChordSpec {
    pub fn new(modifiers: Modifiers, key: Key) -> Self {
        Self { modifiers, key }
    }

    /// A chord with no modifiers
    pub fn bare(key: Key) -> Self {
        Self::new(Modifiers::default(), key)
    }

    /// Parse a chord string
    pub fn parse(s: &str) -> Result<Self, ChordParseError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ChordParseError::Empty);
        }

        let mut modifiers = Modifiers::default();
        let mut key: Option<Key> = None;

        for token in trimmed.split('+').map(str::trim) {
            if token.is_empty() {
                return Err(ChordParseError::EmptyToken(trimmed.to_string()));
            }

            if let Some(modifier) = Modifier::from_token(token) {
                modifiers.insert(modifier);
                continue;
            }

            let base = keys::base_key_from_token(token)
                .ok_or_else(|| ChordParseError::UnknownToken(token.to_string()))?;
            if key.replace(base).is_some() {
                return Err(ChordParseError::MultipleKeys(trimmed.to_string()));
            }
        }

        let key = key.ok_or_else(|| ChordParseError::MissingKey(trimmed.to_string()))?;
        Ok(Self { modifiers, key })
    }

    /// Parse an optional chord; an empty or blank string means unbound
    pub fn parse_optional(s: &str) -> Result<Option<Self>, ChordParseError> {
        if s.trim().is_empty() {
            Ok(None)
        } else {
            Self::parse(s).map(Some)
        }
    }
}

impl fmt::Display for ChordSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in self.modifiers.iter() {
            write!(f, "{modifier}+")?;
        }
        f.write_str(&keys::base_key_name(self.key))
    }
}

impl FromStr for ChordSpec {
    type Err = ChordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChordSpec {
    type Error = ChordParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ChordSpec> for String {
    fn from(chord: ChordSpec) -> Self {
        chord.to_string()
    }
}
