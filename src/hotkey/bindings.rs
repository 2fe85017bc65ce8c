//! Logical actions and the table of chords bound to them
//!
//! A `BindingTable` is an immutable value once shared: rebinding builds a new
//! table and swaps it into `SharedBindings`, so reader threads only ever see a
//! complete table.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::chord::{ChordParseError, ChordSpec};

/// Logical actions a chord can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Legacy single shortcut
    Primary,
    Toggle,
    Start,
    Stop,
    Pause,
}

impl Action {
    /// All actions in table iteration order
    pub const ALL: [Action; 5] = [
        Action::Primary,
        Action::Toggle,
        Action::Start,
        Action::Stop,
        Action::Pause,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::Primary => "primary",
            Action::Toggle => "toggle",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Pause => "pause",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

pub(crate) const ACTION_COUNT: usize = Action::ALL.len();

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an action name that is not one of [`Action::ALL`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action '{0}' (expected primary, toggle, start, stop or pause)")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Action::ALL
            .into_iter()
            .find(|action| action.name() == lower)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// One action and the chord it is bound to, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub action: Action,
    /// `None` means the action is unbound and never fires
    pub chord: Option<ChordSpec>,
}

/// Two distinct actions bound to the same chord
///
/// Advisory only: both actions fire on every matching press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictWarning {
    pub first: Action,
    pub second: Action,
    pub chord: ChordSpec,
}

impl fmt::Display for ConflictWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "actions '{}' and '{}' are both bound to {}",
            self.first, self.second, self.chord
        )
    }
}

/// Chord strings for each action, as supplied by configuration
///
/// Empty strings mean unbound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutStrings {
    #[serde(default)]
    pub primary: String,
    #[serde(default)]
    pub toggle: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub stop: String,
    #[serde(default)]
    pub pause: String,
}

impl ShortcutStrings {
    pub fn get(&self, action: Action) -> &str {
        match action {
            Action::Primary => &self.primary,
            Action::Toggle => &self.toggle,
            Action::Start => &self.start,
            Action::Stop => &self.stop,
            Action::Pause => &self.pause,
        }
    }
}

/// The active mapping from action to chord
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTable {
    chords: [Option<ChordSpec>; ACTION_COUNT],
}

impl BindingTable {
    /// A table with every action unbound
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from chord strings; fails on the first malformed chord
    pub fn from_strings(strings: &ShortcutStrings) -> Result<Self, (Action, ChordParseError)> {
        let mut table = Self::new();
        for action in Action::ALL {
            let chord = ChordSpec::parse_optional(strings.get(action)).map_err(|e| (action, e))?;
            table.bind(action, chord);
        }
        Ok(table)
    }

    pub fn resolve(&self, action: Action) -> Option<ChordSpec> {
        self.chords[action.index()]
    }

    pub fn bind(&mut self, action: Action, chord: Option<ChordSpec>) {
        self.chords[action.index()] = chord;
    }

    /// Copy of this table with one action rebound
    pub fn with_binding(&self, action: Action, chord: Option<ChordSpec>) -> Self {
        let mut table = self.clone();
        table.bind(action, chord);
        table
    }

    /// All bindings in iteration order, bound or not
    pub fn iter(&self) -> impl Iterator<Item = Binding> + '_ {
        Action::ALL.into_iter().map(|action| Binding {
            action,
            chord: self.resolve(action),
        })
    }

    /// Actions bound to exactly this chord, in iteration order
    pub fn actions_for(&self, chord: &ChordSpec) -> impl Iterator<Item = Action> + '_ {
        let chord = *chord;
        self.iter()
            .filter(move |binding| binding.chord == Some(chord))
            .map(|binding| binding.action)
    }

    /// Report every pair of distinct actions sharing a chord
    pub fn validate(&self) -> Vec<ConflictWarning> {
        let bound: Vec<(Action, ChordSpec)> = self
            .iter()
            .filter_map(|binding| binding.chord.map(|chord| (binding.action, chord)))
            .collect();

        let mut conflicts = Vec::new();
        for (i, (first, chord)) in bound.iter().enumerate() {
            for (second, other) in &bound[i + 1..] {
                if chord == other {
                    conflicts.push(ConflictWarning {
                        first: *first,
                        second: *second,
                        chord: *chord,
                    });
                }
            }
        }
        conflicts
    }
}

/// The single active `BindingTable`, replaced by reference on rebind
#[derive(Debug, Clone, Default)]
pub struct SharedBindings {
    current: Arc<RwLock<Arc<BindingTable>>>,
}

impl SharedBindings {
    pub fn new(table: BindingTable) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(table))),
        }
    }

    /// The table in effect right now
    pub fn snapshot(&self) -> Arc<BindingTable> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Replace the active table
    pub fn replace(&self, table: BindingTable) {
        let table = Arc::new(table);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = table;
    }

    /// Rebind one action against the current table and swap in the result
    ///
    /// The read-modify-write happens under one write lock.
    pub fn update(&self, action: Action, chord: Option<ChordSpec>) -> Arc<BindingTable> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let table = Arc::new(guard.with_binding(action, chord));
        *guard = Arc::clone(&table);
        table
    }
}
