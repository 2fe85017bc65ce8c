//! chord-hotkeys: global key-chord shortcuts for Linux
//!
//! Recognizes chords such as `F13` or `Ctrl+Alt+F9` system-wide by reading
//! `/dev/input/event*` directly, independent of which window has focus, and
//! calls back into the host application when one is pressed.
//!
//! The `hotkey` module is the library proper. The remaining modules make up
//! the `chord-hotkeys` daemon, which hosts the service and exposes it over a
//! Unix socket.

pub mod config;
pub mod events;
pub mod hotkey;
pub mod ipc;
pub mod lifecycle;
pub mod session;

pub use hotkey::{Action, Callbacks, ChordSpec, HotkeyError, ShortcutConfig, ShortcutService};
