//! Global hotkeys read from Linux input devices
//!
//! Each keyboard is read on its own thread via evdev. Key events go through a
//! per-device chord recognizer, and fired actions are handed to the consumer's
//! callbacks. Bindings can be replaced while the readers run.

mod bindings;
mod chord;
mod device;
mod dispatch;
mod keys;
mod recognizer;
mod service;

pub use bindings::{
    Action, Binding, BindingTable, ConflictWarning, SharedBindings, ShortcutStrings, UnknownAction,
};
pub use chord::{ChordParseError, ChordSpec};
pub use device::{
    list_keyboards, DeviceOpenError, DeviceReadError, DeviceReader, KeyEvent, KeySource,
    KeyboardInfo, POLL_INTERVAL,
};
pub use dispatch::{Callback, CallbackError, Callbacks, Dispatcher};
pub use keys::{Modifier, Modifiers};
pub use recognizer::ChordRecognizer;
pub use service::{
    HotkeyError, ReaderPipeline, ReaderStatus, ServiceState, ShortcutConfig, ShortcutService,
    StartReport, STOP_TIMEOUT,
};
