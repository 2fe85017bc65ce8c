//! Recording session tracking driven by shortcut actions
//!
//! Provides an explicit state machine with three states:
//! - Idle: not recording
//! - Recording: started by toggle, start or the primary shortcut
//! - Paused: entered and left with pause while recording

mod machine;

pub use machine::{SessionMachine, SessionState};
