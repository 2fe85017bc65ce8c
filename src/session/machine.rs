//! Core session state machine
//!
//! Handles transitions between Idle, Recording and Paused based on fired
//! shortcut actions.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::events::ShortcutEvent;
use crate::hotkey::Action;

/// Recording session states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Not recording, waiting for a shortcut
    #[default]
    Idle,
    /// Recording is active
    Recording,
    /// Recording is held and can be resumed
    Paused,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Recording => write!(f, "Recording"),
            SessionState::Paused => write!(f, "Paused"),
        }
    }
}

/// Tracks the recording session from fired actions
pub struct SessionMachine {
    /// Current state
    state: SessionState,
    /// Time the current non-Idle state was entered
    state_entered_at: Option<Instant>,
    /// Channel for emitting events
    event_tx: broadcast::Sender<ShortcutEvent>,
}

impl SessionMachine {
    /// Create a new session machine
    pub fn new(event_tx: broadcast::Sender<ShortcutEvent>) -> Self {
        Self {
            state: SessionState::Idle,
            state_entered_at: None,
            event_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the machine until the action channel closes
    ///
    /// `on_change` observes every new state, e.g. to mirror it into the IPC
    /// server's status.
    pub async fn run<F>(&mut self, mut action_rx: mpsc::Receiver<Action>, mut on_change: F)
    where
        F: FnMut(SessionState),
    {
        info!("session machine started in Idle state");

        while let Some(action) = action_rx.recv().await {
            let _ = self.event_tx.send(ShortcutEvent::ActionFired { action });
            if self.handle_action(action) {
                on_change(self.state);
            }
        }

        info!("session machine stopped");
    }

    /// Apply one action; returns whether the state changed
    pub fn handle_action(&mut self, action: Action) -> bool {
        let next = self.compute_next_state(action);
        if next == self.state {
            debug!(%action, state = %self.state, "action leaves session unchanged");
            return false;
        }
        self.transition_to(next);
        true
    }

    /// Compute the next state for an action
    fn compute_next_state(&self, action: Action) -> SessionState {
        match (action, self.state) {
            // The legacy shortcut behaves like toggle
            (Action::Toggle | Action::Primary, SessionState::Idle) => SessionState::Recording,
            (Action::Toggle | Action::Primary, _) => SessionState::Idle,

            (Action::Start, SessionState::Idle) => SessionState::Recording,
            (Action::Start, state) => state,

            (Action::Stop, _) => SessionState::Idle,

            (Action::Pause, SessionState::Recording) => SessionState::Paused,
            (Action::Pause, SessionState::Paused) => SessionState::Recording,
            (Action::Pause, SessionState::Idle) => SessionState::Idle,
        }
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: SessionState) {
        let old_state = self.state;
        let duration_ms = self
            .state_entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "session transition"
        );

        self.state = new_state;
        self.state_entered_at = if new_state != SessionState::Idle {
            Some(Instant::now())
        } else {
            None
        };

        let event = ShortcutEvent::SessionChanged {
            from: old_state,
            to: new_state,
            duration_ms,
        };
        debug!(?event, "emitting session event");
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_machine() -> (SessionMachine, broadcast::Receiver<ShortcutEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (SessionMachine::new(tx), rx)
    }

    #[test]
    fn test_initial_state() {
        let (machine, _) = create_machine();
        assert_eq!(machine.state(), SessionState::Idle);
    }

    #[test]
    fn test_toggle_flips() {
        let (mut machine, _) = create_machine();
        assert!(machine.handle_action(Action::Toggle));
        assert_eq!(machine.state(), SessionState::Recording);
        assert!(machine.handle_action(Action::Toggle));
        assert_eq!(machine.state(), SessionState::Idle);
    }

    #[test]
    fn test_primary_acts_as_toggle() {
        let (mut machine, _) = create_machine();
        machine.handle_action(Action::Primary);
        assert_eq!(machine.state(), SessionState::Recording);
    }

    #[test]
    fn test_start_is_ignored_while_recording() {
        let (mut machine, _) = create_machine();
        machine.handle_action(Action::Start);
        assert!(!machine.handle_action(Action::Start));
        assert_eq!(machine.state(), SessionState::Recording);
    }

    #[test]
    fn test_pause_and_resume() {
        let (mut machine, _) = create_machine();
        assert!(!machine.handle_action(Action::Pause));
        assert_eq!(machine.state(), SessionState::Idle);

        machine.handle_action(Action::Start);
        machine.handle_action(Action::Pause);
        assert_eq!(machine.state(), SessionState::Paused);
        machine.handle_action(Action::Pause);
        assert_eq!(machine.state(), SessionState::Recording);
    }

    #[test]
    fn test_stop_from_paused() {
        let (mut machine, _) = create_machine();
        machine.handle_action(Action::Start);
        machine.handle_action(Action::Pause);
        machine.handle_action(Action::Stop);
        assert_eq!(machine.state(), SessionState::Idle);
    }

    #[test]
    fn test_transitions_are_broadcast() {
        let (mut machine, mut rx) = create_machine();
        machine.handle_action(Action::Toggle);

        match rx.try_recv().unwrap() {
            ShortcutEvent::SessionChanged { from, to, .. } => {
                assert_eq!(from, SessionState::Idle);
                assert_eq!(to, SessionState::Recording);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let (mut machine, mut rx) = create_machine();
        let (action_tx, action_rx) = mpsc::channel(8);

        action_tx.send(Action::Toggle).await.unwrap();
        action_tx.send(Action::Pause).await.unwrap();
        drop(action_tx);

        let mut seen = Vec::new();
        machine.run(action_rx, |state| seen.push(state)).await;

        assert_eq!(seen, vec![SessionState::Recording, SessionState::Paused]);
        assert_eq!(
            rx.try_recv().unwrap(),
            ShortcutEvent::ActionFired { action: Action::Toggle }
        );
    }
}
