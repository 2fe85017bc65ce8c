//! Delivery of fired actions to consumer callbacks
//!
//! Callbacks run synchronously on the reader thread that detected the chord.
//! Consumers that need to touch their own thread-affine state should forward
//! the action into a channel and return.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use super::bindings::{Action, ACTION_COUNT};

/// A consumer callback, invoked once per fired edge
pub type Callback = Arc<dyn Fn(Action) + Send + Sync>;

/// A consumer callback panicked while handling an action
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("callback for action '{action}' panicked: {message}")]
pub struct CallbackError {
    pub action: Action,
    pub message: String,
}

/// Fixed callback slots, one per action, plus a legacy fallback slot
#[derive(Clone, Default)]
pub struct Callbacks {
    legacy: Option<Callback>,
    slots: [Option<Callback>; ACTION_COUNT],
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every action to one callback
    pub fn legacy<F>(callback: F) -> Self
    where
        F: Fn(Action) + Send + Sync + 'static,
    {
        Self::new().with_legacy(callback)
    }

    /// Set the fallback used by actions without their own slot
    pub fn with_legacy<F>(mut self, callback: F) -> Self
    where
        F: Fn(Action) + Send + Sync + 'static,
    {
        self.legacy = Some(Arc::new(callback));
        self
    }

    /// Set the callback for one action
    pub fn on<F>(mut self, action: Action, callback: F) -> Self
    where
        F: Fn(Action) + Send + Sync + 'static,
    {
        self.slots[action.index()] = Some(Arc::new(callback));
        self
    }

    /// The callback an action is delivered to, falling back to the legacy slot
    pub fn resolve(&self, action: Action) -> Option<&Callback> {
        self.slots[action.index()].as_ref().or(self.legacy.as_ref())
    }

    pub fn has_handler(&self, action: Action) -> bool {
        self.resolve(action).is_some()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handled: Vec<Action> = Action::ALL
            .into_iter()
            .filter(|a| self.slots[a.index()].is_some())
            .collect();
        f.debug_struct("Callbacks")
            .field("legacy", &self.legacy.is_some())
            .field("handled", &handled)
            .finish()
    }
}

/// Hands fired actions from reader threads to the registered callbacks
#[derive(Debug, Clone)]
pub struct Dispatcher {
    callbacks: Arc<Callbacks>,
}

impl Dispatcher {
    pub fn new(callbacks: Callbacks) -> Self {
        Self {
            callbacks: Arc::new(callbacks),
        }
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    /// Invoke the callback for one action
    ///
    /// Returns `Ok(false)` if nothing is registered for it. A panic inside the
    /// callback is caught and returned as [`CallbackError`].
    pub fn dispatch(&self, action: Action) -> Result<bool, CallbackError> {
        let Some(callback) = self.callbacks.resolve(action) else {
            debug!(%action, "no callback registered, dropping action");
            return Ok(false);
        };

        panic::catch_unwind(AssertUnwindSafe(|| callback(action)))
            .map(|()| true)
            .map_err(|payload| CallbackError {
                action,
                message: panic_message(payload.as_ref()),
            })
    }

    /// Deliver each fired action in order, logging callback failures
    pub fn dispatch_all(&self, actions: &[Action]) {
        for &action in actions {
            if let Err(e) = self.dispatch(action) {
                error!(error = %e, "hotkey callback failed");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_per_action_slot_wins_over_legacy() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let legacy_seen = Arc::clone(&seen);
        let pause_seen = Arc::clone(&seen);

        let dispatcher = Dispatcher::new(
            Callbacks::legacy(move |a| legacy_seen.lock().unwrap().push(format!("legacy:{a}")))
                .on(Action::Pause, move |a| pause_seen.lock().unwrap().push(format!("slot:{a}"))),
        );

        assert_eq!(dispatcher.dispatch(Action::Pause), Ok(true));
        assert_eq!(dispatcher.dispatch(Action::Toggle), Ok(true));
        assert_eq!(*seen.lock().unwrap(), vec!["slot:pause", "legacy:toggle"]);
    }

    #[test]
    fn test_missing_callback_is_dropped() {
        let dispatcher = Dispatcher::new(Callbacks::new().on(Action::Start, |_| {}));
        assert_eq!(dispatcher.dispatch(Action::Stop), Ok(false));
        assert!(!dispatcher.callbacks().has_handler(Action::Stop));
        assert!(dispatcher.callbacks().has_handler(Action::Start));
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let dispatcher = Dispatcher::new(
            Callbacks::new()
                .on(Action::Toggle, |_| panic!("boom"))
                .on(Action::Stop, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        );

        let err = dispatcher.dispatch(Action::Toggle).unwrap_err();
        assert_eq!(err.action, Action::Toggle);
        assert_eq!(err.message, "boom");

        dispatcher.dispatch_all(&[Action::Toggle, Action::Stop]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
