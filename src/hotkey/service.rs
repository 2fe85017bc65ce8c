//! Shortcut service: owns the reader threads, the active bindings and the
//! dispatcher, and exposes the start/stop lifecycle and runtime rebinding.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::bindings::{
    Action, BindingTable, ConflictWarning, SharedBindings, ShortcutStrings, UnknownAction,
};
use super::chord::{ChordParseError, ChordSpec};
use super::device::{self, DeviceOpenError, DeviceReader, KeyEvent, KeySource, KeyboardInfo};
use super::dispatch::{Callbacks, Dispatcher};
use super::recognizer::ChordRecognizer;

/// Upper bound on how long `stop()` waits for reader threads
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors surfaced synchronously by the shortcut service
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("invalid shortcut for '{action}': {source}")]
    InvalidChord {
        action: Action,
        #[source]
        source: ChordParseError,
    },

    #[error(transparent)]
    UnknownAction(#[from] UnknownAction),

    #[error("failed to spawn reader thread for {}: {source}", .path.display())]
    ThreadSpawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Construction parameters for [`ShortcutService`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutConfig {
    /// Chord string per action; empty means unbound
    pub shortcuts: ShortcutStrings,
    /// Read only this device instead of every keyboard
    pub device_path: Option<PathBuf>,
}

/// Lifecycle state of the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Stopped => write!(f, "Stopped"),
            ServiceState::Running => write!(f, "Running"),
        }
    }
}

/// Outcome of `start()`
#[derive(Debug, Default)]
pub struct StartReport {
    /// Readers running after the call
    pub active_readers: usize,
    /// Devices that could not be opened
    pub skipped: Vec<DeviceOpenError>,
    /// Devices that opened but got no reader thread
    pub failed: Vec<HotkeyError>,
    /// The service was already running and nothing was done
    pub already_running: bool,
}

/// Liveness of one reader thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderStatus {
    pub path: PathBuf,
    pub name: String,
    /// False once the reader has exited, e.g. after the device was unplugged
    pub alive: bool,
}

/// Turns one device's key events into dispatched actions
pub struct ReaderPipeline {
    recognizer: ChordRecognizer,
    dispatcher: Dispatcher,
}

impl ReaderPipeline {
    pub fn new(bindings: SharedBindings, dispatcher: Dispatcher) -> Self {
        Self {
            recognizer: ChordRecognizer::new(bindings),
            dispatcher,
        }
    }

    /// Process one event; returns the actions it fired
    pub fn handle(&mut self, event: &KeyEvent) -> Vec<Action> {
        if event.repeat {
            self.recognizer.process_repeat(event.key);
            return Vec::new();
        }
        let fired = self.recognizer.process(event.key, event.pressed);
        if !fired.is_empty() {
            debug!(source = %event.source.display(), ?fired, "shortcut fired");
            self.dispatcher.dispatch_all(&fired);
        }
        fired
    }
}

struct ReaderHandle {
    path: PathBuf,
    name: String,
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    state: ServiceState,
    readers: Vec<ReaderHandle>,
}

/// Global shortcut service
///
/// Reads every keyboard (or one pinned device) on its own thread and invokes
/// the registered callbacks when a bound chord is pressed. Dropping the
/// service stops it.
pub struct ShortcutService {
    device_path: Option<PathBuf>,
    bindings: SharedBindings,
    dispatcher: Dispatcher,
    inner: Mutex<Inner>,
}

impl ShortcutService {
    /// Create a stopped service; fails if any configured chord is malformed
    pub fn new(config: ShortcutConfig, callbacks: Callbacks) -> Result<Self, HotkeyError> {
        let table = BindingTable::from_strings(&config.shortcuts)
            .map_err(|(action, source)| HotkeyError::InvalidChord { action, source })?;

        for conflict in table.validate() {
            warn!(%conflict, "shortcut conflict, both actions will fire");
        }
        for binding in table.iter() {
            if let Some(chord) = binding.chord {
                if !callbacks.has_handler(binding.action) {
                    warn!(action = %binding.action, %chord, "shortcut is bound but has no callback");
                }
            }
        }

        let device_path = config
            .device_path
            .filter(|path| !path.as_os_str().is_empty());

        Ok(Self {
            device_path,
            bindings: SharedBindings::new(table),
            dispatcher: Dispatcher::new(callbacks),
            inner: Mutex::new(Inner::default()),
        })
    }

    pub fn state(&self) -> ServiceState {
        self.lock().state
    }

    /// The pinned device, if any
    pub fn device_path(&self) -> Option<&Path> {
        self.device_path.as_deref()
    }

    /// The binding table currently in effect
    pub fn bindings(&self) -> Arc<BindingTable> {
        self.bindings.snapshot()
    }

    /// A pipeline wired to this service's bindings and callbacks
    pub fn pipeline(&self) -> ReaderPipeline {
        ReaderPipeline::new(self.bindings.clone(), self.dispatcher.clone())
    }

    /// Open the devices and spawn one reader thread per device
    ///
    /// Never fails: devices that cannot be opened are skipped, and with none
    /// at all the service still runs, idle.
    pub fn start(&self) -> StartReport {
        let mut inner = self.lock();
        if inner.state == ServiceState::Running {
            debug!("shortcut service already running");
            return StartReport {
                active_readers: inner.readers.len(),
                already_running: true,
                ..Default::default()
            };
        }

        let paths: Vec<PathBuf> = match &self.device_path {
            Some(path) => vec![path.clone()],
            None => device::list_keyboards()
                .into_iter()
                .map(|keyboard| keyboard.path)
                .collect(),
        };

        let mut report = StartReport::default();
        for path in paths {
            let reader = match DeviceReader::open(&path) {
                Ok(reader) => reader,
                Err(e) => {
                    warn!(error = %e, "skipping input device");
                    report.skipped.push(e);
                    continue;
                }
            };
            match self.spawn_reader(reader) {
                Ok(handle) => inner.readers.push(handle),
                Err(e) => {
                    error!(error = %e, "reader not started");
                    report.failed.push(e);
                }
            }
        }

        report.active_readers = inner.readers.len();
        inner.state = ServiceState::Running;

        if report.active_readers == 0 {
            let denied = report.skipped.iter().any(DeviceOpenError::is_permission_denied);
            warn!(
                permission_denied = denied,
                "no keyboard devices could be opened, global shortcuts are unavailable"
            );
        } else {
            info!(readers = report.active_readers, "shortcut service started");
        }

        report
    }

    /// Cancel all readers and wait for them, at most [`STOP_TIMEOUT`]
    pub fn stop(&self) {
        let readers = {
            let mut inner = self.lock();
            if inner.state == ServiceState::Stopped {
                return;
            }
            inner.state = ServiceState::Stopped;
            std::mem::take(&mut inner.readers)
        };

        for reader in &readers {
            reader.cancel.store(true, Ordering::SeqCst);
        }

        let deadline = Instant::now() + STOP_TIMEOUT;
        while Instant::now() < deadline && !readers.iter().all(|r| r.thread.is_finished()) {
            thread::sleep(Duration::from_millis(10));
        }

        for reader in readers {
            if reader.thread.is_finished() {
                if reader.thread.join().is_err() {
                    warn!(path = %reader.path.display(), "reader thread panicked");
                }
            } else {
                warn!(path = %reader.path.display(), "reader did not stop in time, detaching");
            }
        }

        info!("shortcut service stopped");
    }

    /// Liveness of each reader started by the last `start()`
    pub fn reader_status(&self) -> Vec<ReaderStatus> {
        self.lock()
            .readers
            .iter()
            .map(|reader| ReaderStatus {
                path: reader.path.clone(),
                name: reader.name.clone(),
                alive: !reader.thread.is_finished(),
            })
            .collect()
    }

    /// Number of readers still running
    pub fn active_readers(&self) -> usize {
        self.reader_status().iter().filter(|r| r.alive).count()
    }

    /// Bind one action to a chord string, or unbind it with an empty string
    ///
    /// Takes effect for the next key event on every reader. On a parse error
    /// the previous binding stays active. Returns the conflicts in the new table.
    pub fn rebind(&self, action: Action, chord: &str) -> Result<Vec<ConflictWarning>, HotkeyError> {
        let chord = ChordSpec::parse_optional(chord)
            .map_err(|source| HotkeyError::InvalidChord { action, source })?;

        let table = self.bindings.update(action, chord);

        match chord {
            Some(chord) => {
                info!(%action, %chord, "shortcut rebound");
                if !self.dispatcher.callbacks().has_handler(action) {
                    warn!(%action, "shortcut is bound but has no callback");
                }
            }
            None => info!(%action, "shortcut cleared"),
        }

        let conflicts = table.validate();
        for conflict in &conflicts {
            warn!(%conflict, "shortcut conflict, both actions will fire");
        }
        Ok(conflicts)
    }

    /// Replace every binding at once
    pub fn set_bindings(&self, shortcuts: &ShortcutStrings) -> Result<Vec<ConflictWarning>, HotkeyError> {
        let table = BindingTable::from_strings(shortcuts)
            .map_err(|(action, source)| HotkeyError::InvalidChord { action, source })?;
        let conflicts = table.validate();
        self.bindings.replace(table);
        info!("shortcut bindings replaced");
        Ok(conflicts)
    }

    /// Rebind the legacy primary shortcut
    pub fn update_shortcut(&self, chord: &str) -> Result<Vec<ConflictWarning>, HotkeyError> {
        self.rebind(Action::Primary, chord)
    }

    /// Rebind an action given by name
    pub fn update_shortcut_by_name(
        &self,
        action: &str,
        chord: &str,
    ) -> Result<Vec<ConflictWarning>, HotkeyError> {
        self.rebind(action.parse()?, chord)
    }

    /// Keyboards that could be pinned with [`ShortcutConfig::device_path`]
    pub fn list_available_keyboards(&self) -> Vec<KeyboardInfo> {
        device::list_keyboards()
    }

    fn spawn_reader<S: KeySource>(&self, mut reader: S) -> Result<ReaderHandle, HotkeyError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let path = reader.path().to_path_buf();
        let name = reader.name().to_string();
        let thread_name = format!(
            "hotkey-{}",
            path.file_name().map(|f| f.to_string_lossy()).unwrap_or_default()
        );

        let mut pipeline = self.pipeline();
        let thread_cancel = Arc::clone(&cancel);

        let thread = thread::Builder::new().name(thread_name).spawn(move || {
            info!(path = %reader.path().display(), name = reader.name(), "reader started");

            let result = reader.run(&thread_cancel, &mut |event| {
                pipeline.handle(&event);
            });
            match result {
                Ok(()) => debug!(path = %reader.path().display(), "reader stopped"),
                Err(e) => warn!(error = %e, "reader exited, other devices are unaffected"),
            }
        });
        let thread = thread.map_err(|source| HotkeyError::ThreadSpawn {
            path: path.clone(),
            source,
        })?;

        Ok(ReaderHandle {
            path,
            name,
            cancel,
            thread,
        })
    }

    /// Run an already-open source under this service, as `start()` does
    #[cfg(test)]
    fn attach_reader<S: KeySource>(&self, reader: S) -> Result<(), HotkeyError> {
        let handle = self.spawn_reader(reader)?;
        self.lock().readers.push(handle);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ShortcutService {
    fn drop(&mut self) {
        self.stop();
    }
}
