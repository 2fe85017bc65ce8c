//! Keyboard discovery and raw event reading via evdev
//!
//! Devices are read straight from `/dev/input/event*`, which works on X11,
//! Wayland and the console alike. The user needs read access to those nodes,
//! usually through membership in the `input` group.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use evdev::{Device, EventType, InputEventKind, Key};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::keys;

/// Directory the kernel exposes input event nodes under
pub const INPUT_DIR: &str = "/dev/input";

/// How long one `poll` may block before the cancel flag is checked again
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// evdev key event values
const KEY_RELEASE: i32 = 0;
const KEY_PRESS: i32 = 1;
const KEY_REPEAT: i32 = 2;

/// A keyboard-capable input device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardInfo {
    /// Name plus path, for presenting in a device picker
    pub display_name: String,
    pub path: PathBuf,
}

/// A normalized key press or release read from one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    /// Autorepeat is reported as pressed
    pub pressed: bool,
    /// Kernel autorepeat rather than a physical key-down
    pub repeat: bool,
    pub source: Arc<Path>,
}

/// Errors opening a device node
#[derive(Debug, thiserror::Error)]
pub enum DeviceOpenError {
    #[error("input device {} does not exist", .path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied opening {} - add your user to the 'input' group", .path.display())]
    PermissionDenied { path: PathBuf },

    #[error("failed to open input device {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl DeviceOpenError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => DeviceOpenError::NotFound { path },
            io::ErrorKind::PermissionDenied => DeviceOpenError::PermissionDenied { path },
            _ => DeviceOpenError::Io { path, source },
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, DeviceOpenError::PermissionDenied { .. })
    }
}

/// Errors that end a reader's loop
#[derive(Debug, thiserror::Error)]
pub enum DeviceReadError {
    #[error("input device {} was disconnected", .path.display())]
    Disconnected { path: PathBuf },

    #[error("failed reading input device {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl DeviceReadError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        if source.raw_os_error() == Some(libc::ENODEV) {
            DeviceReadError::Disconnected { path }
        } else {
            DeviceReadError::Io { path, source }
        }
    }
}

/// List keyboard-capable devices under [`INPUT_DIR`]
pub fn list_keyboards() -> Vec<KeyboardInfo> {
    list_keyboards_in(Path::new(INPUT_DIR))
}

/// List keyboard-capable event devices in `dir`, ordered by event number
///
/// Devices that cannot be opened for lack of permission are skipped with a
/// warning; nothing here is fatal.
pub fn list_keyboards_in(dir: &Path) -> Vec<KeyboardInfo> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read input device directory");
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| event_index(path).is_some())
        .collect();
    paths.sort_by_key(|path| (event_index(path), path.clone()));

    let mut keyboards = Vec::new();
    for path in paths {
        let device = match Device::open(&path) {
            Ok(device) => device,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                warn!(path = %path.display(), "permission denied probing input device, skipping");
                continue;
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot open input device, skipping");
                continue;
            }
        };

        if !is_keyboard(&device) {
            continue;
        }

        let display_name = format!("{} ({})", device_name(&device, &path), path.display());
        debug!(%display_name, "found keyboard");
        keyboards.push(KeyboardInfo { display_name, path });
    }

    keyboards
}

/// Number of an `eventN` node, or `None` for anything else
fn event_index(path: &Path) -> Option<u32> {
    path.file_name()?
        .to_str()?
        .strip_prefix("event")?
        .parse()
        .ok()
}

/// A device qualifies if it can emit a bindable key or letter keys.
///
/// Mice, touchpads and other pointer-only devices advertise buttons but no
/// keyboard keys and fall out here.
fn is_keyboard(device: &Device) -> bool {
    if !device.supported_events().contains(EventType::KEY) {
        return false;
    }
    let Some(supported) = device.supported_keys() else {
        return false;
    };
    supported.contains(Key::KEY_A)
        || (1..=20)
            .filter_map(keys::function_key)
            .any(|key| supported.contains(key))
}

fn device_name(device: &Device, path: &Path) -> String {
    match device.name() {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("Unknown device ({file})")
        }
    }
}

/// An open input device, read by exactly one thread
pub struct DeviceReader {
    path: Arc<Path>,
    name: String,
    device: Device,
}

impl std::fmt::Debug for DeviceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceReader")
            .field("path", &self.path)
            .field("name", &self.name)
            .finish()
    }
}

impl DeviceReader {
    /// Open a device node for reading
    pub fn open(path: &Path) -> Result<Self, DeviceOpenError> {
        let device = Device::open(path).map_err(|e| DeviceOpenError::from_io(path, e))?;
        let name = device_name(&device, path);
        Ok(Self {
            path: Arc::from(path),
            name,
            device,
        })
    }

}

/// A source of key events that one reader thread drains until cancelled
pub trait KeySource: Send + 'static {
    fn path(&self) -> &Path;

    fn name(&self) -> &str;

    /// Deliver events to `on_event` until `cancel` is set or the source fails
    fn run(
        &mut self,
        cancel: &AtomicBool,
        on_event: &mut dyn FnMut(KeyEvent),
    ) -> Result<(), DeviceReadError>;
}

impl KeySource for DeviceReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Read key events until `cancel` is set or the device fails
    ///
    /// `on_event` runs synchronously on the calling thread, once per key
    /// press, repeat or release, in the order the kernel produced them.
    fn run(
        &mut self,
        cancel: &AtomicBool,
        on_event: &mut dyn FnMut(KeyEvent),
    ) -> Result<(), DeviceReadError> {
        let fd = self.device.as_raw_fd();
        let path = Arc::clone(&self.path);
        let device = &mut self.device;

        poll_until_cancelled(fd, &path, cancel, || {
            let events = match device.fetch_events() {
                Ok(events) => events,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(DeviceReadError::from_io(&path, e)),
            };

            for event in events {
                let InputEventKind::Key(key) = event.kind() else {
                    continue;
                };
                let (pressed, repeat) = match event.value() {
                    KEY_PRESS => (true, false),
                    KEY_REPEAT => (true, true),
                    KEY_RELEASE => (false, false),
                    _ => continue,
                };
                on_event(KeyEvent {
                    key,
                    pressed,
                    repeat,
                    source: Arc::clone(&path),
                });
            }
            Ok(())
        })
    }
}

/// Call `on_ready` each time `fd` becomes readable, until `cancel` is set
///
/// `cancel` is checked at least every [`POLL_INTERVAL`]. A hangup or error on
/// the descriptor ends the loop with [`DeviceReadError::Disconnected`].
pub(crate) fn poll_until_cancelled<F>(
    fd: RawFd,
    path: &Path,
    cancel: &AtomicBool,
    mut on_ready: F,
) -> Result<(), DeviceReadError>
where
    F: FnMut() -> Result<(), DeviceReadError>,
{
    while !cancel.load(Ordering::SeqCst) {
        if wait_readable(fd, path, POLL_INTERVAL)? {
            on_ready()?;
        }
    }
    Ok(())
}

/// Block until `fd` has data or `timeout` elapses
fn wait_readable(fd: RawFd, path: &Path, timeout: Duration) -> Result<bool, DeviceReadError> {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

    // SAFETY: `fds` is a single valid pollfd that outlives the call; the
    // caller keeps the descriptor open for the duration of the loop.
    let ready = unsafe { libc::poll(&mut fds, 1, timeout_ms) };

    if ready < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(DeviceReadError::from_io(path, err));
    }
    if ready == 0 {
        return Ok(false);
    }
    if fds.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        return Err(DeviceReadError::Disconnected {
            path: path.to_path_buf(),
        });
    }
    Ok(fds.revents & libc::POLLIN != 0)
}
