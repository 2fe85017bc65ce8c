//! Configuration loading and management
//!
//! Shortcut bindings come from a JSON file that the host application owns;
//! this crate only reads it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::hotkey::{ShortcutConfig, ShortcutStrings};

/// Overrides the config file location
pub const CONFIG_ENV: &str = "CHORD_HOTKEYS_CONFIG";
/// Overrides the IPC socket path
pub const SOCKET_ENV: &str = "CHORD_HOTKEYS_SOCKET";
/// Pins a single input device
pub const DEVICE_ENV: &str = "CHORD_HOTKEYS_DEVICE";

/// Primary shortcut used when the config file does not name one
pub const DEFAULT_PRIMARY_SHORTCUT: &str = "F13";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// JSON file the shortcuts were read from
    pub config_file: PathBuf,

    /// Bindings and device selection for the shortcut service
    pub shortcuts: ShortcutConfig,
}

/// On-disk shape of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_primary")]
    pub primary_shortcut: String,

    /// Per-action chords; empty strings are unbound
    #[serde(default)]
    pub shortcuts: ActionShortcuts,

    /// Device path to pin, empty for auto-detect
    #[serde(default)]
    pub keyboard_device: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionShortcuts {
    #[serde(default)]
    pub toggle: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub stop: String,
    #[serde(default)]
    pub pause: String,
}

fn default_primary() -> String {
    DEFAULT_PRIMARY_SHORTCUT.to_string()
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            primary_shortcut: default_primary(),
            shortcuts: ActionShortcuts::default(),
            keyboard_device: String::new(),
        }
    }
}

impl From<FileConfig> for ShortcutConfig {
    fn from(file: FileConfig) -> Self {
        let device = file.keyboard_device.trim();
        Self {
            shortcuts: ShortcutStrings {
                primary: file.primary_shortcut,
                toggle: file.shortcuts.toggle,
                start: file.shortcuts.start,
                stop: file.shortcuts.stop,
                pause: file.shortcuts.pause,
            },
            device_path: (!device.is_empty()).then(|| PathBuf::from(device)),
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = PathBuf::from(std::env::var("HOME").context("HOME is not set")?);
        let config_file = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_config_file(&home));

        let mut config = Self::load_with(&home, &config_file);

        if let Some(socket) = std::env::var_os(SOCKET_ENV) {
            config.socket_path = PathBuf::from(socket);
        }
        if let Some(device) = std::env::var_os(DEVICE_ENV).filter(|d| !d.is_empty()) {
            config.shortcuts.device_path = Some(PathBuf::from(device));
        }

        Ok(config)
    }

    /// Build configuration for a home directory and config file, without
    /// consulting the environment
    pub fn load_with(home: &Path, config_file: &Path) -> Self {
        let data_dir = home.join(".local").join("share").join("chord-hotkeys");
        let socket_path = data_dir.join("daemon.sock");

        let file = read_file_config(config_file).unwrap_or_default();

        Self {
            socket_path,
            data_dir,
            config_file: config_file.to_path_buf(),
            shortcuts: file.into(),
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn default_config_file(home: &Path) -> PathBuf {
    home.join(".config").join("chord-hotkeys").join("config.json")
}

/// Read the config file; a missing or malformed file yields `None`
fn read_file_config(path: &Path) -> Option<FileConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                info!(path = %path.display(), "shortcut configuration loaded");
                Some(config)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to read config, using defaults");
            }
            None
        }
    }
}
