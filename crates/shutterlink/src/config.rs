//! Library configuration — TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# shutterlink configuration — changes made outside the library may be overwritten.\n\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Preferred camera serial number. Empty = auto-select first camera.
    #[serde(default)]
    pub device_serial: String,

    /// Cap on inbound payload bytes per exchange. Default: 65536 (one
    /// live-view frame fits comfortably).
    #[serde(default = "default_receive_capacity")]
    pub receive_capacity: usize,

    /// Bound on queued, not-yet-consumed device events. Default: 32.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Delay before the first reconnect attempt, in milliseconds.
    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,

    /// Ceiling on the reconnect backoff delay, in milliseconds.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Backoff multiplier applied after each failed reconnect attempt.
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,
}

fn default_receive_capacity() -> usize {
    crate::ptp::DEFAULT_RECEIVE_CAPACITY
}
fn default_event_queue_capacity() -> usize {
    crate::events::DEFAULT_EVENT_QUEUE_CAPACITY
}
fn default_reconnect_initial_delay_ms() -> u64 {
    1_000
}
fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}
fn default_reconnect_multiplier() -> f64 {
    2.0
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_serial: String::new(),
            receive_capacity: default_receive_capacity(),
            event_queue_capacity: default_event_queue_capacity(),
            reconnect_initial_delay_ms: default_reconnect_initial_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_multiplier: default_reconnect_multiplier(),
        }
    }
}

/// Validation problems [`Config::validate`] can report.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `event_queue_capacity` is zero; initialization would always fail.
    ZeroEventQueueCapacity,
    /// `receive_capacity` is zero; every data-bearing response would be cut.
    ZeroReceiveCapacity,
    /// `reconnect_multiplier` is not a finite value >= 1.0.
    InvalidReconnectMultiplier(f64),
    /// `reconnect_max_delay_ms` is below `reconnect_initial_delay_ms`.
    ReconnectDelayInverted { initial: u64, max: u64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroEventQueueCapacity => {
                write!(f, "event_queue_capacity must be non-zero")
            }
            ValidationError::ZeroReceiveCapacity => {
                write!(f, "receive_capacity must be non-zero")
            }
            ValidationError::InvalidReconnectMultiplier(m) => {
                write!(f, "reconnect_multiplier {m} must be a finite value >= 1.0")
            }
            ValidationError::ReconnectDelayInverted { initial, max } => {
                write!(
                    f,
                    "reconnect_max_delay_ms {max} is below reconnect_initial_delay_ms {initial}"
                )
            }
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("shutterlink"))
    }

    /// Full path to the config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from the default path, or defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Load config from the default path, returning parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Load config from an arbitrary path.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist and
    /// `(defaults, [warning])` if it exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Save config to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    /// Save config atomically (write to temp file, then rename), prepending
    /// a header comment.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Check the configuration for values that would break at runtime.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut problems = Vec::new();
        if self.event_queue_capacity == 0 {
            problems.push(ValidationError::ZeroEventQueueCapacity);
        }
        if self.receive_capacity == 0 {
            problems.push(ValidationError::ZeroReceiveCapacity);
        }
        if !self.reconnect_multiplier.is_finite() || self.reconnect_multiplier < 1.0 {
            problems.push(ValidationError::InvalidReconnectMultiplier(
                self.reconnect_multiplier,
            ));
        }
        if self.reconnect_max_delay_ms < self.reconnect_initial_delay_ms {
            problems.push(ValidationError::ReconnectDelayInverted {
                initial: self.reconnect_initial_delay_ms,
                max: self.reconnect_max_delay_ms,
            });
        }
        problems
    }
}
