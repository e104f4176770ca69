//! Configuration loading and typed config structures for hahmon.
//!
//! Configuration lives in an optional `hahmon.yaml` file. Every section and
//! field has a default, so a missing file or a partial file is fine. A few
//! values can be overridden from the environment after the file is parsed:
//!
//! | Variable                 | Field                             |
//! |--------------------------|-----------------------------------|
//! | `HAHMON_DB`              | `database.path`                   |
//! | `NATS_URL`               | `monitor.nats_url`                |
//! | `HAHMON_SUBJECT`         | `monitor.subject`                 |
//! | `HAHMON_INACTIVITY_SECS` | `monitor.inactivity_timeout_secs` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use hahmon_db::SqliteConfig;
use serde::Deserialize;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "hahmon.yaml";

/// Environment variable naming an alternative configuration file.
pub const CONFIG_ENV: &str = "HAHMON_CONFIG";

/// Environment variable overriding `database.path`.
pub const DB_ENV: &str = "HAHMON_DB";

/// Environment variable overriding `monitor.nats_url`.
pub const NATS_URL_ENV: &str = "NATS_URL";

/// Environment variable overriding `monitor.subject`.
pub const SUBJECT_ENV: &str = "HAHMON_SUBJECT";

/// Environment variable overriding `monitor.inactivity_timeout_secs`.
pub const INACTIVITY_ENV: &str = "HAHMON_INACTIVITY_SECS";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override holds an unusable value.
    #[error("invalid value for {name}: {reason}")]
    Env {
        /// The variable name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HahmonConfig {
    /// Activity store location and pool settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Event ingestion settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Defaults for newly registered records.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HahmonConfig {
    /// Load configuration the way the binaries do.
    ///
    /// Reads the file named by `HAHMON_CONFIG` if set, otherwise
    /// `hahmon.yaml` if it exists, otherwise starts from defaults. Process
    /// environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or an
    /// override is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let lookup = |name: &str| std::env::var(name).ok();
        let mut config = match lookup(CONFIG_ENV) {
            Some(path) => Self::parse_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::parse_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, then apply process environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, and
    /// [`ConfigError::Env`] or [`ConfigError::Invalid`] for bad values.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides are
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Unset and empty variables leave the configured value alone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if `HAHMON_INACTIVITY_SECS` is not a
    /// positive integer.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(path) = get(DB_ENV) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(url) = get(NATS_URL_ENV) {
            self.monitor.nats_url = Some(url);
        }
        if let Some(subject) = get(SUBJECT_ENV) {
            self.monitor.subject = subject;
        }
        if let Some(raw) = get(INACTIVITY_ENV) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|e: std::num::ParseIntError| ConfigError::Env {
                    name: INACTIVITY_ENV,
                    reason: format!("{raw:?} is not a number of seconds: {e}"),
                })?;
            if secs == 0 {
                return Err(ConfigError::Env {
                    name: INACTIVITY_ENV,
                    reason: "must be at least one second".to_owned(),
                });
            }
            self.monitor.inactivity_timeout_secs = secs;
        }
        Ok(())
    }

    /// Check ranges serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_owned(),
            })
        };
        if self.database.max_connections == 0 {
            return invalid("database.max_connections", "must be at least 1");
        }
        if self.monitor.inactivity_timeout_secs == 0 {
            return invalid("monitor.inactivity_timeout_secs", "must be at least 1");
        }
        if self.monitor.subject.trim().is_empty() {
            return invalid("monitor.subject", "must not be empty");
        }
        if self.registry.default_timeout_secs == 0 {
            return invalid("registry.default_timeout_secs", "must be at least 1");
        }
        Ok(())
    }
}

/// Activity store settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the `SQLite` file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Maximum pooled connections. One means a single writer.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a statement waits on a locked database, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Store settings for [`hahmon_db::ActivityDb`].
    pub fn sqlite_config(&self) -> SqliteConfig {
        SqliteConfig::new(&self.path)
            .with_max_connections(self.max_connections)
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Event ingestion settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonitorConfig {
    /// NATS server URL. When unset the monitor reads `mosquitto_sub -v`
    /// lines from standard input.
    #[serde(default)]
    pub nats_url: Option<String>,

    /// Subject to subscribe to on NATS.
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Seconds without a message before the subscription is renewed.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,

    /// Seconds to wait before resubscribing after the stream ends.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl MonitorConfig {
    /// Inactivity timeout as a [`Duration`].
    pub const fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    /// Reconnect delay as a [`Duration`].
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            nats_url: None,
            subject: default_subject(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

/// Defaults applied when registering records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryConfig {
    /// Timeout given to records added without an explicit one.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit one JSON object per log line instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(hahmon_db::DEFAULT_PATH)
}

const fn default_max_connections() -> u32 {
    1
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_subject() -> String {
    "home_automation.>".to_owned()
}

const fn default_inactivity_timeout_secs() -> u64 {
    90
}

const fn default_reconnect_delay_secs() -> u64 {
    5
}

const fn default_timeout_secs() -> u32 {
    300
}

fn default_log_level() -> String {
    "info".to_owned()
}
