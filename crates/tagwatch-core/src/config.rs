//! Application configuration management.
//!
//! Configuration is read from a TOML file layered with environment variables
//! prefixed `TAGWATCH__`, using `__` between sections and keys:
//!
//! ```text
//! TAGWATCH__SERVER__BIND_ADDRESS=127.0.0.1:8080
//! TAGWATCH__WINDOW__RECENT_SECS=300
//! TAGWATCH__TRUST__TRUSTED_DEVICES=5C:4A:1F:00:12:9B,AA:BB:CC:DD:EE:FF
//! ```
//!
//! Every section has defaults, so an empty or missing file is valid.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::RegistryOptions;
use crate::trust::AllowList;
use crate::window::DEFAULT_RECENT_WINDOW_SECS;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TAGWATCH";

/// Longest accepted recent window (one year).
const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    NotFound(String),

    /// The configuration file could not be written.
    #[error("failed to write {path}: {source}")]
    WriteError {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The layered sources could not be merged or deserialized.
    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// One field holds an invalid value.
    #[error("invalid {field}: {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),

    /// No platform directory could be determined.
    #[error("cannot determine the {0} directory")]
    NoDirectory(&'static str),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_address: String,

    /// Production logging (JSON files plus compact stdout).
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            production: false,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for data files. Platform default when unset.
    pub data_dir: Option<PathBuf>,

    /// Keep everything in memory and write nothing to disk.
    pub in_memory: bool,
}

/// Recent window settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Seconds a device stays "recent" after it was last seen.
    pub recent_secs: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            recent_secs: DEFAULT_RECENT_WINDOW_SECS,
        }
    }
}

/// Registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Seed event counts from persisted events when a device reappears.
    pub recover_event_counts: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            recover_event_counts: true,
        }
    }
}

/// Trust allow-list settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Device ids that belong to the user.
    pub trusted_devices: Vec<String>,
}

/// Scan settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Stop scans automatically after this many seconds.
    pub default_duration_secs: Option<u64>,

    /// How often the radio backend flushes a batch, in milliseconds.
    pub batch_interval_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: None,
            batch_interval_ms: 1_000,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagwatchConfig {
    /// HTTP server.
    pub server: ServerConfig,
    /// Persistence.
    pub storage: StorageConfig,
    /// Recent window.
    pub window: WindowConfig,
    /// Registry.
    pub registry: RegistryConfig,
    /// Trust allow-list.
    pub trust: TrustConfig,
    /// Scanning.
    pub scan: ScanConfig,
}

impl TagwatchConfig {
    /// Loads configuration from `path`, which must exist, layered with
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or fails
    /// validation.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::build(path, true)
    }

    /// Like [`TagwatchConfig::load`], but a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be parsed or the result
    /// fails validation.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::build(path.as_ref(), false)
    }

    fn build(path: &Path, required: bool) -> ConfigResult<Self> {
        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(required),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("trust.trusted_devices"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration to `path` as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Checks every field and reports all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single problem and
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: String| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message,
            });
        };

        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            invalid(
                "server.bind_address",
                format!("'{}' is not a socket address", self.server.bind_address),
            );
        }
        if self.window.recent_secs == 0 || self.window.recent_secs > MAX_WINDOW_SECS {
            invalid(
                "window.recent_secs",
                format!("must be between 1 and {MAX_WINDOW_SECS}"),
            );
        }
        if self.scan.batch_interval_ms == 0 {
            invalid("scan.batch_interval_ms", "must be greater than 0".to_string());
        }
        if self.scan.default_duration_secs == Some(0) {
            invalid(
                "scan.default_duration_secs",
                "must be greater than 0 when set".to_string(),
            );
        }
        for (index, id) in self.trust.trusted_devices.iter().enumerate() {
            if id.trim().is_empty() {
                invalid(
                    format!("trust.trusted_devices[{index}]").as_str(),
                    "device id cannot be empty".to_string(),
                );
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// The recent window as a duration.
    #[must_use]
    pub fn recent_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.window.recent_secs).unwrap_or(i64::MAX))
    }

    /// The trust allow-list.
    #[must_use]
    pub fn allow_list(&self) -> AllowList {
        self.trust.trusted_devices.iter().cloned().collect()
    }

    /// Registry options.
    #[must_use]
    pub const fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            recover_event_counts: self.registry.recover_event_counts,
        }
    }

    /// The configured data directory, or the platform default.
    ///
    /// # Errors
    ///
    /// Returns an error if no platform directory can be determined.
    pub fn data_dir(&self) -> ConfigResult<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }
}

/// Default configuration file location.
///
/// On Linux: `/etc/tagwatch/config.toml`.
/// Elsewhere: the platform config directory.
///
/// # Errors
///
/// Returns an error if no platform directory can be determined.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/etc/tagwatch/config.toml"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let dirs = directories::ProjectDirs::from("", "", "tagwatch")
            .ok_or(ConfigError::NoDirectory("config"))?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Default data directory.
///
/// On Linux: `/var/lib/tagwatch`.
/// Elsewhere: the platform data directory.
///
/// # Errors
///
/// Returns an error if no platform directory can be determined.
pub fn default_data_dir() -> ConfigResult<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/var/lib/tagwatch"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let dirs = directories::ProjectDirs::from("", "", "tagwatch")
            .ok_or(ConfigError::NoDirectory("data"))?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::TrustList;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = TagwatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window.recent_secs, 200);
        assert_eq!(config.recent_window(), chrono::Duration::seconds(200));
        assert!(config.registry.recover_event_counts);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = TagwatchConfig::default();
        config.window.recent_secs = 120;
        config.trust.trusted_devices = vec!["A".to_string(), "B".to_string()];
        config.storage.in_memory = true;
        config.save(&path).unwrap();

        let loaded = TagwatchConfig::load(&path).unwrap();
        assert_eq!(loaded.window.recent_secs, 120);
        assert!(loaded.storage.in_memory);
        assert!(loaded.allow_list().is_trusted("B"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scan]\ndefault_duration_secs = 30\n").unwrap();

        let loaded = TagwatchConfig::load(&path).unwrap();
        assert_eq!(loaded.scan.default_duration_secs, Some(30));
        assert_eq!(loaded.scan.batch_interval_ms, 1_000);
        assert_eq!(loaded.server, ServerConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            TagwatchConfig::load(&path),
            Err(ConfigError::NotFound(_))
        ));
        assert!(TagwatchConfig::load_or_default(&path).is_ok());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[window\nrecent_secs = ").unwrap();
        assert!(matches!(
            TagwatchConfig::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_single_validation_error() {
        let mut config = TagwatchConfig::default();
        config.window.recent_secs = 0;
        match config.validate() {
            Err(ConfigError::ValidationError { field, .. }) => {
                assert_eq!(field, "window.recent_secs");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = TagwatchConfig::default();
        config.server.bind_address = "not-an-address".to_string();
        config.scan.batch_interval_ms = 0;
        config.scan.default_duration_secs = Some(0);
        config.trust.trusted_devices = vec!["  ".to_string()];

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 4),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_registry_options_follow_config() {
        let mut config = TagwatchConfig::default();
        config.registry.recover_event_counts = false;
        assert!(!config.registry_options().recover_event_counts);
    }

    #[test]
    fn test_explicit_data_dir_wins() {
        let mut config = TagwatchConfig::default();
        config.storage.data_dir = Some(PathBuf::from("/tmp/tagwatch-test"));
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/tagwatch-test"));
    }
}
