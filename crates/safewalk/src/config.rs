//! Configuration management for safewalk.
//!
//! Configuration is layered with figment: built-in defaults, then an
//! optional TOML file, then `SAFEWALK_` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::alerts::{MONITORING_RADIUS_METERS, SAFE_ZONE_RADIUS_METERS};
use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "safewalk";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "safewalk.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SAFEWALK_`, sections separated
///    by `__`, e.g. `SAFEWALK_DISPATCH__COUNTRY_PREFIX`)
/// 2. TOML config file at `~/.config/safewalk/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local user identity.
    pub user: UserConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Location tracking configuration.
    pub tracking: TrackingConfig,
    /// Alert radius configuration.
    pub alerts: AlertsConfig,
    /// Emergency dispatch configuration.
    pub dispatch: DispatchConfig,
}

/// The user the CLI acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// User id used as the document key.
    pub id: String,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/safewalk/safewalk.db`
    pub database_path: Option<PathBuf>,
}

/// Location tracking configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Capacity of the source-to-tracker channel.
    pub channel_capacity: usize,
    /// Resume a suspended subscription when returning to the foreground.
    pub auto_resume_on_foreground: bool,
    /// Persist every sample as the user's last-known location.
    pub persist_locations: bool,
}

/// Alert and geofence radii.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Radius around the user within which alerts are shown.
    pub monitoring_radius_meters: f64,
    /// Safe-zone radius shown while on a trip.
    pub safe_zone_radius_meters: f64,
}

/// Emergency dispatch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-attempt gateway timeout in milliseconds.
    pub attempt_timeout_ms: u64,
    /// Country prefix added to local numbers.
    pub country_prefix: String,
    /// Map URL prefix; the coordinate is appended as `lat,lng`.
    pub map_link_base: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: "local".to_string(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            auto_resume_on_foreground: true,
            persist_locations: true,
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            monitoring_radius_meters: MONITORING_RADIUS_METERS,
            safe_zone_radius_meters: SAFE_ZONE_RADIUS_METERS,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 10_000,
            country_prefix: "+91".to_string(),
            map_link_base: "https://www.google.com/maps?q=".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Get the per-attempt timeout as a Duration.
    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation
    /// fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SAFEWALK_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.user.id.trim().is_empty() {
            return Err(invalid("user.id must not be empty"));
        }

        for (name, radius) in [
            ("monitoring_radius_meters", self.alerts.monitoring_radius_meters),
            ("safe_zone_radius_meters", self.alerts.safe_zone_radius_meters),
        ] {
            if !(radius.is_finite() && radius > 0.0) {
                return Err(invalid(format!("{name} must be positive, got {radius}")));
            }
        }

        if self.tracking.channel_capacity == 0 {
            return Err(invalid("channel_capacity must be greater than 0"));
        }

        if self.dispatch.attempt_timeout_ms == 0 {
            return Err(invalid("attempt_timeout_ms must be greater than 0"));
        }

        let prefix = &self.dispatch.country_prefix;
        let valid_prefix = prefix
            .strip_prefix('+')
            .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()));
        if !valid_prefix {
            return Err(invalid(format!(
                "country_prefix must be '+' followed by digits, got {prefix:?}"
            )));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
