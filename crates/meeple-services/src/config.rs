//! # Service Configuration
//!
//! Rates, earn defaults, database location and sweeper cadence.
//!
//! ## Configuration Sources (Priority Order)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Configuration Loading                                  │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MEEPLE_DB_PATH=/var/lib/meeple/meeple.db                            │
//! │     MEEPLE_SWEEP_ENABLED=true                                           │
//! │     MEEPLE_SWEEP_INTERVAL_SECS=3600                                     │
//! │     MEEPLE_REGULAR_EARN_RATE=50                                         │
//! │     MEEPLE_MEMBER_EARN_RATE=40                                          │
//! │     MEEPLE_REGULAR_HOURLY_RATE=50000                                    │
//! │                                                                         │
//! │  2. Config File (meeple.toml)                                          │
//! │     ~/.config/meeple-pos/meeple.toml (Linux)                            │
//! │     ~/Library/Application Support/com.meeple.pos/meeple.toml (macOS)    │
//! │     %APPDATA%\meeple\pos\config\meeple.toml (Windows)                   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use meeple_core::{PointsSettings, RateTable, ValidationError, DEFAULT_REGULAR_HOURLY_RATE};
use meeple_db::DbConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

// =============================================================================
// Errors
// =============================================================================

/// Failure to load or validate configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

/// Where the database lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "meeple", "pos")
        .map(|dirs| dirs.data_dir().join("meeple.db"))
        .unwrap_or_else(|| PathBuf::from("./meeple.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    /// Pool configuration for these settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.path).max_connections(self.max_connections)
    }
}

/// Checkout pricing for customers without a membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSettings {
    /// Minor units per hour.
    #[serde(default = "default_regular_hourly_rate")]
    pub regular_hourly_rate_minor: i64,
}

fn default_regular_hourly_rate() -> i64 {
    DEFAULT_REGULAR_HOURLY_RATE
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        CheckoutSettings {
            regular_hourly_rate_minor: default_regular_hourly_rate(),
        }
    }
}

/// Values written to the settings row the first time it is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsDefaults {
    #[serde(default = "default_regular_earn_rate")]
    pub regular_earn_rate: i64,

    #[serde(default = "default_member_earn_rate")]
    pub member_earn_rate: i64,

    #[serde(default = "default_points_per_yen")]
    pub points_per_yen: i64,
}

fn default_regular_earn_rate() -> i64 {
    50
}
fn default_member_earn_rate() -> i64 {
    40
}
fn default_points_per_yen() -> i64 {
    1
}

impl Default for PointsDefaults {
    fn default() -> Self {
        PointsDefaults {
            regular_earn_rate: default_regular_earn_rate(),
            member_earn_rate: default_member_earn_rate(),
            points_per_yen: default_points_per_yen(),
        }
    }
}

/// Expiry sweeper cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    86_400 // daily
}

impl Default for SweeperSettings {
    fn default() -> Self {
        SweeperSettings {
            enabled: true,
            interval_secs: default_sweep_interval(),
        }
    }
}

impl SweeperSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete service configuration.
///
/// ## Example Config File
/// ```toml
/// [database]
/// path = "/var/lib/meeple/meeple.db"
/// max_connections = 5
///
/// [billing]
/// grace_minutes = 5
/// hourly_rate_minor = 50000
/// discounted_hourly_rate_minor = 20000
/// three_hour_minutes = 180
/// day_cap_minutes = 300
/// day_cap_minor = 180000
///
/// [checkout]
/// regular_hourly_rate_minor = 50000
///
/// [points]
/// regular_earn_rate = 50
/// member_earn_rate = 40
/// points_per_yen = 1
///
/// [sweeper]
/// enabled = true
/// interval_secs = 86400
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Seat-time rate table.
    #[serde(default)]
    pub billing: RateTable,

    #[serde(default)]
    pub checkout: CheckoutSettings,

    #[serde(default)]
    pub points: PointsDefaults,

    #[serde(default)]
    pub sweeper: SweeperSettings,
}

impl ServiceConfig {
    /// Loads configuration from defaults, file, then environment.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (meeple.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document and validates it; no environment overrides.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        let config: ServiceConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the services cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        self.billing.validate()?;

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.checkout.regular_hourly_rate_minor < 0 {
            return Err(ConfigError::Invalid(
                "checkout.regular_hourly_rate_minor must not be negative".into(),
            ));
        }

        for (field, value) in [
            ("points.regular_earn_rate", self.points.regular_earn_rate),
            ("points.member_earn_rate", self.points.member_earn_rate),
            ("points.points_per_yen", self.points.points_per_yen),
        ] {
            if value <= 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", field)));
            }
        }

        if self.sweeper.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweeper.interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `MEEPLE_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("MEEPLE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(value) = lookup("MEEPLE_SWEEP_ENABLED") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.sweeper.enabled = true,
                "0" | "false" | "no" => self.sweeper.enabled = false,
                _ => warn!(value = %value, "Unknown MEEPLE_SWEEP_ENABLED value"),
            }
        }

        override_number(&lookup, "MEEPLE_SWEEP_INTERVAL_SECS", &mut self.sweeper.interval_secs);
        override_number(&lookup, "MEEPLE_REGULAR_EARN_RATE", &mut self.points.regular_earn_rate);
        override_number(&lookup, "MEEPLE_MEMBER_EARN_RATE", &mut self.points.member_earn_rate);
        override_number(
            &lookup,
            "MEEPLE_REGULAR_HOURLY_RATE",
            &mut self.checkout.regular_hourly_rate_minor,
        );
    }

    /// The settings row to create when none exists yet.
    pub fn points_defaults(&self, now: DateTime<Utc>) -> PointsSettings {
        PointsSettings::new(
            self.points.regular_earn_rate,
            self.points.member_earn_rate,
            self.points.points_per_yen,
            now,
        )
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "meeple", "pos")
            .map(|dirs| dirs.config_dir().join("meeple.toml"))
    }
}

fn override_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => {
                debug!(key, value = %raw, "Overriding from environment");
                *target = value;
            }
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable environment override"),
        }
    }
}
