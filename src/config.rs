//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. `config/hp4280a.toml` (base configuration)
//! 2. Environment variables prefixed with `HP4280A_`, nested keys split on `__`
//!    (e.g. `HP4280A_INSTRUMENT__RESOURCE=GPIB0::17::INSTR`)
//!
//! Every field has a default, so an absent file yields a working setup that talks
//! to `GPIB1::17::INSTR` and stores data next to the binary.
//!
//! # Example
//! ```no_run
//! use hp4280a_lab::config::LabConfig;
//!
//! let config = LabConfig::load()?;
//! println!("Instrument: {}", config.instrument.resource);
//! # Ok::<(), hp4280a_lab::error::LabError>(())
//! ```

use crate::error::{AppResult, LabError};
use crate::validation;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/hp4280a.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// GPIB/VISA connection and sweep timing
    pub instrument: InstrumentConfig,
    /// CSV and database locations
    pub storage: StorageConfig,
    /// HTTP API settings
    pub server: ServerConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "HP 4280A Controller".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Instrument connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// VISA resource string of the meter
    pub resource: String,
    /// Use the simulated connection for every user instead of real hardware
    pub simulated: bool,
    /// I/O timeout for ordinary commands
    pub timeout_ms: u64,
    /// Timeout while waiting for a full C-V sweep block
    pub sweep_timeout_ms: u64,
    /// Timeout while waiting for each pulse of a pulse sweep
    pub pulse_timeout_ms: u64,
    /// Pause between writing a query and reading its answer
    pub query_delay_ms: u64,
    /// Pause after each numeric parameter write
    pub write_delay_ms: u64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            resource: "GPIB1::17::INSTR".to_string(),
            simulated: false,
            timeout_ms: 10_000,
            sweep_timeout_ms: 1_000_000,
            pulse_timeout_ms: 6_000_000,
            query_delay_ms: 100,
            write_delay_ms: 500,
        }
    }
}

impl InstrumentConfig {
    /// Default I/O timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Timing values the controller applies around commands and sweeps.
    pub fn timing(&self) -> crate::instrument::hp4280a::ControllerTiming {
        crate::instrument::hp4280a::ControllerTiming {
            default_timeout: Duration::from_millis(self.timeout_ms),
            sweep_timeout: Duration::from_millis(self.sweep_timeout_ms),
            pulse_timeout: Duration::from_millis(self.pulse_timeout_ms),
            write_delay: Duration::from_millis(self.write_delay_ms),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory receiving sweep CSV files
    pub uploads_dir: PathBuf,
    /// sea-orm connection URL of the SQLite database
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("uploads"),
            database_url: "sqlite://database.db?mode=rwc".to_string(),
        }
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// HMAC secret used to sign session tokens
    pub token_secret: String,
    /// Session token lifetime
    pub token_expire_seconds: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            token_secret: "change-me-hp4280a-session-secret".to_string(),
            token_expire_seconds: 18_000,
        }
    }
}

impl LabConfig {
    /// Load configuration from `config/hp4280a.toml` and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment overrides still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: LabConfig = Figment::from(Serialized::defaults(LabConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("HP4280A_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |field: &str, reason: &str| {
            LabError::Configuration(format!("{field}: {reason}"))
        };

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(LabError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(LabError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        validation::is_valid_visa_resource(&self.instrument.resource)
            .map_err(|e| invalid("instrument.resource", e))?;
        validation::is_in_range(self.instrument.timeout_ms, 1..=u64::MAX)
            .map_err(|e| invalid("instrument.timeout_ms", e))?;
        if self.instrument.sweep_timeout_ms < self.instrument.timeout_ms {
            return Err(invalid(
                "instrument.sweep_timeout_ms",
                "must not be shorter than instrument.timeout_ms",
            ));
        }
        if self.instrument.pulse_timeout_ms < self.instrument.timeout_ms {
            return Err(invalid(
                "instrument.pulse_timeout_ms",
                "must not be shorter than instrument.timeout_ms",
            ));
        }

        validation::is_valid_path(&self.storage.uploads_dir.to_string_lossy())
            .map_err(|e| invalid("storage.uploads_dir", e))?;
        validation::is_not_empty(&self.storage.database_url)
            .map_err(|e| invalid("storage.database_url", e))?;

        validation::is_valid_ip(&self.server.host).map_err(|e| invalid("server.host", e))?;
        validation::is_valid_port(self.server.port).map_err(|e| invalid("server.port", e))?;
        validation::is_not_empty(&self.server.token_secret)
            .map_err(|e| invalid("server.token_secret", e))?;
        if self.server.token_expire_seconds <= 0 {
            return Err(invalid("server.token_expire_seconds", "must be positive"));
        }

        Ok(())
    }
}
