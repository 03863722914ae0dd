//! Subscriber initialisation.
//!
//! The level and output format come from `[application]` in the configuration;
//! `RUST_LOG`, when set, replaces the configured level.
//!
//! ```no_run
//! use hp4280a_lab::{config::LabConfig, tracing_setup};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LabConfig::load()?;
//! tracing_setup::init_from_config(&config)?;
//! tracing::info!(resource = %config.instrument.resource, "Application started");
//! # Ok(())
//! # }
//! ```

use crate::config::LabConfig;
use crate::error::{AppResult, LabError};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Console output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, coloured
    Pretty,
    /// One line per event, no colours (lab PC console)
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(LabError::Configuration(format!(
                "Invalid log format '{s}'. Must be one of: pretty, compact, json"
            ))),
        }
    }
}

/// What [`init`] installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
}

impl LogSettings {
    pub fn from_lab_config(config: &LabConfig) -> AppResult<Self> {
        let level = Level::from_str(&config.application.log_level).map_err(|_| {
            LabError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                config.application.log_level
            ))
        })?;
        Ok(Self {
            level,
            format: config.application.log_format.parse()?,
        })
    }
}

pub fn init_from_config(config: &LabConfig) -> AppResult<()> {
    init(LogSettings::from_lab_config(config)?)
}

/// Install the global subscriber. A second call leaves the first subscriber in place
/// and returns `Ok`.
pub fn init(settings: LogSettings) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_str().to_ascii_lowercase()));

    let layer = match settings.format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_ansi(false).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    };

    match tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
    {
        Ok(()) => Ok(()),
        // already installed by an earlier call or a test harness
        Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
        Err(e) => Err(LabError::Configuration(format!(
            "Failed to initialize tracing: {e}"
        ))),
    }
}
