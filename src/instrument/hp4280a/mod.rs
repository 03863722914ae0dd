//! HP 4280A 1 MHz C meter / C-V plotter.
//!
//! - [`commands`]: the ASCII command vocabulary
//! - [`params`]: sweep and C-t parameter sets with step count and sweep time arithmetic
//! - [`block`]: block-mode response parsing
//! - [`controller`]: [`Hp4280a`], which sequences commands over an
//!   [`InstrumentConnection`](crate::adapters::InstrumentConnection)
//!
//! ## Configuration
//!
//! ```toml
//! [instrument]
//! resource = "GPIB1::17::INSTR"
//! timeout_ms = 10000
//! sweep_timeout_ms = 1000000
//! pulse_timeout_ms = 6000000
//! write_delay_ms = 500
//! ```

pub mod block;
pub mod commands;
pub mod controller;
pub mod params;

pub use block::BlockResponse;
pub use commands::{
    BiasMode, CableLength, Command, GroundMode, MeasRange, MeasureFunction, MeasurementSpeed,
    SignalLevel, TriggerMode,
};
pub use controller::Hp4280a;
pub use params::{CtParameters, SweepParameters};

use std::time::Duration;

/// Timeouts and delays the controller applies around commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerTiming {
    /// I/O timeout outside sweeps.
    pub default_timeout: Duration,
    /// I/O timeout while a C-V sweep block is pending.
    pub sweep_timeout: Duration,
    /// I/O timeout while each pulse of a pulse sweep is pending.
    pub pulse_timeout: Duration,
    /// Settle time after each numeric parameter write.
    pub write_delay: Duration,
}

impl Default for ControllerTiming {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(10_000),
            sweep_timeout: Duration::from_millis(1_000_000),
            pulse_timeout: Duration::from_millis(6_000_000),
            write_delay: Duration::from_millis(500),
        }
    }
}

impl ControllerTiming {
    /// Default timeouts without the settle delay, for simulated sessions and tests.
    pub fn without_write_delay() -> Self {
        Self {
            write_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}
