//! Sweep and C-t parameter sets.

use crate::error::{AppResult, LabError};
use crate::validation;
use serde::{Deserialize, Serialize};

/// Staircase sweep settings, in volts and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepParameters {
    pub dc_bias_v: f64,
    pub start_v: f64,
    pub stop_v: f64,
    pub step_v: f64,
    pub hold_time_s: f64,
    pub step_time_s: f64,
}

impl Default for SweepParameters {
    fn default() -> Self {
        Self {
            dc_bias_v: 5.0,
            start_v: 0.0,
            stop_v: 5.0,
            step_v: 0.5,
            hold_time_s: 1.0,
            step_time_s: 1.0,
        }
    }
}

impl SweepParameters {
    /// Initial settings of a freshly logged in web session.
    pub fn web_default() -> Self {
        Self {
            dc_bias_v: 5.0,
            start_v: -5.0,
            stop_v: 5.0,
            step_v: 0.5,
            hold_time_s: 0.05,
            step_time_s: 0.05,
        }
    }

    /// Values written by the single-sweep preset.
    pub fn instrument_default() -> Self {
        Self {
            dc_bias_v: 5.0,
            start_v: 0.0,
            stop_v: 5.0,
            step_v: 0.01,
            hold_time_s: 0.01,
            step_time_s: 0.03,
        }
    }

    /// Number of bias points in the sweep.
    ///
    /// A zero step is treated as a one-volt step without the closing point.
    pub fn step_count(&self) -> f64 {
        if self.step_v == 0.0 {
            (self.stop_v - self.start_v) / 1.0
        } else {
            (self.stop_v - self.start_v) / self.step_v + 1.0
        }
    }

    /// Expected sweep duration in seconds, including one second of overhead.
    pub fn sweep_time_secs(&self) -> f64 {
        let steps = self.step_count();
        (steps * (self.step_time_s + self.hold_time_s) * 1000.0 + 1000.0) / 1000.0
    }

    pub fn validate(&self) -> AppResult<()> {
        let fields = [
            ("dc_bias_v", self.dc_bias_v),
            ("start_v", self.start_v),
            ("stop_v", self.stop_v),
            ("step_v", self.step_v),
            ("hold_time_s", self.hold_time_s),
            ("step_time_s", self.step_time_s),
        ];
        for (name, value) in fields {
            validation::is_finite(value)
                .map_err(|e| LabError::InvalidInput(format!("{name}: {e}")))?;
        }
        if self.hold_time_s < 0.0 || self.step_time_s < 0.0 {
            return Err(LabError::InvalidInput(
                "hold and step times must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Capacitance-time (C-t) settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CtParameters {
    /// Pulse voltage (`PU`)
    pub pulse_v: f64,
    /// Measure voltage (`PM`)
    pub measure_v: f64,
    /// Number of readings (`PN`)
    pub readings: u32,
    /// Pulse width, "th" on the front panel (`PH`)
    pub pulse_width_s: f64,
    /// Interval between readings, "td" on the front panel (`PT`)
    pub measure_interval_s: f64,
}

impl Default for CtParameters {
    fn default() -> Self {
        Self {
            pulse_v: 0.0,
            measure_v: 0.0,
            readings: 10,
            pulse_width_s: 1.0,
            measure_interval_s: 0.15,
        }
    }
}

impl CtParameters {
    /// Values written by the C-t preset.
    pub fn instrument_default() -> Self {
        Self {
            measure_interval_s: 0.01,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("pulse_v", self.pulse_v),
            ("measure_v", self.measure_v),
            ("pulse_width_s", self.pulse_width_s),
            ("measure_interval_s", self.measure_interval_s),
        ] {
            validation::is_finite(value)
                .map_err(|e| LabError::InvalidInput(format!("{name}: {e}")))?;
        }
        if self.readings == 0 {
            return Err(LabError::InvalidInput(
                "readings: at least one reading is required".to_string(),
            ));
        }
        if self.pulse_width_s < 0.0 || self.measure_interval_s < 0.0 {
            return Err(LabError::InvalidInput(
                "pulse width and interval must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
