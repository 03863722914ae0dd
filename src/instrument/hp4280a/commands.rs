//! HP 4280A command vocabulary.
//!
//! The meter speaks two-letter ASCII mnemonics over GPIB. Numeric settings take a
//! value after a space (`PV 5.0`), everything else is a bare code (`FN1`, `SW0`).
//! [`Command`] renders exactly those strings through `Display`.

use crate::error::LabError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Renders a numeric parameter the way it is written as a decimal literal.
///
/// Whole numbers keep a trailing `.0` (`5.0`), fractions print their shortest exact
/// form (`0.01`). The meter accepts both, and the log stays readable.
pub fn format_value(value: f64) -> String {
    format!("{value:?}")
}

/// Measurement function (`FN` code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureFunction {
    /// Capacitance and conductance against bias (`FN1`).
    Cg,
    /// Capacitance against bias (`FN2`).
    C,
    /// Conductance against bias (`FN3`).
    G,
    /// Capacitance and conductance against time (`FN4`).
    Cgt,
    /// Capacitance against time (`FN5`).
    Ct,
    /// Conductance against time (`FN6`).
    Gt,
}

impl MeasureFunction {
    pub fn code(self) -> u8 {
        match self {
            Self::Cg => 1,
            Self::C => 2,
            Self::G => 3,
            Self::Cgt => 4,
            Self::Ct => 5,
            Self::Gt => 6,
        }
    }

    /// Column names of one record in a block response.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Cg => &["C", "G", "V"],
            Self::C => &["C", "V"],
            Self::G => &["G", "V"],
            Self::Cgt => &["C", "G", "T"],
            Self::Ct => &["C", "T"],
            Self::Gt => &["G", "T"],
        }
    }

    /// True for the C-t family, where records are indexed by time rather than bias.
    pub fn is_time_domain(self) -> bool {
        matches!(self, Self::Cgt | Self::Ct | Self::Gt)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cg => "cg",
            Self::C => "c",
            Self::G => "g",
            Self::Cgt => "cgt",
            Self::Ct => "ct",
            Self::Gt => "gt",
        }
    }
}

impl FromStr for MeasureFunction {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cg" | "c-g" | "fn1" => Ok(Self::Cg),
            "c" | "cv" | "c-v" | "fn2" => Ok(Self::C),
            "g" | "fn3" => Ok(Self::G),
            "cgt" | "c-g-t" | "fn4" => Ok(Self::Cgt),
            "ct" | "c-t" | "fn5" => Ok(Self::Ct),
            "gt" | "g-t" | "fn6" => Ok(Self::Gt),
            other => Err(LabError::InvalidInput(format!(
                "unknown measurement function '{other}'"
            ))),
        }
    }
}

/// Bias sweep mode (`IB` code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasMode {
    /// Single staircase (`IB2`).
    Single,
    /// Double staircase, sweeping back to start (`IB3`).
    Double,
    /// Pulsed bias for C-t (`IB5`).
    Pulse,
}

impl BiasMode {
    pub fn code(self) -> u8 {
        match self {
            Self::Single => 2,
            Self::Double => 3,
            Self::Pulse => 5,
        }
    }
}

/// Integration time (`MS` code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementSpeed {
    Fast,
    Medium,
    Slow,
}

impl MeasurementSpeed {
    pub fn code(self) -> u8 {
        match self {
            Self::Fast => 1,
            Self::Medium => 2,
            Self::Slow => 3,
        }
    }
}

/// Test signal amplitude (`SL` code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalLevel {
    #[serde(rename = "10mv", alias = "10")]
    Millivolts10,
    #[serde(rename = "30mv", alias = "30")]
    Millivolts30,
}

impl SignalLevel {
    pub fn code(self) -> u8 {
        match self {
            Self::Millivolts10 => 1,
            Self::Millivolts30 => 2,
        }
    }
}

/// Test cable length compensation (`LE` code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CableLength {
    #[serde(rename = "1m", alias = "1")]
    OneMeter,
    #[serde(rename = "2m", alias = "2")]
    TwoMeters,
    #[serde(rename = "3m", alias = "3")]
    ThreeMeters,
}

impl CableLength {
    pub fn code(self) -> u8 {
        match self {
            Self::OneMeter => 1,
            Self::TwoMeters => 2,
            Self::ThreeMeters => 3,
        }
    }
}

/// Trigger source (`TR` code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Internal, repeating (`TR1`).
    #[serde(alias = "int", alias = "repeat")]
    Internal,
    /// External trigger input (`TR2`).
    #[serde(alias = "ext")]
    External,
    /// Hold / manual sweep (`TR3`).
    Hold,
}

impl TriggerMode {
    pub fn code(self) -> u8 {
        match self {
            Self::Internal => 1,
            Self::External => 2,
            Self::Hold => 3,
        }
    }
}

/// Guard connection of the measurement terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundMode {
    Float,
    Ground,
}

/// Capacitance range selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasRange {
    /// `RA1`
    Auto,
    /// `RA0`, keeps the current range
    Manual,
    /// `RM1`
    #[serde(rename = "10pf", alias = "manual3")]
    Picofarads10,
    /// `RM2`
    #[serde(rename = "100pf", alias = "manual2")]
    Picofarads100,
    /// `RM3`
    #[serde(rename = "10nf", alias = "manual1")]
    Nanofarads10,
}

/// One command sent to the meter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    DcBias(f64),
    StartVoltage(f64),
    StopVoltage(f64),
    StepVoltage(f64),
    HoldTime(f64),
    StepTime(f64),
    ReadingCount(u32),
    MeasureVoltage(f64),
    PulseVoltage(f64),
    PulseWidth(f64),
    MeasureInterval(f64),
    Function(MeasureFunction),
    Bias(BiasMode),
    Speed(MeasurementSpeed),
    Signal(SignalLevel),
    Cable(CableLength),
    Trigger(TriggerMode),
    Ground(GroundMode),
    Range(MeasRange),
    CorrectionEnable,
    VoltageOutput,
    BlockMode,
    StandardTransfer,
    BlockDump,
    Read,
    AutoSample,
    Measure,
    Init,
    Identify,
    SweepStart,
    SweepStop,
}

impl Command {
    /// Numeric settings are followed by a settle delay on the bus.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::DcBias(_)
                | Self::StartVoltage(_)
                | Self::StopVoltage(_)
                | Self::StepVoltage(_)
                | Self::HoldTime(_)
                | Self::StepTime(_)
                | Self::ReadingCount(_)
                | Self::MeasureVoltage(_)
                | Self::PulseVoltage(_)
                | Self::PulseWidth(_)
                | Self::MeasureInterval(_)
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DcBias(v) => write!(f, "PV {}", format_value(*v)),
            Self::StartVoltage(v) => write!(f, "PS {}", format_value(*v)),
            Self::StopVoltage(v) => write!(f, "PP {}", format_value(*v)),
            Self::StepVoltage(v) => write!(f, "PE {}", format_value(*v)),
            Self::HoldTime(v) => write!(f, "PL {}", format_value(*v)),
            Self::StepTime(v) => write!(f, "PD {}", format_value(*v)),
            Self::ReadingCount(n) => write!(f, "PN {n}"),
            Self::MeasureVoltage(v) => write!(f, "PM {}", format_value(*v)),
            Self::PulseVoltage(v) => write!(f, "PU {}", format_value(*v)),
            Self::PulseWidth(v) => write!(f, "PH {}", format_value(*v)),
            Self::MeasureInterval(v) => write!(f, "PT {}", format_value(*v)),
            Self::Function(func) => write!(f, "FN{}", func.code()),
            Self::Bias(mode) => write!(f, "IB{}", mode.code()),
            Self::Speed(speed) => write!(f, "MS{}", speed.code()),
            Self::Signal(level) => write!(f, "SL{}", level.code()),
            Self::Cable(length) => write!(f, "LE{}", length.code()),
            Self::Trigger(mode) => write!(f, "TR{}", mode.code()),
            Self::Ground(GroundMode::Float) => f.write_str("FL"),
            Self::Ground(GroundMode::Ground) => f.write_str("GN"),
            Self::Range(MeasRange::Auto) => f.write_str("RA1"),
            Self::Range(MeasRange::Manual) => f.write_str("RA0"),
            Self::Range(MeasRange::Picofarads10) => f.write_str("RM1"),
            Self::Range(MeasRange::Picofarads100) => f.write_str("RM2"),
            Self::Range(MeasRange::Nanofarads10) => f.write_str("RM3"),
            Self::CorrectionEnable => f.write_str("CEI"),
            Self::VoltageOutput => f.write_str("V01"),
            Self::BlockMode => f.write_str("BL1"),
            Self::StandardTransfer => f.write_str("BL0"),
            Self::BlockDump => f.write_str("BD"),
            Self::Read => f.write_str("READ?"),
            Self::AutoSample => f.write_str("AS"),
            Self::Measure => f.write_str("MEASURE"),
            Self::Init => f.write_str("INIT"),
            Self::Identify => f.write_str("ID?"),
            Self::SweepStart => f.write_str("SW1"),
            Self::SweepStop => f.write_str("SW0"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_values_render_like_decimal_literals() {
        assert_eq!(Command::DcBias(5.0).to_string(), "PV 5.0");
        assert_eq!(Command::StartVoltage(-5.0).to_string(), "PS -5.0");
        assert_eq!(Command::StepVoltage(0.01).to_string(), "PE 0.01");
        assert_eq!(Command::StepTime(0.03).to_string(), "PD 0.03");
        assert_eq!(Command::ReadingCount(10).to_string(), "PN 10");
        assert_eq!(Command::MeasureInterval(0.15).to_string(), "PT 0.15");
    }

    #[test]
    fn mode_codes() {
        assert_eq!(Command::Function(MeasureFunction::Ct).to_string(), "FN5");
        assert_eq!(Command::Bias(BiasMode::Pulse).to_string(), "IB5");
        assert_eq!(Command::Speed(MeasurementSpeed::Slow).to_string(), "MS3");
        assert_eq!(Command::Signal(SignalLevel::Millivolts30).to_string(), "SL2");
        assert_eq!(Command::Cable(CableLength::ThreeMeters).to_string(), "LE3");
        assert_eq!(Command::Trigger(TriggerMode::Hold).to_string(), "TR3");
        assert_eq!(Command::Ground(GroundMode::Ground).to_string(), "GN");
        assert_eq!(Command::Range(MeasRange::Manual).to_string(), "RA0");
        assert_eq!(Command::Range(MeasRange::Nanofarads10).to_string(), "RM3");
        assert_eq!(Command::StandardTransfer.to_string(), "BL0");
    }

    #[test]
    fn function_names_parse() {
        assert_eq!("cgt".parse::<MeasureFunction>().unwrap(), MeasureFunction::Cgt);
        assert_eq!("C-t".parse::<MeasureFunction>().unwrap(), MeasureFunction::Ct);
        assert_eq!("FN3".parse::<MeasureFunction>().unwrap(), MeasureFunction::G);
        assert!("xy".parse::<MeasureFunction>().is_err());
    }

    #[test]
    fn columns_follow_function() {
        assert_eq!(MeasureFunction::Cg.columns(), &["C", "G", "V"]);
        assert_eq!(MeasureFunction::Gt.columns(), &["G", "T"]);
        assert!(MeasureFunction::Cgt.is_time_domain());
        assert!(!MeasureFunction::C.is_time_domain());
    }

    #[test]
    fn form_values_deserialize() {
        let range: MeasRange = serde_json::from_str("\"manual1\"").unwrap();
        assert_eq!(range, MeasRange::Nanofarads10);
        let trigger: TriggerMode = serde_json::from_str("\"int\"").unwrap();
        assert_eq!(trigger, TriggerMode::Internal);
        let level: SignalLevel = serde_json::from_str("\"30\"").unwrap();
        assert_eq!(level, SignalLevel::Millivolts30);
        let cable: CableLength = serde_json::from_str("\"2\"").unwrap();
        assert_eq!(cable, CableLength::TwoMeters);
    }

    #[test]
    fn only_parameters_are_numeric() {
        assert!(Command::HoldTime(0.01).is_numeric());
        assert!(Command::ReadingCount(3).is_numeric());
        assert!(!Command::SweepStart.is_numeric());
    }
}
