//! SQLite user and measurement store.
//!
//! Two tables, created on first start:
//! - `users`: lab members, with an admin flag
//! - `measurements`: one row per stored sweep, pointing at its CSV file

pub mod entity;
pub mod store;

pub use store::{MeasurementSummary, NewUser, Store};

use crate::error::LabError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Login of the shared demonstration account, which always gets a simulated meter.
pub const DEMO_EMAIL: &str = "demo@hp4280a.com";
pub const DEMO_PASSWORD: &str = "demo";
/// Administrator seeded into an empty database.
pub const ADMIN_EMAIL: &str = "admin@hp4280a.com";
pub const ADMIN_PASSWORD: &str = "Welcome1";

/// Kind of measurement recorded in the `test_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestType {
    #[serde(rename = "C-V Measurement")]
    CapacitanceVoltage,
    #[serde(rename = "C-t Measurement")]
    CapacitanceTime,
    #[serde(rename = "Pulse Measurement")]
    Pulse,
}

impl TestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CapacitanceVoltage => "C-V Measurement",
            Self::CapacitanceTime => "C-t Measurement",
            Self::Pulse => "Pulse Measurement",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "C-V Measurement" => Ok(Self::CapacitanceVoltage),
            "C-t Measurement" => Ok(Self::CapacitanceTime),
            "Pulse Measurement" => Ok(Self::Pulse),
            other => Err(LabError::InvalidInput(format!("unknown test type '{other}'"))),
        }
    }
}
