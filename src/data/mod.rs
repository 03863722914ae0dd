//! Measurement data storage.
pub mod storage;

pub use storage::{CsvStore, CsvTable};
