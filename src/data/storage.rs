//! CSV storage for sweep results.
//!
//! Every sweep lands in its own `data_<YYYY-MM-DD_HH-MM-SS>.csv` file inside the uploads
//! directory. The first row names the columns of the active measurement function; pulse
//! sweeps collect all pulses into one file with a leading `pulse` column.
use crate::error::{AppResult, LabError};
use crate::instrument::hp4280a::{BlockResponse, MeasureFunction};
use crate::validation;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Header of the pulse index column in pulse sweep files.
pub const PULSE_COLUMN: &str = "pulse";

/// Columns and rows read back from a stored file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Writes sweep data under one directory.
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a stored file, refusing anything that would leave the directory.
    pub fn resolve(&self, file_name: &str) -> AppResult<PathBuf> {
        validation::is_plain_file_name(file_name)
            .map_err(|e| LabError::InvalidInput(format!("{file_name}: {e}")))?;
        Ok(self.dir.join(file_name))
    }

    /// Create a fresh, uniquely named file. A name already taken within the same second
    /// gets a `_1`, `_2`, ... suffix.
    #[cfg_attr(not(feature = "storage_csv"), allow(dead_code))]
    fn create_unique(&self) -> AppResult<(PathBuf, File)> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| LabError::Storage(format!("cannot create {}: {e}", self.dir.display())))?;

        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        for attempt in 0u32.. {
            let name = if attempt == 0 {
                format!("data_{stamp}.csv")
            } else {
                format!("data_{stamp}_{attempt}.csv")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(LabError::Storage(format!(
                        "Failed to create CSV file {}: {e}",
                        path.display()
                    )))
                }
            }
        }
        Err(LabError::Storage("no free file name left".to_string()))
    }

    /// Write one block response to a new file and return its path.
    pub fn write_block(&self, block: &BlockResponse) -> AppResult<PathBuf> {
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = block;
            return Err(LabError::FeatureNotEnabled("storage_csv".to_string()));
        }

        #[cfg(feature = "storage_csv")]
        {
            let (path, file) = self.create_unique()?;
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_writer(file);
            writer.write_record(block.columns())?;
            for record in block.records() {
                writer.write_record(record)?;
            }
            writer.flush()?;
            tracing::info!(path = %path.display(), records = block.len(), "Data saved");
            Ok(path)
        }
    }

    /// Start a pulse sweep file holding the header row only.
    pub fn create_pulse_file(&self, function: MeasureFunction) -> AppResult<PathBuf> {
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = function;
            return Err(LabError::FeatureNotEnabled("storage_csv".to_string()));
        }

        #[cfg(feature = "storage_csv")]
        {
            let (path, file) = self.create_unique()?;
            let mut writer = csv::Writer::from_writer(file);
            let mut header = vec![PULSE_COLUMN];
            header.extend_from_slice(function.columns());
            writer.write_record(&header)?;
            writer.flush()?;
            Ok(path)
        }
    }

    /// Append the records of pulse number `pulse` to a file from [`Self::create_pulse_file`].
    pub fn append_pulse(&self, path: &Path, pulse: usize, block: &BlockResponse) -> AppResult<()> {
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = (path, pulse, block);
            return Err(LabError::FeatureNotEnabled("storage_csv".to_string()));
        }

        #[cfg(feature = "storage_csv")]
        {
            let file = OpenOptions::new().append(true).open(path).map_err(|e| {
                LabError::Storage(format!("cannot append to {}: {e}", path.display()))
            })?;
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .has_headers(false)
                .from_writer(file);
            let pulse = pulse.to_string();
            for record in block.records() {
                let mut row = Vec::with_capacity(record.len() + 1);
                row.push(pulse.as_str());
                row.extend(record.iter().map(String::as_str));
                writer.write_record(&row)?;
            }
            writer.flush()?;
            tracing::debug!(path = %path.display(), pulse, records = block.len(), "Pulse appended");
            Ok(())
        }
    }

    /// Read a stored file back.
    pub fn read_table(path: &Path) -> AppResult<CsvTable> {
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = path;
            return Err(LabError::FeatureNotEnabled("storage_csv".to_string()));
        }

        #[cfg(feature = "storage_csv")]
        {
            let mut reader = csv::ReaderBuilder::new()
                .flexible(true)
                .from_path(path)?;
            let headers = reader.headers()?.iter().map(str::to_string).collect();
            let mut rows = Vec::new();
            for record in reader.records() {
                rows.push(record?.iter().map(str::to_string).collect());
            }
            Ok(CsvTable { headers, rows })
        }
    }
}

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;

    fn block(raw: &str, function: MeasureFunction) -> BlockResponse {
        BlockResponse::parse(raw, function).unwrap()
    }

    #[test]
    fn writes_header_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path().join("uploads"));
        let path = store
            .write_block(&block("1,2,-5.0,3,4,-4.5", MeasureFunction::Cg))
            .unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("data_") && name.ends_with(".csv"));

        let table = CsvStore::read_table(&path).unwrap();
        assert_eq!(table.headers, vec!["C", "G", "V"]);
        assert_eq!(table.rows, vec![vec!["1", "2", "-5.0"], vec!["3", "4", "-4.5"]]);
    }

    #[test]
    fn same_second_files_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        let b = block("1,0.0", MeasureFunction::Ct);
        let first = store.write_block(&b).unwrap();
        let second = store.write_block(&b).unwrap();
        assert_ne!(first, second);
        assert!(second.exists());
    }

    #[test]
    fn partial_record_survives() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        let path = store.write_block(&block("1,2,3,4", MeasureFunction::Cg)).unwrap();
        let table = CsvStore::read_table(&path).unwrap();
        assert_eq!(table.rows[1], vec!["4"]);
    }

    #[test]
    fn pulse_file_collects_every_pulse() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        let path = store.create_pulse_file(MeasureFunction::C).unwrap();
        store
            .append_pulse(&path, 1, &block("10,0.5", MeasureFunction::C))
            .unwrap();
        store
            .append_pulse(&path, 2, &block("11,1.0,12,1.0", MeasureFunction::C))
            .unwrap();

        let table = CsvStore::read_table(&path).unwrap();
        assert_eq!(table.headers, vec!["pulse", "C", "V"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[2], vec!["2", "12", "1.0"]);
    }

    #[test]
    fn resolve_rejects_traversal() {
        let store = CsvStore::new("uploads");
        assert!(store.resolve("data_1.csv").is_ok());
        assert!(store.resolve("../database.db").is_err());
        assert!(store.resolve("a/b.csv").is_err());
    }
}
