//! Block-mode response parsing.
//!
//! In block mode (`BL1` + `BD`) the meter dumps the whole sweep as one ASCII line of
//! comma separated values, record after record, with no framing. The number of fields
//! per record depends on the active measurement function.

use super::commands::MeasureFunction;
use crate::error::{AppResult, LabError};

/// A parsed block response.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockResponse {
    function: MeasureFunction,
    records: Vec<Vec<String>>,
}

impl BlockResponse {
    /// Split `raw` into records for `function`.
    ///
    /// Fields are separated by commas or line breaks; empty fields are dropped. A
    /// trailing partial record is kept as is so nothing the meter sent is lost.
    pub fn parse(raw: &str, function: MeasureFunction) -> AppResult<Self> {
        let fields: Vec<String> = raw
            .split([',', '\r', '\n'])
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect();

        if fields.is_empty() {
            return Err(LabError::NoData);
        }

        let width = function.columns().len();
        let records = fields.chunks(width).map(<[String]>::to_vec).collect();
        Ok(Self { function, records })
    }

    pub fn function(&self) -> MeasureFunction {
        self.function
    }

    pub fn columns(&self) -> &'static [&'static str] {
        self.function.columns()
    }

    pub fn records(&self) -> &[Vec<String>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when the last record has fewer fields than the function defines.
    pub fn has_partial_record(&self) -> bool {
        self.records
            .last()
            .is_some_and(|record| record.len() < self.columns().len())
    }

    /// Values of one column parsed as numbers; fields that do not parse are skipped.
    pub fn column_values(&self, column: &str) -> Vec<f64> {
        let Some(index) = self.columns().iter().position(|c| *c == column) else {
            return Vec::new();
        };
        self.records
            .iter()
            .filter_map(|record| record.get(index))
            .filter_map(|field| field.parse().ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_function_width() {
        let raw = "+1.0E-10,+2.0E-06,-5.0,+1.1E-10,+2.1E-06,-4.5\r\n";
        let block = BlockResponse::parse(raw, MeasureFunction::Cg).unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block.records()[1], vec!["+1.1E-10", "+2.1E-06", "-4.5"]);
        assert!(!block.has_partial_record());
    }

    #[test]
    fn two_column_functions() {
        let raw = "1,0.0,2,0.01,3,0.02";
        let block = BlockResponse::parse(raw, MeasureFunction::Ct).unwrap();
        assert_eq!(block.len(), 3);
        assert_eq!(block.columns(), &["C", "T"]);
        assert_eq!(block.column_values("T"), vec![0.0, 0.01, 0.02]);
    }

    #[test]
    fn line_breaks_separate_fields_too() {
        let raw = "1,2\n3,4\r\n";
        let block = BlockResponse::parse(raw, MeasureFunction::G).unwrap();
        assert_eq!(block.records(), &[vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn keeps_trailing_partial_record() {
        let raw = "1,2,3,4";
        let block = BlockResponse::parse(raw, MeasureFunction::Cgt).unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block.records()[1], vec!["4"]);
        assert!(block.has_partial_record());
    }

    #[test]
    fn empty_response_is_no_data() {
        assert!(matches!(
            BlockResponse::parse(" ,\r\n", MeasureFunction::Cg),
            Err(LabError::NoData)
        ));
    }

    #[test]
    fn unknown_column_yields_nothing() {
        let block = BlockResponse::parse("1,2", MeasureFunction::C).unwrap();
        assert!(block.column_values("G").is_empty());
    }
}
