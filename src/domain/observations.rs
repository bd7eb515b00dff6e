//! Observation Table
//!
//! Column-oriented table of historical samples: one column per parameter plus
//! an outcome column. Missing cells are stored as NaN.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObservationError {
    #[error("Observation table is empty")]
    EmptyData,

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to read observations: {0}")]
    ReadError(String),

    #[error("Failed to parse observations: {0}")]
    ParseError(String),
}

/// One JSON row: column name to value, `null` for missing
pub type ObservationRow = BTreeMap<String, Option<f64>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObservationTable {
    columns: BTreeMap<String, Vec<f64>>,
    rows: usize,
}

impl ObservationTable {
    /// Build from equal-length columns
    pub fn from_columns(columns: BTreeMap<String, Vec<f64>>) -> Result<Self, ObservationError> {
        let rows = columns.values().map(Vec::len).max().unwrap_or(0);

        for (name, values) in &columns {
            if values.len() != rows {
                return Err(ObservationError::RaggedColumn {
                    column: name.clone(),
                    expected: rows,
                    actual: values.len(),
                });
            }
        }

        Ok(Self { columns, rows })
    }

    /// Build from rows; a key absent from a row becomes a missing cell
    pub fn from_rows(rows: &[ObservationRow]) -> Self {
        let names: BTreeSet<&String> = rows.iter().flat_map(|row| row.keys()).collect();

        let columns = names
            .into_iter()
            .map(|name| {
                let values = rows
                    .iter()
                    .map(|row| row.get(name).copied().flatten().unwrap_or(f64::NAN))
                    .collect();
                (name.clone(), values)
            })
            .collect();

        Self {
            columns,
            rows: rows.len(),
        }
    }

    /// Parse a JSON array of row objects
    pub fn from_json_rows(json: &str) -> Result<Self, ObservationError> {
        let rows: Vec<ObservationRow> = serde_json::from_str(json)
            .map_err(|e| ObservationError::ParseError(e.to_string()))?;
        Ok(Self::from_rows(&rows))
    }

    /// Load a JSON array of row objects from disk
    pub fn load_json(path: &Path) -> Result<Self, ObservationError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ObservationError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_json_rows(&content)
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of missing cells in a column (0 for unknown columns)
    pub fn missing_count(&self, name: &str) -> usize {
        self.columns
            .get(name)
            .map_or(0, |values| values.iter().filter(|v| v.is_nan()).count())
    }

    /// Copy with every column forward-filled, then back-filled.
    /// A column with no values at all stays NaN.
    pub fn fill_missing(&self) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| (name.clone(), forward_back_fill(values)))
            .collect();

        Self {
            columns,
            rows: self.rows,
        }
    }
}

fn forward_back_fill(values: &[f64]) -> Vec<f64> {
    let mut filled = Vec::with_capacity(values.len());
    let mut last = None;
    for &value in values {
        if !value.is_nan() {
            last = Some(value);
        }
        filled.push(last.unwrap_or(f64::NAN));
    }

    // Leading gaps take the first observed value
    if let Some(first) = values.iter().copied().find(|v| !v.is_nan()) {
        for value in filled.iter_mut().take_while(|v| v.is_nan()) {
            *value = first;
        }
    }

    filled
}
