//! Historical sensor/weather dataset loaded from a JSON array of records.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One historical sample: a flat object of named fields.
pub type SensorRecord = Map<String, Value>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read dataset: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse dataset: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Tabular view over the loaded records.
///
/// Columns are listed in the order they were first observed. Rows are never
/// mutated after loading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<SensorRecord>,
}

impl Dataset {
    pub fn from_records(rows: Vec<SensorRecord>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }

    pub fn rows(&self) -> &[SensorRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Numeric value at `row` for `column`, if present and a number.
    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        self.rows.get(row)?.get(column)?.as_f64()
    }
}

/// Read the dataset file. Every call re-reads from disk.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset, DatasetError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            DatasetError::NotFound(path.to_path_buf())
        } else {
            DatasetError::Read(err)
        }
    })?;
    let rows: Vec<SensorRecord> = serde_json::from_str(&contents)?;
    Ok(Dataset::from_records(rows))
}
