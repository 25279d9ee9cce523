//! Projection of dataset columns into model-ready feature matrices.

use crate::dataset::Dataset;
use crate::estimation::PredictionError;
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::fmt;

/// A dataset column used as a model input, with the key callers use for it
/// in prediction conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureColumn {
    pub column: String,
    pub input_key: String,
}

impl FeatureColumn {
    pub fn new(column: impl Into<String>, input_key: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            input_key: input_key.into(),
        }
    }
}

/// How the regression target is obtained from a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A directly observed column.
    Column(String),
    /// Elementwise product, e.g. `voltage * current = power`.
    Product(String, String),
    /// `(sum of columns) * factor`.
    ScaledSum { columns: Vec<String>, factor: f64 },
    /// First alternative whose columns all exist.
    FirstAvailable(Vec<Target>),
}

impl Target {
    pub fn column(name: impl Into<String>) -> Self {
        Target::Column(name.into())
    }

    pub fn product(left: impl Into<String>, right: impl Into<String>) -> Self {
        Target::Product(left.into(), right.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Column(name) => f.write_str(name),
            Target::Product(left, right) => write!(f, "{left} * {right}"),
            Target::ScaledSum { columns, factor } => {
                write!(f, "({}) * {factor}", columns.join(" + "))
            }
            Target::FirstAvailable(options) => {
                let rendered: Vec<String> = options.iter().map(ToString::to_string).collect();
                f.write_str(&rendered.join(" | "))
            }
        }
    }
}

/// Feature matrix and target vector, rows aligned with the dataset.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    pub columns: Vec<String>,
    pub records: Array2<f64>,
    pub targets: Array1<f64>,
}

impl FeatureFrame {
    pub fn nrows(&self) -> usize {
        self.records.nrows()
    }
}

pub fn frame(
    dataset: &Dataset,
    features: &[FeatureColumn],
    target: &Target,
) -> Result<FeatureFrame, PredictionError> {
    let columns: Vec<String> = features.iter().map(|f| f.column.clone()).collect();
    let records = project(dataset, &columns)?;
    let targets = derive_target(dataset, target)?;
    Ok(FeatureFrame {
        columns,
        records,
        targets,
    })
}

/// Select `columns` in exactly the given order.
pub fn project(dataset: &Dataset, columns: &[String]) -> Result<Array2<f64>, PredictionError> {
    for column in columns {
        require_column(dataset, column)?;
    }

    let mut records = Array2::zeros((dataset.len(), columns.len()));
    for row in 0..dataset.len() {
        for (index, column) in columns.iter().enumerate() {
            records[[row, index]] = numeric_value(dataset, row, column)?;
        }
    }
    Ok(records)
}

pub fn derive_target(dataset: &Dataset, target: &Target) -> Result<Array1<f64>, PredictionError> {
    match target {
        Target::Column(name) => column_values(dataset, name),
        Target::Product(left, right) => {
            let left = column_values(dataset, left)?;
            let right = column_values(dataset, right)?;
            Ok(left * right)
        }
        Target::ScaledSum { columns, factor } => {
            let mut total = Array1::zeros(dataset.len());
            for column in columns {
                total = total + column_values(dataset, column)?;
            }
            Ok(total * *factor)
        }
        Target::FirstAvailable(options) => {
            let mut last_missing = None;
            for option in options {
                match derive_target(dataset, option) {
                    Ok(values) => return Ok(values),
                    Err(PredictionError::MissingColumn(name)) => last_missing = Some(name),
                    Err(other) => return Err(other),
                }
            }
            Err(PredictionError::MissingColumn(
                last_missing.unwrap_or_else(|| target.to_string()),
            ))
        }
    }
}

fn column_values(dataset: &Dataset, column: &str) -> Result<Array1<f64>, PredictionError> {
    require_column(dataset, column)?;
    (0..dataset.len())
        .map(|row| numeric_value(dataset, row, column))
        .collect::<Result<Vec<f64>, _>>()
        .map(Array1::from_vec)
}

fn require_column(dataset: &Dataset, column: &str) -> Result<(), PredictionError> {
    if dataset.has_column(column) {
        Ok(())
    } else {
        Err(PredictionError::MissingColumn(column.to_string()))
    }
}

fn numeric_value(dataset: &Dataset, row: usize, column: &str) -> Result<f64, PredictionError> {
    dataset
        .value(row, column)
        .ok_or_else(|| PredictionError::InvalidValue {
            column: column.to_string(),
            row,
        })
}
