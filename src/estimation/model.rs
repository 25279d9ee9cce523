//! Estimator traits for pluggable regression families.
//!
//! A [`Regressor`] is an unfitted estimator family (configuration only). Fitting
//! it on a feature matrix yields a boxed [`Estimator`] that answers predictions.
//! Models are chosen per predictor in the catalog and can be swapped in tests.

use crate::estimation::PredictionError;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Estimator families available to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    Linear,
    RandomForest,
}

impl EstimatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EstimatorKind::Linear => "linear",
            EstimatorKind::RandomForest => "random_forest",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "linear" => Some(EstimatorKind::Linear),
            "random_forest" => Some(EstimatorKind::RandomForest),
            _ => None,
        }
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unfitted regression family.
pub trait Regressor: Send + Sync + fmt::Debug {
    /// Short name used in logs and model info.
    fn name(&self) -> &'static str;

    /// Fit on `records` (one row per sample) against `targets`.
    fn fit(
        &self,
        records: &Array2<f64>,
        targets: &Array1<f64>,
    ) -> Result<Box<dyn Estimator>, PredictionError>;
}

/// A fitted estimator. Read-only once built.
pub trait Estimator: Send + Sync + fmt::Debug {
    /// Predict one value per row of `records`.
    fn predict(&self, records: &Array2<f64>) -> Result<Array1<f64>, PredictionError>;

    /// Fitted parameters, when the family has a closed form
    /// (`[intercept, coefficients...]` for linear models).
    fn coefficients(&self) -> Option<Vec<f64>> {
        None
    }

    /// Relative feature importances in training column order.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}
