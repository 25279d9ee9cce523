//! Ordinary least-squares linear regression.
//!
//! Formula: target = intercept + sum(coefficient_i * feature_i)

use crate::estimation::PredictionError;
use crate::estimation::model::{Estimator, Regressor};
use linfa::prelude::*;
use linfa_linear::{FittedLinearRegression, LinearRegression};
use ndarray::{Array1, Array2};

/// OLS regressor with an intercept term.
#[derive(Debug, Clone)]
pub struct LinearRegressor {
    pub fit_intercept: bool,
}

impl Default for LinearRegressor {
    fn default() -> Self {
        Self {
            fit_intercept: true,
        }
    }
}

impl Regressor for LinearRegressor {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn fit(
        &self,
        records: &Array2<f64>,
        targets: &Array1<f64>,
    ) -> Result<Box<dyn Estimator>, PredictionError> {
        if records.nrows() != targets.len() {
            return Err(PredictionError::Estimator(format!(
                "feature and target lengths mismatch: {} vs {}",
                records.nrows(),
                targets.len()
            )));
        }
        if records.nrows() == 0 {
            return Err(PredictionError::InsufficientData(0));
        }

        let dataset = Dataset::new(records.clone(), targets.clone());
        let model = LinearRegression::default()
            .with_intercept(self.fit_intercept)
            .fit(&dataset)
            .map_err(|e: linfa_linear::LinearError<f64>| {
                PredictionError::Estimator(e.to_string())
            })?;

        Ok(Box::new(LinearEstimator { model }))
    }
}

#[derive(Debug)]
pub struct LinearEstimator {
    model: FittedLinearRegression<f64>,
}

impl Estimator for LinearEstimator {
    fn predict(&self, records: &Array2<f64>) -> Result<Array1<f64>, PredictionError> {
        let expected = self.model.params().len();
        if records.ncols() != expected {
            return Err(PredictionError::Estimator(format!(
                "expected {expected} feature columns, got {}",
                records.ncols()
            )));
        }
        Ok(self.model.predict(records))
    }

    fn coefficients(&self) -> Option<Vec<f64>> {
        let mut values = Vec::with_capacity(self.model.params().len() + 1);
        values.push(self.model.intercept());
        values.extend(self.model.params().iter().copied());
        Some(values)
    }
}
