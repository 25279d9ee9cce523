//! Random forest regression backed by smartcore.
//!
//! Captures non-linear interactions between environmental features. Feature
//! importances are estimated by permutation on the training rows and are only
//! used for diagnostic logging.

use crate::estimation::PredictionError;
use crate::estimation::model::{Estimator, Regressor};
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt;

type ForestModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Forest hyperparameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

impl ForestParams {
    fn to_smartcore(&self) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            min_samples_split: self.min_samples_split,
            n_trees: self.n_trees,
            m: None,
            keep_samples: false,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForestRegressor {
    pub params: ForestParams,
}

impl ForestRegressor {
    pub fn new(params: ForestParams) -> Self {
        Self { params }
    }
}

impl Regressor for ForestRegressor {
    fn name(&self) -> &'static str {
        "random_forest"
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

        let matrix = to_dense(records);
        let y = targets.to_vec();
        let model = ForestModel::fit(&matrix, &y, self.params.to_smartcore())
            .map_err(|e| PredictionError::Estimator(format!("random forest fit failed: {e:?}")))?;

        let mut estimator = ForestEstimator {
            model,
            n_features: records.ncols(),
            importances: None,
        };
        estimator.importances = Some(permutation_importances(
            &estimator,
            records,
            targets,
            self.params.seed,
        )?);
        Ok(Box::new(estimator))
    }
}

pub struct ForestEstimator {
    model: ForestModel,
    n_features: usize,
    importances: Option<Vec<f64>>,
}

impl fmt::Debug for ForestEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForestEstimator")
            .field("n_features", &self.n_features)
            .field("importances", &self.importances)
            .finish()
    }
}

impl Estimator for ForestEstimator {
    fn predict(&self, records: &Array2<f64>) -> Result<Array1<f64>, PredictionError> {
        if records.ncols() != self.n_features {
            return Err(PredictionError::Estimator(format!(
                "expected {} feature columns, got {}",
                self.n_features,
                records.ncols()
            )));
        }
        let predictions = self
            .model
            .predict(&to_dense(records))
            .map_err(|e| PredictionError::Estimator(format!("random forest predict failed: {e:?}")))?;
        Ok(Array1::from_vec(predictions))
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.importances.clone()
    }
}

fn to_dense(records: &Array2<f64>) -> DenseMatrix<f64> {
    let values: Vec<f64> = records.iter().copied().collect();
    DenseMatrix::new(records.nrows(), records.ncols(), values, false)
}

/// Increase in training MSE when each column is shuffled, normalized to sum to 1.
fn permutation_importances(
    estimator: &ForestEstimator,
    records: &Array2<f64>,
    targets: &Array1<f64>,
    seed: u64,
) -> Result<Vec<f64>, PredictionError> {
    let baseline = mse(&estimator.predict(records)?, targets);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut raw = Vec::with_capacity(records.ncols());

    for column in 0..records.ncols() {
        let mut shuffled = records.column(column).to_vec();
        shuffled.shuffle(&mut rng);
        let mut permuted = records.clone();
        permuted
            .index_axis_mut(Axis(1), column)
            .assign(&Array1::from_vec(shuffled));
        let score = mse(&estimator.predict(&permuted)?, targets);
        raw.push((score - baseline).max(0.0));
    }

    let total: f64 = raw.iter().sum();
    if total > 0.0 {
        Ok(raw.into_iter().map(|value| value / total).collect())
    } else {
        Ok(raw)
    }
}

fn mse(predicted: &Array1<f64>, actual: &Array1<f64>) -> f64 {
    if predicted.is_empty() {
        return 0.0;
    }
    predicted
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| (p - a).powi(2))
        .sum::<f64>()
        / predicted.len() as f64
}
