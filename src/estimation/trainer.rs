//! Seeded train/test split, fitting and held-out evaluation.

use crate::estimation::PredictionError;
use crate::estimation::features::FeatureFrame;
use crate::estimation::model::{Estimator, Regressor};
use ndarray::{Array1, Axis};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_TEST_SIZE: f64 = 0.3;
pub const DEFAULT_RANDOM_STATE: u64 = 70;
pub const FULL_DATASET_NOTE: &str = "Trained on full dataset, no test metrics available";

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TrainOptions {
    pub test_size: f64,
    pub random_state: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            test_size: DEFAULT_TEST_SIZE,
            random_state: DEFAULT_RANDOM_STATE,
        }
    }
}

impl TrainOptions {
    pub fn validate(&self) -> Result<(), PredictionError> {
        if (0.0..1.0).contains(&self.test_size) {
            Ok(())
        } else {
            Err(PredictionError::InvalidTestSize(self.test_size))
        }
    }
}

/// Row indices of each partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Permute `0..rows` with a seeded RNG and hold out `ceil(test_size * rows)`.
pub fn train_test_split(
    rows: usize,
    test_size: f64,
    random_state: u64,
) -> Result<Split, PredictionError> {
    TrainOptions {
        test_size,
        random_state,
    }
    .validate()?;

    let mut indices: Vec<usize> = (0..rows).collect();
    if test_size == 0.0 {
        return Ok(Split {
            train: indices,
            test: Vec::new(),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(random_state);
    indices.shuffle(&mut rng);
    let test_rows = ((test_size * rows as f64).ceil() as usize).min(rows);
    let train = indices.split_off(test_rows);
    Ok(Split {
        train,
        test: indices,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub mse: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl Metrics {
    pub fn compute(predicted: &Array1<f64>, actual: &Array1<f64>) -> Self {
        let n = actual.len().max(1) as f64;
        let ss_res: f64 = predicted
            .iter()
            .zip(actual.iter())
            .map(|(p, a)| (a - p).powi(2))
            .sum();
        let mean = actual.mean().unwrap_or(0.0);
        let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

        let mse = ss_res / n;
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res < 1e-12 {
            1.0
        } else {
            0.0
        };
        Self {
            mse,
            rmse: mse.sqrt(),
            r2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evaluation {
    HeldOut(Metrics),
    FullDataset {
        note: String,
    },
}

impl Evaluation {
    pub fn metrics(&self) -> Option<&Metrics> {
        match self {
            Evaluation::HeldOut(metrics) => Some(metrics),
            Evaluation::FullDataset { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub column: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub estimator: String,
    pub evaluation: Evaluation,
    pub training_rows: usize,
    pub test_rows: usize,
    pub training_r2: Option<f64>,
    pub feature_importances: Option<Vec<FeatureImportance>>,
}

pub fn train(
    regressor: &dyn Regressor,
    frame: &FeatureFrame,
    options: TrainOptions,
) -> Result<(Box<dyn Estimator>, TrainingReport), PredictionError> {
    let split = train_test_split(frame.nrows(), options.test_size, options.random_state)?;
    if split.train.is_empty() {
        return Err(PredictionError::InsufficientData(frame.nrows()));
    }

    let train_records = frame.records.select(Axis(0), &split.train);
    let train_targets = frame.targets.select(Axis(0), &split.train);
    debug!(
        estimator = regressor.name(),
        training_rows = split.train.len(),
        test_rows = split.test.len(),
        "Fitting estimator"
    );
    let estimator = regressor.fit(&train_records, &train_targets)?;

    let training_r2 = Metrics::compute(&estimator.predict(&train_records)?, &train_targets).r2;

    let evaluation = if split.test.is_empty() {
        info!(estimator = regressor.name(), "{FULL_DATASET_NOTE}");
        Evaluation::FullDataset {
            note: FULL_DATASET_NOTE.to_string(),
        }
    } else {
        let test_records = frame.records.select(Axis(0), &split.test);
        let test_targets = frame.targets.select(Axis(0), &split.test);
        let metrics = Metrics::compute(&estimator.predict(&test_records)?, &test_targets);
        info!(
            estimator = regressor.name(),
            mse = metrics.mse,
            rmse = metrics.rmse,
            r2 = metrics.r2,
            "Held-out evaluation"
        );
        Evaluation::HeldOut(metrics)
    };

    let feature_importances = estimator.feature_importances().map(|values| {
        frame
            .columns
            .iter()
            .zip(values)
            .map(|(column, importance)| FeatureImportance {
                column: column.clone(),
                importance,
            })
            .collect()
    });

    let report = TrainingReport {
        estimator: regressor.name().to_string(),
        evaluation,
        training_rows: split.train.len(),
        test_rows: split.test.len(),
        training_r2: Some(training_r2),
        feature_importances,
    };
    Ok((estimator, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::linear::LinearRegressor;
    use ndarray::Array2;

    fn linear_frame(rows: usize) -> FeatureFrame {
        let mut records = Array2::zeros((rows, 2));
        let mut targets = Array1::zeros(rows);
        for i in 0..rows {
            let a = i as f64;
            let b = ((i * 3) % 7) as f64;
            records[[i, 0]] = a;
            records[[i, 1]] = b;
            targets[i] = 4.0 + a - 2.0 * b;
        }
        FeatureFrame {
            columns: vec!["a".to_string(), "b".to_string()],
            records,
            targets,
        }
    }

    #[test]
    fn split_holds_out_ceil_of_test_fraction() {
        let split = train_test_split(10, 0.25, 70).expect("split");

        assert_eq!(split.test.len(), 3);
        assert_eq!(split.train.len(), 7);

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_deterministic_per_seed() {
        let first = train_test_split(50, 0.3, 70).expect("split");
        let second = train_test_split(50, 0.3, 70).expect("split");

        assert_eq!(first, second);
    }

    #[test]
    fn test_size_out_of_range_is_rejected() {
        for test_size in [-0.1, 1.0, 1.5] {
            let err = train_test_split(10, test_size, 70).unwrap_err();
            assert!(matches!(err, PredictionError::InvalidTestSize(_)));
        }
    }

    #[test]
    fn held_out_metrics_for_exact_fit() {
        let frame = linear_frame(20);

        let (_, report) =
            train(&LinearRegressor::default(), &frame, TrainOptions::default()).expect("train");

        let metrics = report.evaluation.metrics().expect("held-out metrics");
        assert_eq!(report.test_rows, 6);
        assert_eq!(report.training_rows, 14);
        assert!(metrics.mse < 1e-12);
        assert!((metrics.r2 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_test_size_trains_on_everything() {
        let frame = linear_frame(8);
        let options = TrainOptions {
            test_size: 0.0,
            random_state: 70,
        };

        let (_, report) = train(&LinearRegressor::default(), &frame, options).expect("train");

        assert_eq!(report.training_rows, 8);
        assert_eq!(report.test_rows, 0);
        assert_eq!(
            report.evaluation,
            Evaluation::FullDataset {
                note: FULL_DATASET_NOTE.to_string()
            }
        );
    }

    #[test]
    fn single_row_with_holdout_has_no_training_rows() {
        let frame = linear_frame(1);

        let err = train(&LinearRegressor::default(), &frame, TrainOptions::default()).unwrap_err();

        assert!(matches!(err, PredictionError::InsufficientData(1)));
    }

    #[test]
    fn constant_target_r2() {
        let actual = ndarray::array![5.0, 5.0, 5.0];

        assert_eq!(Metrics::compute(&actual.clone(), &actual).r2, 1.0);
        assert_eq!(
            Metrics::compute(&ndarray::array![4.0, 5.0, 6.0], &actual).r2,
            0.0
        );
    }
}
