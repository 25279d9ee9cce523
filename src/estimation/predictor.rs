//! Trained/untrained predictor wrapping one feature layout and one estimator.

use crate::dataset::Dataset;
use crate::estimation::PredictionError;
use crate::estimation::features::{self, FeatureColumn, Target};
use crate::estimation::model::{Estimator, Regressor};
use crate::estimation::trainer::{self, Evaluation, FeatureImportance, TrainOptions, TrainingReport};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Loosely keyed prediction inputs.
pub type Conditions = HashMap<String, f64>;

/// What to do when a condition key needed by the model is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFeaturePolicy {
    /// Substitute 0.0.
    #[default]
    Zero,
    Reject,
}

/// Fitted estimator plus the report of the run that produced it.
#[derive(Debug)]
pub struct TrainedModel {
    estimator: Box<dyn Estimator>,
    report: TrainingReport,
}

impl TrainedModel {
    pub fn report(&self) -> &TrainingReport {
        &self.report
    }
}

#[derive(Debug)]
pub struct Predictor {
    name: String,
    features: Vec<FeatureColumn>,
    target: Target,
    regressor: Box<dyn Regressor>,
    policy: MissingFeaturePolicy,
    trained: Option<TrainedModel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub estimator: String,
    pub is_trained: bool,
    pub feature_columns: Vec<FeatureColumn>,
    pub target: String,
    pub evaluation: Option<Evaluation>,
    pub training_rows: Option<usize>,
    pub test_rows: Option<usize>,
    pub coefficients: Option<Vec<f64>>,
    pub feature_importances: Option<Vec<FeatureImportance>>,
}

impl Predictor {
    pub fn new(
        name: impl Into<String>,
        features: Vec<FeatureColumn>,
        target: Target,
        regressor: Box<dyn Regressor>,
    ) -> Self {
        Self {
            name: name.into(),
            features,
            target,
            regressor,
            policy: MissingFeaturePolicy::default(),
            trained: None,
        }
    }

    pub fn with_policy(mut self, policy: MissingFeaturePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    pub fn report(&self) -> Option<&TrainingReport> {
        self.trained.as_ref().map(TrainedModel::report)
    }

    /// Build a new trained state without touching the current one.
    pub fn fit(
        &self,
        dataset: &Dataset,
        options: TrainOptions,
    ) -> Result<TrainedModel, PredictionError> {
        let frame = features::frame(dataset, &self.features, &self.target)?;
        let (estimator, report) = trainer::train(self.regressor.as_ref(), &frame, options)?;
        Ok(TrainedModel { estimator, report })
    }

    /// Replace the trained state wholesale.
    pub fn install(&mut self, trained: TrainedModel) {
        self.trained = Some(trained);
    }

    pub fn train(
        &mut self,
        dataset: &Dataset,
        options: TrainOptions,
    ) -> Result<TrainingReport, PredictionError> {
        let trained = self.fit(dataset, options)?;
        let report = trained.report.clone();
        self.install(trained);
        Ok(report)
    }

    /// Predict a single non-negative value.
    ///
    /// Each feature is looked up by its input key, then by its dataset column
    /// name.
    pub fn predict(&self, conditions: &Conditions) -> Result<f64, PredictionError> {
        let trained = self.trained.as_ref().ok_or(PredictionError::NotTrained)?;

        let mut row = Vec::with_capacity(self.features.len());
        let mut defaulted = Vec::new();
        for feature in &self.features {
            let value = conditions
                .get(&feature.input_key)
                .or_else(|| conditions.get(&feature.column));
            match (value, self.policy) {
                (Some(value), _) => row.push(*value),
                (None, MissingFeaturePolicy::Zero) => {
                    defaulted.push(feature.input_key.as_str());
                    row.push(0.0);
                }
                (None, MissingFeaturePolicy::Reject) => {
                    return Err(PredictionError::MissingFeature(feature.input_key.clone()));
                }
            }
        }
        if !defaulted.is_empty() {
            debug!(model = %self.name, missing = ?defaulted, "Defaulting missing features to 0");
        }

        let records = Array2::from_shape_vec((1, row.len()), row)
            .map_err(|e| PredictionError::Estimator(e.to_string()))?;
        let raw = trained
            .estimator
            .predict(&records)?
            .get(0)
            .copied()
            .ok_or_else(|| PredictionError::Estimator("estimator returned no prediction".into()))?;

        Ok(clamp_non_negative(raw))
    }

    pub fn model_info(&self) -> ModelInfo {
        let report = self.report();
        ModelInfo {
            name: self.name.clone(),
            estimator: self.regressor.name().to_string(),
            is_trained: self.is_trained(),
            feature_columns: self.features.clone(),
            target: self.target.to_string(),
            evaluation: report.map(|r| r.evaluation.clone()),
            training_rows: report.map(|r| r.training_rows),
            test_rows: report.map(|r| r.test_rows),
            coefficients: self
                .trained
                .as_ref()
                .and_then(|t| t.estimator.coefficients()),
            feature_importances: report.and_then(|r| r.feature_importances.clone()),
        }
    }
}

fn clamp_non_negative(raw: f64) -> f64 {
    if raw.is_nan() { 0.0 } else { raw.max(0.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::forest::ForestRegressor;
    use crate::estimation::linear::LinearRegressor;
    use ndarray::Array1;
    use serde_json::json;

    #[derive(Debug)]
    struct ConstantRegressor(f64);

    #[derive(Debug)]
    struct ConstantEstimator(f64);

    impl Regressor for ConstantRegressor {
        fn name(&self) -> &'static str {
            "constant"
        }

        fn fit(
            &self,
            _records: &Array2<f64>,
            _targets: &Array1<f64>,
        ) -> Result<Box<dyn Estimator>, PredictionError> {
            Ok(Box::new(ConstantEstimator(self.0)))
        }
    }

    impl Estimator for ConstantEstimator {
        fn predict(&self, records: &Array2<f64>) -> Result<Array1<f64>, PredictionError> {
            Ok(Array1::from_elem(records.nrows(), self.0))
        }
    }

    fn voltage_dataset() -> Dataset {
        // combined power = 2 * sv + 3 * wv
        let rows: Vec<serde_json::Value> = (0..10)
            .map(|i| {
                let sv = 10.0 + i as f64;
                let wv = ((i * i) % 5) as f64 + 0.5;
                json!({
                    "solar_voltage_v": sv,
                    "wind_voltage_v": wv,
                    "combined_voltage_output_v": 2.0 * sv + 3.0 * wv,
                    "combined_current_output_a": 1.0
                })
            })
            .collect();
        let records = serde_json::from_value(serde_json::Value::Array(rows)).expect("records");
        Dataset::from_records(records)
    }

    fn voltage_predictor(regressor: Box<dyn Regressor>) -> Predictor {
        Predictor::new(
            "power",
            vec![
                FeatureColumn::new("solar_voltage_v", "solar_voltage"),
                FeatureColumn::new("wind_voltage_v", "wind_voltage"),
            ],
            Target::product("combined_voltage_output_v", "combined_current_output_a"),
            regressor,
        )
    }

    fn conditions(pairs: &[(&str, f64)]) -> Conditions {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn full_dataset() -> TrainOptions {
        TrainOptions {
            test_size: 0.0,
            random_state: 70,
        }
    }

    #[test]
    fn untrained_predictor_reports_not_trained() {
        let predictor = voltage_predictor(Box::new(LinearRegressor::default()));

        let err = predictor.predict(&Conditions::new()).unwrap_err();

        assert!(matches!(err, PredictionError::NotTrained));
        assert!(!predictor.model_info().is_trained);
    }

    #[test]
    fn negative_raw_output_is_clamped() {
        for raw in [-5.0, f64::NAN] {
            let mut predictor = voltage_predictor(Box::new(ConstantRegressor(raw)));
            predictor
                .train(&voltage_dataset(), full_dataset())
                .expect("train");

            let value = predictor
                .predict(&conditions(&[("solar_voltage", 1.0), ("wind_voltage", 1.0)]))
                .expect("predict");

            assert_eq!(value, 0.0);
        }
    }

    #[test]
    fn linear_round_trip_recovers_voltage_formula() {
        let mut predictor = voltage_predictor(Box::new(LinearRegressor::default()));
        predictor
            .train(&voltage_dataset(), full_dataset())
            .expect("train");

        let value = predictor
            .predict(&conditions(&[("solar_voltage", 10.0), ("wind_voltage", 2.0)]))
            .expect("predict");

        assert!((value - 26.0).abs() < 1e-6);
    }

    #[test]
    fn column_names_are_accepted_as_keys() {
        let mut predictor = voltage_predictor(Box::new(LinearRegressor::default()));
        predictor
            .train(&voltage_dataset(), full_dataset())
            .expect("train");

        let by_key = predictor
            .predict(&conditions(&[("solar_voltage", 12.0), ("wind_voltage", 1.0)]))
            .expect("by key");
        let by_column = predictor
            .predict(&conditions(&[("solar_voltage_v", 12.0), ("wind_voltage_v", 1.0)]))
            .expect("by column");

        assert!((by_key - by_column).abs() < 1e-9);
    }

    #[test]
    fn empty_conditions_default_to_zero() {
        let mut predictor = voltage_predictor(Box::new(LinearRegressor::default()));
        predictor
            .train(&voltage_dataset(), full_dataset())
            .expect("train");

        let value = predictor.predict(&Conditions::new()).expect("predict");

        assert!(value >= 0.0);
    }

    #[test]
    fn reject_policy_names_missing_key() {
        let mut predictor = voltage_predictor(Box::new(LinearRegressor::default()))
            .with_policy(MissingFeaturePolicy::Reject);
        predictor
            .train(&voltage_dataset(), full_dataset())
            .expect("train");

        let err = predictor
            .predict(&conditions(&[("solar_voltage", 12.0)]))
            .unwrap_err();

        assert!(matches!(err, PredictionError::MissingFeature(key) if key == "wind_voltage"));
    }

    #[test]
    fn same_seed_gives_same_prediction() {
        let input = conditions(&[("solar_voltage", 14.0), ("wind_voltage", 2.5)]);
        let predict_once = || {
            let mut predictor = voltage_predictor(Box::new(ForestRegressor::default()));
            predictor
                .train(&voltage_dataset(), TrainOptions::default())
                .expect("train");
            predictor.predict(&input).expect("predict")
        };

        assert_eq!(predict_once(), predict_once());
    }

    #[test]
    fn failed_retrain_keeps_previous_model() {
        let mut predictor = voltage_predictor(Box::new(LinearRegressor::default()));
        predictor
            .train(&voltage_dataset(), full_dataset())
            .expect("train");
        let input = conditions(&[("solar_voltage", 11.0), ("wind_voltage", 3.0)]);
        let before = predictor.predict(&input).expect("predict");

        let broken = Dataset::from_records(
            serde_json::from_value(json!([{"solar_voltage_v": 1.0}])).expect("records"),
        );
        let err = predictor.train(&broken, full_dataset()).unwrap_err();

        assert!(matches!(err, PredictionError::MissingColumn(_)));
        assert!(predictor.is_trained());
        assert_eq!(predictor.predict(&input).expect("predict"), before);
    }

    #[test]
    fn model_info_exposes_linear_coefficients() {
        let mut predictor = voltage_predictor(Box::new(LinearRegressor::default()));
        predictor
            .train(&voltage_dataset(), full_dataset())
            .expect("train");

        let info = predictor.model_info();

        assert!(info.is_trained);
        assert_eq!(info.estimator, "linear");
        let coefficients = info.coefficients.expect("coefficients");
        assert!((coefficients[1] - 2.0).abs() < 1e-6);
        assert!((coefficients[2] - 3.0).abs() < 1e-6);
    }
}
