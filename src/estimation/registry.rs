//! Application-owned set of predictors, one lock per model.
//!
//! Fitting runs under the read lock so predictions keep flowing; only the
//! final install takes the write lock.

use crate::dataset::Dataset;
use crate::error::AppError;
use crate::estimation::catalog::{ModelKind, ModelSpec};
use crate::estimation::forest::ForestParams;
use crate::estimation::predictor::{Conditions, MissingFeaturePolicy, ModelInfo, Predictor};
use crate::estimation::trainer::{TrainOptions, TrainingReport};
use std::sync::RwLock;
use tracing::info;

#[derive(Debug)]
pub struct ModelRegistry {
    models: Vec<(ModelKind, RwLock<Predictor>)>,
}

impl ModelRegistry {
    pub fn new(specs: &[ModelSpec], forest: &ForestParams, policy: MissingFeaturePolicy) -> Self {
        Self::from_predictors(
            specs
                .iter()
                .map(|spec| (spec.kind, spec.build_predictor(forest, policy)))
                .collect(),
        )
    }

    pub fn from_predictors(predictors: Vec<(ModelKind, Predictor)>) -> Self {
        Self {
            models: predictors
                .into_iter()
                .map(|(kind, predictor)| (kind, RwLock::new(predictor)))
                .collect(),
        }
    }

    pub fn kinds(&self) -> Vec<ModelKind> {
        self.models.iter().map(|(kind, _)| *kind).collect()
    }

    pub fn contains(&self, kind: ModelKind) -> bool {
        self.models.iter().any(|(k, _)| *k == kind)
    }

    fn slot(&self, kind: ModelKind) -> Result<&RwLock<Predictor>, AppError> {
        self.models
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, slot)| slot)
            .ok_or_else(|| AppError::UnknownModel(kind.to_string()))
    }

    /// Fit every model, then install all of them. Nothing is installed if any
    /// fit fails.
    pub fn train_all(
        &self,
        dataset: &Dataset,
        options: TrainOptions,
    ) -> Result<Vec<(ModelKind, TrainingReport)>, AppError> {
        let mut fitted = Vec::with_capacity(self.models.len());
        for (kind, slot) in &self.models {
            let trained = {
                let guard = slot.read().map_err(|_| AppError::StateLock)?;
                guard.fit(dataset, options)?
            };
            fitted.push((*kind, slot, trained));
        }

        let mut reports = Vec::with_capacity(fitted.len());
        for (kind, slot, trained) in fitted {
            let report = trained.report().clone();
            slot.write()
                .map_err(|_| AppError::StateLock)?
                .install(trained);
            info!(model = %kind, estimator = %report.estimator, rows = report.training_rows, "Model trained");
            reports.push((kind, report));
        }
        Ok(reports)
    }

    pub fn train(
        &self,
        kind: ModelKind,
        dataset: &Dataset,
        options: TrainOptions,
    ) -> Result<TrainingReport, AppError> {
        let slot = self.slot(kind)?;
        let trained = {
            let guard = slot.read().map_err(|_| AppError::StateLock)?;
            guard.fit(dataset, options)?
        };
        let report = trained.report().clone();
        slot.write()
            .map_err(|_| AppError::StateLock)?
            .install(trained);
        Ok(report)
    }

    pub fn predict(&self, kind: ModelKind, conditions: &Conditions) -> Result<f64, AppError> {
        let guard = self.slot(kind)?.read().map_err(|_| AppError::StateLock)?;
        Ok(guard.predict(conditions)?)
    }

    pub fn model_info(&self, kind: ModelKind) -> Result<ModelInfo, AppError> {
        let guard = self.slot(kind)?.read().map_err(|_| AppError::StateLock)?;
        Ok(guard.model_info())
    }

    pub fn models(&self) -> Result<Vec<ModelInfo>, AppError> {
        self.kinds()
            .into_iter()
            .map(|kind| self.model_info(kind))
            .collect()
    }

    pub fn trained_count(&self) -> Result<usize, AppError> {
        let mut count = 0;
        for (_, slot) in &self.models {
            if slot.read().map_err(|_| AppError::StateLock)?.is_trained() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// True when every registered model is trained.
    pub fn is_ready(&self) -> Result<bool, AppError> {
        Ok(self.trained_count()? == self.models.len())
    }
}
