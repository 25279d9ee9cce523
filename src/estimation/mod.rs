use crate::dataset::{Dataset, load_dataset};
use crate::error::AppError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

pub mod catalog;
pub mod features;
pub mod forest;
pub mod linear;
pub mod model;
pub mod predictor;
pub mod recommend;
pub mod registry;
pub mod trainer;

use catalog::ModelKind;
use registry::ModelRegistry;
use trainer::{TrainOptions, TrainingReport};

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("missing column: {0}")]
    MissingColumn(String),
    #[error("invalid value for column {column} at row {row}")]
    InvalidValue { column: String, row: usize },
    #[error("test_size must be in [0, 1), got {0}")]
    InvalidTestSize(f64),
    #[error("insufficient training data: {0} rows")]
    InsufficientData(usize),
    #[error("model is not trained")]
    NotTrained,
    #[error("missing feature: {0}")]
    MissingFeature(String),
    #[error("estimator failure: {0}")]
    Estimator(String),
}

/// Reload the dataset from `path`, retrain every model, then publish the new
/// dataset. On failure the previous models and dataset stay in place.
pub fn retrain_from_path(
    registry: &ModelRegistry,
    dataset: &RwLock<Arc<Dataset>>,
    path: &Path,
    options: TrainOptions,
) -> Result<Vec<(ModelKind, TrainingReport)>, AppError> {
    let fresh = Arc::new(load_dataset(path)?);
    let reports = registry.train_all(&fresh, options)?;

    let mut guard = dataset.write().map_err(|_| AppError::StateLock)?;
    *guard = fresh;
    info!(rows = guard.len(), path = %path.display(), "Dataset reloaded");

    Ok(reports)
}

pub fn spawn_retrain_thread(
    registry: Arc<ModelRegistry>,
    dataset: Arc<RwLock<Arc<Dataset>>>,
    path: PathBuf,
    options: TrainOptions,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            sleep_with_stop(interval, &stop, Instant::now());
            if stop.load(Ordering::Relaxed) {
                break;
            }

            match retrain_from_path(&registry, &dataset, &path, options) {
                Ok(reports) => info!(models = reports.len(), "Scheduled retrain complete"),
                Err(e) => warn!(error = %e, "Scheduled retrain failed, keeping previous models"),
            }
        }
    })
}

fn sleep_with_stop(duration: Duration, stop: &AtomicBool, start: Instant) {
    let elapsed = start.elapsed();
    if elapsed >= duration {
        return;
    }
    let remaining = duration - elapsed;
    let step = Duration::from_millis(100);
    let mut slept = Duration::ZERO;

    while slept < remaining {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        std::thread::sleep(step.min(remaining - slept));
        slept += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::catalog::ModelSpec;
    use crate::estimation::forest::ForestParams;
    use crate::estimation::model::EstimatorKind;
    use crate::estimation::predictor::MissingFeaturePolicy;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn registry() -> ModelRegistry {
        ModelRegistry::new(
            &[ModelSpec::for_kind(ModelKind::Irradiance, EstimatorKind::Linear)],
            &ForestParams::default(),
            MissingFeaturePolicy::Zero,
        )
    }

    fn write_dataset(label: &str, contents: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("hybrid-retrain-{label}-{unique}.json"));
        fs::write(&path, contents)?;
        Ok(path)
    }

    const IRRADIANCE_ROWS: &str = r#"[
        {"solar_voltage_v": 10.0, "wind_voltage_v": 1.0, "solar_irradiance_wm2": 300.0},
        {"solar_voltage_v": 12.0, "wind_voltage_v": 3.0, "solar_irradiance_wm2": 340.0},
        {"solar_voltage_v": 14.0, "wind_voltage_v": 2.0, "solar_irradiance_wm2": 410.0},
        {"solar_voltage_v": 16.0, "wind_voltage_v": 0.0, "solar_irradiance_wm2": 480.0},
        {"solar_voltage_v": 18.0, "wind_voltage_v": 4.0, "solar_irradiance_wm2": 500.0},
        {"solar_voltage_v": 20.0, "wind_voltage_v": 1.0, "solar_irradiance_wm2": 590.0}
    ]"#;

    #[test]
    fn retrain_replaces_dataset_and_trains_models() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_dataset("ok", IRRADIANCE_ROWS)?;
        let registry = registry();
        let shared = RwLock::new(Arc::new(Dataset::default()));

        let reports = retrain_from_path(&registry, &shared, &path, TrainOptions::default())?;
        let _ = fs::remove_file(&path);

        assert_eq!(reports.len(), 1);
        assert!(registry.is_ready()?);
        assert_eq!(shared.read().map_err(|_| AppError::StateLock)?.len(), 6);
        Ok(())
    }

    #[test]
    fn failed_reload_keeps_previous_dataset() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_dataset("bad", "{ not json")?;
        let registry = registry();
        let shared = RwLock::new(Arc::new(Dataset::default()));

        let result = retrain_from_path(&registry, &shared, &path, TrainOptions::default());
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(AppError::Dataset(_))));
        assert!(shared.read().map_err(|_| AppError::StateLock)?.is_empty());
        Ok(())
    }

    #[test]
    fn retrain_thread_stops_promptly() {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_retrain_thread(
            Arc::new(registry()),
            Arc::new(RwLock::new(Arc::new(Dataset::default()))),
            PathBuf::from("does-not-exist.json"),
            TrainOptions::default(),
            Duration::from_secs(60),
            Arc::clone(&stop),
        );

        let started = Instant::now();
        stop.store(true, Ordering::Relaxed);
        handle.join().expect("retrain thread panicked");

        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
