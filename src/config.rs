use crate::estimation::catalog::{ModelKind, ModelSpec};
use crate::estimation::forest::ForestParams;
use crate::estimation::model::EstimatorKind;
use crate::estimation::predictor::MissingFeaturePolicy;
use crate::estimation::trainer::{DEFAULT_RANDOM_STATE, DEFAULT_TEST_SIZE, TrainOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_DATASET_PATH: &str = "data/hybrid_constrained_realistic.json";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_FORECAST_SOLAR_VOLTAGE: f64 = 24.0;
pub const DEFAULT_FORECAST_WIND_VOLTAGE: f64 = 3.0;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub dataset: Option<DatasetSection>,
    #[serde(default)]
    pub training: Option<TrainingSection>,
    #[serde(default)]
    pub models: Option<ModelsSection>,
    #[serde(default)]
    pub forest: Option<ForestSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub forecast: Option<ForecastSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainingSection {
    /// Held-out fraction in [0, 1). 0 trains on the full dataset.
    pub test_size: Option<f64>,
    pub random_state: Option<u64>,
    /// Periodic retrain; absent or 0 disables it.
    pub retrain_interval_secs: Option<u64>,
    pub missing_features: Option<MissingFeaturePolicy>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsSection {
    /// Models to serve (default: all of them)
    pub enabled: Option<Vec<String>>,
    pub power_estimator: Option<String>,
    pub irradiance_estimator: Option<String>,
    pub solar_voltage_estimator: Option<String>,
    pub wind_voltage_estimator: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForestSection {
    pub n_trees: Option<usize>,
    pub max_depth: Option<u16>,
    pub min_samples_split: Option<usize>,
    pub min_samples_leaf: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

/// Fixed voltages assumed when predicting power for stored forecasts.
#[derive(Debug, Deserialize, Clone)]
pub struct ForecastSection {
    pub solar_voltage: Option<f64>,
    pub wind_voltage: Option<f64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let test_size = self.train_options().test_size;
        if !(0.0..1.0).contains(&test_size) {
            return Err(ConfigError::Invalid(format!(
                "training.test_size must be in [0, 1), got {test_size}"
            )));
        }
        self.model_specs()?;
        Ok(())
    }

    /// Max log level; unparsable values fall back to INFO.
    pub fn log_level(&self) -> tracing::Level {
        tracing::Level::from_str(self.logging.level.trim()).unwrap_or(tracing::Level::INFO)
    }

    pub fn dataset_path(&self) -> &Path {
        match self.dataset.as_ref().and_then(|d| d.path.as_deref()) {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => Path::new(DEFAULT_DATASET_PATH),
        }
    }

    pub fn train_options(&self) -> TrainOptions {
        let training = self.training.as_ref();
        TrainOptions {
            test_size: training
                .and_then(|t| t.test_size)
                .unwrap_or(DEFAULT_TEST_SIZE),
            random_state: training
                .and_then(|t| t.random_state)
                .unwrap_or(DEFAULT_RANDOM_STATE),
        }
    }

    /// Returns the retrain interval, or None when periodic retraining is off.
    pub fn retrain_interval(&self) -> Option<Duration> {
        self.training
            .as_ref()
            .and_then(|t| t.retrain_interval_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn missing_feature_policy(&self) -> MissingFeaturePolicy {
        self.training
            .as_ref()
            .and_then(|t| t.missing_features)
            .unwrap_or_default()
    }

    pub fn forest_params(&self) -> ForestParams {
        let defaults = ForestParams::default();
        match &self.forest {
            Some(section) => ForestParams {
                n_trees: section.n_trees.unwrap_or(defaults.n_trees),
                max_depth: section.max_depth.or(defaults.max_depth),
                min_samples_split: section
                    .min_samples_split
                    .unwrap_or(defaults.min_samples_split),
                min_samples_leaf: section
                    .min_samples_leaf
                    .unwrap_or(defaults.min_samples_leaf),
                seed: section.seed.unwrap_or(defaults.seed),
            },
            None => defaults,
        }
    }

    pub fn enabled_models(&self) -> Result<Vec<ModelKind>, ConfigError> {
        match self.models.as_ref().and_then(|m| m.enabled.as_ref()) {
            Some(names) => names
                .iter()
                .map(|name| {
                    ModelKind::parse(name)
                        .ok_or_else(|| ConfigError::Invalid(format!("unknown model: {name}")))
                })
                .collect(),
            None => Ok(ModelKind::ALL.to_vec()),
        }
    }

    pub fn estimator_for(&self, kind: ModelKind) -> Result<EstimatorKind, ConfigError> {
        let configured = self.models.as_ref().and_then(|m| match kind {
            ModelKind::Power => m.power_estimator.as_deref(),
            ModelKind::Irradiance => m.irradiance_estimator.as_deref(),
            ModelKind::SolarVoltage => m.solar_voltage_estimator.as_deref(),
            ModelKind::WindVoltage => m.wind_voltage_estimator.as_deref(),
        });
        match configured {
            Some(name) => EstimatorKind::parse(name).ok_or_else(|| {
                ConfigError::Invalid(format!("unknown estimator for {kind}: {name}"))
            }),
            None => Ok(kind.default_estimator()),
        }
    }

    pub fn model_specs(&self) -> Result<Vec<ModelSpec>, ConfigError> {
        self.enabled_models()?
            .into_iter()
            .map(|kind| Ok(ModelSpec::for_kind(kind, self.estimator_for(kind)?)))
            .collect()
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    /// Returns (solar, wind) voltages used for forecast power predictions.
    pub fn forecast_voltages(&self) -> (f64, f64) {
        let forecast = self.forecast.as_ref();
        (
            forecast
                .and_then(|f| f.solar_voltage)
                .unwrap_or(DEFAULT_FORECAST_SOLAR_VOLTAGE),
            forecast
                .and_then(|f| f.wind_voltage)
                .unwrap_or(DEFAULT_FORECAST_WIND_VOLTAGE),
        )
    }
}
