//! Model variants served by the application, described as data.

use crate::estimation::features::{FeatureColumn, Target};
use crate::estimation::forest::{ForestParams, ForestRegressor};
use crate::estimation::linear::LinearRegressor;
use crate::estimation::model::{EstimatorKind, Regressor};
use crate::estimation::predictor::{MissingFeaturePolicy, Predictor};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const COMBINED_VOLTAGE: &str = "combined_voltage_output_v";
pub const COMBINED_CURRENT: &str = "combined_current_output_a";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Power,
    Irradiance,
    SolarVoltage,
    WindVoltage,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Power,
        ModelKind::Irradiance,
        ModelKind::SolarVoltage,
        ModelKind::WindVoltage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Power => "power",
            ModelKind::Irradiance => "irradiance",
            ModelKind::SolarVoltage => "solar_voltage",
            ModelKind::WindVoltage => "wind_voltage",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn default_estimator(self) -> EstimatorKind {
        match self {
            ModelKind::Power | ModelKind::Irradiance => EstimatorKind::Linear,
            ModelKind::SolarVoltage | ModelKind::WindVoltage => EstimatorKind::RandomForest,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn temperature() -> FeatureColumn {
    FeatureColumn::new("temperature_c", "temperature")
}

fn humidity() -> FeatureColumn {
    FeatureColumn::new("humidity_percent", "humidity")
}

fn cloud_cover() -> FeatureColumn {
    FeatureColumn::new("cloud_cover_percent", "cloud_cover")
}

fn wind_speed() -> FeatureColumn {
    FeatureColumn::new("wind_speed_kmh", "wind_speed")
}

fn irradiance() -> FeatureColumn {
    FeatureColumn::new("solar_irradiance_wm2", "solar_irradiance")
}

fn solar_voltage() -> FeatureColumn {
    FeatureColumn::new("solar_voltage_v", "solar_voltage")
}

fn wind_voltage() -> FeatureColumn {
    FeatureColumn::new("wind_voltage_v", "wind_voltage")
}

fn combined_power() -> Target {
    Target::product(COMBINED_VOLTAGE, COMBINED_CURRENT)
}

/// Feature layout, target and estimator family of one model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub kind: ModelKind,
    pub estimator: EstimatorKind,
    pub features: Vec<FeatureColumn>,
    pub target: Target,
}

impl ModelSpec {
    pub fn for_kind(kind: ModelKind, estimator: EstimatorKind) -> Self {
        let (features, target) = match (kind, estimator) {
            (ModelKind::Power, EstimatorKind::Linear) => (
                vec![
                    solar_voltage(),
                    wind_voltage(),
                    irradiance(),
                    cloud_cover(),
                    wind_speed(),
                ],
                combined_power(),
            ),
            (ModelKind::Power, EstimatorKind::RandomForest) => (
                vec![
                    temperature(),
                    humidity(),
                    cloud_cover(),
                    wind_speed(),
                    irradiance(),
                    wind_voltage(),
                    solar_voltage(),
                ],
                // Older exports lack the combined output columns.
                Target::FirstAvailable(vec![
                    combined_power(),
                    Target::ScaledSum {
                        columns: vec!["wind_voltage_v".into(), "solar_voltage_v".into()],
                        factor: 2.0,
                    },
                ]),
            ),
            (ModelKind::Irradiance, _) => (
                vec![solar_voltage(), wind_voltage()],
                Target::column("solar_irradiance_wm2"),
            ),
            (ModelKind::SolarVoltage, _) => (
                vec![
                    temperature(),
                    humidity(),
                    cloud_cover(),
                    wind_speed(),
                    irradiance(),
                    wind_voltage(),
                ],
                Target::column("solar_voltage_v"),
            ),
            (ModelKind::WindVoltage, _) => (
                vec![
                    temperature(),
                    humidity(),
                    cloud_cover(),
                    wind_speed(),
                    irradiance(),
                    solar_voltage(),
                ],
                Target::column("wind_voltage_v"),
            ),
        };
        Self {
            kind,
            estimator,
            features,
            target,
        }
    }

    pub fn regressor(&self, forest: &ForestParams) -> Box<dyn Regressor> {
        match self.estimator {
            EstimatorKind::Linear => Box::new(LinearRegressor::default()),
            EstimatorKind::RandomForest => Box::new(ForestRegressor::new(forest.clone())),
        }
    }

    pub fn build_predictor(
        &self,
        forest: &ForestParams,
        policy: MissingFeaturePolicy,
    ) -> Predictor {
        Predictor::new(
            self.kind.as_str(),
            self.features.clone(),
            self.target.clone(),
            self.regressor(forest),
        )
        .with_policy(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_names() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ModelKind::parse("voltage"), None);
    }

    #[test]
    fn linear_power_uses_voltages_and_weather() {
        let spec = ModelSpec::for_kind(ModelKind::Power, EstimatorKind::Linear);

        let keys: Vec<&str> = spec.features.iter().map(|f| f.input_key.as_str()).collect();

        assert_eq!(
            keys,
            ["solar_voltage", "wind_voltage", "solar_irradiance", "cloud_cover", "wind_speed"]
        );
        assert_eq!(spec.target, combined_power());
    }

    #[test]
    fn forest_power_falls_back_to_scaled_voltage_sum() {
        let spec = ModelSpec::for_kind(ModelKind::Power, EstimatorKind::RandomForest);

        assert_eq!(spec.features.len(), 7);
        assert!(matches!(spec.target, Target::FirstAvailable(ref options) if options.len() == 2));
    }

    #[test]
    fn voltage_models_exclude_their_own_target() {
        let solar = ModelSpec::for_kind(ModelKind::SolarVoltage, EstimatorKind::RandomForest);
        let wind = ModelSpec::for_kind(ModelKind::WindVoltage, EstimatorKind::RandomForest);

        assert!(solar.features.iter().all(|f| f.column != "solar_voltage_v"));
        assert!(wind.features.iter().all(|f| f.column != "wind_voltage_v"));
    }

    #[test]
    fn built_predictor_uses_requested_family() {
        let spec = ModelSpec::for_kind(ModelKind::Irradiance, EstimatorKind::RandomForest);

        let predictor = spec.build_predictor(&ForestParams::default(), MissingFeaturePolicy::Zero);

        assert_eq!(predictor.model_info().estimator, "random_forest");
        assert_eq!(predictor.name(), "irradiance");
    }
}
