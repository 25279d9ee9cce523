use crate::dataset::Dataset;
use crate::estimation::predictor::Conditions;
use crate::estimation::registry::ModelRegistry;
use crate::estimation::trainer::TrainOptions;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// Oldest entries are dropped beyond these limits.
pub const MAX_READINGS: usize = 1000;
pub const MAX_FORECASTS: usize = 1000;

/// One ESP32 sample of the combined output.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryReading {
    pub overall_voltage: Option<f64>,
    pub overall_current: Option<f64>,
    pub wind_voltage: Option<f64>,
    pub received_at: SystemTime,
}

impl TelemetryReading {
    pub fn power(&self) -> f64 {
        self.overall_voltage.unwrap_or(0.0) * self.overall_current.unwrap_or(0.0)
    }
}

/// One hourly weather forecast entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForecastHour {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub solar_irradiance_wm2: Option<f64>,
    #[serde(default)]
    pub cloud_cover_percent: Option<f64>,
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub humidity_percent: Option<f64>,
    #[serde(default)]
    pub wind_speed_kmh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solar_voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_voltage: Option<f64>,
}

impl ForecastHour {
    /// Prediction conditions for this hour. Missing weather fields are 0 and
    /// missing voltages take the supplied defaults. Wind speed stays in km/h.
    pub fn conditions(&self, solar_voltage: f64, wind_voltage: f64) -> Conditions {
        let mut conditions = Conditions::new();
        let mut put = |key: &str, value: Option<f64>| {
            conditions.insert(key.to_string(), value.unwrap_or(0.0));
        };
        put("solar_irradiance", self.solar_irradiance_wm2);
        put("cloud_cover", self.cloud_cover_percent);
        put("temperature", self.temperature_c);
        put("humidity", self.humidity_percent);
        put("wind_speed", self.wind_speed_kmh);
        put("solar_voltage", self.solar_voltage.or(Some(solar_voltage)));
        put("wind_voltage", self.wind_voltage.or(Some(wind_voltage)));
        conditions
    }
}

/// In-memory telemetry store. Insertion order, newest last.
#[derive(Debug, Default)]
pub struct AppState {
    readings: VecDeque<TelemetryReading>,
    forecasts: VecDeque<ForecastHour>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reading(&mut self, reading: TelemetryReading) {
        self.readings.push_back(reading);
        while self.readings.len() > MAX_READINGS {
            self.readings.pop_front();
        }
    }

    pub fn readings(&self) -> impl Iterator<Item = &TelemetryReading> {
        self.readings.iter()
    }

    pub fn reading_count(&self) -> usize {
        self.readings.len()
    }

    pub fn latest_reading(&self) -> Option<&TelemetryReading> {
        self.readings.back()
    }

    pub fn previous_reading(&self) -> Option<&TelemetryReading> {
        self.readings.iter().rev().nth(1)
    }

    /// Append forecasts and return how many were stored.
    pub fn push_forecasts(&mut self, forecasts: Vec<ForecastHour>) -> usize {
        let inserted = forecasts.len();
        self.forecasts.extend(forecasts);
        while self.forecasts.len() > MAX_FORECASTS {
            self.forecasts.pop_front();
        }
        inserted
    }

    pub fn forecasts(&self) -> impl Iterator<Item = &ForecastHour> {
        self.forecasts.iter()
    }

    pub fn latest_forecast(&self) -> Option<&ForecastHour> {
        self.forecasts.back()
    }

    /// Up to `limit` forecasts, newest first.
    pub fn recent_forecasts(&self, limit: usize) -> Vec<ForecastHour> {
        self.forecasts.iter().rev().take(limit).cloned().collect()
    }
}

/// Values the HTTP layer needs beyond the shared state.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub dataset_path: PathBuf,
    pub train_options: TrainOptions,
    pub forecast_solar_voltage: f64,
    pub forecast_wind_voltage: f64,
}

/// Everything the router shares across requests.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub registry: Arc<ModelRegistry>,
    pub state: Arc<RwLock<AppState>>,
    pub dataset: Arc<RwLock<Arc<Dataset>>>,
    pub settings: Arc<ServiceSettings>,
}

impl AppContext {
    pub fn new(registry: ModelRegistry, dataset: Dataset, settings: ServiceSettings) -> Self {
        Self {
            registry: Arc::new(registry),
            state: Arc::new(RwLock::new(AppState::new())),
            dataset: Arc::new(RwLock::new(Arc::new(dataset))),
            settings: Arc::new(settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn reading(voltage: f64, current: f64, secs: u64) -> TelemetryReading {
        TelemetryReading {
            overall_voltage: Some(voltage),
            overall_current: Some(current),
            wind_voltage: None,
            received_at: UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[test]
    fn latest_and_previous_follow_insertion_order() {
        let mut state = AppState::new();
        assert!(state.latest_reading().is_none());

        state.push_reading(reading(12.0, 1.0, 1));
        assert!(state.previous_reading().is_none());
        state.push_reading(reading(13.0, 2.0, 2));

        assert_eq!(state.latest_reading().map(TelemetryReading::power), Some(26.0));
        assert_eq!(state.previous_reading().map(TelemetryReading::power), Some(12.0));
    }

    #[test]
    fn readings_are_bounded() {
        let mut state = AppState::new();
        for i in 0..(MAX_READINGS + 5) {
            state.push_reading(reading(i as f64, 1.0, i as u64));
        }

        assert_eq!(state.reading_count(), MAX_READINGS);
        assert_eq!(
            state.readings().next().and_then(|r| r.overall_voltage),
            Some(5.0)
        );
    }

    #[test]
    fn recent_forecasts_are_newest_first() {
        let mut state = AppState::new();
        let hours: Vec<ForecastHour> = (0..30)
            .map(|i| ForecastHour {
                temperature_c: Some(i as f64),
                ..ForecastHour::default()
            })
            .collect();

        assert_eq!(state.push_forecasts(hours), 30);

        let recent = state.recent_forecasts(24);
        assert_eq!(recent.len(), 24);
        assert_eq!(recent[0].temperature_c, Some(29.0));
        assert_eq!(recent[23].temperature_c, Some(6.0));
    }

    #[test]
    fn forecast_conditions_fill_defaults() {
        let hour = ForecastHour {
            solar_irradiance_wm2: Some(640.0),
            wind_speed_kmh: Some(18.0),
            wind_voltage: Some(5.0),
            ..ForecastHour::default()
        };

        let conditions = hour.conditions(24.0, 3.0);

        assert_eq!(conditions.get("solar_irradiance"), Some(&640.0));
        assert_eq!(conditions.get("wind_speed"), Some(&18.0));
        assert_eq!(conditions.get("cloud_cover"), Some(&0.0));
        assert_eq!(conditions.get("solar_voltage"), Some(&24.0));
        assert_eq!(conditions.get("wind_voltage"), Some(&5.0));
    }
}
