use crate::estimation::catalog::ModelKind;
use crate::estimation::predictor::ModelInfo;
use crate::estimation::recommend::{PowerBand, Recommendation};
use crate::estimation::trainer::TrainingReport;
use crate::state::ForecastHour;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownModel,
    NotTrained,
    MissingFeature,
    EstimatorFailure,
    DatasetError,
    TrainingFailed,
    InvalidRequest,
    NoData,
    NotEnoughData,
    InternalError,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub models_trained: usize,
    pub models_total: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RecommendationResponse {
    pub band: PowerBand,
    pub label: &'static str,
    pub devices: Vec<&'static str>,
    pub text: String,
}

impl From<Recommendation> for RecommendationResponse {
    fn from(recommendation: Recommendation) -> Self {
        Self {
            text: recommendation.to_string(),
            band: recommendation.band,
            label: recommendation.label,
            devices: recommendation.devices,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PredictionResponse {
    pub model: ModelKind,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<RecommendationResponse>,
    pub timestamp: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrainRequest {
    pub test_size: Option<f64>,
    pub random_state: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TrainedModelResponse {
    pub model: ModelKind,
    #[serde(flatten)]
    pub report: TrainingReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TrainResponse {
    pub dataset_rows: usize,
    pub models: Vec<TrainedModelResponse>,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub power: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RecommendResponse {
    pub power: f64,
    pub recommendation: RecommendationResponse,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct InsertResponse {
    pub status: &'static str,
    pub inserted: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ForecastWithPrediction {
    #[serde(flatten)]
    pub hour: ForecastHour,
    pub predicted_power: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PredictedValues {
    pub solar_irradiance: f64,
    /// Metres per second.
    pub windspeed: f64,
    pub powergenerated: f64,
}

#[derive(Debug, Serialize)]
pub struct PredictedResponse {
    pub predicted: PredictedValues,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HourlyPower {
    pub powergenerated: f64,
    /// Metres per second.
    pub windspeed: f64,
    pub solar_irradiance: f64,
}

#[derive(Debug, Serialize)]
pub struct HistoricalResponse {
    pub powergenerated_per_hour: Vec<HourlyPower>,
}

#[derive(Debug, Deserialize)]
pub struct ReadingRequest {
    #[serde(default)]
    pub overall_voltage: Option<f64>,
    #[serde(default)]
    pub overall_current: Option<f64>,
    #[serde(default)]
    pub wind_voltage: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ReadingResponse {
    pub overall_voltage: Option<f64>,
    pub overall_current: Option<f64>,
    pub wind_voltage: Option<f64>,
    pub received_at: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct LiveValues {
    pub powergenerated: f64,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct LiveResponse {
    pub live: LiveValues,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PreviousValues {
    pub powergenerated: f64,
}

#[derive(Debug, Serialize)]
pub struct PreviousResponse {
    pub previous: PreviousValues,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::recommend::recommend;
    use serde_json::json;

    #[test]
    fn error_response_uses_screaming_snake_case_code() {
        let response = ErrorResponse {
            error_code: ErrorCode::NotTrained,
            error_message: "model is not trained".to_string(),
            timestamp: "2026-01-11T12:32:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize error response");
        assert_eq!(
            value,
            json!({
                "error_code": "NOT_TRAINED",
                "error_message": "model is not trained",
                "timestamp": "2026-01-11T12:32:00Z"
            })
        );
    }

    #[test]
    fn prediction_response_omits_missing_recommendation() {
        let response = PredictionResponse {
            model: ModelKind::SolarVoltage,
            value: 18.5,
            recommendation: None,
            timestamp: "2026-01-11T12:30:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize prediction response");
        assert_eq!(
            value,
            json!({
                "model": "solar_voltage",
                "value": 18.5,
                "timestamp": "2026-01-11T12:30:00Z"
            })
        );
    }

    #[test]
    fn recommendation_response_carries_text() {
        let response = RecommendationResponse::from(recommend(150.0));

        let value = serde_json::to_value(response).expect("serialize recommendation");
        assert_eq!(
            value,
            json!({
                "band": "medium",
                "label": "Medium power",
                "devices": ["TV", "laptop", "lights"],
                "text": "Medium power: {Recommendations: TV, laptop, lights}"
            })
        );
    }

    #[test]
    fn forecast_with_prediction_is_flat() {
        let response = ForecastWithPrediction {
            hour: ForecastHour {
                timestamp: Some("2026-01-11T13:00:00Z".to_string()),
                temperature_c: Some(21.0),
                ..ForecastHour::default()
            },
            predicted_power: Some(42.0),
        };

        let value = serde_json::to_value(response).expect("serialize forecast");
        assert_eq!(value["timestamp"], "2026-01-11T13:00:00Z");
        assert_eq!(value["temperature_c"], 21.0);
        assert_eq!(value["predicted_power"], 42.0);
    }

    #[test]
    fn live_response_shape() {
        let response = LiveResponse {
            live: LiveValues {
                powergenerated: 26.4,
                voltage: Some(12.0),
                current: Some(2.2),
            },
        };

        let value = serde_json::to_value(response).expect("serialize live response");
        assert_eq!(
            value,
            json!({"live": {"powergenerated": 26.4, "voltage": 12.0, "current": 2.2}})
        );
    }
}
