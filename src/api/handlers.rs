use crate::api::responses::{
    ErrorCode, ErrorResponse, ForecastWithPrediction, HealthStatus, HealthSuccessResponse,
    HistoricalResponse, HourlyPower, InsertResponse, LiveResponse, LiveValues, ModelsResponse,
    PredictedResponse, PredictedValues, PredictionResponse, PreviousResponse, PreviousValues,
    ReadingRequest, ReadingResponse, RecommendRequest, RecommendResponse, RecommendationResponse,
    StatusResponse, TrainRequest, TrainResponse, TrainedModelResponse,
};
use crate::dataset::SensorRecord;
use crate::error::AppError;
use crate::estimation::PredictionError;
use crate::estimation::catalog::ModelKind;
use crate::estimation::predictor::Conditions;
use crate::estimation::recommend::recommend;
use crate::estimation::registry::ModelRegistry;
use crate::estimation::retrain_from_path;
use crate::estimation::trainer::TrainOptions;
use crate::state::{AppContext, AppState, ForecastHour, ServiceSettings, TelemetryReading};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, error, info, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const HISTORY_HOURS: usize = 24;

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum ApiResponse<T> {
    Success {
        status: StatusCode,
        body: T,
    },
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl<T> ApiResponse<T> {
    fn ok(body: T) -> Self {
        ApiResponse::Success {
            status: StatusCode::OK,
            body,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(ctx): State<AppContext>) -> impl IntoResponse {
    build_health_response(&ctx.registry, SystemTime::now())
}

pub async fn get_models(State(ctx): State<AppContext>) -> impl IntoResponse {
    build_models_response(&ctx.registry, SystemTime::now())
}

pub async fn post_predict(
    State(ctx): State<AppContext>,
    Path(model): Path<String>,
    Json(conditions): Json<Conditions>,
) -> impl IntoResponse {
    build_predict_response(&ctx.registry, &model, &conditions, SystemTime::now())
}

pub async fn post_train(State(ctx): State<AppContext>, body: Bytes) -> impl IntoResponse {
    // Fitting is CPU bound.
    match tokio::task::spawn_blocking(move || build_train_response(&ctx, &body, SystemTime::now()))
        .await
    {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "Training task failed to complete");
            internal_error("/api/train", "training task join failure")
        }
    }
}

pub async fn post_recommend(Json(request): Json<RecommendRequest>) -> impl IntoResponse {
    build_recommend_response(request.power, SystemTime::now())
}

pub async fn get_prediction_data(State(ctx): State<AppContext>) -> impl IntoResponse {
    build_prediction_data_response(&ctx)
}

pub async fn post_hourly(
    State(ctx): State<AppContext>,
    Json(hours): Json<Vec<ForecastHour>>,
) -> impl IntoResponse {
    build_insert_forecasts_response(&ctx.state, hours)
}

pub async fn get_hourly(State(ctx): State<AppContext>) -> impl IntoResponse {
    build_forecasts_response(&ctx)
}

pub async fn get_predicted(State(ctx): State<AppContext>) -> impl IntoResponse {
    build_predicted_response(&ctx, SystemTime::now())
}

pub async fn get_historical(State(ctx): State<AppContext>) -> impl IntoResponse {
    build_historical_response(&ctx, SystemTime::now())
}

pub async fn post_reading(
    State(ctx): State<AppContext>,
    Json(request): Json<ReadingRequest>,
) -> impl IntoResponse {
    build_store_reading_response(&ctx.state, request, SystemTime::now())
}

pub async fn get_readings(State(ctx): State<AppContext>) -> impl IntoResponse {
    build_readings_response(&ctx.state)
}

pub async fn get_live(State(ctx): State<AppContext>) -> impl IntoResponse {
    build_live_response(&ctx.state, SystemTime::now())
}

pub async fn get_previous(State(ctx): State<AppContext>) -> impl IntoResponse {
    build_previous_response(&ctx.state, SystemTime::now())
}

fn build_health_response(
    registry: &ModelRegistry,
    now: SystemTime,
) -> ApiResponse<HealthSuccessResponse> {
    let trained = match registry.trained_count() {
        Ok(count) => count,
        Err(_) => return internal_error("/api/health", "model lock poisoned"),
    };
    let total = registry.kinds().len();

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => return internal_error("/api/health", "timestamp formatting failure"),
    };

    let status = if trained == total {
        HealthStatus::Ok
    } else {
        HealthStatus::Degraded
    };
    let status_code = if trained == 0 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    ApiResponse::Success {
        status: status_code,
        body: HealthSuccessResponse {
            status,
            models_trained: trained,
            models_total: total,
            timestamp,
        },
    }
}

fn build_models_response(registry: &ModelRegistry, now: SystemTime) -> ApiResponse<ModelsResponse> {
    let models = match registry.models() {
        Ok(models) => models,
        Err(err) => return error_response("/api/models", &err, now),
    };
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::ok(ModelsResponse { models, timestamp }),
        Err(_) => internal_error("/api/models", "timestamp formatting failure"),
    }
}

fn build_predict_response(
    registry: &ModelRegistry,
    model: &str,
    conditions: &Conditions,
    now: SystemTime,
) -> ApiResponse<PredictionResponse> {
    let route = "/api/predict";
    let kind = match ModelKind::parse(model) {
        Some(kind) if registry.contains(kind) => kind,
        _ => return error_response(route, &AppError::UnknownModel(model.to_string()), now),
    };

    let value = match registry.predict(kind, conditions) {
        Ok(value) => value,
        Err(err) => return error_response(route, &err, now),
    };
    let recommendation = (kind == ModelKind::Power).then(|| RecommendationResponse::from(recommend(value)));

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::ok(PredictionResponse {
            model: kind,
            value,
            recommendation,
            timestamp,
        }),
        Err(_) => internal_error(route, "timestamp formatting failure"),
    }
}

fn build_train_response(ctx: &AppContext, body: &[u8], now: SystemTime) -> ApiResponse<TrainResponse> {
    let route = "/api/train";
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        TrainRequest::default()
    } else {
        match serde_json::from_slice::<TrainRequest>(body) {
            Ok(request) => request,
            Err(err) => {
                return client_error(
                    StatusCode::BAD_REQUEST,
                    ErrorCode::InvalidRequest,
                    format!("invalid train request: {err}"),
                    now,
                );
            }
        }
    };

    let defaults = ctx.settings.train_options;
    let options = TrainOptions {
        test_size: request.test_size.unwrap_or(defaults.test_size),
        random_state: request.random_state.unwrap_or(defaults.random_state),
    };
    if let Err(err) = options.validate() {
        return error_response(route, &AppError::Prediction(err), now);
    }

    info!(
        test_size = options.test_size,
        random_state = options.random_state,
        "Retraining models on request"
    );
    let reports = match retrain_from_path(
        &ctx.registry,
        &ctx.dataset,
        &ctx.settings.dataset_path,
        options,
    ) {
        Ok(reports) => reports,
        Err(err) => {
            warn!(error = %err, "Retrain failed, keeping previous models");
            return error_response(route, &err, now);
        }
    };

    let dataset_rows = match ctx.dataset.read() {
        Ok(guard) => guard.len(),
        Err(_) => return internal_error(route, "dataset lock poisoned"),
    };

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::ok(TrainResponse {
            dataset_rows,
            models: reports
                .into_iter()
                .map(|(model, report)| TrainedModelResponse { model, report })
                .collect(),
            timestamp,
        }),
        Err(_) => internal_error(route, "timestamp formatting failure"),
    }
}

fn build_recommend_response(power: f64, now: SystemTime) -> ApiResponse<RecommendResponse> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::ok(RecommendResponse {
            power,
            recommendation: recommend(power).into(),
            timestamp,
        }),
        Err(_) => internal_error("/api/recommend", "timestamp formatting failure"),
    }
}

fn build_prediction_data_response(ctx: &AppContext) -> ApiResponse<Vec<SensorRecord>> {
    let dataset = match ctx.dataset.read() {
        Ok(guard) => Arc::clone(&guard),
        Err(_) => return internal_error("/weather/prediction-data", "dataset lock poisoned"),
    };
    ApiResponse::ok(dataset.rows().to_vec())
}

fn build_insert_forecasts_response(
    state: &Arc<RwLock<AppState>>,
    hours: Vec<ForecastHour>,
) -> ApiResponse<InsertResponse> {
    let mut guard = match state.write() {
        Ok(guard) => guard,
        Err(_) => return internal_error("/weather/hourly", "state lock poisoned"),
    };
    let inserted = guard.push_forecasts(hours);
    drop(guard);
    debug!(inserted, "Stored hourly forecasts");

    ApiResponse::Success {
        status: StatusCode::CREATED,
        body: InsertResponse {
            status: "success",
            inserted,
        },
    }
}

fn build_forecasts_response(ctx: &AppContext) -> ApiResponse<Vec<ForecastWithPrediction>> {
    let hours: Vec<ForecastHour> = match ctx.state.read() {
        Ok(guard) => guard.forecasts().cloned().collect(),
        Err(_) => return internal_error("/weather/hourly", "state lock poisoned"),
    };

    let (solar_voltage, wind_voltage) = fixed_voltages(&ctx.settings);
    let mut results = Vec::with_capacity(hours.len());
    for hour in hours {
        let conditions = hour.conditions(solar_voltage, wind_voltage);
        let predicted_power = match ctx.registry.predict(ModelKind::Power, &conditions) {
            Ok(value) => Some(value),
            Err(AppError::StateLock) => {
                return internal_error("/weather/hourly", "model lock poisoned");
            }
            Err(err) => {
                debug!(error = %err, "No power prediction for forecast hour");
                None
            }
        };
        results.push(ForecastWithPrediction {
            hour,
            predicted_power,
        });
    }
    ApiResponse::ok(results)
}

fn build_predicted_response(ctx: &AppContext, now: SystemTime) -> ApiResponse<PredictedResponse> {
    let route = "/data/predicted";
    let latest = match ctx.state.read() {
        Ok(guard) => guard.latest_forecast().cloned(),
        Err(_) => return internal_error(route, "state lock poisoned"),
    };
    let Some(hour) = latest else {
        return client_error(
            StatusCode::NOT_FOUND,
            ErrorCode::NoData,
            "No predicted data available".to_string(),
            now,
        );
    };

    match predict_hour(&ctx.registry, &ctx.settings, &hour) {
        Ok(predicted) => ApiResponse::ok(PredictedResponse {
            predicted: PredictedValues {
                solar_irradiance: predicted.solar_irradiance,
                windspeed: predicted.windspeed,
                powergenerated: predicted.powergenerated,
            },
        }),
        Err(err) => error_response(route, &err, now),
    }
}

fn build_historical_response(
    ctx: &AppContext,
    now: SystemTime,
) -> ApiResponse<HistoricalResponse> {
    let route = "/data/historical";
    let recent = match ctx.state.read() {
        Ok(guard) => guard.recent_forecasts(HISTORY_HOURS),
        Err(_) => return internal_error(route, "state lock poisoned"),
    };

    let mut per_hour = Vec::with_capacity(recent.len());
    for hour in &recent {
        match predict_hour(&ctx.registry, &ctx.settings, hour) {
            Ok(predicted) => per_hour.push(predicted),
            Err(err) => return error_response(route, &err, now),
        }
    }
    ApiResponse::ok(HistoricalResponse {
        powergenerated_per_hour: per_hour,
    })
}

/// Power for a forecast hour with the configured fixed voltages.
fn predict_hour(
    registry: &ModelRegistry,
    settings: &ServiceSettings,
    hour: &ForecastHour,
) -> Result<HourlyPower, AppError> {
    let (solar_voltage, wind_voltage) = fixed_voltages(settings);
    let mut conditions = hour.conditions(solar_voltage, wind_voltage);
    conditions.insert("solar_voltage".to_string(), solar_voltage);
    conditions.insert("wind_voltage".to_string(), wind_voltage);

    let power = registry.predict(ModelKind::Power, &conditions)?;
    Ok(HourlyPower {
        powergenerated: round2(power),
        windspeed: round2(hour.wind_speed_kmh.unwrap_or(0.0) / 3.6),
        solar_irradiance: hour.solar_irradiance_wm2.unwrap_or(0.0),
    })
}

fn fixed_voltages(settings: &ServiceSettings) -> (f64, f64) {
    (settings.forecast_solar_voltage, settings.forecast_wind_voltage)
}

fn build_store_reading_response(
    state: &Arc<RwLock<AppState>>,
    request: ReadingRequest,
    now: SystemTime,
) -> ApiResponse<StatusResponse> {
    let reading = TelemetryReading {
        overall_voltage: request.overall_voltage,
        overall_current: request.overall_current,
        wind_voltage: request.wind_voltage,
        received_at: now,
    };
    match state.write() {
        Ok(mut guard) => guard.push_reading(reading),
        Err(_) => return internal_error("/esp32/readings", "state lock poisoned"),
    }
    ApiResponse::ok(StatusResponse { status: "success" })
}

fn build_readings_response(state: &Arc<RwLock<AppState>>) -> ApiResponse<Vec<ReadingResponse>> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => return internal_error("/esp32/readings", "state lock poisoned"),
    };

    let mut readings = Vec::with_capacity(guard.reading_count());
    for reading in guard.readings() {
        match format_timestamp(reading.received_at) {
            Ok(received_at) => readings.push(ReadingResponse {
                overall_voltage: reading.overall_voltage,
                overall_current: reading.overall_current,
                wind_voltage: reading.wind_voltage,
                received_at,
            }),
            Err(_) => {
                return internal_error("/esp32/readings", "timestamp formatting failure");
            }
        }
    }
    drop(guard);

    ApiResponse::ok(readings)
}

fn build_live_response(state: &Arc<RwLock<AppState>>, now: SystemTime) -> ApiResponse<LiveResponse> {
    let latest = match state.read() {
        Ok(guard) => guard.latest_reading().cloned(),
        Err(_) => return internal_error("/data/live", "state lock poisoned"),
    };

    match latest {
        Some(reading) => ApiResponse::ok(LiveResponse {
            live: LiveValues {
                powergenerated: round2(reading.power()),
                voltage: reading.overall_voltage,
                current: reading.overall_current,
            },
        }),
        None => client_error(
            StatusCode::NOT_FOUND,
            ErrorCode::NoData,
            "No data available".to_string(),
            now,
        ),
    }
}

fn build_previous_response(
    state: &Arc<RwLock<AppState>>,
    now: SystemTime,
) -> ApiResponse<PreviousResponse> {
    let previous = match state.read() {
        Ok(guard) => guard.previous_reading().cloned(),
        Err(_) => return internal_error("/data/previous", "state lock poisoned"),
    };

    match previous {
        Some(reading) => ApiResponse::ok(PreviousResponse {
            previous: PreviousValues {
                powergenerated: round2(reading.power()),
            },
        }),
        None => client_error(
            StatusCode::NOT_FOUND,
            ErrorCode::NotEnoughData,
            "Not enough data".to_string(),
            now,
        ),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Map a pipeline error onto its status code and error code.
fn error_response<T>(route: &str, err: &AppError, now: SystemTime) -> ApiResponse<T> {
    let (status, code) = match err {
        AppError::StateLock => return internal_error(route, "state lock poisoned"),
        AppError::UnknownModel(_) => (StatusCode::NOT_FOUND, ErrorCode::UnknownModel),
        AppError::Dataset(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DatasetError),
        AppError::Prediction(prediction) => match prediction {
            PredictionError::NotTrained => (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::NotTrained),
            PredictionError::MissingFeature(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::MissingFeature)
            }
            PredictionError::Estimator(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::EstimatorFailure)
            }
            PredictionError::MissingColumn(_)
            | PredictionError::InvalidValue { .. }
            | PredictionError::InvalidTestSize(_)
            | PredictionError::InsufficientData(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::TrainingFailed)
            }
        },
    };
    if status.is_server_error() {
        error!(route, error = %err, "Request failed");
    }
    client_error(status, code, err.to_string(), now)
}

fn client_error<T>(
    status: StatusCode,
    error_code: ErrorCode,
    error_message: String,
    now: SystemTime,
) -> ApiResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Error {
            status,
            body: ErrorResponse {
                error_code,
                error_message,
                timestamp,
            },
        },
        Err(_) => internal_error("api", "timestamp formatting failure"),
    }
}

fn internal_error<T>(route: &str, message: &str) -> ApiResponse<T> {
    error!(route, message = message, "Internal error while handling request");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    });
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}
