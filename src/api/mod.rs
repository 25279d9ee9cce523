use crate::state::AppContext;
use axum::Router;
use axum::routing::{get, post};

pub mod handlers;
pub mod responses;

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route("/api/models", get(handlers::get_models))
        .route("/api/predict/{model}", post(handlers::post_predict))
        .route("/api/train", post(handlers::post_train))
        .route("/api/recommend", post(handlers::post_recommend))
        .route("/weather/prediction-data", get(handlers::get_prediction_data))
        .route(
            "/weather/hourly",
            get(handlers::get_hourly).post(handlers::post_hourly),
        )
        .route("/data/predicted", get(handlers::get_predicted))
        .route("/data/historical", get(handlers::get_historical))
        .route("/data/live", get(handlers::get_live))
        .route("/data/previous", get(handlers::get_previous))
        .route(
            "/esp32/readings",
            get(handlers::get_readings).post(handlers::post_reading),
        )
        .with_state(ctx)
}
