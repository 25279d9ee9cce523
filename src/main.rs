use hybrid_power::estimation::registry::ModelRegistry;
use hybrid_power::estimation::spawn_retrain_thread;
use hybrid_power::state::{AppContext, ServiceSettings};
use hybrid_power::{api, config, dataset};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match config::load_default() {
        Ok(config) => config,
        Err(err) => {
            init_tracing(tracing::Level::INFO);
            tracing::error!(
                config_path = config::DEFAULT_CONFIG_PATH,
                error = %err,
                "Failed to load config"
            );
            return Err(err.into());
        }
    };
    init_tracing(config.log_level());
    tracing::info!(
        app = %config.app.name,
        config_path = config::DEFAULT_CONFIG_PATH,
        "hybrid-power starting"
    );

    let dataset_path = config.dataset_path().to_path_buf();
    let dataset = dataset::load_dataset(&dataset_path)?;
    tracing::info!(
        path = %dataset_path.display(),
        rows = dataset.len(),
        columns = dataset.columns().len(),
        "Dataset loaded"
    );

    let specs = config.model_specs()?;
    let registry = ModelRegistry::new(
        &specs,
        &config.forest_params(),
        config.missing_feature_policy(),
    );

    // A model that cannot train on the startup dataset is fatal.
    let train_options = config.train_options();
    registry.train_all(&dataset, train_options)?;

    let (forecast_solar_voltage, forecast_wind_voltage) = config.forecast_voltages();
    let ctx = AppContext::new(
        registry,
        dataset,
        ServiceSettings {
            dataset_path: dataset_path.clone(),
            train_options,
            forecast_solar_voltage,
            forecast_wind_voltage,
        },
    );

    let stop_flag = Arc::new(AtomicBool::new(false));
    let _retrain_handle = match config.retrain_interval() {
        Some(interval) => {
            tracing::info!(
                interval_secs = interval.as_secs(),
                "Starting periodic retrain thread"
            );
            Some(spawn_retrain_thread(
                Arc::clone(&ctx.registry),
                Arc::clone(&ctx.dataset),
                dataset_path,
                train_options,
                interval,
                Arc::clone(&stop_flag),
            ))
        }
        None => {
            tracing::info!("Periodic retrain disabled");
            None
        }
    };

    let app = api::router(ctx);
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    stop_flag.store(true, Ordering::Relaxed);

    Ok(())
}
