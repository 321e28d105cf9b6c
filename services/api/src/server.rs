use crate::cli::ServeArgs;
use crate::infra::{seed_identities, AppState};
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use munaqasa::config::AppConfig;
use munaqasa::error::AppError;
use munaqasa::telemetry;
use munaqasa::workflows::marketplace::{
    InMemoryRepository, MarketplaceRepository, MarketplaceService, SqliteRepository,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(database) = args.database.take() {
        config.storage.database_path = Some(database);
    }

    telemetry::init(&config.telemetry)?;

    match config.storage.database_path.clone() {
        Some(path) => {
            let repository = SqliteRepository::open(&path)?;
            info!(path = %path.display(), "marketplace storage opened");
            serve(config, Arc::new(repository)).await
        }
        None => {
            warn!("no database configured, marketplace state lives in memory only");
            serve(config, Arc::new(InMemoryRepository::new())).await
        }
    }
}

async fn serve<R>(config: AppConfig, repository: Arc<R>) -> Result<(), AppError>
where
    R: MarketplaceRepository + 'static,
{
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    if config.identity.is_empty() {
        warn!("APP_IDENTITY_TOKENS is empty, every marketplace call will be unauthenticated");
    }
    let identity = Arc::new(config.identity.clone());
    let service = Arc::new(MarketplaceService::new(repository, identity.clone()));
    let seeded = seed_identities(&service, &identity)?;

    let app = with_marketplace_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, accounts = seeded, "marketplace api ready");

    axum::serve(listener, app).await?;
    Ok(())
}
