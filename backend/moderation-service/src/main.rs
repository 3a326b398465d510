use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::{anyhow, Context};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use moderation_service::{
    config::{Config, LogFormat},
    db::{create_pool, MemoryStore, ModerationStore, PgStore},
    events::TracingDispatcher,
    metrics::ModerationMetrics,
    services::ModerationCore,
};

struct AppState {
    core: ModerationCore,
    registry: Registry,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

async fn ready(state: web::Data<AppState>) -> HttpResponse {
    match state.core.ping().await {
        Ok(()) => HttpResponse::Ok().body("READY"),
        Err(e) => {
            error!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable().body("NOT READY")
        }
    }
}

async fn serve_metrics(state: web::Data<AppState>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("moderation_service=info,info"));

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init(),
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ModerationStore>> {
    if !config.uses_database() {
        info!("DATABASE_URL not set, using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = create_pool(config)
        .await
        .context("Failed to connect to database")?;
    let store = PgStore::new(Arc::new(pool));

    info!("Running database migrations...");
    store.migrate().await.map_err(|e| {
        error!("Migration failed: {}", e);
        anyhow!(e)
    })?;
    info!("Migrations completed successfully");

    Ok(Arc::new(store))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format()?);

    info!(
        service = %config.service_name,
        environment = %config.environment,
        health_port = config.health_port,
        "Starting moderation service"
    );

    let store = open_store(&config).await?;

    let registry = Registry::new();
    let metrics = ModerationMetrics::new(&registry, &config.service_name)
        .context("Failed to build metrics")?;
    let core = ModerationCore::from_config(
        &config,
        store,
        Arc::new(TracingDispatcher),
        Some(metrics),
    );

    let state = web::Data::new(AppState { core, registry });
    let addr = format!("0.0.0.0:{}", config.health_port);
    info!("Health server listening on http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health))
            .route("/ready", web::get().to(ready))
            .route("/metrics", web::get().to(serve_metrics))
    })
    .bind(&addr)
    .with_context(|| format!("Failed to bind {}", addr))?
    .run()
    .await?;

    info!("Moderation service stopped");
    Ok(())
}
