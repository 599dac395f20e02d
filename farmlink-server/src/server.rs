use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};

use anyhow::Context as _;
use axum::{
    Extension, Router,
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::get,
    serve,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shared::config::server::{Config, DatabaseConfig, LogFormat, StoreBackend};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    app_state::AppState,
    db::bootstrap,
    directory::MemoryDirectory,
    middleware::request_context::{self, RequestIdState},
    realtime::PgChangeRelay,
    routes, tracer,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Process-wide Prometheus handle. If another recorder is already installed
/// the handle renders an empty, detached registry.
pub fn metrics_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new().install_recorder().unwrap_or_else(|err| {
                warn!(error = %err, "prometheus recorder already installed; metrics detached");
                PrometheusBuilder::new().build_recorder().handle()
            })
        })
        .clone()
}

async fn metrics_endpoint(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        handle.render(),
    )
}

/// Installs the global subscriber, text or JSON per `logging.format`.
/// Returns the configured level.
pub fn initialize_tracing(config: &Config) -> String {
    let env_filter = build_env_filter(config);

    let fmt_builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let installed = if matches!(config.logging.format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).try_init()
    } else {
        fmt_builder.with_ansi(true).try_init()
    };
    if installed.is_err() {
        warn!("tracing subscriber already installed");
    }

    config.logging.level.clone()
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

/// Opens the Postgres pool described by `db`.
///
/// # Errors
/// Returns an error if the first connection cannot be established.
pub async fn create_database_pool(db: &DatabaseConfig) -> Result<sqlx::PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .acquire_timeout(Duration::from_millis(db.acquire_timeout_ms))
        .connect(&db.url)
        .await?;
    metrics::gauge!("db_pool_max_connections").set(f64::from(db.max_connections));
    Ok(pool)
}

pub fn create_cors_layer(config: &Config) -> CorsLayer {
    use axum::http::Method;

    let mut cors = CorsLayer::new()
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("last-event-id"),
        ]))
        .allow_credentials(config.server.cors.allow_credentials)
        .max_age(Duration::from_secs(config.server.cors.max_age_seconds));

    if config.server.cors.allowed_origins.is_empty() {
        if !config.server.cors.allow_credentials {
            cors = cors.allow_origin(AllowOrigin::any());
        }
    } else {
        let origins = config
            .server
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        cors = cors.allow_origin(AllowOrigin::list(origins));
    }

    cors
}

/// The full application: chat API behind identity, health probes, metrics.
pub fn create_app_router(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let cors = create_cors_layer(&state.config);
    let request_id_state = RequestIdState::from_config(&state.config);

    Router::new()
        .merge(routes::protected::create_router_protected(state.clone()))
        .merge(routes::health::create_health_router())
        .route("/metrics", get(metrics_endpoint))
        .layer(Extension(metrics_handle))
        .layer(cors)
        .layer(tracer::create_trace_layer())
        .layer(axum::middleware::from_fn_with_state(
            request_id_state,
            request_context::assign_request_id,
        ))
        .with_state(state)
}

/// Resolves when Ctrl+C (or SIGTERM on unix) arrives.
pub async fn create_shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutting down...");
}

/// Application state plus the background relay that feeds it, if any.
pub struct Runtime {
    pub state: Arc<AppState>,
    relay: Option<PgChangeRelay>,
}

impl Runtime {
    pub async fn shutdown(self) {
        if let Some(relay) = self.relay {
            relay.shutdown().await;
        }
    }
}

/// Builds state for the configured backend. Postgres is connected,
/// bootstrapped and checked for readiness, and its change relay started.
///
/// # Errors
/// Fails when the database cannot be reached or bootstrapped.
pub async fn build_runtime(config: Config) -> anyhow::Result<Runtime> {
    let config = Arc::new(config);
    match config.database.backend {
        StoreBackend::Memory => {
            info!("using in-memory chat store");
            let state = AppState::in_memory(config, Arc::new(MemoryDirectory::new()));
            Ok(Runtime {
                state: Arc::new(state),
                relay: None,
            })
        }
        StoreBackend::Postgres => {
            let pool = create_database_pool(&config.database)
                .await
                .context("connecting to postgres")?;
            bootstrap::ensure_liveness(&pool)
                .await
                .context("postgres liveness check")?;
            bootstrap::run(&pool, &config.database)
                .await
                .context("database bootstrap")?;
            bootstrap::ensure_readiness(&pool)
                .await
                .context("postgres readiness check")?;

            let state = Arc::new(AppState::postgres(config, pool.clone()));
            let relay = PgChangeRelay::start(&pool, state.store.clone(), state.feed.clone())
                .await
                .context("starting change relay")?;
            Ok(Runtime {
                state,
                relay: Some(relay),
            })
        }
    }
}

/// Starts the server and serves until a shutdown signal.
///
/// # Errors
/// Returns an error if the backend cannot be prepared or the port cannot be bound.
pub async fn run(config: Config) -> anyhow::Result<()> {
    initialize_tracing(&config);
    info!(profile = ?config.profile, backend = ?config.database.backend, "Starting server...");

    let metrics_handle = metrics_handle();
    let port = config.server.port;
    let runtime = build_runtime(config).await?;
    let app = create_app_router(runtime.state.clone(), metrics_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Listening on {}", addr);

    serve(listener, app)
        .with_graceful_shutdown(create_shutdown_signal())
        .await?;

    runtime.shutdown().await;
    Ok(())
}

/// Rewrites every conversation preview from its newest message.
///
/// # Errors
/// Fails when the backend cannot be prepared or the repair fails.
pub async fn repair_previews(config: Config) -> anyhow::Result<usize> {
    initialize_tracing(&config);
    let runtime = build_runtime(config).await?;
    let repaired = runtime.state.messages.repair_previews().await;
    runtime.shutdown().await;
    Ok(repaired?)
}
