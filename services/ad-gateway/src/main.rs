//! Video ad gateway
//!
//! Single-binary service that:
//! 1. Serves video search through a pool of rate-limited API keys
//! 2. Tracks per-key quota and fails over when a key is exhausted
//! 3. Drives sponsor ad insertion for playback sessions
//! 4. Exposes an admin API for ad and key management on a separate port

mod admin;
mod config;
mod gateway;
mod metrics;
mod session;
mod upstream;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use adbreak::{AdCatalog, AdStore};
use keypool::ledger::QuotaLedger;
use keypool::rotator::CredentialRotator;

use crate::admin::{AdminState, build_admin_router};
use crate::config::Config;
use crate::gateway::{GatewayError, SearchGateway};
use crate::session::{SessionManager, build_session_router};
use crate::upstream::HttpSearchBackend;

/// Shared application state for the public handlers.
#[derive(Clone)]
struct AppState {
    gateway: Arc<SearchGateway>,
    rotator: Arc<CredentialRotator>,
    catalog: Arc<AdCatalog>,
    prometheus: Option<PrometheusHandle>,
}

/// Build the public axum router.
///
/// A concurrency limit caps simultaneous requests across all public routes.
fn build_public_router(
    state: AppState,
    sessions: Arc<SessionManager>,
    max_connections: usize,
) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/search", get(search_handler))
        .route("/v1/channels/{id}/videos", get(channel_videos_handler))
        .with_state(state)
        .merge(build_session_router(sessions))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs with LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting video-ad-gateway");

    // Install the Prometheus recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        admin_addr = %config.server.admin_addr,
        upstream = %config.upstream.base_url,
        "configuration loaded"
    );

    // Stores live under paths from config; make sure the directories exist
    for path in [&config.storage.keys_path, &config.storage.ads_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating storage directory {}", parent.display()))?;
        }
    }

    let ledger = Arc::new(
        QuotaLedger::load(config.storage.keys_path.clone())
            .await
            .context("loading credential ledger")?,
    );
    let rotator = Arc::new(CredentialRotator::load(ledger.clone()).await);

    let store = Arc::new(
        AdStore::load(config.storage.ads_path.clone())
            .await
            .context("loading ad store")?,
    );
    let catalog = Arc::new(AdCatalog::load(store.clone()).await);

    // Out-of-band changes (admin edits, the provider's daily quota reset)
    // reach the in-memory views on this interval
    let refresh_interval = Duration::from_secs(config.pool.refresh_interval_secs);
    keypool::spawn_refresh_task(rotator.clone(), refresh_interval);
    {
        let catalog = catalog.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                catalog.refresh().await;
            }
        });
    }

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream.timeout_secs))
        .build()
        .context("building HTTP client")?;
    let backend = Arc::new(HttpSearchBackend::new(
        http_client,
        config.upstream.base_url.clone(),
        config.upstream.page_size,
    ));
    let gateway = Arc::new(SearchGateway::new(rotator.clone(), backend));

    let sessions = Arc::new(SessionManager::new(catalog.clone()));

    let app_state = AppState {
        gateway,
        rotator: rotator.clone(),
        catalog: catalog.clone(),
        prometheus: Some(prometheus_handle),
    };
    let public_router =
        build_public_router(app_state, sessions, config.server.max_connections);
    let admin_router = build_admin_router(AdminState {
        rotator,
        ledger,
        store,
        catalog,
    });

    let public_listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.server.listen_addr))?;
    let admin_listener = TcpListener::bind(config.server.admin_addr)
        .await
        .with_context(|| format!("binding admin {}", config.server.admin_addr))?;

    info!(
        listen_addr = %config.server.listen_addr,
        admin_addr = %config.server.admin_addr,
        "listeners ready"
    );

    let public = axum::serve(public_listener, public_router)
        .with_graceful_shutdown(shutdown_signal());
    let admin = axum::serve(admin_listener, admin_router)
        .with_graceful_shutdown(shutdown_signal());

    tokio::try_join!(async { public.await }, async { admin.await }).context("server error")?;

    info!("shut down cleanly");
    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

/// GET /health - pool and catalog summary.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.rotator.health().await;
    let ads = state.catalog.summary().await;
    let status = pool["status"].as_str().unwrap_or("unhealthy").to_string();
    let code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (
        code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "status": status,
            "pool": pool,
            "ads": ads,
        })
        .to_string(),
    )
}

/// GET /metrics - Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    page_token: Option<String>,
}

#[derive(Deserialize)]
struct PageParams {
    page_token: Option<String>,
}

fn gateway_error_response(e: &GatewayError) -> axum::response::Response {
    let (status, outcome) = match e {
        GatewayError::PoolExhausted => (StatusCode::TOO_MANY_REQUESTS, "pool_exhausted"),
        GatewayError::UpstreamRequestFailed(_) => (StatusCode::BAD_GATEWAY, "upstream_failed"),
    };
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "error": { "kind": outcome, "message": e.to_string() }
        })
        .to_string(),
    )
        .into_response()
}

/// GET /v1/search?q=&page_token=
async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let started = Instant::now();
    let result = state
        .gateway
        .search(&params.q, params.page_token.as_deref())
        .await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(page) => {
            metrics::record_search("search", "ok", elapsed);
            (
                StatusCode::OK,
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                serde_json::to_string(&page).unwrap_or_else(|_| "{}".into()),
            )
                .into_response()
        }
        Err(e) => {
            let outcome = match e {
                GatewayError::PoolExhausted => "pool_exhausted",
                GatewayError::UpstreamRequestFailed(_) => "upstream_failed",
            };
            metrics::record_search("search", outcome, elapsed);
            gateway_error_response(&e)
        }
    }
}

/// GET /v1/channels/{id}/videos?page_token=
async fn channel_videos_handler(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(params): Query<PageParams>,
) -> impl IntoResponse {
    let started = Instant::now();
    let result = state
        .gateway
        .channel_videos(&channel_id, params.page_token.as_deref())
        .await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(page) => {
            metrics::record_search("list", "ok", elapsed);
            (
                StatusCode::OK,
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                serde_json::to_string(&page).unwrap_or_else(|_| "{}".into()),
            )
                .into_response()
        }
        Err(e) => {
            let outcome = match e {
                GatewayError::PoolExhausted => "pool_exhausted",
                GatewayError::UpstreamRequestFailed(_) => "upstream_failed",
            };
            metrics::record_search("list", outcome, elapsed);
            gateway_error_response(&e)
        }
    }
}
