pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod rate_limit;

use crate::auth::{caller_context_middleware, CallerDecoder};
use crate::config::{AdmissionConfig, LogFormat};
use crate::error::{AdmissionError, Result};
use crate::metrics::{metrics_handler, MetricsService};
use crate::proxy::{proxy_handler, ProxyState};
use crate::rate_limit::{admission_middleware, AdmissionController};
use axum::{http::Uri, middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the HTTP application: local routes, upstream fallback, and the
/// caller-context and admission middleware in front of all of them.
pub fn build_app(config: &AdmissionConfig, controller: AdmissionController) -> Result<Router> {
    let mut app = Router::new().route("/health", get(health_handler));

    if config.metrics.enabled {
        let metrics = MetricsService::new()?;
        app = app.merge(
            Router::new()
                .route(&config.metrics.path, get(metrics_handler))
                .with_state(metrics),
        );
    }

    app = match &config.upstream {
        Some(upstream) => {
            let state = ProxyState::new(
                &upstream.url,
                Duration::from_secs(config.server.timeout_secs),
            )?;
            info!(upstream = %state.upstream, "Forwarding admitted requests upstream");
            app.merge(Router::new().fallback(proxy_handler).with_state(state))
        }
        None => app.fallback(not_found_handler),
    };

    // Layers run outermost-last: caller context must be attached before admission
    app = app.layer(middleware::from_fn_with_state(
        controller,
        admission_middleware,
    ));

    if let Some(jwt) = config.auth.as_ref().and_then(|auth| auth.jwt.as_ref()) {
        let decoder = Arc::new(CallerDecoder::new(jwt)?);
        app = app.layer(middleware::from_fn_with_state(
            decoder,
            caller_context_middleware,
        ));
    }

    Ok(app.layer(TraceLayer::new_for_http()))
}

/// Start the admission gateway and serve until interrupted
pub async fn init_gateway(config: AdmissionConfig) -> Result<()> {
    config.validate()?;

    info!("Starting admission gateway");
    info!(
        "Server listening on {}:{}",
        config.server.host, config.server.port
    );

    let controller = AdmissionController::new(&config.rate_limiting);
    let reclaimer = controller.reclaimer().spawn();

    let app = build_app(&config, controller)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(AdmissionError::Io)?;

    info!("Admission gateway ready to accept connections");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    reclaimer.abort();

    served.map_err(|e| AdmissionError::Internal(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found_handler(uri: Uri) -> AdmissionError {
    AdmissionError::NotFound(uri.path().to_string())
}

/// Initialize tracing/logging
pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "admission=debug,tower_http=debug".into());

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
    }
}
