use anyhow::Result;
use axum::{serve, Router};
use rand::RngCore;
use server::{
    middleware::{create_request_id_layers, RequestSpan},
    router::{create_router, AppState},
};
use shelfgate_core::config::AppConfig;
use std::net::SocketAddr;
use tokio::signal;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Graceful shutdown timeout in seconds.
/// After this timeout, the process exits with in-flight requests dropped.
const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Initializes logging. `RUST_LOG` wins over `logging.level`; the shorthands `debug` and
/// `trace` apply to the workspace crates only.
fn init_logging(config: &AppConfig) {
    let crates = |level: &str| {
        format!("warn,shelfgate_core={level},server={level},cli={level},tests={level}")
    };

    let filter = match std::env::var("RUST_LOG") {
        Ok(level) if level == "debug" || level == "trace" => EnvFilter::new(crates(&level)),
        Ok(_) => EnvFilter::try_from_env("RUST_LOG")
            .unwrap_or_else(|_| EnvFilter::new(crates(&config.logging.level))),
        Err(_) => EnvFilter::new(crates(&config.logging.level)),
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

/// Fills an empty signing secret outside production. Keys issued with it stop verifying
/// after a restart.
fn ensure_signing_secret(config: &mut AppConfig) {
    if !config.security.api_keys.signing_secret.is_empty() || config.environment.is_production() {
        return;
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    config.security.api_keys.signing_secret = hex::encode(bytes);
    warn!(
        environment = %config.environment,
        "no API key signing secret configured, using an ephemeral one"
    );
}

fn create_app(state: AppState) -> Router {
    let (set_request_id, propagate_request_id) = create_request_id_layers();
    let max_body_bytes = state.config.server.max_body_bytes;

    // Layers are applied in reverse order, so the request ID is set before tracing runs.
    create_router(state)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
        .layer(propagate_request_id)
        .layer(set_request_id)
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;

    init_logging(&config);
    ensure_signing_secret(&mut config);
    config.validate().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    info!(environment = %config.environment, "Starting Shelfgate");
    debug!(
        bind_port = config.server.bind_port,
        salt_rounds = config.security.hashing.salt_rounds,
        sanitize_mode = %config.validation.sanitize_mode,
        "Configuration loaded"
    );

    let addr = config.socket_addr().map_err(|e| anyhow::anyhow!(e))?;
    let state = AppState::new(config)?;

    for recommendation in state.passwords.security_recommendations() {
        warn!(
            kind = recommendation.kind,
            priority = ?recommendation.priority,
            "{}",
            recommendation.message
        );
    }

    let admin_key = state.issue_bootstrap_admin_key()?;
    if state.config.environment.is_development() {
        info!(key = %admin_key.plaintext, "Bootstrap admin key issued");
    } else {
        info!(key_id = %admin_key.key_id, "Bootstrap admin key issued");
    }

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Shelfgate listening");

    let server = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        error!(error = %e, "Server error occurred");
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!(
        "Shutdown signal received, starting graceful shutdown (timeout: {}s)",
        GRACEFUL_SHUTDOWN_TIMEOUT_SECS
    );

    tokio::spawn(async {
        tokio::time::sleep(std::time::Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS)).await;
        warn!("Graceful shutdown timed out, exiting");
        std::process::exit(1);
    });
}
