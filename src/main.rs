use std::net::SocketAddr;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

mod chunker;
mod config;
mod embedder;
mod error;
mod governor;
mod indexer;
mod lang;
mod reporter;
mod routes;
mod scanner;
mod search;
mod server;
mod state;
mod store;
mod vector;
mod watcher;

use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> ExitCode {
    // Resolve log directory (platform data dir or from env)
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| {
        dirs::data_local_dir()
            .map(|d| d.join("semcode-backend").join("logs").to_string_lossy().to_string())
            .unwrap_or_else(|| ".semcode-logs".to_string())
    });
    std::fs::create_dir_all(&log_dir).ok();

    // File appender: daily rotated log files
    let file_appender = tracing_appender::rolling::daily(&log_dir, "semcode-backend.log");
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "semcode_backend=info,tower_http=info".into());

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .compact();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(non_blocking_writer)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Install panic hook that logs before aborting
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_default();
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        error!(target: "semcode_backend::panic", location = %location, payload = %payload, "PANIC: thread panicked");
        default_panic(info);
    }));

    match run(&log_dir).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(log_dir: &str) -> AppResult<()> {
    routes::health::init_start_time();

    let config = config::AppConfig::from_env()?;
    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|e| AppError::Configuration(format!("listen address: {}", e)))?;

    info!(
        repo_path = %config.repo_path.display(),
        collection = %config.collection,
        model = config.model.name,
        dimension = config.dimension,
        watch_mode = config.watch_mode,
        batch_size = config.batch_size,
        daily_limit = config.daily_limit,
        log_dir = %log_dir,
        "semcode backend starting"
    );

    let app_state = state::AppState::new(config).await?;

    routes::health::init_shutdown_notify();

    let app = server::create_app(app_state.clone());

    // Bind and serve before kicking off indexing so /health responds
    // immediately while the first (potentially long) run proceeds.
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("semcode backend listening on {}", addr);

    app_state.indexer.clone().trigger();

    let _watcher = if app_state.config.watch_mode {
        match watcher::start(
            &app_state.config,
            app_state.indexer.clone(),
            app_state.event_tx.clone(),
        ) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "file watching unavailable, continuing without it");
                None
            }
        }
    } else {
        info!("watch mode disabled, indexing on demand only");
        None
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain the active run and write a final checkpoint before exit.
    app_state.indexer.shutdown().await;

    info!("semcode backend shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install secondary Ctrl+C handler");
    };

    // Also wait for HTTP-based shutdown requests from supervisors.
    let http_shutdown = routes::health::wait_for_shutdown();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, initiating shutdown"); },
        _ = terminate => { info!("Received terminate signal, initiating shutdown"); },
        _ = http_shutdown => { info!("Received HTTP shutdown request, initiating shutdown"); },
    }

    info!("Shutdown signal received");
}
