//! Console proxy server binary

use anyhow::{Context, Result};
use clap::Parser;
use iot_console_server::{AppState, Args, Config, build_router};
use tokio::net::TcpListener;
use tracing::{Level, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    info!("IoT console server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_args(args)?;
    info!("Backend: {}", config.upstream_url);
    if !config.secure_cookies {
        info!("Serving session cookies without the Secure flag");
    }

    let bind = config.bind;
    let state = AppState::new(config)?;
    let router = build_router(state);

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, shutting down gracefully...");
            }
        })
        .await
        .context("Server error")?;

    Ok(())
}
