use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};
use vitals_core::VitalsConfig;

use vitals_server::server;
use vitals_server::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "vitals.toml")]
    config: String,

    /// Check provider and trace store wiring, then exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match VitalsConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG directives are extended by service.log_level
    let level: Directive = config
        .service
        .log_level
        .parse()
        .unwrap_or_else(|_| tracing::Level::INFO.into());
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level))
        .init();

    let state = match AppState::from_config(config).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to initialise: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        println!(
            "✅ Provider: {} ({})",
            state.invoker.name(),
            state.options.model
        );
        match state.store.list_sessions().await {
            Ok(sessions) => println!(
                "✅ Trace store ({}): {} sessions",
                state.store.name(),
                sessions.len()
            ),
            Err(e) => {
                println!("❌ Trace store ({}) failed: {}", state.store.name(), e);
                std::process::exit(1);
            }
        }
        println!("✅ Vitals health check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Trace retention loop
    tokio::spawn(vitals_server::subsystems::retention::run_retention_loop(
        state.store.clone(),
        state.config.trace.clone(),
        tx.subscribe(),
    ));

    // HTTP REST API, if enabled
    if state.config.http.enabled {
        let http_state = state.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = vitals_server::http::start_http_server(http_state, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = state.config.service.socket_path.clone();
    server::run_unix_server(&socket_path, state, tx.subscribe()).await?;

    Ok(())
}
