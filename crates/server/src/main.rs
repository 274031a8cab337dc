use std::future::IntoFuture;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tollgate_limiter::NewTenant;
use tollgate_server::api::AppState;
use tollgate_server::config::{TollgateConfig, build_catalog};
use tollgate_server::error::ServerError;

/// Tollgate admission-control HTTP server.
#[derive(Parser, Debug)]
#[command(name = "tollgate", about = "Multi-tenant rate limiting HTTP server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "tollgate.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create one demo tenant per configured tier and print their API keys.
    Seed,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = TollgateConfig::load(&cli.config)?;
    let telemetry = tollgate_server::telemetry::init(&config.telemetry);

    let catalog = build_catalog(&config.tiers).map_err(|e| ServerError::Config(e.to_string()))?;
    let store = tollgate_server::state_factory::create_state(&config.state)?;
    let state = AppState::new(store, catalog, config.rate_limit.to_limiter_config())?;

    if let Some(Commands::Seed) = cli.command {
        let result = run_seed(&state, &config.state.backend).await;
        telemetry.shutdown();
        return result;
    }

    let limiter_config = state.limiter.config();
    info!(
        backend = %config.state.backend,
        tiers = state.catalog.len(),
        on_error = ?limiter_config.on_error,
        consistency = ?limiter_config.consistency,
        "admission control configured"
    );

    let app = tollgate_server::api::router(state);

    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "tollgate listening");

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    tokio::select! {
        result = server => result?,
        () = drain_deadline(shutdown_timeout) => {
            warn!(
                timeout_secs = config.server.shutdown_timeout_seconds,
                "shutdown timeout exceeded, dropping in-flight requests"
            );
        }
    }

    info!("tollgate shut down");
    telemetry.shutdown();
    Ok(())
}

async fn run_seed(state: &AppState, backend: &str) -> Result<(), Box<dyn std::error::Error>> {
    if backend == "memory" {
        warn!("seeding the in-memory store; tenants will not outlive this process");
    }

    for tier in state.catalog.iter() {
        let tenant = state
            .directory
            .create(NewTenant {
                name: format!("{} Demo Tenant", tier.name),
                email: Some(format!("{}@example.com", tier.name)),
                tier: Some(tier.name.clone()),
            })
            .await?;
        println!(
            "{:<12} {:<48} {} ({} rpm, burst {})",
            tenant.tier.as_str(),
            tenant.id.as_str(),
            tenant.api_key,
            tier.requests_per_minute,
            tier.burst_capacity
        );
    }
    Ok(())
}

/// Resolves `timeout` after a shutdown signal, bounding the graceful drain.
async fn drain_deadline(timeout: Duration) {
    shutdown_signal().await;
    tokio::time::sleep(timeout).await;
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
