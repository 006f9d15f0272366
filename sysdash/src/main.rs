//! sysdash server binary. Loads the service list and serves the dashboard.

use anyhow::Context;
use clap::Parser;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use tokio::{net::TcpListener, sync::watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sysdash::config::{Config, DEFAULT_CONFIG_PATH};
use sysdash::multiplexer::Cadence;
use sysdash::probe::ServiceProbe;
use sysdash::server::{router, shutdown_signal};
use sysdash::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "sysdash", version, about = "Live host metrics dashboard over server-sent events")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SYSDASH_PORT", default_value_t = 3333)]
    port: u16,

    /// Address to bind
    #[arg(long, env = "SYSDASH_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// YAML file listing services to probe
    #[arg(short, long, env = "SYSDASH_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory served under /static
    #[arg(long, env = "SYSDASH_STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    /// Dashboard page served at /
    #[arg(long, env = "SYSDASH_TEMPLATE", default_value = "templates/index.html")]
    template: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sysdash=info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    info!(services = config.services.len(), "loaded service list");

    let probe = ServiceProbe::new(config.probe_timeout()).context("failed to build HTTP client")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = AppState {
        config: Arc::new(config),
        probe,
        cadence: Cadence::default(),
        shutdown: shutdown_rx,
        template: args.template,
    };
    let app = router(state, &args.static_dir);

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("dashboard running at http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutting down");
            // Ends every open telemetry stream so graceful shutdown can finish.
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("server error")?;
    Ok(())
}
