use bizcalc_onboard::config::Config;
use bizcalc_onboard::orchestrator::Provisioner;
use bizcalc_onboard::server::{OnboardServer, PKG_NAME, VERSION};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bizcalc_onboard=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration; the service is usable with defaults alone
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("onboard.toml"));

    let config = if config_path.exists() {
        let config = Config::load(&config_path).map_err(|e| {
            error!(path = %config_path.display(), error = %e, "Failed to load configuration");
            e
        })?;
        info!(path = %config_path.display(), "Configuration loaded");
        config
    } else {
        info!(path = %config_path.display(), "No configuration file found, using defaults");
        Config::default()
    };

    print_startup_banner(&config);

    // The create operation writes units and rules and drives systemctl;
    // without root those steps will fail on their own
    #[cfg(unix)]
    if unsafe { libc::geteuid() } != 0 {
        warn!("Not running as root; privileged filesystem and service operations will fail");
    }

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .map_err(|e| {
            error!(bind = %config.server.bind, port = config.server.port, error = %e, "Invalid bind address");
            anyhow::anyhow!("Invalid bind address: {}", e)
        })?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let provisioner = Arc::new(Provisioner::for_host(config));
    let server = OnboardServer::new(bind_addr, provisioner, shutdown_rx);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "Onboarding server error");
        }
    });

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }

    // Signal shutdown and wait for the server to stop (with timeout)
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;

    info!("Shutdown complete");
    Ok(())
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting onboarding service");
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        "Server configuration"
    );
    info!(
        base_dir = %config.paths.base_dir.display(),
        backend_binary = %config.paths.backend_binary().display(),
        frontend_dist = %config.paths.frontend_dist().display(),
        run_as = %config.paths.run_as,
        "Deployment layout"
    );
    info!(
        systemd_dir = %config.paths.systemd_dir.display(),
        sites_available = %config.paths.sites_available.display(),
        sites_enabled = %config.paths.sites_enabled.display(),
        "Host catalogs"
    );
    info!(
        start = config.ports.start,
        end = config.ports.end,
        "Backend port range"
    );
}
