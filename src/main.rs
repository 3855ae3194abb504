use anyhow::{Context, Result};
use bmc_exporter::{
    config::Config,
    credentials::{CredentialStore, TokenLifecycle, VaultClient},
    exporter::Services,
    ignored::IgnoredDevices,
    server,
};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/Default.toml")]
    config: String,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "EXPORTER_PORT")]
    port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long, env = "EXPORTER_ADDR")]
    addr: Option<String>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting BMC Prometheus Exporter v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    info!(
        "Configuration loaded: {} credential profiles, {} plugins",
        config.credentials.len(),
        config.plugins.len()
    );

    let (credentials, lifecycle) = match &config.vault {
        Some(vault) => {
            info!("Reading device credentials from Vault at {}", vault.address);
            let client = Arc::new(VaultClient::new(vault).context("Failed to build Vault client")?);
            let lifecycle = TokenLifecycle::start(Arc::clone(&client));
            let store = CredentialStore::with_backend(config.credentials.clone(), client);
            (store, Some(lifecycle))
        }
        None => (CredentialStore::new(config.credentials.clone()), None),
    };

    let services = Arc::new(
        Services::new(&config, Arc::new(credentials), Arc::new(IgnoredDevices::new()))
            .context("Invalid device configuration")?,
    );

    let result = server::start(config, services, shutdown_signal()).await;

    if let Some(lifecycle) = lifecycle {
        lifecycle.stop().await;
    }

    if let Err(e) = result {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
