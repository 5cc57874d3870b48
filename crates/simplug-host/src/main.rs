//! Simplug Host - runs a simulation plugin process.
//!
//! Loads a plugin manifest, serves the plugin RPC surface, and registers the
//! plugin with the simulation API until interrupted.

mod service;

use anyhow::{Context, Result};
use clap::Parser;
use service::HostService;
use simplug_core::{load_manifest, PluginServer, RegistrationClient, RegistrationConfig, RegistryConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "simplug-host")]
#[command(about = "Serve a simulation plugin and register it with the simulation API")]
struct Args {
    /// Path to the plugin manifest (JSON)
    #[arg(short, long, env = "SIMPLUG_MANIFEST")]
    manifest: PathBuf,

    /// Address the RPC server binds to (port 0 = auto-assign)
    #[arg(long, env = "SIMPLUG_LISTEN", default_value = "127.0.0.1:0")]
    listen: String,

    /// Address advertised to the API (defaults to the bound address)
    #[arg(long, env = "SIMPLUG_ADVERTISE")]
    advertise: Option<String>,

    /// Simulation API host
    #[arg(long, env = "SIMPLUG_API_HOST", default_value = RegistryConfig::DEFAULT_API_HOST)]
    api_host: String,

    /// Simulation API port
    #[arg(long, env = "SIMPLUG_API_PORT", default_value_t = RegistryConfig::DEFAULT_API_PORT)]
    api_port: u16,

    /// HTTP timeout for API calls, in seconds
    #[arg(long, env = "SIMPLUG_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Registration attempts before giving up
    #[arg(long, env = "SIMPLUG_MAX_RETRIES", default_value_t = 5)]
    max_retries: u32,

    /// Base delay between registration attempts, in milliseconds
    #[arg(long, env = "SIMPLUG_RETRY_DELAY_MS", default_value_t = 1000)]
    retry_delay_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let manifest = load_manifest(&args.manifest)
        .with_context(|| format!("loading manifest {}", args.manifest.display()))?;

    info!(
        "Starting plugin {} v{} ({})",
        manifest.id, manifest.version, manifest.plugin_type
    );

    let service = Arc::new(HostService::new(manifest.clone()));
    let mut server = PluginServer::start(&args.listen, service.clone())
        .await
        .with_context(|| format!("binding RPC server on {}", args.listen))?;

    let rpc_address = args
        .advertise
        .unwrap_or_else(|| server.addr().to_string());

    // Print the RPC address for supervising processes (intentional stdout)
    println!("RPC_ADDR={}", rpc_address);

    let config = RegistrationConfig::new()
        .with_api_host(args.api_host)
        .with_api_port(args.api_port)
        .with_timeout(Duration::from_secs(args.timeout_secs))
        .with_manifest(manifest)
        .with_rpc_address(rpc_address);

    let mut registration = RegistrationClient::new(config)?;
    registration
        .register_with_retries(args.max_retries, Duration::from_millis(args.retry_delay_ms))
        .await
        .context("registering with the simulation API")?;

    info!("Plugin registered, serving on {}", server.addr());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, unregistering");

    service.stop_serving();
    if let Err(e) = registration.unregister_plugin().await {
        warn!("Failed to unregister plugin: {}", e);
    }
    server.shutdown();

    Ok(())
}
