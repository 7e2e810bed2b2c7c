//! Registry server - HTTP backend for the content-addressed model registry.

mod handlers;
mod server;

use anyhow::Result;
use clap::Parser;
use registry_core::config::RegistryConfig;
use registry_core::Registry;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "registry-server")]
#[command(about = "HTTP server for the content-addressed model registry")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Root directory the registry stores artifacts and its catalog under
    /// (defaults to `~/.registry`)
    #[arg(long)]
    base_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting registry server");

    let base_path = args.base_path.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".registry-data")
    });
    info!("Registry base path: {}", base_path.display());

    let registry = Registry::open(RegistryConfig::new(&base_path))?;

    let addr = server::start_server(registry, &args.host, args.port).await?;

    // Intentional stdout line for supervising processes to read the bound port.
    println!("REGISTRY_PORT={}", addr.port());
    info!("Registry server running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
