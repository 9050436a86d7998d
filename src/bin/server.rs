//! HTTP server binary for speakwell.

use clap::Parser;
use speakwell::{SpeechConfig, SpeechServer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Speakwell: spoken English conversation practice server.
#[derive(Parser)]
#[command(name = "speakwell-server", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Suppress noisy dependency logs by default.
    // Users can override with RUST_LOG=debug to see everything.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("speakwell=info,tower_http=info,hf_hub=warn,ort=warn")
        }))
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => SpeechConfig::from_file(path)?,
        None => SpeechConfig::load_or_init(&SpeechConfig::default_config_path())?,
    };
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    println!("Speakwell v{}", env!("CARGO_PKG_VERSION"));

    // Phase 1: validate and load every model before accepting requests
    let models = speakwell::startup::initialize_models(&config).await?;
    let pipeline = models.into_pipeline(&config);

    // Phase 2: serve until Ctrl+C
    let server = SpeechServer::start(pipeline, &config.server).await?;
    println!("Ready at http://{}", server.addr());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server.shutdown();
    Ok(())
}
