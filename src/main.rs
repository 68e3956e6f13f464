//! talk-to-me-mcp: MCP server that lets an agent speak to the user via TTS
//! when it is blocked waiting for input.

mod config;
mod mcp_server;
mod speech;
mod toggle;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Args, Config};
use crate::mcp_server::ServerState;
use crate::speech::engine::KokoroEngine;
use crate::speech::pipeline::{EngineLoader, NotificationPipeline};
use crate::speech::{playback, Synthesizer};
use crate::toggle::FeatureToggle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::from_args(&args);

    // Initialize logging (suppress noisy ort/rmcp internals)
    let filter = if config.debug {
        EnvFilter::new("debug,ort=info,rmcp=info")
    } else {
        EnvFilter::new("info,ort=warn,rmcp=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("talk-to-me-server starting");

    let loader: EngineLoader = {
        let model_dir = config.model_dir.clone();
        let voice = config.voice.clone();
        Arc::new(move || {
            KokoroEngine::load(&model_dir, &voice).map(|e| Arc::new(e) as Arc<dyn Synthesizer>)
        })
    };

    let pipeline = NotificationPipeline::new(
        loader,
        playback::default_player(),
        playback::detect_fallback(),
    );

    // Pre-load the TTS model for faster first response
    info!("Pre-loading TTS model (voice: {})...", config.voice);
    if let Err(e) = pipeline.warm_up().await {
        warn!("Could not pre-load TTS model: {e}");
        warn!("Will fall back to a platform speech utility if available");
    }

    let toggle = FeatureToggle::new(config.marker_path.clone());
    info!("State file: {}", toggle.marker_path().display());
    match toggle.is_enabled() {
        Ok(enabled) => info!("Feature enabled: {enabled}"),
        Err(e) => warn!("Could not read feature state: {e}"),
    }

    let state = Arc::new(ServerState { toggle, pipeline });

    // Bind failure is fatal; everything after this degrades gracefully.
    let addr = SocketAddr::new(config.host, config.port);
    let ct = mcp_server::serve(state, addr).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    ct.cancel();

    Ok(())
}
