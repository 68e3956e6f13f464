//! Runtime configuration for talk-to-me-mcp.
//!
//! Precedence: command-line argument > environment variable > built-in
//! default. The environment fallbacks are handled by clap's `env` attribute,
//! so the resolved `Args` already reflect the full chain.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

/// Marker file name inside the state directory.
const ENABLED_MARKER: &str = "enabled";

/// Subdirectory of the per-user state dir holding our marker.
const STATE_SUBDIR: &str = "talk-to-me-mcp";

#[derive(Parser, Debug)]
#[command(name = "talk-to-me-server", about = "Talk-to-me MCP server")]
pub struct Args {
    /// Voice to use for TTS
    #[arg(long, env = "TALK_TO_ME_VOICE", default_value = "af_heart")]
    pub voice: String,

    /// Address to listen on
    #[arg(long, env = "TALK_TO_ME_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "TALK_TO_ME_PORT", default_value_t = 8347)]
    pub port: u16,

    /// State directory for the enabled flag (default: ~/.local/state/talk-to-me-mcp)
    #[arg(short = 'd', long = "directory", env = "TALK_TO_ME_STATE_DIR")]
    pub directory: Option<PathBuf>,

    /// Directory containing the Kokoro model assets (default: current dir)
    #[arg(long, env = "TALK_TO_ME_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Resolved configuration, built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub voice: String,
    pub host: IpAddr,
    pub port: u16,
    /// Full path of the enabled marker file.
    pub marker_path: PathBuf,
    pub model_dir: PathBuf,
    pub debug: bool,
}

impl Config {
    pub fn from_args(args: &Args) -> Self {
        let state_dir = args.directory.clone().unwrap_or_else(default_state_dir);

        let model_dir = args
            .model_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            voice: args.voice.clone(),
            host: args.host,
            port: args.port,
            marker_path: state_dir.join(ENABLED_MARKER),
            model_dir,
            debug: args.debug,
        }
    }
}

/// `$XDG_STATE_HOME/talk-to-me-mcp`, falling back to
/// `~/.local/state/talk-to-me-mcp`. Shared with any external tool that flips
/// the marker, so the layout must stay stable.
fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .unwrap_or_else(|| PathBuf::from(".local/state"))
        .join(STATE_SUBDIR)
}
