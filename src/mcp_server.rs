//! MCP server for talk-to-me using rmcp.
//!
//! Exposes four tools to the agent:
//! - speak_to_user_for_input
//! - enable_talk_to_me, disable_talk_to_me
//! - check_talk_to_me_status
//!
//! Tools never surface protocol errors: every outcome — success, disabled
//! feature, broken audio stack — comes back as descriptive text, which is
//! what an agent on the other end of the wire can actually act on.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rmcp::handler::server::tool::{Parameters, ToolRouter};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::transport::sse_server::SseServerConfig;
use rmcp::transport::SseServer;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::speech::pipeline::NotificationPipeline;
use crate::toggle::FeatureToggle;

const SERVER_INSTRUCTIONS: &str = "\
    This server provides text-to-speech capabilities for notifying users when input is needed.\n\
    \n\
    IMPORTANT: The speak-to-user-for-input tool should ONLY be called when:\n\
    1. The user has enabled the feature by typing 'talk to me' or using /talk-to-me\n\
    2. You (the agent) are blocked waiting for user input to continue\n\
    \n\
    Use this tool sparingly - only when you genuinely need user input to proceed.";

/// Everything the tools share. Kept separate from the rmcp handler so the
/// dispatch logic is testable without a transport.
pub struct ServerState {
    pub toggle: FeatureToggle,
    pub pipeline: NotificationPipeline,
}

impl ServerState {
    /// Speak `"{agent_id}. {summary}"` if the feature is enabled. Always
    /// resolves to a descriptive string, never an error.
    pub async fn notify(&self, summary: &str, agent_id: &str) -> String {
        match self.toggle.is_enabled() {
            Ok(false) => {
                warn!("Tool called but feature is not enabled");
                "Talk-to-me feature is not enabled. The user must first type 'talk to me' \
                 or use /talk-to-me to enable it."
                    .to_string()
            }
            Err(e) => format!("Failed to check talk-to-me state: {e}"),
            Ok(true) => {
                let message = format!("{agent_id}. {summary}");
                match self.pipeline.speak(&message).await {
                    Ok(()) => {
                        info!("Successfully spoke to user");
                        format!("Spoke to user: {message}")
                    }
                    Err(e) => {
                        warn!("Failed to speak: {e}");
                        format!("Failed to speak: {e}")
                    }
                }
            }
        }
    }

    pub fn enable(&self) -> String {
        match self.toggle.enable() {
            Ok(()) => "Talk-to-me feature enabled. The agent can now speak to you when \
                       input is needed."
                .to_string(),
            Err(e) => format!("Failed to enable talk-to-me: {e}"),
        }
    }

    pub fn disable(&self) -> String {
        match self.toggle.disable() {
            Ok(()) => "Talk-to-me feature disabled. The agent will no longer speak to you."
                .to_string(),
            Err(e) => format!("Failed to disable talk-to-me: {e}"),
        }
    }

    pub fn status(&self) -> String {
        match self.toggle.is_enabled() {
            Ok(true) => "Talk-to-me feature is ENABLED. The agent can speak to you when \
                         input is needed."
                .to_string(),
            Ok(false) => "Talk-to-me feature is DISABLED. Use /talk-to-me or \
                          enable_talk_to_me to enable it."
                .to_string(),
            Err(e) => format!("Failed to check talk-to-me state: {e}"),
        }
    }
}

// --- Tool parameter structs ---

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct SpeakToUserRequest {
    #[schemars(description = "A concise summary (1-2 sentences) of the current state or what input is needed. Keep it brief - this will be spoken aloud.")]
    pub summary: String,
    #[schemars(description = "A short identifier for context - e.g., the project name, current task, or session purpose. Should be intelligible to a human hearing it spoken.")]
    pub agent_id: String,
}

// --- MCP Server handler ---

#[derive(Clone)]
pub struct TalkToMeServer {
    state: Arc<ServerState>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TalkToMeServer {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self {
            state,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Speak to the user via TTS when input is needed to continue. Only use this when you are blocked and cannot proceed without user input.\n\nArgs:\n    summary: A concise summary (1-2 sentences) of what input is needed\n    agent_id: A short context identifier (project name, task, or session purpose)")]
    async fn speak_to_user_for_input(
        &self,
        Parameters(req): Parameters<SpeakToUserRequest>,
    ) -> Result<CallToolResult, McpError> {
        let preview: String = req.summary.chars().take(50).collect();
        info!(
            "speak_to_user_for_input called | agent_id={} summary={preview}",
            req.agent_id
        );
        let text = self.state.notify(&req.summary, &req.agent_id).await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(description = "Enable the talk-to-me feature. This allows the speak_to_user_for_input tool to function. The user should invoke this (or use /talk-to-me) to opt-in to spoken notifications.")]
    async fn enable_talk_to_me(&self) -> Result<CallToolResult, McpError> {
        info!("enable_talk_to_me called");
        Ok(CallToolResult::success(vec![Content::text(
            self.state.enable(),
        )]))
    }

    #[tool(description = "Disable the talk-to-me feature. This prevents the speak_to_user_for_input tool from producing audio.")]
    async fn disable_talk_to_me(&self) -> Result<CallToolResult, McpError> {
        info!("disable_talk_to_me called");
        Ok(CallToolResult::success(vec![Content::text(
            self.state.disable(),
        )]))
    }

    #[tool(description = "Check if the talk-to-me feature is currently enabled.")]
    async fn check_talk_to_me_status(&self) -> Result<CallToolResult, McpError> {
        let status = self.state.status();
        info!("check_talk_to_me_status called | {status}");
        Ok(CallToolResult::success(vec![Content::text(status)]))
    }
}

#[tool_handler]
impl ServerHandler for TalkToMeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Start the MCP SSE server. Binding failure is the one fatal condition and
/// propagates to the caller.
pub async fn serve(
    state: Arc<ServerState>,
    addr: SocketAddr,
) -> std::io::Result<CancellationToken> {
    let config = SseServerConfig {
        bind: addr,
        sse_path: "/sse".to_string(),
        post_path: "/message".to_string(),
        ct: CancellationToken::new(),
        sse_keep_alive: Some(Duration::from_secs(15)),
    };

    let sse_server = SseServer::serve_with_config(config)
        .await
        .map_err(std::io::Error::other)?;
    info!("MCP SSE server listening on http://{addr}/sse");

    Ok(sse_server.with_service(move || TalkToMeServer::new(state.clone())))
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::speech::pipeline::EngineLoader;
    use crate::speech::playback::AudioPlayer;
    use crate::speech::{SpeechError, Synthesizer, Waveform};

    struct BeepSynth;

    impl Synthesizer for BeepSynth {
        fn synthesize(&self, _text: &str) -> Result<Waveform, SpeechError> {
            Ok(Waveform {
                samples: vec![0.2; 32],
                sample_rate: 24000,
            })
        }
    }

    struct SilentPlayer {
        plays: Mutex<Vec<std::path::PathBuf>>,
    }

    impl AudioPlayer for SilentPlayer {
        fn play(&self, path: &Path) -> Result<(), SpeechError> {
            self.plays.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    struct Fixture {
        state: ServerState,
        loads: Arc<AtomicUsize>,
        player: Arc<SilentPlayer>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let loads = Arc::new(AtomicUsize::new(0));
        let player = Arc::new(SilentPlayer {
            plays: Mutex::new(Vec::new()),
        });

        let loader: EngineLoader = {
            let loads = loads.clone();
            Arc::new(move || {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(BeepSynth) as Arc<dyn Synthesizer>)
            })
        };

        let state = ServerState {
            toggle: FeatureToggle::new(dir.path().join("enabled")),
            pipeline: NotificationPipeline::new(loader, player.clone(), None),
        };

        Fixture {
            state,
            loads,
            player,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn notify_while_disabled_returns_guidance_without_synthesis() {
        let fx = fixture();

        let result = fx.state.notify("need API key", "proj-x").await;

        assert!(result.contains("not enabled"));
        assert!(result.contains("/talk-to-me"));
        assert_eq!(fx.loads.load(Ordering::SeqCst), 0);
        assert!(fx.player.plays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notify_while_enabled_speaks_the_prefixed_message() {
        let fx = fixture();
        fx.state.enable();

        let result = fx.state.notify("need API key", "proj-x").await;

        assert_eq!(result, "Spoke to user: proj-x. need API key");
        assert_eq!(fx.loads.load(Ordering::SeqCst), 1);
        assert_eq!(fx.player.plays.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_agent_id_is_accepted() {
        let fx = fixture();
        fx.state.enable();

        let result = fx.state.notify("need API key", "").await;
        assert_eq!(result, "Spoke to user: . need API key");
    }

    #[tokio::test]
    async fn notify_with_broken_audio_stack_returns_a_failure_string() {
        let dir = tempfile::tempdir().unwrap();
        let loader: EngineLoader =
            Arc::new(|| Err(SpeechError::Unavailable("model files missing".into())));
        let state = ServerState {
            toggle: FeatureToggle::new(dir.path().join("enabled")),
            pipeline: NotificationPipeline::new(
                loader,
                Arc::new(SilentPlayer {
                    plays: Mutex::new(Vec::new()),
                }),
                None,
            ),
        };
        state.enable();

        let result = state.notify("need API key", "proj-x").await;
        assert!(result.starts_with("Failed to speak:"));
        assert!(result.contains("no synthesis backend available"));
    }

    #[tokio::test]
    async fn status_reflects_the_last_toggle_call() {
        let fx = fixture();

        assert!(fx.state.status().contains("DISABLED"));

        fx.state.enable();
        fx.state.disable();
        fx.state.enable();
        assert!(fx.state.status().contains("ENABLED"));

        fx.state.disable();
        assert!(fx.state.status().contains("DISABLED"));
    }

    #[tokio::test]
    async fn enable_and_disable_are_idempotent_through_dispatch() {
        let fx = fixture();

        assert!(fx.state.enable().contains("enabled"));
        assert!(fx.state.enable().contains("enabled"));
        assert!(fx.state.status().contains("ENABLED"));

        assert!(fx.state.disable().contains("disabled"));
        assert!(fx.state.disable().contains("disabled"));
        assert!(fx.state.status().contains("DISABLED"));
    }
}
