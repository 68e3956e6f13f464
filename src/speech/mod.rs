//! Speech output stack: Kokoro synthesis, lazy engine cache, platform
//! playback, and the notification pipeline tying them together.

pub mod cache;
pub mod engine;
pub mod pipeline;
pub mod playback;

use thiserror::Error;

/// Mono f32 audio produced by a synthesizer.
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Text-to-waveform synthesis. Implemented by the Kokoro engine; test
/// doubles implement it to observe pipeline behavior.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<Waveform, SpeechError>;
}

#[derive(Debug, Error)]
pub enum SpeechError {
    /// The synthesis engine could not be constructed (missing model assets
    /// or runtime). Recoverable: callers switch to the fallback utility.
    #[error("synthesis engine unavailable: {0}")]
    Unavailable(String),

    /// Neither the engine nor a platform fallback utility exists.
    #[error("no synthesis backend available: {0}")]
    NoBackend(String),

    /// The engine failed mid-generation.
    #[error("audio generation failed: {0}")]
    Synthesis(String),

    /// The platform player or fallback utility failed.
    #[error("audio playback failed: {0}")]
    Playback(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to write waveform: {0}")]
    Encode(#[from] hound::Error),
}
