//! Notification pipeline: turn a message into sound, whatever it takes.
//!
//! Preferred path: Kokoro engine (lazily loaded through the cache) →
//! waveform → transient WAV file → platform player. Degraded path: the
//! platform's own speech utility when the engine is unavailable. The
//! transient WAV lives in a `NamedTempFile`, so it is removed when the scope
//! ends even if playback fails partway.

use std::sync::Arc;

use tracing::{debug, info};

use super::cache::SynthesizerCache;
use super::playback::{AudioPlayer, FallbackSpeaker};
use super::{SpeechError, Synthesizer, Waveform};

/// Builds the synthesis engine on first use. Stored rather than passed per
/// call so the pipeline owns the whole lazy-init story.
pub type EngineLoader =
    Arc<dyn Fn() -> Result<Arc<dyn Synthesizer>, SpeechError> + Send + Sync>;

pub struct NotificationPipeline {
    cache: SynthesizerCache,
    loader: EngineLoader,
    player: Arc<dyn AudioPlayer>,
    fallback: Option<Arc<dyn FallbackSpeaker>>,
}

impl NotificationPipeline {
    pub fn new(
        loader: EngineLoader,
        player: Arc<dyn AudioPlayer>,
        fallback: Option<Arc<dyn FallbackSpeaker>>,
    ) -> Self {
        Self {
            cache: SynthesizerCache::new(),
            loader,
            player,
            fallback,
        }
    }

    /// Trigger the engine load ahead of the first request. Failure here is
    /// not fatal — the fallback path still stands.
    pub async fn warm_up(&self) -> Result<(), SpeechError> {
        let loader = self.loader.clone();
        self.cache.get_or_load(move || loader()).await.map(|_| ())
    }

    /// Speak `message` out loud. Blocks (on the blocking pool) until the
    /// audio has finished playing. Concurrent calls run their own pipelines;
    /// only the first-use engine construction is serialized by the cache.
    pub async fn speak(&self, message: &str) -> Result<(), SpeechError> {
        let loader = self.loader.clone();
        match self.cache.get_or_load(move || loader()).await {
            Ok(engine) => self.synthesize_and_play(engine, message).await,
            Err(SpeechError::Unavailable(reason)) => self.speak_degraded(message, reason).await,
            Err(e) => Err(e),
        }
    }

    async fn synthesize_and_play(
        &self,
        engine: Arc<dyn Synthesizer>,
        message: &str,
    ) -> Result<(), SpeechError> {
        let player = self.player.clone();
        let message = message.to_string();

        tokio::task::spawn_blocking(move || {
            let waveform = engine.synthesize(&message)?;
            if waveform.samples.is_empty() {
                debug!("Nothing to play (empty waveform)");
                return Ok(());
            }

            let wav = tempfile::Builder::new()
                .prefix("talk-to-me-")
                .suffix(".wav")
                .tempfile()?;
            write_wav(&wav, &waveform)?;

            // The temp file is dropped (and unlinked) on every exit from
            // this closure, including playback errors.
            player.play(wav.path())
        })
        .await
        .map_err(|e| SpeechError::Playback(format!("speech task failed: {e}")))?
    }

    async fn speak_degraded(&self, message: &str, reason: String) -> Result<(), SpeechError> {
        let Some(fallback) = self.fallback.clone() else {
            return Err(SpeechError::NoBackend(reason));
        };

        info!("Using fallback speech utility ({reason})");
        let message = message.to_string();
        tokio::task::spawn_blocking(move || fallback.speak(&message))
            .await
            .map_err(|e| SpeechError::Playback(format!("fallback task failed: {e}")))?
    }
}

/// Write mono f32 samples as a WAV file.
fn write_wav(file: &tempfile::NamedTempFile, waveform: &Waveform) -> Result<(), SpeechError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(file.path(), spec)?;
    for &sample in &waveform.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    debug!(
        "Wrote {} samples ({:.1}s) to {}",
        waveform.samples.len(),
        waveform.samples.len() as f32 / waveform.sample_rate as f32,
        file.path().display()
    );
    Ok(())
}
