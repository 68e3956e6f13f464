//! Lazy, once-per-process cache for the synthesis engine.
//!
//! Construction is expensive (ONNX model load, seconds). The cache runs it
//! in `spawn_blocking` at most once: concurrent first callers all await the
//! same in-flight load, and a load that failed with "unavailable" stays
//! failed for the process lifetime — later callers get the same outcome
//! immediately instead of retrying.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::warn;

use super::{SpeechError, Synthesizer};

/// Cached outcome: a shared engine, or the reason it could not be built.
type Slot = Result<Arc<dyn Synthesizer>, String>;

pub struct SynthesizerCache {
    slot: OnceCell<Slot>,
}

impl SynthesizerCache {
    pub fn new() -> Self {
        Self {
            slot: OnceCell::new(),
        }
    }

    /// Return the engine, constructing it on first use via `load`.
    ///
    /// `load` runs on the blocking thread pool. Its error is treated as the
    /// capability-unavailable condition and is logged exactly once.
    pub async fn get_or_load<F>(&self, load: F) -> Result<Arc<dyn Synthesizer>, SpeechError>
    where
        F: FnOnce() -> Result<Arc<dyn Synthesizer>, SpeechError> + Send + 'static,
    {
        let slot = self
            .slot
            .get_or_init(|| async {
                match tokio::task::spawn_blocking(load).await {
                    Ok(Ok(engine)) => Ok(engine),
                    Ok(Err(e)) => {
                        warn!("Synthesis engine unavailable: {e}");
                        Err(e.to_string())
                    }
                    Err(e) => {
                        warn!("Synthesis engine load task failed: {e}");
                        Err(format!("engine load task failed: {e}"))
                    }
                }
            })
            .await;

        match slot {
            Ok(engine) => Ok(engine.clone()),
            Err(reason) => Err(SpeechError::Unavailable(reason.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::speech::Waveform;

    struct NullSynth;

    impl Synthesizer for NullSynth {
        fn synthesize(&self, _text: &str) -> Result<Waveform, SpeechError> {
            Ok(Waveform {
                samples: vec![0.0],
                sample_rate: 24000,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_trigger_one_construction() {
        static LOADS: AtomicUsize = AtomicUsize::new(0);
        let cache = Arc::new(SynthesizerCache::new());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_load(|| {
                        LOADS.fetch_add(1, Ordering::SeqCst);
                        Ok(Arc::new(NullSynth) as Arc<dyn Synthesizer>)
                    })
                    .await
            }));
        }

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(LOADS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_is_sticky() {
        static LOADS: AtomicUsize = AtomicUsize::new(0);
        let cache = SynthesizerCache::new();

        let load = || {
            LOADS.fetch_add(1, Ordering::SeqCst);
            Err(SpeechError::Unavailable("model files missing".into()))
        };

        let first = cache.get_or_load(load).await;
        assert!(matches!(first, Err(SpeechError::Unavailable(_))));

        // Second call must not re-run construction.
        let second = cache
            .get_or_load(|| {
                LOADS.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(NullSynth) as Arc<dyn Synthesizer>)
            })
            .await;
        assert!(matches!(second, Err(SpeechError::Unavailable(_))));
        assert_eq!(LOADS.load(Ordering::SeqCst), 1);
    }
}
