//! Kokoro TTS engine: text → phonemes → ONNX inference → audio samples.
//!
//! Pipeline per sentence:
//! 1. Sentence → phonemes (misaki-rs G2P)
//! 2. Phonemes → token IDs (tokenizer.json vocabulary)
//! 3. Token IDs + voice style + speed → ONNX inference → f32 audio (24kHz)
//!
//! The engine is constructed once with a single preselected voice; callers
//! only ever see `synthesize`. Playback is someone else's job.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use ndarray::{Array2, Array3};
use ndarray_npy::NpzReader;
use ort::value::Tensor;
use tracing::{debug, info};

use super::{SpeechError, Synthesizer, Waveform};

const SAMPLE_RATE: u32 = 24000;
const MAX_TOKENS: usize = 510; // Voice style array first dimension
const SPEED: f32 = 1.0;

const MODEL_FILE: &str = "kokoro-v1.0.onnx";
const VOICES_FILE: &str = "voices-v1.0.bin";
const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct KokoroEngine {
    // ONNX model (Mutex because ort 2.0 Session::run needs &mut)
    session: Mutex<ort::session::Session>,

    // Phonemizer (misaki-rs G2P)
    phonemizer: misaki_rs::G2P,

    // Tokenizer vocabulary: char → token ID
    vocab: HashMap<char, i64>,

    // Style vectors for the configured voice, indexed by token count.
    // shape: (510, 256)
    styles: Array2<f32>,
}

impl KokoroEngine {
    /// Load the model, tokenizer, phonemizer, and the style array for
    /// `voice`. Blocking — may take seconds; run in spawn_blocking.
    ///
    /// Every load failure maps to `SpeechError::Unavailable` so the caller
    /// can take the fallback path instead of aborting.
    pub fn load(model_dir: &Path, voice: &str) -> Result<Self, SpeechError> {
        let t0 = Instant::now();

        let tokenizer_path = model_dir.join(TOKENIZER_FILE);
        info!("Loading tokenizer from {}", tokenizer_path.display());
        let vocab = load_tokenizer(&tokenizer_path)?;

        let voices_path = model_dir.join(VOICES_FILE);
        info!("Loading voice '{voice}' from {}", voices_path.display());
        let styles = load_voice_styles(&voices_path, voice)?;

        let model_path = model_dir.join(MODEL_FILE);
        info!("Loading ONNX model from {}", model_path.display());
        let session = ort::session::Session::builder()
            .map_err(|e| SpeechError::Unavailable(format!("ONNX session builder: {e}")))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| SpeechError::Unavailable(format!("optimization level: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| SpeechError::Unavailable(format!("thread count: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| {
                SpeechError::Unavailable(format!("{}: {e}", model_path.display()))
            })?;

        let phonemizer = misaki_rs::G2P::new(misaki_rs::Language::EnglishUS);

        info!("Kokoro TTS loaded in {}ms", t0.elapsed().as_millis());

        Ok(Self {
            session: Mutex::new(session),
            phonemizer,
            vocab,
            styles,
        })
    }

    /// Generate audio samples for a single sentence.
    fn generate_sentence(&self, text: &str) -> Result<Vec<f32>, SpeechError> {
        // 1. Text → phonemes via misaki-rs G2P
        let (phonemes, _tokens) = self
            .phonemizer
            .g2p(text)
            .map_err(|e| SpeechError::Synthesis(format!("phonemization failed: {e}")))?;

        if phonemes.is_empty() {
            return Ok(Vec::new());
        }

        // 2. Phonemes → token IDs, padded with 0 on both ends
        let mut token_ids: Vec<i64> = Vec::with_capacity(phonemes.len() + 2);
        token_ids.push(0);
        for ch in phonemes.chars() {
            if let Some(&id) = self.vocab.get(&ch) {
                token_ids.push(id);
            }
            // Unknown characters are skipped
        }
        token_ids.push(0);

        let n_tokens = token_ids.len().min(MAX_TOKENS);
        token_ids.truncate(n_tokens);

        // 3. Style vector for this token count (clamped to the array)
        let style_idx = (n_tokens.saturating_sub(2)).min(self.styles.nrows() - 1);
        let style_vec: Vec<f32> = self.styles.row(style_idx).to_vec();

        // 4. Build ONNX input tensors (ort 2.0: must convert to Tensor values)
        let tokens_array = Array2::from_shape_vec((1, n_tokens), token_ids)
            .map_err(|e| SpeechError::Synthesis(format!("tokens tensor: {e}")))?;
        let tokens_tensor = Tensor::from_array(tokens_array)
            .map_err(|e| SpeechError::Synthesis(format!("tokens ort tensor: {e}")))?;

        let style_array = Array2::from_shape_vec((1, 256), style_vec)
            .map_err(|e| SpeechError::Synthesis(format!("style tensor: {e}")))?;
        let style_tensor = Tensor::from_array(style_array)
            .map_err(|e| SpeechError::Synthesis(format!("style ort tensor: {e}")))?;

        let speed_array = ndarray::Array1::from_vec(vec![SPEED]);
        let speed_tensor = Tensor::from_array(speed_array)
            .map_err(|e| SpeechError::Synthesis(format!("speed ort tensor: {e}")))?;

        // 5. Run ONNX inference
        let mut session = self
            .session
            .lock()
            .map_err(|_| SpeechError::Synthesis("session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![
                "tokens" => tokens_tensor,
                "style" => style_tensor,
                "speed" => speed_tensor
            ])
            .map_err(|e| SpeechError::Synthesis(format!("ONNX inference failed: {e}")))?;

        // 6. Extract audio samples from output
        // ort 2.0: try_extract_tensor returns (&Shape, &[T]) tuple
        let first_output = outputs
            .iter()
            .next()
            .ok_or_else(|| SpeechError::Synthesis("no output tensor from model".into()))?;

        let (_shape, audio_slice) = first_output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| SpeechError::Synthesis(format!("extract audio tensor: {e}")))?;

        Ok(audio_slice.to_vec())
    }
}

impl Synthesizer for KokoroEngine {
    /// Synthesize the whole message, sentence by sentence, into one
    /// contiguous waveform. Long messages just take longer; nothing is
    /// truncated at this level.
    fn synthesize(&self, text: &str) -> Result<Waveform, SpeechError> {
        let mut samples = Vec::new();

        for sentence in split_sentences(text.trim()) {
            let t_gen = Instant::now();
            let sentence_samples = self.generate_sentence(sentence)?;
            debug!(
                "Generated {} samples in {}ms",
                sentence_samples.len(),
                t_gen.elapsed().as_millis()
            );
            samples.extend(sentence_samples);
        }

        Ok(Waveform {
            samples,
            sample_rate: SAMPLE_RATE,
        })
    }
}

// --- Helper functions ---

/// Load tokenizer vocabulary from tokenizer.json.
fn load_tokenizer(path: &Path) -> Result<HashMap<char, i64>, SpeechError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| SpeechError::Unavailable(format!("{}: {e}", path.display())))?;

    let data: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| SpeechError::Unavailable(format!("tokenizer JSON: {e}")))?;

    let vocab = data["model"]["vocab"]
        .as_object()
        .ok_or_else(|| SpeechError::Unavailable("missing model.vocab in tokenizer.json".into()))?;

    let mut map = HashMap::new();
    for (token, id) in vocab {
        let id = id
            .as_i64()
            .ok_or_else(|| SpeechError::Unavailable("token ID is not an integer".into()))?;
        // Each token is a single character
        if let Some(ch) = token.chars().next() {
            map.insert(ch, id);
        }
    }

    Ok(map)
}

/// Load the style array for one voice from the NPZ voices file.
fn load_voice_styles(path: &Path, voice: &str) -> Result<Array2<f32>, SpeechError> {
    let file = fs::File::open(path)
        .map_err(|e| SpeechError::Unavailable(format!("{}: {e}", path.display())))?;

    let mut npz = NpzReader::new(file)
        .map_err(|e| SpeechError::Unavailable(format!("NPZ voices file: {e}")))?;

    let npy_name = format!("{voice}.npy");
    let arr: Array3<f32> = npz.by_name(&npy_name).map_err(|e| {
        SpeechError::Unavailable(format!("voice '{voice}' not found in voices file: {e}"))
    })?;

    // Shape is (510, 1, 256). Squeeze the middle dimension to (510, 256).
    let dim0 = arr.shape()[0];
    let dim2 = arr.shape()[2];
    arr.into_shape_with_order((dim0, dim2))
        .map_err(|e| SpeechError::Unavailable(format!("reshape voice '{voice}': {e}")))
}

/// Split text into sentences at .!? boundaries.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        if (b == b'.' || b == b'!' || b == b'?')
            && i + 1 < bytes.len()
            && bytes[i + 1].is_ascii_whitespace()
        {
            let end = i + 1;
            let s = text[start..end].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = end;
        }
    }

    // Remainder
    let s = text[start..].trim();
    if !s.is_empty() {
        sentences.push(s);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::split_sentences;

    #[test]
    fn splits_on_terminators_followed_by_whitespace() {
        let parts = split_sentences("proj-x. Need an API key to continue! Which one?");
        assert_eq!(
            parts,
            vec!["proj-x.", "Need an API key to continue!", "Which one?"]
        );
    }

    #[test]
    fn keeps_inline_dots_together() {
        let parts = split_sentences("Check config.yaml first");
        assert_eq!(parts, vec!["Check config.yaml first"]);
    }

    #[test]
    fn empty_text_yields_no_sentences() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }
}
