//! Platform audio playback and the degraded speech fallback.
//!
//! Both are selected once at startup rather than branched per call:
//! - playback: afplay (macOS), aplay (Linux), PowerShell SoundPlayer
//!   (Windows) — each a blocking subprocess over a WAV file path;
//! - fallback: a plain "speak this text" utility (`say` on macOS, `espeak`
//!   or `spd-say` on Linux when installed, nothing on Windows), used only
//!   when the Kokoro engine is unavailable.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, info};

use super::SpeechError;

/// Plays an audio file out loud, blocking until playback finishes.
pub trait AudioPlayer: Send + Sync {
    fn play(&self, path: &Path) -> Result<(), SpeechError>;
}

/// Degraded text-to-speech via a platform utility.
pub trait FallbackSpeaker: Send + Sync {
    fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

/// `program file.wav` style player.
struct CommandPlayer {
    program: &'static str,
}

impl AudioPlayer for CommandPlayer {
    fn play(&self, path: &Path) -> Result<(), SpeechError> {
        debug!("Playing audio file via {}: {}", self.program, path.display());
        run_checked(Command::new(self.program).arg(path), self.program)
    }
}

/// Windows playback through the .NET SoundPlayer (no standalone CLI player
/// ships with the OS).
struct PowerShellPlayer;

impl AudioPlayer for PowerShellPlayer {
    fn play(&self, path: &Path) -> Result<(), SpeechError> {
        debug!("Playing audio file via PowerShell: {}", path.display());
        let script = format!(
            "(New-Object Media.SoundPlayer '{}').PlaySync()",
            path.display()
        );
        run_checked(
            Command::new("powershell").args(["-NoProfile", "-Command", &script]),
            "powershell",
        )
    }
}

/// `program text...` style speaker.
struct CommandSpeaker {
    program: &'static str,
}

impl FallbackSpeaker for CommandSpeaker {
    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        debug!("Speaking via {}", self.program);
        run_checked(Command::new(self.program).arg(text), self.program)
    }
}

fn run_checked(command: &mut Command, program: &str) -> Result<(), SpeechError> {
    let status = command
        .status()
        .map_err(|e| SpeechError::Playback(format!("failed to run {program}: {e}")))?;
    if !status.success() {
        return Err(SpeechError::Playback(format!(
            "{program} exited with {status}"
        )));
    }
    Ok(())
}

/// The playback primitive for the current OS, chosen once at startup.
pub fn default_player() -> Arc<dyn AudioPlayer> {
    if cfg!(target_os = "macos") {
        Arc::new(CommandPlayer { program: "afplay" })
    } else if cfg!(target_os = "windows") {
        Arc::new(PowerShellPlayer)
    } else {
        Arc::new(CommandPlayer { program: "aplay" })
    }
}

/// The fallback speech utility for the current OS, if one exists. Absence
/// is an answer, not an error: the pipeline reports "no backend" cleanly
/// instead of invoking a binary that isn't there.
pub fn detect_fallback() -> Option<Arc<dyn FallbackSpeaker>> {
    let candidates: &[&'static str] = if cfg!(target_os = "macos") {
        &["say"]
    } else if cfg!(target_os = "windows") {
        &[]
    } else {
        &["espeak", "spd-say"]
    };

    for program in candidates {
        if on_path(program) {
            info!("Fallback speech utility: {program}");
            return Some(Arc::new(CommandSpeaker { program }));
        }
    }
    None
}

/// Whether `program` resolves to an executable file on PATH.
fn on_path(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths)
        .map(|dir| dir.join(exe_name(program)))
        .any(|candidate| candidate.is_file())
}

fn exe_name(program: &str) -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from(format!("{program}.exe"))
    } else {
        PathBuf::from(program)
    }
}
