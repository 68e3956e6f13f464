//! Durable on/off toggle backed by a marker file.
//!
//! The marker's existence is the whole state: present means enabled. The
//! file is shared with the plugin command that flips it from outside this
//! process, so every check re-reads the filesystem — nothing is cached.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::debug;

pub struct FeatureToggle {
    marker_path: PathBuf,
}

impl FeatureToggle {
    pub fn new(marker_path: PathBuf) -> Self {
        Self { marker_path }
    }

    pub fn marker_path(&self) -> &std::path::Path {
        &self.marker_path
    }

    /// True iff the marker file exists. A clean "not found" is `Ok(false)`;
    /// any other I/O failure (e.g. permission denied on the state dir)
    /// propagates so the caller can report it.
    pub fn is_enabled(&self) -> io::Result<bool> {
        self.marker_path.try_exists()
    }

    /// Create the marker, and its parent directories if needed. Idempotent.
    pub fn enable(&self) -> io::Result<()> {
        if let Some(parent) = self.marker_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::File::create(&self.marker_path)?;
        debug!("Enabled marker written: {}", self.marker_path.display());
        Ok(())
    }

    /// Remove the marker if present. Removing an absent marker is a no-op.
    pub fn disable(&self) -> io::Result<()> {
        match fs::remove_file(&self.marker_path) {
            Ok(()) => {
                debug!("Enabled marker removed: {}", self.marker_path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toggle_in(dir: &tempfile::TempDir) -> FeatureToggle {
        FeatureToggle::new(dir.path().join("state/enabled"))
    }

    #[test]
    fn disabled_by_default() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!toggle_in(&dir).is_enabled().unwrap());
    }

    #[test]
    fn last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let toggle = toggle_in(&dir);

        toggle.enable().unwrap();
        toggle.disable().unwrap();
        toggle.enable().unwrap();
        assert!(toggle.is_enabled().unwrap());

        toggle.disable().unwrap();
        assert!(!toggle.is_enabled().unwrap());
    }

    #[test]
    fn enable_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let toggle = toggle_in(&dir);

        toggle.enable().unwrap();
        toggle.enable().unwrap();
        assert!(toggle.is_enabled().unwrap());
    }

    #[test]
    fn disable_when_already_disabled_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let toggle = toggle_in(&dir);

        toggle.disable().unwrap();
        assert!(!toggle.is_enabled().unwrap());
    }

    #[test]
    fn state_survives_a_fresh_store_on_the_same_path() {
        let dir = tempfile::tempdir().unwrap();
        toggle_in(&dir).enable().unwrap();

        // A new instance (as after a process restart) sees the same marker.
        assert!(toggle_in(&dir).is_enabled().unwrap());
    }
}
