//! Durable player settings.
//!
//! The only setting that survives a restart is the volume: it is read once
//! at startup and written on every change, so the player comes back at the
//! level the user left it. Persistence failures are logged and swallowed;
//! losing a volume write must never interrupt playback.

use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Store for the persisted volume.
///
/// The player talks to this seam; the binary plugs in [`SettingsFile`] and
/// tests use an in-memory stand-in.
pub trait VolumeStore {
    fn load(&self) -> Option<u8>;
    fn save(&mut self, volume: u8);
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
struct Settings {
    volume: u8,
}

/// Settings persisted as a small TOML file.
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VolumeStore for SettingsFile {
    fn load(&self) -> Option<u8> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("could not read {}: {e}", self.path.display());
                return None;
            }
        };

        match toml::from_str::<Settings>(&contents) {
            Ok(settings) => Some(settings.volume),
            Err(e) => {
                warn!("{} is malformed: {e}", self.path.display());
                None
            }
        }
    }

    fn save(&mut self, volume: u8) {
        let settings = Settings { volume };
        let contents = match toml::to_string(&settings) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("could not serialize settings: {e}");
                return;
            }
        };

        if let Err(e) = fs::write(&self.path, contents) {
            warn!("could not write {}: {e}", self.path.display());
        }
    }
}
