//! Small on-disk store under `.cache/`.
//!
//! `state.toml` keeps the signed-in user, the last sync time and the
//! user-chosen TTS server. Synthesized audio is kept in `audio/`, named by a
//! hash of the server, the text and the rate so repeated chunks skip the
//! network.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CACHE_DIR: &str = ".cache";
const STATE_FILE: &str = "state.toml";
const AUDIO_DIR: &str = "audio";

/// Persisted key-value state. Every field is optional; an unreadable file is
/// treated as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_server_url: Option<String>,
}

impl LocalState {
    pub fn load() -> Self {
        Self::load_from(Path::new(CACHE_DIR))
    }

    pub fn load_from(root: &Path) -> Self {
        let path = root.join(STATE_FILE);
        let Ok(data) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&data) {
            Ok(state) => state,
            Err(err) => {
                warn!(path = %path.display(), "Ignoring unreadable local state: {err}");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Path::new(CACHE_DIR))
    }

    pub fn save_to(&self, root: &Path) -> Result<()> {
        fs::create_dir_all(root)
            .with_context(|| format!("Creating cache dir {}", root.display()))?;
        let path = root.join(STATE_FILE);
        let contents = toml::to_string(self).context("Serializing local state")?;
        fs::write(&path, contents).with_context(|| format!("Writing {}", path.display()))?;
        debug!(path = %path.display(), "Saved local state");
        Ok(())
    }

    pub fn is_signed_in(&self) -> bool {
        self.auth_token.is_some()
    }

    pub fn clear_auth(&mut self) {
        self.auth_token = None;
        self.user_email = None;
        self.user_name = None;
    }
}

pub fn audio_dir(root: &Path) -> PathBuf {
    root.join(AUDIO_DIR)
}

pub fn audio_cache_path(dir: &Path, server_url: &str, text: &str, rate: f32) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(server_url.as_bytes());
    hasher.update(text.as_bytes());
    hasher.update(rate.to_le_bytes());
    let hash = format!("{:x}", hasher.finalize());
    dir.join(format!("tts-{hash}.audio"))
}
