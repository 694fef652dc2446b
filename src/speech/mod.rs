//! Speech backends: an on-device voice and a remote synthesis server.

pub mod audio;
pub mod local;
pub mod remote;

use local::LocalVoice;
use remote::SynthesisClient;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Backend preference from config or the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeechMode {
    #[default]
    Auto,
    Local,
    Remote,
}

impl SpeechMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SpeechMode::Auto => "auto",
            SpeechMode::Local => "local",
            SpeechMode::Remote => "remote",
        }
    }
}

/// Backend actually used for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Local,
    Remote,
}

/// Pick a backend. `auto` prefers a local voice with at least one installed
/// voice, then a reachable server. Explicit modes are taken as given; their
/// failures surface when playback starts.
pub fn resolve_backend(
    mode: SpeechMode,
    voice: &dyn LocalVoice,
    server: Option<&SynthesisClient>,
) -> Option<Backend> {
    match mode {
        SpeechMode::Local => Some(Backend::Local),
        SpeechMode::Remote => server.map(|_| Backend::Remote),
        SpeechMode::Auto => {
            match voice.voices() {
                Ok(voices) if !voices.is_empty() => {
                    info!(count = voices.len(), "Using local voice");
                    return Some(Backend::Local);
                }
                Ok(_) => warn!("Local voice reports no voices"),
                Err(err) => warn!("Local voice unavailable: {err:#}"),
            }
            let server = server?;
            match server.health() {
                Ok(()) => {
                    info!(url = server.base_url(), "Using synthesis server");
                    Some(Backend::Remote)
                }
                Err(err) => {
                    warn!("Synthesis server unavailable: {err:#}");
                    None
                }
            }
        }
    }
}
