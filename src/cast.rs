//! Cast relay client and the bookkeeping for relayed playback.
//!
//! The relay plays forwarded audio on a remote device and never reports a
//! position back, so chunk length and word pacing are estimated locally.

use crate::playback::timers::TimerId;
use crate::speech::audio::AudioClip;
use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client, multipart};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_WORDS_PER_MINUTE: u32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastAction {
    Play,
    Pause,
    Stop,
}

impl CastAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CastAction::Play => "play",
            CastAction::Pause => "pause",
            CastAction::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CastStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Serialize)]
struct ControlRequest {
    action: CastAction,
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    http: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Building relay HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/cast/{path}", self.base_url)
    }

    pub fn status(&self) -> Result<CastStatus> {
        let url = self.url("status");
        let response = self
            .http
            .get(&url)
            .send()
            .with_context(|| format!("Requesting {url}"))?;
        if !response.status().is_success() {
            return Ok(CastStatus::default());
        }
        response.json().context("Parsing cast status")
    }

    /// Upload one chunk of audio for the relay to play.
    pub fn cast_audio(&self, clip: &AudioClip) -> Result<()> {
        let part = multipart::Part::bytes(clip.bytes().to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .context("Building cast upload")?;
        let form = multipart::Form::new().part("audio", part);
        let url = self.url("cast_data");
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .with_context(|| format!("Uploading to {url}"))?;
        if !response.status().is_success() {
            bail!("Cast failed ({})", response.status());
        }
        info!(bytes = clip.len(), "Chunk sent to cast relay");
        Ok(())
    }

    pub fn control(&self, action: CastAction) -> Result<()> {
        let url = self.url("control");
        let response = self
            .http
            .post(&url)
            .json(&ControlRequest { action })
            .send()
            .with_context(|| format!("Sending {} to {url}", action.as_str()))?;
        if !response.status().is_success() {
            bail!("Cast {} rejected ({})", action.as_str(), response.status());
        }
        debug!(action = action.as_str(), "Cast control sent");
        Ok(())
    }

    pub fn disconnect(&self) -> Result<()> {
        let url = self.url("disconnect");
        let response = self
            .http
            .post(&url)
            .send()
            .with_context(|| format!("Requesting {url}"))?;
        if !response.status().is_success() {
            bail!("Cast disconnect rejected ({})", response.status());
        }
        Ok(())
    }
}

/// Relay connection flag plus every timer scheduled on its behalf.
#[derive(Debug, Clone, Default)]
pub struct CastSession {
    connected: bool,
    pending: BTreeSet<TimerId>,
}

impl CastSession {
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn track(&mut self, id: TimerId) {
        self.pending.insert(id);
    }

    /// Forget a timer that fired. Returns false for unknown ids.
    pub fn settle(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Take every pending timer so the caller can cancel them.
    pub fn drain(&mut self) -> Vec<TimerId> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

/// Spoken length of `words` at `wpm`.
pub fn estimate_chunk_duration(words: usize, wpm: u32) -> Duration {
    Duration::from_secs_f64(words as f64 * 60.0 / wpm.max(1) as f64)
}

pub fn word_duration(wpm: u32) -> Duration {
    estimate_chunk_duration(1, wpm)
}

/// Word index reached after `seconds` of playback at `wpm` scaled by `rate`.
pub fn seconds_to_words(seconds: f64, wpm: u32, rate: f32) -> usize {
    let per_second = wpm as f64 * rate.max(0.01) as f64 / 60.0;
    (seconds.max(0.0) * per_second).floor() as usize
}

pub fn words_to_seconds(words: usize, wpm: u32, rate: f32) -> f64 {
    let per_second = wpm as f64 * rate.max(0.01) as f64 / 60.0;
    words as f64 / per_second
}
