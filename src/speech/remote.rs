//! Client for the remote synthesis server.

use super::audio::AudioClip;
use crate::cache;
use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::Serialize;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    rate: f32,
}

#[derive(Debug, Clone)]
pub struct SynthesisClient {
    http: Client,
    base_url: String,
    cache_dir: Option<PathBuf>,
}

impl SynthesisClient {
    pub fn new(base_url: &str, timeout: Duration, cache_dir: Option<PathBuf>) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Building synthesis HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache_dir,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        self.http
            .get(&url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .with_context(|| format!("Checking {url}"))?;
        Ok(())
    }

    /// Synthesize `text` at `rate`, serving repeats from the audio cache.
    pub fn synthesize(&self, text: &str, rate: f32) -> Result<AudioClip> {
        let cached = self
            .cache_dir
            .as_ref()
            .map(|dir| cache::audio_cache_path(dir, &self.base_url, text, rate));
        if let Some(path) = &cached {
            if let Ok(bytes) = fs::read(path) {
                debug!(path = %path.display(), "Using cached chunk audio");
                return Ok(AudioClip::from_bytes(bytes));
            }
        }

        let url = format!("{}/synthesize", self.base_url);
        info!(chars = text.len(), rate, "Requesting synthesis");
        let response = self
            .http
            .post(&url)
            .json(&SynthesizeRequest { text, rate })
            .send()
            .with_context(|| format!("Requesting {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("TTS server error ({status}): {}", body.trim());
        }
        let bytes = response.bytes().context("Reading synthesized audio")?.to_vec();
        if bytes.is_empty() {
            bail!("TTS server returned no audio");
        }

        if let Some(path) = &cached {
            if let Err(err) = store(path, &bytes) {
                warn!(path = %path.display(), "Could not cache chunk audio: {err}");
            }
        }
        Ok(AudioClip::from_bytes(bytes))
    }
}

fn store(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

/// Token range submitted for one remote request.
pub fn chunk_range(cursor: usize, len: usize, chunk_size: usize) -> Range<usize> {
    let start = cursor.min(len);
    start..start.saturating_add(chunk_size.max(1)).min(len)
}

/// Per-word highlight interval for a chunk of `words` lasting `duration`.
pub fn word_interval(duration: Duration, words: usize) -> Duration {
    if words == 0 {
        return duration;
    }
    duration.div_f64(words as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_document_in_order() {
        let ranges: Vec<_> = [0, 50, 100]
            .into_iter()
            .map(|cursor| chunk_range(cursor, 120, 50))
            .collect();
        assert_eq!(ranges, vec![0..50, 50..100, 100..120]);
        assert_eq!(chunk_range(120, 120, 50), 120..120);
    }

    #[test]
    fn interval_divides_duration() {
        assert_eq!(
            word_interval(Duration::from_secs(10), 40),
            Duration::from_millis(250)
        );
        assert_eq!(word_interval(Duration::from_secs(1), 0), Duration::from_secs(1));
    }

    #[test]
    fn cached_audio_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        // Nothing listens on this port; only the cache can answer.
        let client = SynthesisClient::new(
            "http://127.0.0.1:9/",
            Duration::from_millis(200),
            Some(dir.path().to_path_buf()),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9");

        let path = cache::audio_cache_path(dir.path(), client.base_url(), "hello there", 1.0);
        fs::write(&path, b"RIFFdata").unwrap();

        let clip = client.synthesize("hello there", 1.0).unwrap();
        assert_eq!(clip.bytes(), b"RIFFdata");
        assert!(client.synthesize("hello there", 1.5).is_err());
    }
}
