//! Audio clips returned by the synthesis server and their local playback.

use anyhow::{Context, Result, anyhow};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Encoded audio for one chunk. Cheap to clone.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioClip {
    bytes: Arc<[u8]>,
}

impl AudioClip {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decoded length, when the container reports one.
    pub fn duration(&self) -> Option<Duration> {
        decode(self).ok().and_then(|decoder| decoder.total_duration())
    }
}

impl fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClip")
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

fn decode(clip: &AudioClip) -> Result<Decoder<Cursor<Vec<u8>>>> {
    Decoder::new(Cursor::new(clip.bytes.to_vec())).context("Decoding audio")
}

/// Local audio device. One clip plays at a time.
pub trait AudioOutput {
    fn play(&mut self, clip: &AudioClip) -> Result<()>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    /// True once the current clip has drained (or nothing was playing).
    fn is_finished(&self) -> bool;
}

/// `rodio` sink over the default output device, opened on first use.
#[derive(Default)]
pub struct RodioOutput {
    device: Option<(OutputStream, OutputStreamHandle)>,
    sink: Option<Sink>,
}

impl RodioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&mut self) -> Result<&OutputStreamHandle> {
        if self.device.is_none() {
            let device = OutputStream::try_default().context("Opening audio output")?;
            info!("Opened audio output");
            self.device = Some(device);
        }
        self.device
            .as_ref()
            .map(|(_, handle)| handle)
            .ok_or_else(|| anyhow!("Audio output unavailable"))
    }
}

impl AudioOutput for RodioOutput {
    fn play(&mut self, clip: &AudioClip) -> Result<()> {
        self.stop();
        let source = decode(clip)?;
        let sink = Sink::try_new(self.handle()?).context("Creating sink")?;
        sink.append(source);
        sink.play();
        debug!(bytes = clip.len(), "Starting clip playback");
        self.sink = Some(sink);
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            debug!("Pausing playback");
            sink.pause();
        }
    }

    fn resume(&mut self) {
        if let Some(sink) = &self.sink {
            debug!("Resuming playback");
            sink.play();
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn is_finished(&self) -> bool {
        self.sink.as_ref().map(Sink::empty).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal 16-bit mono PCM WAV with `samples` zero samples.
    pub(crate) fn silent_wav(sample_rate: u32, samples: u32) -> Vec<u8> {
        let data_len = samples * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(out.len() + data_len as usize, 0);
        out
    }

    #[test]
    fn wav_duration_is_decoded() {
        let clip = AudioClip::from_bytes(silent_wav(8_000, 16_000));
        let duration = clip.duration().unwrap();
        assert!((duration.as_secs_f64() - 2.0).abs() < 0.01);
    }

    #[test]
    fn garbage_has_no_duration() {
        let clip = AudioClip::from_bytes(b"not audio".to_vec());
        assert!(clip.duration().is_none());
        assert_eq!(format!("{clip:?}"), "AudioClip { bytes: 9 }");
    }

    #[test]
    fn idle_output_reports_finished() {
        let output = RodioOutput::new();
        assert!(output.is_finished());
    }
}
