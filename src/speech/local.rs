//! On-device speech through an `espeak-ng` subprocess.
//!
//! `espeak-ng` does not report word positions on stdout, so boundaries are
//! paced at the words-per-minute it was asked to speak at. Raw boundaries are
//! thinned by [`BoundaryThrottle`] before they reach the controller.

use crate::cancellation::CancellationToken;
use anyhow::{Context, Result, bail};
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    Boundary,
    Ended,
    Failed(String),
}

pub type VoiceCallback = Box<dyn FnMut(VoiceEvent) + Send>;

/// Cancels a running utterance when asked; dropping it does not.
#[derive(Debug, Clone)]
pub struct Utterance {
    token: CancellationToken,
}

impl Utterance {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

pub trait LocalVoice: Send + Sync {
    /// Installed voices. An empty list means the engine cannot speak.
    fn voices(&self) -> Result<Vec<String>>;

    /// Start speaking `text`. Events arrive on another thread; a cancelled
    /// utterance emits nothing further.
    fn speak(&self, text: &str, rate: f32, on_event: VoiceCallback) -> Result<Utterance>;
}

#[derive(Debug, Clone)]
pub struct EspeakVoice {
    program: String,
    voice: Option<String>,
    base_wpm: u32,
}

impl EspeakVoice {
    pub fn new(program: impl Into<String>, voice: Option<String>, base_wpm: u32) -> Self {
        Self {
            program: program.into(),
            voice,
            base_wpm,
        }
    }

    pub fn words_per_minute(&self, rate: f32) -> u32 {
        ((self.base_wpm as f32) * rate).round().max(1.0) as u32
    }

    fn spawn(&self, text: &str, wpm: u32) -> Result<Child> {
        let mut command = Command::new(&self.program);
        command.arg("-s").arg(wpm.to_string());
        if let Some(voice) = &self.voice {
            command.arg("-v").arg(voice);
        }
        command
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let mut child = command
            .spawn()
            .with_context(|| format!("Starting {}", self.program))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .context("Writing utterance text")?;
        }
        Ok(child)
    }
}

impl LocalVoice for EspeakVoice {
    fn voices(&self) -> Result<Vec<String>> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .output()
            .with_context(|| format!("Listing voices with {}", self.program))?;
        if !output.status.success() {
            bail!("{} --voices exited with {}", self.program, output.status);
        }
        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn speak(&self, text: &str, rate: f32, mut on_event: VoiceCallback) -> Result<Utterance> {
        if self.voices()?.is_empty() {
            bail!("{} has no voices installed", self.program);
        }
        let wpm = self.words_per_minute(rate);
        let words = text.split_whitespace().count();
        let mut child = self.spawn(text, wpm)?;
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let per_word = Duration::from_secs_f64(60.0 / wpm as f64);
        info!(words, wpm, "Speaking with local voice");

        thread::spawn(move || {
            let started = Instant::now();
            let mut emitted = 0usize;
            loop {
                if worker_token.is_cancelled() {
                    if let Err(err) = child.kill() {
                        debug!("Local voice already exited: {err}");
                    }
                    let _ = child.wait();
                    return;
                }
                match child.try_wait() {
                    Ok(Some(status)) => {
                        if worker_token.is_cancelled() {
                            return;
                        }
                        if status.success() {
                            on_event(VoiceEvent::Ended);
                        } else {
                            let stderr = read_stderr(&mut child);
                            warn!(%status, "Local voice failed");
                            on_event(VoiceEvent::Failed(if stderr.is_empty() {
                                format!("speech engine exited with {status}")
                            } else {
                                stderr
                            }));
                        }
                        return;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        on_event(VoiceEvent::Failed(err.to_string()));
                        return;
                    }
                }
                let due = boundaries_due(started.elapsed(), per_word, words);
                while emitted < due {
                    emitted += 1;
                    on_event(VoiceEvent::Boundary);
                }
                thread::sleep(POLL_INTERVAL);
            }
        });

        Ok(Utterance::new(token))
    }
}

fn read_stderr(child: &mut Child) -> String {
    use std::io::Read;
    let mut buf = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut buf);
    }
    buf.trim().to_string()
}

/// Word starts reached after `elapsed`; the first word starts at zero.
fn boundaries_due(elapsed: Duration, per_word: Duration, words: usize) -> usize {
    if words == 0 || per_word.is_zero() {
        return 0;
    }
    let started = (elapsed.as_secs_f64() / per_word.as_secs_f64()).floor() as usize + 1;
    started.min(words)
}

/// Parse `espeak-ng --voices` output: a header row, then one voice per row
/// with the name in the fourth column.
pub fn parse_voice_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(3))
        .map(str::to_string)
        .collect()
}

/// Drops boundaries that arrive within `min_interval` of the last accepted
/// one. Seeded at utterance start, so an immediate first boundary is dropped
/// too.
#[derive(Debug, Clone)]
pub struct BoundaryThrottle {
    min_interval: Duration,
    last: Instant,
}

impl BoundaryThrottle {
    pub fn new(min_interval: Duration, started: Instant) -> Self {
        Self {
            min_interval,
            last: started,
        }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) < self.min_interval {
            return false;
        }
        self.last = now;
        true
    }
}
