//! Interactive playback session.
//!
//! A single thread owns the controller, the highlight renderer, the audio
//! output and the timer queue. Network calls run on short-lived worker
//! threads and report back over a channel; every report carries the epoch of
//! the dispatch that started it.

use crate::cast::{CastAction, RelayClient};
use crate::highlight::page::PageDom;
use crate::highlight::{HighlightRenderer, HighlightSink};
use crate::playback::{
    AdapterEvent, Effect, PlaybackController, PlaybackState, SessionCommand, TimerQueue,
};
use crate::speech::audio::{AudioClip, AudioOutput};
use crate::speech::local::{BoundaryThrottle, LocalVoice, Utterance, VoiceEvent};
use crate::speech::remote::SynthesisClient;
use crate::text_utils::Document;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const AUDIO_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub enum SessionEvent {
    Command(SessionCommand),
    Adapter(AdapterEvent),
    CastStatus(bool),
}

/// What the session shows to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    Highlight(String),
    Status { message: String, percent: u8 },
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub boundary_throttle: Duration,
    pub skip_words: usize,
    pub exit_on_finish: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            boundary_throttle: Duration::from_millis(200),
            skip_words: 10,
            exit_on_finish: false,
        }
    }
}

pub struct SessionParts {
    pub controller: PlaybackController,
    pub highlight: HighlightRenderer,
    pub audio: Box<dyn AudioOutput>,
    pub voice: Arc<dyn LocalVoice>,
    pub synthesis: Option<SynthesisClient>,
    pub relay: Option<RelayClient>,
    pub options: SessionOptions,
}

pub type OutputSink = Box<dyn FnMut(SessionOutput)>;
pub type ProgressHook = Box<dyn FnMut(usize, PlaybackState)>;

/// Where playback stood when the session was disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub cursor: usize,
    pub state: PlaybackState,
    pub words: usize,
}

pub struct PlaybackSession {
    controller: PlaybackController,
    highlight: HighlightRenderer,
    audio: Box<dyn AudioOutput>,
    voice: Arc<dyn LocalVoice>,
    synthesis: Option<SynthesisClient>,
    relay: Option<RelayClient>,
    options: SessionOptions,
    timers: TimerQueue,
    tx: Sender<SessionEvent>,
    rx: Receiver<SessionEvent>,
    utterance: Option<Utterance>,
    throttle: Option<(u64, BoundaryThrottle)>,
    audio_epoch: Option<u64>,
    audio_paused: bool,
    output: OutputSink,
    progress_hook: Option<ProgressHook>,
    last_state: PlaybackState,
    quit: bool,
}

impl PlaybackSession {
    pub fn create(parts: SessionParts, output: OutputSink) -> Self {
        let (tx, rx) = mpsc::channel();
        let last_state = parts.controller.state();
        Self {
            controller: parts.controller,
            highlight: parts.highlight,
            audio: parts.audio,
            voice: parts.voice,
            synthesis: parts.synthesis,
            relay: parts.relay,
            options: parts.options,
            timers: TimerQueue::new(),
            tx,
            rx,
            utterance: None,
            throttle: None,
            audio_epoch: None,
            audio_paused: false,
            output,
            progress_hook: None,
            last_state,
            quit: false,
        }
    }

    /// Channel for commands from other threads (stdin reader, Ctrl-C).
    pub fn sender(&self) -> Sender<SessionEvent> {
        self.tx.clone()
    }

    /// Called with the cursor whenever the playback state changes.
    pub fn set_progress_hook(&mut self, hook: ProgressHook) {
        self.progress_hook = Some(hook);
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn load(&mut self, doc: Document, page: PageDom) {
        if !doc.is_empty() {
            self.highlight.replace_page(page);
        }
        let effects = self.controller.load(doc);
        self.apply(effects);
    }

    pub fn seek(&mut self, index: usize) {
        let effects = self.controller.seek(index);
        self.apply(effects);
    }

    /// Ask the relay whether a device is connected and update the controller.
    pub fn refresh_cast_status(&mut self) {
        let Some(relay) = self.relay.clone() else {
            self.controller.set_cast_connected(false);
            return;
        };
        let connected = match relay.status() {
            Ok(status) => status.connected,
            Err(err) => {
                warn!("Cast status check failed: {err:#}");
                false
            }
        };
        self.on_cast_status(connected);
    }

    /// Process events until quit.
    pub fn run(&mut self) {
        info!("Playback session started");
        while !self.quit {
            let now = Instant::now();
            for id in self.timers.pop_due(now) {
                let effects = self.controller.timer_fired(id);
                self.apply(effects);
            }
            self.poll_audio();

            let wait = self
                .timers
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(AUDIO_POLL_INTERVAL)
                .min(AUDIO_POLL_INTERVAL);
            match self.rx.recv_timeout(wait) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Stop playback, cancel timers and release the relay.
    pub fn dispose(mut self) -> SessionSummary {
        let summary = SessionSummary {
            cursor: self.controller.cursor(),
            state: self.controller.state(),
            words: self.controller.document().len(),
        };
        self.quit = true;
        let effects = self.controller.stop();
        self.apply(effects);
        let dropped_timers = self.timers.len();
        self.timers.clear();
        if let Some(utterance) = self.utterance.take() {
            utterance.cancel();
        }
        self.audio.stop();
        info!(
            cursor = summary.cursor,
            dropped_timers, "Playback session disposed"
        );
        summary
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Command(command) => self.handle_command(command),
            SessionEvent::Adapter(event) => self.handle_adapter(event),
            SessionEvent::CastStatus(connected) => self.on_cast_status(connected),
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        debug!(action = command.action(), "Session command");
        let skip = self.options.skip_words as isize;
        let effects = match command {
            SessionCommand::TogglePlay => self.controller.play(),
            SessionCommand::Stop => self.controller.stop(),
            SessionCommand::Restart => self.controller.restart(),
            SessionCommand::SkipForward => self.controller.skip(skip),
            SessionCommand::SkipBackward => self.controller.skip(-skip),
            SessionCommand::ToggleHighlightMode => {
                let mode = self.highlight.toggle();
                self.redraw_highlight();
                vec![Effect::Status(format!("Highlight mode: {}", mode.as_str()))]
            }
            SessionCommand::CheckCast => {
                self.spawn_cast_status_check();
                Vec::new()
            }
            SessionCommand::Quit => {
                self.quit = true;
                Vec::new()
            }
        };
        self.apply(effects);
    }

    fn handle_adapter(&mut self, event: AdapterEvent) {
        if let AdapterEvent::WordBoundary { epoch } = event {
            let accepted = match self.throttle.as_mut() {
                Some((current, throttle)) if *current == epoch => throttle.accept(Instant::now()),
                _ => false,
            };
            if !accepted {
                return;
            }
        }
        if matches!(
            event,
            AdapterEvent::SpeechEnded { .. } | AdapterEvent::Failed { .. }
        ) && self.throttle.as_ref().map(|(epoch, _)| *epoch) == Some(event.epoch())
        {
            self.throttle = None;
            self.utterance = None;
        }
        let effects = self.controller.handle_event(event);
        self.apply(effects);
    }

    fn on_cast_status(&mut self, connected: bool) {
        self.controller.set_cast_connected(connected);
        let message = if connected {
            "Cast device connected"
        } else {
            "No cast device connected"
        };
        self.emit_status(message.to_string());
    }

    fn poll_audio(&mut self) {
        let Some(epoch) = self.audio_epoch else {
            return;
        };
        if self.audio_paused || !self.audio.is_finished() {
            return;
        }
        self.audio_epoch = None;
        debug!(epoch, "Chunk audio drained");
        self.handle_adapter(AdapterEvent::AudioEnded { epoch });
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.run_effect(effect);
        }
        self.notify_progress();
    }

    fn notify_progress(&mut self) {
        let state = self.controller.state();
        if state == self.last_state {
            return;
        }
        self.last_state = state;
        let cursor = self.controller.cursor();
        if let Some(hook) = self.progress_hook.as_mut() {
            hook(cursor, state);
        }
        if state == PlaybackState::Finished && self.options.exit_on_finish {
            self.quit = true;
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Speak { epoch, text, rate } => self.speak(epoch, &text, rate),
            Effect::CancelSpeech => {
                if let Some(utterance) = self.utterance.take() {
                    utterance.cancel();
                }
                self.throttle = None;
            }
            Effect::Synthesize {
                epoch,
                chunk,
                text,
                rate,
            } => {
                let Some(client) = self.synthesis.clone() else {
                    self.report_failure(epoch, "Please configure TTS server".to_string());
                    return;
                };
                let tx = self.tx.clone();
                debug!(epoch, chunk_start = chunk.start, chunk_end = chunk.end, "Synthesis worker spawned");
                thread::spawn(move || {
                    let event = match client.synthesize(&text, rate) {
                        Ok(audio) => {
                            let duration = audio.duration();
                            AdapterEvent::Synthesized {
                                epoch,
                                audio,
                                duration,
                            }
                        }
                        Err(err) => AdapterEvent::Failed {
                            epoch,
                            message: format!("{err:#}"),
                        },
                    };
                    let _ = tx.send(SessionEvent::Adapter(event));
                });
            }
            Effect::PlayAudio { epoch, audio } => self.play_audio(epoch, &audio),
            Effect::PauseAudio => {
                self.audio.pause();
                self.audio_paused = true;
            }
            Effect::ResumeAudio { epoch } => {
                self.audio.resume();
                self.audio_paused = false;
                self.audio_epoch = Some(epoch);
            }
            Effect::StopAudio => {
                self.audio.stop();
                self.audio_epoch = None;
                self.audio_paused = false;
            }
            Effect::CastAudio { epoch, audio } => self.cast_audio(epoch, audio),
            Effect::CastControl(action) => self.cast_control(action),
            Effect::StartTimer { id, after } => self.timers.schedule(id, Instant::now(), after),
            Effect::CancelTimer { id } => {
                self.timers.cancel(id);
            }
            Effect::Highlight { cursor } => {
                self.highlight.show(self.controller.document(), cursor);
                self.flush_highlight();
            }
            Effect::ClearHighlight => self.highlight.clear(),
            Effect::Status(message) => self.emit_status(message),
        }
    }

    fn speak(&mut self, epoch: u64, text: &str, rate: f32) {
        if let Some(previous) = self.utterance.take() {
            previous.cancel();
        }
        self.throttle = Some((
            epoch,
            BoundaryThrottle::new(self.options.boundary_throttle, Instant::now()),
        ));
        let tx = self.tx.clone();
        let callback = Box::new(move |event: VoiceEvent| {
            let event = match event {
                VoiceEvent::Boundary => AdapterEvent::WordBoundary { epoch },
                VoiceEvent::Ended => AdapterEvent::SpeechEnded { epoch },
                VoiceEvent::Failed(message) => AdapterEvent::Failed { epoch, message },
            };
            let _ = tx.send(SessionEvent::Adapter(event));
        });
        match self.voice.speak(text, rate, callback) {
            Ok(utterance) => self.utterance = Some(utterance),
            Err(err) => self.report_failure(epoch, format!("{err:#}")),
        }
    }

    fn play_audio(&mut self, epoch: u64, audio: &AudioClip) {
        match self.audio.play(audio) {
            Ok(()) => {
                self.audio_epoch = Some(epoch);
                self.audio_paused = false;
            }
            Err(err) => self.report_failure(epoch, format!("{err:#}")),
        }
    }

    fn cast_audio(&mut self, epoch: u64, audio: AudioClip) {
        let Some(relay) = self.relay.clone() else {
            let _ = self.tx.send(SessionEvent::Adapter(AdapterEvent::CastFailed {
                epoch,
                message: "No cast relay configured".to_string(),
            }));
            return;
        };
        let tx = self.tx.clone();
        thread::spawn(move || {
            let event = match relay.cast_audio(&audio) {
                Ok(()) => AdapterEvent::CastDelivered { epoch },
                Err(err) => AdapterEvent::CastFailed {
                    epoch,
                    message: format!("{err:#}"),
                },
            };
            let _ = tx.send(SessionEvent::Adapter(event));
        });
    }

    fn cast_control(&mut self, action: CastAction) {
        let Some(relay) = self.relay.clone() else {
            return;
        };
        let send = move || {
            if let Err(err) = relay.control(action) {
                warn!(action = action.as_str(), "Cast control failed: {err:#}");
            }
        };
        // Nothing would wait for a worker once the session is going away.
        if self.quit {
            send();
        } else {
            thread::spawn(send);
        }
    }

    fn spawn_cast_status_check(&mut self) {
        let Some(relay) = self.relay.clone() else {
            self.emit_status("No cast relay configured".to_string());
            return;
        };
        let tx = self.tx.clone();
        thread::spawn(move || {
            let connected = match relay.status() {
                Ok(status) => status.connected,
                Err(err) => {
                    warn!("Cast status check failed: {err:#}");
                    false
                }
            };
            let _ = tx.send(SessionEvent::CastStatus(connected));
        });
    }

    /// Failures detected while running an effect go back through the
    /// controller like any backend error.
    fn report_failure(&mut self, epoch: u64, message: String) {
        let _ = self
            .tx
            .send(SessionEvent::Adapter(AdapterEvent::Failed { epoch, message }));
    }

    fn redraw_highlight(&mut self) {
        let state = self.controller.state();
        if self.controller.document().is_empty() || state == PlaybackState::Finished {
            return;
        }
        let cursor = self.controller.cursor();
        self.highlight.show(self.controller.document(), cursor);
        self.flush_highlight();
    }

    fn flush_highlight(&mut self) {
        if let Some(frame) = self.highlight.take_frame() {
            (self.output)(SessionOutput::Highlight(frame));
        }
    }

    fn emit_status(&mut self, message: String) {
        let percent = (self.controller.progress() * 100.0).round().clamp(0.0, 100.0) as u8;
        (self.output)(SessionOutput::Status { message, percent });
    }
}

/// Read single-key commands from stdin until EOF or quit.
pub fn spawn_stdin_commands(tx: Sender<SessionEvent>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let Some(command) = SessionCommand::from_key(&line) else {
                continue;
            };
            if tx.send(SessionEvent::Command(command)).is_err() || command == SessionCommand::Quit {
                return;
            }
        }
    });
}
