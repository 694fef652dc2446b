//! Playback state machine.
//!
//! The controller never performs I/O. Commands and backend events go in and a
//! list of [`Effect`]s comes out. Every dispatch is tagged with an epoch;
//! events from an older epoch are ignored, so a completion that arrives after
//! a stop or skip cannot move the cursor.

use super::state::{AdapterEvent, Effect, PlaybackState, SynthesisChunk};
use super::timers::TimerId;
use crate::cast::{self, CastAction, CastSession};
use crate::speech::Backend;
use crate::speech::audio::AudioClip;
use crate::speech::remote;
use crate::text_utils::Document;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MIN_RATE: f32 = 0.5;
pub const MAX_RATE: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub chunk_size: usize,
    pub cast_words_per_minute: u32,
    pub rate: f32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            cast_words_per_minute: cast::DEFAULT_WORDS_PER_MINUTE,
            rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    /// Local utterance covering the rest of the document.
    Speaking,
    /// Remote synthesis request outstanding.
    Requesting,
    /// Audio received, relay upload outstanding. `epoch` tags the upload;
    /// it outlives pause and resume.
    Uploading {
        audio: AudioClip,
        duration: Option<Duration>,
        epoch: u64,
    },
    /// Audio playing on the local device.
    Playing { interval: Duration },
    /// Audio handed to the relay; progress is timer-driven.
    Casting { interval: Duration },
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Speaking => "speaking",
            Phase::Requesting => "requesting",
            Phase::Uploading { .. } => "uploading",
            Phase::Playing { .. } => "playing",
            Phase::Casting { .. } => "casting",
        }
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    chunk: SynthesisChunk,
    phase: Phase,
}

#[derive(Debug)]
pub struct PlaybackController {
    doc: Document,
    cursor: usize,
    state: PlaybackState,
    backend: Option<Backend>,
    settings: ControllerSettings,
    epoch: u64,
    next_timer: u64,
    in_flight: Option<InFlight>,
    tick: Option<TimerId>,
    deadline: Option<TimerId>,
    cast: CastSession,
    /// Uploads cancelled before the relay answered.
    abandoned_uploads: BTreeSet<u64>,
}

impl PlaybackController {
    pub fn new(backend: Option<Backend>, settings: ControllerSettings) -> Self {
        Self {
            doc: Document::default(),
            cursor: 0,
            state: PlaybackState::Idle,
            backend,
            settings: ControllerSettings {
                rate: settings.rate.clamp(MIN_RATE, MAX_RATE),
                chunk_size: settings.chunk_size.max(1),
                ..settings
            },
            epoch: 0,
            next_timer: 0,
            in_flight: None,
            tick: None,
            deadline: None,
            cast: CastSession::default(),
            abandoned_uploads: BTreeSet::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn rate(&self) -> f32 {
        self.settings.rate
    }

    pub fn cast_connected(&self) -> bool {
        self.cast.is_connected()
    }

    /// Fraction of the document already read, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.doc.is_empty() {
            return 0.0;
        }
        self.cursor as f64 / self.doc.len() as f64
    }

    /// Takes effect at the next dispatch.
    pub fn set_rate(&mut self, rate: f32) {
        self.settings.rate = rate.clamp(MIN_RATE, MAX_RATE);
    }

    pub fn set_cast_connected(&mut self, connected: bool) {
        if connected != self.cast.is_connected() {
            info!(connected, "Cast relay connection changed");
        }
        self.cast.set_connected(connected);
    }

    pub fn load(&mut self, doc: Document) -> Vec<Effect> {
        let mut effects = Vec::new();
        if doc.is_empty() {
            effects.push(Effect::Status("No text found".to_string()));
            return effects;
        }
        self.cancel_in_flight(&mut effects);
        info!(words = doc.len(), "Loaded document");
        self.doc = doc;
        self.cursor = 0;
        self.state = PlaybackState::Idle;
        effects.push(Effect::Highlight { cursor: 0 });
        effects.push(Effect::Status("Ready to play".to_string()));
        effects
    }

    /// Move to `index` without starting playback; used when resuming saved
    /// progress.
    pub fn seek(&mut self, index: usize) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.doc.is_empty() || self.state == PlaybackState::Playing {
            return effects;
        }
        self.cancel_in_flight(&mut effects);
        self.cursor = index.min(self.doc.len() - 1);
        self.state = PlaybackState::Idle;
        effects.push(Effect::Highlight {
            cursor: self.cursor,
        });
        effects
    }

    pub fn play(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state == PlaybackState::Playing {
            return self.pause();
        }
        if self.doc.is_empty() {
            effects.push(Effect::Status("No text found".to_string()));
            return effects;
        }
        let Some(backend) = self.backend else {
            effects.push(Effect::Status("Please configure TTS server".to_string()));
            return effects;
        };
        if self.cast.is_connected() && backend == Backend::Local {
            effects.push(Effect::Status(
                "Casting requires the synthesis server".to_string(),
            ));
            return effects;
        }
        if self.cursor >= self.doc.len() {
            self.finish(false, &mut effects);
            return effects;
        }
        if self.state == PlaybackState::Paused && self.in_flight.is_some() {
            self.resume(&mut effects);
            return effects;
        }
        self.dispatch(&mut effects);
        effects
    }

    pub fn pause(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state != PlaybackState::Playing {
            return effects;
        }
        self.epoch = self.epoch.wrapping_add(1);
        self.cancel_timers(&mut effects);
        let phase = self.in_flight.as_ref().map(|flight| flight.phase.clone());
        match phase {
            Some(Phase::Speaking) => {
                effects.push(Effect::CancelSpeech);
                self.in_flight = None;
            }
            Some(Phase::Requesting) => {
                self.in_flight = None;
                if self.cast.is_connected() {
                    effects.push(Effect::CastControl(CastAction::Pause));
                }
            }
            // The upload keeps going; its result is settled while paused.
            Some(Phase::Uploading { .. }) => effects.push(Effect::CastControl(CastAction::Pause)),
            Some(Phase::Playing { .. }) => effects.push(Effect::PauseAudio),
            Some(Phase::Casting { .. }) => effects.push(Effect::CastControl(CastAction::Pause)),
            None => {}
        }
        self.state = PlaybackState::Paused;
        info!(cursor = self.cursor, "Playback paused");
        effects.push(Effect::Status("Paused".to_string()));
        effects
    }

    pub fn stop(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.halt(&mut effects);
        effects.push(Effect::ClearHighlight);
        effects.push(Effect::Status("Stopped".to_string()));
        effects
    }

    pub fn restart(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.halt(&mut effects);
        if !self.doc.is_empty() {
            effects.push(Effect::Highlight { cursor: 0 });
        }
        effects.push(Effect::Status("Ready to play".to_string()));
        effects
    }

    pub fn skip(&mut self, delta: isize) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.doc.is_empty() {
            return effects;
        }
        let last = self.doc.len() - 1;
        let target = self.cursor.saturating_add_signed(delta).min(last);
        debug!(from = self.cursor, to = target, delta, "Skipping");

        match self.state {
            PlaybackState::Playing => {
                self.cancel_in_flight(&mut effects);
                self.cursor = target;
                self.dispatch(&mut effects);
            }
            PlaybackState::Paused => {
                self.cancel_in_flight(&mut effects);
                self.cursor = target;
                effects.push(Effect::Highlight { cursor: target });
            }
            PlaybackState::Idle | PlaybackState::Finished => {
                self.cursor = target;
                self.state = PlaybackState::Idle;
                effects.push(Effect::Highlight { cursor: target });
            }
        }
        effects
    }

    pub fn handle_event(&mut self, event: AdapterEvent) -> Vec<Effect> {
        if matches!(
            event,
            AdapterEvent::CastDelivered { .. } | AdapterEvent::CastFailed { .. }
        ) {
            return self.settle_upload(event);
        }
        let mut effects = Vec::new();
        if event.epoch() != self.epoch || self.state != PlaybackState::Playing {
            debug!(
                event = event.kind(),
                epoch = event.epoch(),
                current = self.epoch,
                "Ignoring stale playback event"
            );
            return effects;
        }
        let Some(flight) = self.in_flight.as_ref() else {
            debug!(event = event.kind(), "Ignoring event with nothing in flight");
            return effects;
        };
        let chunk = flight.chunk;
        let phase = flight.phase.clone();

        match (event, phase) {
            (AdapterEvent::Failed { message, .. }, _) => {
                warn!(%message, "Playback failed");
                self.halt(&mut effects);
                effects.push(Effect::ClearHighlight);
                effects.push(Effect::Status(format!("Error: {message}")));
            }
            (AdapterEvent::WordBoundary { .. }, Phase::Speaking) => {
                let next = (self.cursor + 1).min(self.doc.len() - 1);
                if next != self.cursor {
                    self.cursor = next;
                    effects.push(Effect::Highlight { cursor: next });
                }
            }
            (AdapterEvent::SpeechEnded { .. }, Phase::Speaking)
            | (AdapterEvent::AudioEnded { .. }, Phase::Playing { .. }) => {
                self.complete_chunk(&mut effects);
            }
            (AdapterEvent::Synthesized { audio, duration, .. }, Phase::Requesting) => {
                if self.cast.is_connected() {
                    info!(
                        chunk_start = chunk.start,
                        chunk_end = chunk.end,
                        "Forwarding chunk to cast relay"
                    );
                    effects.push(Effect::CastAudio {
                        epoch: self.epoch,
                        audio: audio.clone(),
                    });
                    effects.push(Effect::Status("Sending to cast device...".to_string()));
                    let epoch = self.epoch;
                    self.set_phase(Phase::Uploading {
                        audio,
                        duration,
                        epoch,
                    });
                } else {
                    self.start_local_audio(chunk, audio, duration, &mut effects);
                }
            }
            (event, phase) => {
                debug!(
                    event = event.kind(),
                    phase = phase.name(),
                    "Ignoring event for another phase"
                );
            }
        }
        effects
    }

    /// Relay upload results are matched by upload epoch rather than the
    /// current one, so an upload that finishes across a pause still lands.
    fn settle_upload(&mut self, event: AdapterEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        let epoch = event.epoch();
        if self.abandoned_uploads.remove(&epoch) {
            let relay_has_newer_audio = matches!(
                self.in_flight.as_ref().map(|flight| &flight.phase),
                Some(Phase::Casting { .. })
            );
            if matches!(event, AdapterEvent::CastDelivered { .. }) && !relay_has_newer_audio {
                debug!(epoch, "Stopping audio from an abandoned cast upload");
                effects.push(Effect::CastControl(CastAction::Stop));
            }
            return effects;
        }
        let Some(flight) = self.in_flight.clone() else {
            debug!(event = event.kind(), epoch, "Ignoring stale cast upload result");
            return effects;
        };
        let Phase::Uploading {
            audio,
            duration,
            epoch: upload_epoch,
        } = flight.phase
        else {
            debug!(event = event.kind(), epoch, "Ignoring stale cast upload result");
            return effects;
        };
        if upload_epoch != epoch {
            debug!(event = event.kind(), epoch, upload_epoch, "Ignoring stale cast upload result");
            return effects;
        }
        let chunk = flight.chunk;
        let interval = cast::word_duration(self.settings.cast_words_per_minute);
        let paused = self.state == PlaybackState::Paused;

        match event {
            AdapterEvent::CastDelivered { .. } if paused => {
                // The relay starts playing on delivery; hold it until resume.
                info!(chunk_start = chunk.start, "Cast chunk delivered while paused");
                self.set_phase(Phase::Casting { interval });
                effects.push(Effect::CastControl(CastAction::Pause));
            }
            AdapterEvent::CastDelivered { .. } => {
                self.set_phase(Phase::Casting { interval });
                self.arm_cast_timers(chunk, interval, &mut effects);
                effects.push(Effect::Status("Casting...".to_string()));
            }
            AdapterEvent::CastFailed { message, .. } if paused => {
                warn!(%message, "Cast upload failed while paused");
                self.in_flight = None;
                effects.push(Effect::Status(format!("Cast error: {message}")));
            }
            AdapterEvent::CastFailed { message, .. } => {
                warn!(%message, "Cast upload failed; playing locally");
                effects.push(Effect::Status(format!("Cast error: {message}")));
                self.start_local_audio(chunk, audio, duration, &mut effects);
            }
            _ => {}
        }
        effects
    }

    pub fn timer_fired(&mut self, id: TimerId) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state != PlaybackState::Playing {
            return effects;
        }
        self.cast.settle(id);
        if self.tick == Some(id) {
            self.tick = None;
            self.on_tick(&mut effects);
        } else if self.deadline == Some(id) {
            self.deadline = None;
            debug!(cursor = self.cursor, "Cast chunk deadline reached");
            self.complete_chunk(&mut effects);
        } else {
            debug!(timer = id.0, "Ignoring stale timer");
        }
        effects
    }

    fn on_tick(&mut self, effects: &mut Vec<Effect>) {
        let Some(flight) = self.in_flight.as_ref() else {
            return;
        };
        let interval = match flight.phase {
            Phase::Playing { interval } | Phase::Casting { interval } => interval,
            _ => return,
        };
        let chunk_end = flight.chunk.end;
        let casting = matches!(flight.phase, Phase::Casting { .. });
        if self.cursor + 1 >= chunk_end {
            return;
        }
        self.cursor += 1;
        effects.push(Effect::Highlight {
            cursor: self.cursor,
        });
        if self.cursor + 1 < chunk_end {
            let id = self.start_timer(interval, effects);
            self.tick = Some(id);
            if casting {
                self.cast.track(id);
            }
        }
    }

    fn dispatch(&mut self, effects: &mut Vec<Effect>) {
        let Some(backend) = self.backend else {
            return;
        };
        self.epoch = self.epoch.wrapping_add(1);
        let len = self.doc.len();
        let chunk = match backend {
            Backend::Local => SynthesisChunk::new(self.cursor..len),
            Backend::Remote => SynthesisChunk::new(remote::chunk_range(
                self.cursor,
                len,
                self.settings.chunk_size,
            )),
        };
        let text = self.doc.join(chunk.range());
        self.state = PlaybackState::Playing;
        effects.push(Effect::Highlight {
            cursor: self.cursor,
        });
        info!(
            epoch = self.epoch,
            chunk_start = chunk.start,
            chunk_end = chunk.end,
            backend = ?backend,
            "Dispatching chunk"
        );
        match backend {
            Backend::Local => {
                effects.push(Effect::Speak {
                    epoch: self.epoch,
                    text,
                    rate: self.settings.rate,
                });
                effects.push(Effect::Status("Playing...".to_string()));
                self.in_flight = Some(InFlight {
                    chunk,
                    phase: Phase::Speaking,
                });
            }
            Backend::Remote => {
                effects.push(Effect::Synthesize {
                    epoch: self.epoch,
                    chunk,
                    text,
                    rate: self.settings.rate,
                });
                effects.push(Effect::Status("Generating speech...".to_string()));
                self.in_flight = Some(InFlight {
                    chunk,
                    phase: Phase::Requesting,
                });
            }
        }
    }

    fn resume(&mut self, effects: &mut Vec<Effect>) {
        let Some(flight) = self.in_flight.clone() else {
            return;
        };
        self.epoch = self.epoch.wrapping_add(1);
        self.state = PlaybackState::Playing;
        info!(cursor = self.cursor, "Playback resumed");
        match flight.phase {
            Phase::Playing { interval } => {
                effects.push(Effect::ResumeAudio { epoch: self.epoch });
                if self.cursor + 1 < flight.chunk.end {
                    let id = self.start_timer(interval, effects);
                    self.tick = Some(id);
                }
                effects.push(Effect::Status("Playing...".to_string()));
            }
            Phase::Casting { interval } => {
                effects.push(Effect::CastControl(CastAction::Play));
                self.arm_cast_timers(flight.chunk, interval, effects);
                effects.push(Effect::Status("Casting...".to_string()));
            }
            Phase::Uploading { .. } => {
                effects.push(Effect::CastControl(CastAction::Play));
                effects.push(Effect::Status("Sending to cast device...".to_string()));
            }
            _ => {
                self.in_flight = None;
                self.dispatch(effects);
            }
        }
    }

    fn start_local_audio(
        &mut self,
        chunk: SynthesisChunk,
        audio: AudioClip,
        duration: Option<Duration>,
        effects: &mut Vec<Effect>,
    ) {
        let interval = match duration {
            Some(duration) if !duration.is_zero() => remote::word_interval(duration, chunk.len()),
            _ => cast::word_duration(self.settings.cast_words_per_minute),
        };
        debug!(
            chunk_start = chunk.start,
            interval_ms = interval.as_millis() as u64,
            "Starting local chunk audio"
        );
        effects.push(Effect::PlayAudio {
            epoch: self.epoch,
            audio,
        });
        effects.push(Effect::Status("Playing...".to_string()));
        self.set_phase(Phase::Playing { interval });
        if self.cursor + 1 < chunk.end {
            let id = self.start_timer(interval, effects);
            self.tick = Some(id);
        }
    }

    /// Ticks for the words left in the chunk plus a deadline for the chunk's
    /// end, all tracked by the cast session.
    fn arm_cast_timers(
        &mut self,
        chunk: SynthesisChunk,
        interval: Duration,
        effects: &mut Vec<Effect>,
    ) {
        if self.cursor + 1 < chunk.end {
            let tick = self.start_timer(interval, effects);
            self.tick = Some(tick);
            self.cast.track(tick);
        }
        let remaining = chunk.end.saturating_sub(self.cursor) as u32;
        let deadline = self.start_timer(interval * remaining, effects);
        self.deadline = Some(deadline);
        self.cast.track(deadline);
        debug!(
            remaining_words = remaining,
            pending = self.cast.pending_count(),
            "Cast timers armed"
        );
    }

    fn complete_chunk(&mut self, effects: &mut Vec<Effect>) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        self.cancel_timers(effects);
        let casting = matches!(flight.phase, Phase::Casting { .. });
        self.cursor = flight.chunk.end.min(self.doc.len());
        debug!(cursor = self.cursor, "Chunk complete");
        if self.cursor >= self.doc.len() {
            self.finish(casting, effects);
        } else {
            self.dispatch(effects);
        }
    }

    fn finish(&mut self, casting: bool, effects: &mut Vec<Effect>) {
        self.cursor = self.doc.len();
        self.state = PlaybackState::Finished;
        self.in_flight = None;
        if casting {
            effects.push(Effect::CastControl(CastAction::Stop));
        }
        info!(words = self.doc.len(), "Playback finished");
        effects.push(Effect::ClearHighlight);
        effects.push(Effect::Status("Finished".to_string()));
    }

    /// Cancellation shared by stop, restart and errors.
    fn halt(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_in_flight(effects);
        self.epoch = self.epoch.wrapping_add(1);
        self.cursor = 0;
        self.state = PlaybackState::Idle;
    }

    fn cancel_in_flight(&mut self, effects: &mut Vec<Effect>) {
        self.epoch = self.epoch.wrapping_add(1);
        self.cancel_timers(effects);
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        debug!(
            phase = flight.phase.name(),
            chunk_start = flight.chunk.start,
            "Cancelling in-flight chunk"
        );
        match flight.phase {
            Phase::Speaking => effects.push(Effect::CancelSpeech),
            Phase::Playing { .. } => effects.push(Effect::StopAudio),
            Phase::Casting { .. } => effects.push(Effect::CastControl(CastAction::Stop)),
            Phase::Uploading { epoch, .. } => {
                self.abandoned_uploads.insert(epoch);
            }
            Phase::Requesting => {}
        }
    }

    fn cancel_timers(&mut self, effects: &mut Vec<Effect>) {
        let mut ids: BTreeSet<TimerId> = self.cast.drain().into_iter().collect();
        ids.extend(self.tick.take());
        ids.extend(self.deadline.take());
        effects.extend(ids.into_iter().map(|id| Effect::CancelTimer { id }));
    }

    fn start_timer(&mut self, after: Duration, effects: &mut Vec<Effect>) -> TimerId {
        self.next_timer = self.next_timer.wrapping_add(1);
        let id = TimerId(self.next_timer);
        effects.push(Effect::StartTimer { id, after });
        id
    }

    fn set_phase(&mut self, phase: Phase) {
        if let Some(flight) = self.in_flight.as_mut() {
            flight.phase = phase;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(count: usize) -> Document {
        let text = (0..count)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        Document::from_text(&text)
    }

    fn build_test_controller(backend: Backend, count: usize) -> PlaybackController {
        let mut controller = PlaybackController::new(Some(backend), ControllerSettings::default());
        controller.load(words(count));
        controller
    }

    fn clip() -> AudioClip {
        AudioClip::from_bytes(vec![1, 2, 3])
    }

    fn synthesize_epoch(effects: &[Effect]) -> Option<(u64, SynthesisChunk)> {
        effects.iter().find_map(|effect| match effect {
            Effect::Synthesize { epoch, chunk, .. } => Some((*epoch, *chunk)),
            _ => None,
        })
    }

    fn speak_epoch(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|effect| match effect {
            Effect::Speak { epoch, .. } => Some(*epoch),
            _ => None,
        })
    }

    fn started_timers(effects: &[Effect]) -> Vec<(TimerId, Duration)> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::StartTimer { id, after } => Some((*id, *after)),
                _ => None,
            })
            .collect()
    }

    fn cancelled_timers(effects: &[Effect]) -> Vec<TimerId> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::CancelTimer { id } => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn statuses(effects: &[Effect]) -> Vec<&str> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Status(status) => Some(status.as_str()),
                _ => None,
            })
            .collect()
    }

    fn in_flight_chunk(controller: &PlaybackController) -> Option<SynthesisChunk> {
        controller.in_flight.as_ref().map(|flight| flight.chunk)
    }

    fn cast_controls(effects: &[Effect]) -> Vec<CastAction> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::CastControl(action) => Some(*action),
                _ => None,
            })
            .collect()
    }

    /// Drive a casting controller up to the point the relay accepted the
    /// current chunk.
    fn deliver_cast_chunk(controller: &mut PlaybackController, effects: &[Effect]) -> Vec<Effect> {
        let (epoch, _) = synthesize_epoch(effects).unwrap();
        let uploaded = controller.handle_event(AdapterEvent::Synthesized {
            epoch,
            audio: clip(),
            duration: None,
        });
        assert!(uploaded
            .iter()
            .any(|effect| matches!(effect, Effect::CastAudio { .. })));
        controller.handle_event(AdapterEvent::CastDelivered { epoch })
    }

    #[test]
    fn load_resets_cursor_and_state() {
        let mut controller = build_test_controller(Backend::Remote, 10);
        controller.skip(4);
        let effects = controller.load(words(3));
        assert_eq!(controller.cursor(), 0);
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(effects.contains(&Effect::Highlight { cursor: 0 }));
    }

    #[test]
    fn empty_load_keeps_previous_document() {
        let mut controller = build_test_controller(Backend::Local, 5);
        let effects = controller.load(Document::from_text("   "));
        assert_eq!(statuses(&effects), vec!["No text found"]);
        assert_eq!(controller.document().len(), 5);
    }

    #[test]
    fn play_without_backend_asks_for_server() {
        let mut controller = PlaybackController::new(None, ControllerSettings::default());
        controller.load(words(3));
        let effects = controller.play();
        assert_eq!(statuses(&effects), vec!["Please configure TTS server"]);
        assert_eq!(controller.state(), PlaybackState::Idle);
    }

    #[test]
    fn casting_requires_remote_backend() {
        let mut controller = build_test_controller(Backend::Local, 3);
        controller.set_cast_connected(true);
        let effects = controller.play();
        assert_eq!(
            statuses(&effects),
            vec!["Casting requires the synthesis server"]
        );
        assert!(speak_epoch(&effects).is_none());
    }

    #[test]
    fn play_at_end_finishes_without_dispatch() {
        let mut controller = build_test_controller(Backend::Remote, 3);
        let effects = controller.play();
        let (epoch, _) = synthesize_epoch(&effects).unwrap();
        controller.handle_event(AdapterEvent::Synthesized {
            epoch,
            audio: clip(),
            duration: Some(Duration::from_secs(3)),
        });
        controller.handle_event(AdapterEvent::AudioEnded { epoch });
        assert_eq!(controller.state(), PlaybackState::Finished);

        let effects = controller.play();
        assert!(synthesize_epoch(&effects).is_none());
        assert_eq!(controller.state(), PlaybackState::Finished);
    }

    #[test]
    fn remote_chunks_cover_document_once_in_order() {
        let mut controller = build_test_controller(Backend::Remote, 120);
        let mut effects = controller.play();
        let mut chunks = Vec::new();

        while let Some((epoch, chunk)) = synthesize_epoch(&effects) {
            chunks.push(chunk.range());
            assert_eq!(in_flight_chunk(&controller), Some(chunk));
            controller.handle_event(AdapterEvent::Synthesized {
                epoch,
                audio: clip(),
                duration: Some(Duration::from_secs(10)),
            });
            effects = controller.handle_event(AdapterEvent::AudioEnded { epoch });
        }

        assert_eq!(chunks, vec![0..50, 50..100, 100..120]);
        assert_eq!(controller.state(), PlaybackState::Finished);
        assert_eq!(controller.cursor(), 120);
        assert!(effects.contains(&Effect::ClearHighlight));
        assert_eq!(statuses(&effects), vec!["Finished"]);
    }

    #[test]
    fn remote_ticks_advance_within_chunk() {
        let mut controller = build_test_controller(Backend::Remote, 4);
        let effects = controller.play();
        let (epoch, _) = synthesize_epoch(&effects).unwrap();
        let effects = controller.handle_event(AdapterEvent::Synthesized {
            epoch,
            audio: clip(),
            duration: Some(Duration::from_secs(2)),
        });
        let timers = started_timers(&effects);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].1, Duration::from_millis(500));

        let mut next = timers[0].0;
        for expected in 1..=3 {
            let effects = controller.timer_fired(next);
            assert_eq!(controller.cursor(), expected);
            assert!(effects.contains(&Effect::Highlight { cursor: expected }));
            match started_timers(&effects).first() {
                Some((id, _)) => next = *id,
                None => assert_eq!(expected, 3),
            }
        }
        // Ticks stop at the last word of the chunk.
        assert!(controller.timer_fired(next).is_empty());
        assert_eq!(controller.cursor(), 3);
    }

    #[test]
    fn stop_then_play_ignores_cancelled_completion() {
        let mut controller = build_test_controller(Backend::Remote, 120);
        let first = controller.play();
        let (old_epoch, _) = synthesize_epoch(&first).unwrap();

        let stopped = controller.stop();
        assert!(stopped.contains(&Effect::ClearHighlight));
        assert_eq!(controller.cursor(), 0);
        assert_eq!(controller.state(), PlaybackState::Idle);

        let replay = controller.play();
        let (new_epoch, chunk) = synthesize_epoch(&replay).unwrap();
        assert_ne!(old_epoch, new_epoch);
        assert_eq!(chunk.range(), 0..50);

        let stale = controller.handle_event(AdapterEvent::Synthesized {
            epoch: old_epoch,
            audio: clip(),
            duration: None,
        });
        assert!(stale.is_empty());
        assert!(controller
            .handle_event(AdapterEvent::AudioEnded { epoch: old_epoch })
            .is_empty());
        assert_eq!(controller.cursor(), 0);
        assert_eq!(in_flight_chunk(&controller), Some(chunk));
    }

    #[test]
    fn skip_clamps_to_document() {
        let mut controller = build_test_controller(Backend::Remote, 10);
        controller.skip(-5);
        assert_eq!(controller.cursor(), 0);
        controller.skip(25);
        assert_eq!(controller.cursor(), 9);
        controller.skip(-3);
        assert_eq!(controller.cursor(), 6);
    }

    #[test]
    fn skip_while_playing_redispatches_once() {
        let mut controller = build_test_controller(Backend::Remote, 100);
        let effects = controller.play();
        let (old_epoch, _) = synthesize_epoch(&effects).unwrap();

        let effects = controller.skip(10);
        let (epoch, chunk) = synthesize_epoch(&effects).unwrap();
        assert_eq!(chunk.range(), 10..60);
        assert_ne!(epoch, old_epoch);
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert!(controller
            .handle_event(AdapterEvent::AudioEnded { epoch: old_epoch })
            .is_empty());
    }

    #[test]
    fn skip_while_local_audio_plays_stops_it() {
        let mut controller = build_test_controller(Backend::Remote, 100);
        let effects = controller.play();
        let (epoch, _) = synthesize_epoch(&effects).unwrap();
        controller.handle_event(AdapterEvent::Synthesized {
            epoch,
            audio: clip(),
            duration: Some(Duration::from_secs(20)),
        });
        let effects = controller.skip(-10);
        assert!(effects.contains(&Effect::StopAudio));
        assert_eq!(synthesize_epoch(&effects).unwrap().1.range(), 0..50);
    }

    #[test]
    fn skip_while_paused_stays_paused() {
        let mut controller = build_test_controller(Backend::Remote, 100);
        let effects = controller.play();
        let (epoch, _) = synthesize_epoch(&effects).unwrap();
        controller.handle_event(AdapterEvent::Synthesized {
            epoch,
            audio: clip(),
            duration: Some(Duration::from_secs(20)),
        });
        controller.pause();

        let effects = controller.skip(10);
        assert!(effects.contains(&Effect::StopAudio));
        assert_eq!(controller.state(), PlaybackState::Paused);
        assert_eq!(controller.cursor(), 10);

        let effects = controller.play();
        assert_eq!(synthesize_epoch(&effects).unwrap().1.range(), 10..60);
    }

    #[test]
    fn skip_from_finished_returns_to_idle() {
        let mut controller = build_test_controller(Backend::Local, 5);
        let effects = controller.play();
        let epoch = speak_epoch(&effects).unwrap();
        controller.handle_event(AdapterEvent::SpeechEnded { epoch });
        assert_eq!(controller.state(), PlaybackState::Finished);

        controller.skip(-2);
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert_eq!(controller.cursor(), 3);
    }

    #[test]
    fn local_boundaries_clamp_to_last_word() {
        let mut controller = build_test_controller(Backend::Local, 3);
        let effects = controller.play();
        let epoch = speak_epoch(&effects).unwrap();
        for _ in 0..5 {
            controller.handle_event(AdapterEvent::WordBoundary { epoch });
        }
        assert_eq!(controller.cursor(), 2);
        let effects = controller.handle_event(AdapterEvent::SpeechEnded { epoch });
        assert_eq!(controller.cursor(), 3);
        assert_eq!(controller.state(), PlaybackState::Finished);
        assert_eq!(statuses(&effects), vec!["Finished"]);
    }

    #[test]
    fn local_pause_cancels_and_resume_speaks_from_cursor() {
        let mut controller = build_test_controller(Backend::Local, 6);
        let effects = controller.play();
        let epoch = speak_epoch(&effects).unwrap();
        controller.handle_event(AdapterEvent::WordBoundary { epoch });
        controller.handle_event(AdapterEvent::WordBoundary { epoch });

        let effects = controller.pause();
        assert!(effects.contains(&Effect::CancelSpeech));
        assert_eq!(controller.state(), PlaybackState::Paused);
        assert!(controller
            .handle_event(AdapterEvent::SpeechEnded { epoch })
            .is_empty());

        let effects = controller.play();
        let text = effects.iter().find_map(|effect| match effect {
            Effect::Speak { text, .. } => Some(text.clone()),
            _ => None,
        });
        assert_eq!(text.as_deref(), Some("w2 w3 w4 w5"));
    }

    #[test]
    fn play_toggles_pause_while_playing() {
        let mut controller = build_test_controller(Backend::Local, 4);
        controller.play();
        let effects = controller.play();
        assert_eq!(controller.state(), PlaybackState::Paused);
        assert_eq!(statuses(&effects), vec!["Paused"]);
    }

    #[test]
    fn remote_pause_and_resume_use_sink() {
        let mut controller = build_test_controller(Backend::Remote, 10);
        let effects = controller.play();
        let (epoch, _) = synthesize_epoch(&effects).unwrap();
        let effects = controller.handle_event(AdapterEvent::Synthesized {
            epoch,
            audio: clip(),
            duration: Some(Duration::from_secs(5)),
        });
        let (tick, _) = started_timers(&effects)[0];

        let paused = controller.pause();
        assert!(paused.contains(&Effect::PauseAudio));
        assert_eq!(cancelled_timers(&paused), vec![tick]);
        assert!(controller.timer_fired(tick).is_empty());

        let resumed = controller.play();
        let new_epoch = controller.epoch();
        assert!(resumed.contains(&Effect::ResumeAudio { epoch: new_epoch }));
        assert_eq!(started_timers(&resumed).len(), 1);
        assert!(synthesize_epoch(&resumed).is_none());

        // End of the resumed audio is reported under the new epoch.
        assert!(controller
            .handle_event(AdapterEvent::AudioEnded { epoch })
            .is_empty());
        controller.handle_event(AdapterEvent::AudioEnded { epoch: new_epoch });
        assert_eq!(controller.state(), PlaybackState::Finished);
    }

    #[test]
    fn pause_while_requesting_drops_the_request() {
        let mut controller = build_test_controller(Backend::Remote, 10);
        let effects = controller.play();
        let (epoch, _) = synthesize_epoch(&effects).unwrap();
        controller.pause();
        assert!(controller
            .handle_event(AdapterEvent::Synthesized {
                epoch,
                audio: clip(),
                duration: None,
            })
            .is_empty());
        let effects = controller.play();
        assert_eq!(synthesize_epoch(&effects).unwrap().1.range(), 0..10);
    }

    #[test]
    fn casting_schedules_ticks_and_deadline() {
        let mut controller = build_test_controller(Backend::Remote, 120);
        controller.set_cast_connected(true);
        let effects = controller.play();
        let delivered = deliver_cast_chunk(&mut controller, &effects);

        let timers = started_timers(&delivered);
        assert_eq!(timers.len(), 2);
        assert_eq!(timers[0].1, Duration::from_millis(400));
        assert_eq!(timers[1].1, Duration::from_secs(20));
        assert_eq!(controller.cast.pending_count(), 2);
        assert_eq!(statuses(&delivered), vec!["Casting..."]);

        let next = controller.timer_fired(timers[1].0);
        assert_eq!(controller.cursor(), 50);
        assert_eq!(synthesize_epoch(&next).unwrap().1.range(), 50..100);
        assert!(cancelled_timers(&next).contains(&timers[0].0));
    }

    #[test]
    fn pause_while_casting_sends_one_pause_and_silences_timers() {
        let mut controller = build_test_controller(Backend::Remote, 120);
        controller.set_cast_connected(true);
        let effects = controller.play();
        let delivered = deliver_cast_chunk(&mut controller, &effects);
        let timers = started_timers(&delivered);
        let tick_effects = controller.timer_fired(timers[0].0);
        let second_tick = started_timers(&tick_effects)[0].0;

        let paused = controller.pause();
        assert_eq!(cast_controls(&paused), vec![CastAction::Pause]);
        let mut cancelled = cancelled_timers(&paused);
        cancelled.sort();
        assert_eq!(cancelled, vec![timers[1].0, second_tick]);
        assert_eq!(controller.cast.pending_count(), 0);

        for id in [timers[0].0, timers[1].0, second_tick] {
            assert!(controller.timer_fired(id).is_empty());
        }
        assert_eq!(controller.cursor(), 1);
        assert!(controller.pause().is_empty());

        let resumed = controller.play();
        assert_eq!(cast_controls(&resumed), vec![CastAction::Play]);
        let rearmed = started_timers(&resumed);
        assert_eq!(rearmed.len(), 2);
        assert_eq!(rearmed[1].1, Duration::from_millis(400) * 49);
    }

    #[test]
    fn pause_during_cast_upload_holds_the_delivered_chunk() {
        let mut controller = build_test_controller(Backend::Remote, 120);
        controller.set_cast_connected(true);
        let effects = controller.play();
        let (epoch, _) = synthesize_epoch(&effects).unwrap();
        controller.handle_event(AdapterEvent::Synthesized {
            epoch,
            audio: clip(),
            duration: None,
        });

        let paused = controller.pause();
        assert_eq!(cast_controls(&paused), vec![CastAction::Pause]);
        assert_eq!(controller.state(), PlaybackState::Paused);
        assert_eq!(in_flight_chunk(&controller).unwrap().range(), 0..50);

        // The relay starts playing as soon as it has the audio.
        let delivered = controller.handle_event(AdapterEvent::CastDelivered { epoch });
        assert_eq!(cast_controls(&delivered), vec![CastAction::Pause]);
        assert!(started_timers(&delivered).is_empty());
        assert_eq!(controller.state(), PlaybackState::Paused);

        let resumed = controller.play();
        assert!(synthesize_epoch(&resumed).is_none());
        assert!(!resumed
            .iter()
            .any(|effect| matches!(effect, Effect::CastAudio { .. })));
        assert_eq!(cast_controls(&resumed), vec![CastAction::Play]);
        let timers = started_timers(&resumed);
        assert_eq!(timers.len(), 2);
        assert_eq!(timers[1].1, Duration::from_secs(20));
        assert_eq!(controller.cast.pending_count(), 2);
    }

    #[test]
    fn resume_before_cast_upload_finishes_waits_for_the_relay() {
        let mut controller = build_test_controller(Backend::Remote, 120);
        controller.set_cast_connected(true);
        let effects = controller.play();
        let (epoch, _) = synthesize_epoch(&effects).unwrap();
        controller.handle_event(AdapterEvent::Synthesized {
            epoch,
            audio: clip(),
            duration: None,
        });
        controller.pause();

        let resumed = controller.play();
        assert!(synthesize_epoch(&resumed).is_none());
        assert_eq!(cast_controls(&resumed), vec![CastAction::Play]);
        assert_eq!(statuses(&resumed), vec!["Sending to cast device..."]);
        assert!(started_timers(&resumed).is_empty());

        let delivered = controller.handle_event(AdapterEvent::CastDelivered { epoch });
        assert_eq!(started_timers(&delivered).len(), 2);
        assert_eq!(statuses(&delivered), vec!["Casting..."]);
    }

    #[test]
    fn cast_failure_while_paused_redispatches_on_resume() {
        let mut controller = build_test_controller(Backend::Remote, 20);
        controller.set_cast_connected(true);
        let effects = controller.play();
        let (epoch, _) = synthesize_epoch(&effects).unwrap();
        controller.handle_event(AdapterEvent::Synthesized {
            epoch,
            audio: clip(),
            duration: None,
        });
        controller.pause();

        let failed = controller.handle_event(AdapterEvent::CastFailed {
            epoch,
            message: "relay down".into(),
        });
        assert_eq!(statuses(&failed), vec!["Cast error: relay down"]);
        assert!(!failed
            .iter()
            .any(|effect| matches!(effect, Effect::PlayAudio { .. })));
        assert_eq!(controller.state(), PlaybackState::Paused);

        let resumed = controller.play();
        assert_eq!(synthesize_epoch(&resumed).unwrap().1.range(), 0..20);
    }

    #[test]
    fn upload_finishing_after_stop_is_silenced_once() {
        let mut controller = build_test_controller(Backend::Remote, 60);
        controller.set_cast_connected(true);
        let effects = controller.play();
        let (epoch, _) = synthesize_epoch(&effects).unwrap();
        controller.handle_event(AdapterEvent::Synthesized {
            epoch,
            audio: clip(),
            duration: None,
        });

        let stopped = controller.stop();
        assert!(cast_controls(&stopped).is_empty());
        let late = controller.handle_event(AdapterEvent::CastDelivered { epoch });
        assert_eq!(cast_controls(&late), vec![CastAction::Stop]);
        assert!(controller
            .handle_event(AdapterEvent::CastDelivered { epoch })
            .is_empty());
        assert_eq!(controller.state(), PlaybackState::Idle);
    }

    #[test]
    fn pause_while_requesting_for_the_relay_pauses_it() {
        let mut controller = build_test_controller(Backend::Remote, 10);
        controller.set_cast_connected(true);
        controller.play();
        let paused = controller.pause();
        assert_eq!(cast_controls(&paused), vec![CastAction::Pause]);
        let resumed = controller.play();
        assert_eq!(synthesize_epoch(&resumed).unwrap().1.range(), 0..10);
    }

    #[test]
    fn stop_while_casting_sends_stop() {
        let mut controller = build_test_controller(Backend::Remote, 60);
        controller.set_cast_connected(true);
        let effects = controller.play();
        deliver_cast_chunk(&mut controller, &effects);
        let stopped = controller.stop();
        assert_eq!(cast_controls(&stopped), vec![CastAction::Stop]);
        assert_eq!(cancelled_timers(&stopped).len(), 2);
        assert_eq!(controller.cast.pending_count(), 0);
    }

    #[test]
    fn cast_failure_falls_back_to_local_audio() {
        let mut controller = build_test_controller(Backend::Remote, 20);
        controller.set_cast_connected(true);
        let effects = controller.play();
        let (epoch, _) = synthesize_epoch(&effects).unwrap();
        controller.handle_event(AdapterEvent::Synthesized {
            epoch,
            audio: clip(),
            duration: Some(Duration::from_secs(4)),
        });
        let effects = controller.handle_event(AdapterEvent::CastFailed {
            epoch,
            message: "relay down".into(),
        });
        assert_eq!(statuses(&effects), vec!["Cast error: relay down", "Playing..."]);
        assert!(effects.contains(&Effect::PlayAudio {
            epoch,
            audio: clip()
        }));
        assert_eq!(started_timers(&effects)[0].1, Duration::from_millis(200));
    }

    #[test]
    fn adapter_error_behaves_like_stop() {
        let mut controller = build_test_controller(Backend::Remote, 80);
        controller.skip(5);
        let effects = controller.play();
        let (epoch, _) = synthesize_epoch(&effects).unwrap();
        let effects = controller.handle_event(AdapterEvent::Failed {
            epoch,
            message: "TTS server error".into(),
        });
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert_eq!(controller.cursor(), 0);
        assert_eq!(statuses(&effects), vec!["Error: TTS server error"]);
        assert!(in_flight_chunk(&controller).is_none());
    }

    #[test]
    fn restart_shows_first_word() {
        let mut controller = build_test_controller(Backend::Local, 5);
        controller.play();
        let effects = controller.restart();
        assert!(effects.contains(&Effect::CancelSpeech));
        assert!(effects.contains(&Effect::Highlight { cursor: 0 }));
        assert_eq!(statuses(&effects), vec!["Ready to play"]);
        assert_eq!(controller.state(), PlaybackState::Idle);
    }

    #[test]
    fn seek_positions_without_playing() {
        let mut controller = build_test_controller(Backend::Remote, 30);
        let effects = controller.seek(12);
        assert_eq!(effects, vec![Effect::Highlight { cursor: 12 }]);
        assert_eq!(controller.state(), PlaybackState::Idle);
        controller.seek(99);
        assert_eq!(controller.cursor(), 29);
        assert!((controller.progress() - 29.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn rate_is_clamped() {
        let mut controller = build_test_controller(Backend::Remote, 3);
        controller.set_rate(5.0);
        assert_eq!(controller.rate(), MAX_RATE);
        controller.set_rate(0.1);
        assert_eq!(controller.rate(), MIN_RATE);
    }
}
