use super::timers::TimerId;
use crate::cast::CastAction;
use crate::speech::audio::AudioClip;
use std::ops::Range;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
    Finished,
}

/// Half-open token range dispatched to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisChunk {
    pub start: usize,
    pub end: usize,
}

impl SynthesisChunk {
    pub fn new(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end.max(range.start),
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Side effects requested by the controller. The session executes them.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Speak {
        epoch: u64,
        text: String,
        rate: f32,
    },
    CancelSpeech,
    Synthesize {
        epoch: u64,
        chunk: SynthesisChunk,
        text: String,
        rate: f32,
    },
    PlayAudio {
        epoch: u64,
        audio: AudioClip,
    },
    PauseAudio,
    /// Resume paused audio; its end is reported under `epoch` from now on.
    ResumeAudio {
        epoch: u64,
    },
    StopAudio,
    CastAudio {
        epoch: u64,
        audio: AudioClip,
    },
    CastControl(CastAction),
    StartTimer {
        id: TimerId,
        after: Duration,
    },
    CancelTimer {
        id: TimerId,
    },
    Highlight {
        cursor: usize,
    },
    ClearHighlight,
    Status(String),
}

/// Backend reports, tagged with the epoch of the dispatch that caused them.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    WordBoundary {
        epoch: u64,
    },
    SpeechEnded {
        epoch: u64,
    },
    Synthesized {
        epoch: u64,
        audio: AudioClip,
        duration: Option<Duration>,
    },
    AudioEnded {
        epoch: u64,
    },
    CastDelivered {
        epoch: u64,
    },
    CastFailed {
        epoch: u64,
        message: String,
    },
    Failed {
        epoch: u64,
        message: String,
    },
}

impl AdapterEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            AdapterEvent::WordBoundary { epoch }
            | AdapterEvent::SpeechEnded { epoch }
            | AdapterEvent::Synthesized { epoch, .. }
            | AdapterEvent::AudioEnded { epoch }
            | AdapterEvent::CastDelivered { epoch }
            | AdapterEvent::CastFailed { epoch, .. }
            | AdapterEvent::Failed { epoch, .. } => *epoch,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AdapterEvent::WordBoundary { .. } => "word_boundary",
            AdapterEvent::SpeechEnded { .. } => "speech_ended",
            AdapterEvent::Synthesized { .. } => "synthesized",
            AdapterEvent::AudioEnded { .. } => "audio_ended",
            AdapterEvent::CastDelivered { .. } => "cast_delivered",
            AdapterEvent::CastFailed { .. } => "cast_failed",
            AdapterEvent::Failed { .. } => "failed",
        }
    }
}

/// User-facing commands accepted by a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    TogglePlay,
    Stop,
    Restart,
    SkipForward,
    SkipBackward,
    ToggleHighlightMode,
    CheckCast,
    Quit,
}

impl SessionCommand {
    pub fn action(&self) -> &'static str {
        match self {
            Self::TogglePlay => "playback_toggle_play",
            Self::Stop => "playback_stop",
            Self::Restart => "playback_restart",
            Self::SkipForward => "playback_skip_forward",
            Self::SkipBackward => "playback_skip_backward",
            Self::ToggleHighlightMode => "highlight_toggle_mode",
            Self::CheckCast => "cast_check_status",
            Self::Quit => "session_quit",
        }
    }

    /// Map one line of terminal input to a command.
    pub fn from_key(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "p" | "" => Some(Self::TogglePlay),
            "s" => Some(Self::Stop),
            "r" => Some(Self::Restart),
            "f" => Some(Self::SkipForward),
            "b" => Some(Self::SkipBackward),
            "h" => Some(Self::ToggleHighlightMode),
            "c" => Some(Self::CheckCast),
            "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_range_is_half_open() {
        let chunk = SynthesisChunk::new(50..100);
        assert_eq!(chunk.len(), 50);
        assert_eq!(chunk.range(), 50..100);
        assert_eq!(SynthesisChunk::new(7..5).range(), 7..7);
    }

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(SessionCommand::from_key("p\n"), Some(SessionCommand::TogglePlay));
        assert_eq!(SessionCommand::from_key(" F "), Some(SessionCommand::SkipForward));
        assert_eq!(SessionCommand::from_key("x"), None);
        assert_eq!(SessionCommand::Quit.action(), "session_quit");
    }

    #[test]
    fn events_expose_epoch() {
        let event = AdapterEvent::CastFailed {
            epoch: 9,
            message: "down".into(),
        };
        assert_eq!(event.epoch(), 9);
        assert_eq!(event.kind(), "cast_failed");
    }
}
