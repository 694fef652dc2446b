use super::defaults;
use super::models::{AppConfig, LogLevel};
use crate::highlight::HighlightMode;
use crate::speech::SpeechMode;
use serde::Deserialize;

/// On-disk layout of `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct ConfigTables {
    #[serde(default)]
    speech: SpeechConfig,
    #[serde(default)]
    cast: CastConfig,
    #[serde(default)]
    cloud: CloudConfig,
    #[serde(default)]
    playback: PlaybackConfig,
    #[serde(default)]
    highlight: HighlightConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

impl From<ConfigTables> for AppConfig {
    fn from(tables: ConfigTables) -> Self {
        AppConfig {
            speech_mode: tables.speech.mode,
            tts_server_url: tables.speech.tts_server_url,
            speech_rate: tables.speech.rate,
            voice_program: tables.speech.voice_program,
            voice: tables.speech.voice,
            voice_words_per_minute: tables.speech.words_per_minute,
            boundary_throttle_ms: tables.speech.boundary_throttle_ms,
            chunk_size: tables.speech.chunk_size,
            audio_cache: tables.speech.audio_cache,
            synthesis_timeout_secs: tables.speech.timeout_secs,
            relay_url: tables.cast.relay_url,
            cast_words_per_minute: tables.cast.words_per_minute,
            relay_timeout_secs: tables.cast.timeout_secs,
            api_url: tables.cloud.api_url,
            api_timeout_secs: tables.cloud.timeout_secs,
            skip_words: tables.playback.skip_words,
            highlight_mode: tables.highlight.mode,
            context_words: tables.highlight.context_words,
            log_level: tables.logging.log_level,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SpeechConfig {
    #[serde(default)]
    mode: SpeechMode,
    #[serde(default = "defaults::default_tts_server_url")]
    tts_server_url: String,
    #[serde(default = "defaults::default_speech_rate")]
    rate: f32,
    #[serde(default = "defaults::default_voice_program")]
    voice_program: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    voice: Option<String>,
    #[serde(default = "defaults::default_voice_words_per_minute")]
    words_per_minute: u32,
    #[serde(default = "defaults::default_boundary_throttle_ms")]
    boundary_throttle_ms: u64,
    #[serde(default = "defaults::default_chunk_size")]
    chunk_size: usize,
    #[serde(default = "defaults::default_audio_cache")]
    audio_cache: bool,
    #[serde(default = "defaults::default_request_timeout_secs")]
    timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        SpeechConfig {
            mode: SpeechMode::default(),
            tts_server_url: defaults::default_tts_server_url(),
            rate: defaults::default_speech_rate(),
            voice_program: defaults::default_voice_program(),
            voice: None,
            words_per_minute: defaults::default_voice_words_per_minute(),
            boundary_throttle_ms: defaults::default_boundary_throttle_ms(),
            chunk_size: defaults::default_chunk_size(),
            audio_cache: defaults::default_audio_cache(),
            timeout_secs: defaults::default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CastConfig {
    #[serde(default = "defaults::default_relay_url")]
    relay_url: String,
    #[serde(default = "defaults::default_cast_words_per_minute")]
    words_per_minute: u32,
    #[serde(default = "defaults::default_request_timeout_secs")]
    timeout_secs: u64,
}

impl Default for CastConfig {
    fn default() -> Self {
        CastConfig {
            relay_url: defaults::default_relay_url(),
            words_per_minute: defaults::default_cast_words_per_minute(),
            timeout_secs: defaults::default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CloudConfig {
    #[serde(default = "defaults::default_api_url")]
    api_url: String,
    #[serde(default = "defaults::default_request_timeout_secs")]
    timeout_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        CloudConfig {
            api_url: defaults::default_api_url(),
            timeout_secs: defaults::default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PlaybackConfig {
    #[serde(default = "defaults::default_skip_words")]
    skip_words: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            skip_words: defaults::default_skip_words(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct HighlightConfig {
    #[serde(default)]
    mode: HighlightMode,
    #[serde(default = "defaults::default_context_words")]
    context_words: usize,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        HighlightConfig {
            mode: HighlightMode::default(),
            context_words: defaults::default_context_words(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: defaults::default_log_level(),
        }
    }
}
