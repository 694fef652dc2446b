use crate::highlight::HighlightMode;
use crate::speech::SpeechMode;
use serde::Deserialize;

/// Flat runtime configuration. On disk it is grouped into sections; see
/// `tables.rs`.
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub speech_mode: SpeechMode,
    #[serde(default = "crate::config::defaults::default_tts_server_url")]
    pub tts_server_url: String,
    #[serde(default = "crate::config::defaults::default_speech_rate")]
    pub speech_rate: f32,
    #[serde(default = "crate::config::defaults::default_voice_program")]
    pub voice_program: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default = "crate::config::defaults::default_voice_words_per_minute")]
    pub voice_words_per_minute: u32,
    #[serde(default = "crate::config::defaults::default_boundary_throttle_ms")]
    pub boundary_throttle_ms: u64,
    #[serde(default = "crate::config::defaults::default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "crate::config::defaults::default_audio_cache")]
    pub audio_cache: bool,
    #[serde(default = "crate::config::defaults::default_request_timeout_secs")]
    pub synthesis_timeout_secs: u64,
    #[serde(default = "crate::config::defaults::default_relay_url")]
    pub relay_url: String,
    #[serde(default = "crate::config::defaults::default_cast_words_per_minute")]
    pub cast_words_per_minute: u32,
    #[serde(default = "crate::config::defaults::default_request_timeout_secs")]
    pub relay_timeout_secs: u64,
    #[serde(default = "crate::config::defaults::default_api_url")]
    pub api_url: String,
    #[serde(default = "crate::config::defaults::default_request_timeout_secs")]
    pub api_timeout_secs: u64,
    #[serde(default = "crate::config::defaults::default_skip_words")]
    pub skip_words: usize,
    #[serde(default)]
    pub highlight_mode: HighlightMode,
    #[serde(default = "crate::config::defaults::default_context_words")]
    pub context_words: usize,
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            speech_mode: SpeechMode::default(),
            tts_server_url: crate::config::defaults::default_tts_server_url(),
            speech_rate: crate::config::defaults::default_speech_rate(),
            voice_program: crate::config::defaults::default_voice_program(),
            voice: None,
            voice_words_per_minute: crate::config::defaults::default_voice_words_per_minute(),
            boundary_throttle_ms: crate::config::defaults::default_boundary_throttle_ms(),
            chunk_size: crate::config::defaults::default_chunk_size(),
            audio_cache: crate::config::defaults::default_audio_cache(),
            synthesis_timeout_secs: crate::config::defaults::default_request_timeout_secs(),
            relay_url: crate::config::defaults::default_relay_url(),
            cast_words_per_minute: crate::config::defaults::default_cast_words_per_minute(),
            relay_timeout_secs: crate::config::defaults::default_request_timeout_secs(),
            api_url: crate::config::defaults::default_api_url(),
            api_timeout_secs: crate::config::defaults::default_request_timeout_secs(),
            skip_words: crate::config::defaults::default_skip_words(),
            highlight_mode: HighlightMode::default(),
            context_words: crate::config::defaults::default_context_words(),
            log_level: crate::config::defaults::default_log_level(),
        }
    }
}

impl AppConfig {
    /// Clamp values that would break playback.
    pub fn sanitized(mut self) -> Self {
        self.speech_rate = self.speech_rate.clamp(0.5, 2.0);
        self.chunk_size = self.chunk_size.max(1);
        self.voice_words_per_minute = self.voice_words_per_minute.max(1);
        self.cast_words_per_minute = self.cast_words_per_minute.max(1);
        self.skip_words = self.skip_words.max(1);
        self.tts_server_url = self.tts_server_url.trim_end_matches('/').to_string();
        self.relay_url = self.relay_url.trim_end_matches('/').to_string();
        self.api_url = self.api_url.trim_end_matches('/').to_string();
        self
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
