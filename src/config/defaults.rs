pub(crate) fn default_tts_server_url() -> String {
    "http://localhost:5000".to_string()
}

pub(crate) fn default_speech_rate() -> f32 {
    1.0
}

pub(crate) fn default_voice_program() -> String {
    "espeak-ng".to_string()
}

pub(crate) fn default_voice_words_per_minute() -> u32 {
    175
}

pub(crate) fn default_boundary_throttle_ms() -> u64 {
    200
}

pub(crate) fn default_chunk_size() -> usize {
    50
}

pub(crate) fn default_audio_cache() -> bool {
    true
}

pub(crate) fn default_request_timeout_secs() -> u64 {
    10
}

pub(crate) fn default_relay_url() -> String {
    "http://localhost:5000".to_string()
}

pub(crate) fn default_cast_words_per_minute() -> u32 {
    crate::cast::DEFAULT_WORDS_PER_MINUTE
}

pub(crate) fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

pub(crate) fn default_skip_words() -> usize {
    10
}

pub(crate) fn default_context_words() -> usize {
    15
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Info
}
