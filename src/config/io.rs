use super::models::AppConfig;
use super::tables::ConfigTables;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load configuration from the given path, falling back to defaults on error.
pub fn load_config(path: &Path) -> AppConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return AppConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err}");
            AppConfig::default()
        }
    }
}

pub fn parse_config(contents: &str) -> Result<AppConfig, toml::de::Error> {
    let tables: ConfigTables = toml::from_str(contents)?;
    Ok(AppConfig::from(tables).sanitized())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use crate::highlight::HighlightMode;
    use crate::speech::SpeechMode;

    #[test]
    fn missing_fields_use_defaults() {
        let config = parse_config("[speech]\nmode = \"remote\"\n").unwrap();
        assert_eq!(config.speech_mode, SpeechMode::Remote);
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.boundary_throttle_ms, 200);
        assert_eq!(config.cast_words_per_minute, 150);
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn sections_map_onto_flat_config() {
        let config = parse_config(
            r#"
[speech]
tts_server_url = "http://tts.local:5000/"
rate = 1.5
voice = "en-us"

[cast]
words_per_minute = 120
timeout_secs = 5

[cloud]
timeout_secs = 45

[highlight]
mode = "page"
context_words = 8

[logging]
log_level = "warn"
"#,
        )
        .unwrap();
        assert_eq!(config.tts_server_url, "http://tts.local:5000");
        assert_eq!(config.speech_rate, 1.5);
        assert_eq!(config.voice.as_deref(), Some("en-us"));
        assert_eq!(config.cast_words_per_minute, 120);
        assert_eq!(config.relay_timeout_secs, 5);
        assert_eq!(config.api_timeout_secs, 45);
        assert_eq!(config.synthesis_timeout_secs, 10);
        assert_eq!(config.highlight_mode, HighlightMode::Page);
        assert_eq!(config.context_words, 8);
        assert_eq!(config.log_level, LogLevel::Warn);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = parse_config("[speech]\nrate = 9.0\nchunk_size = 0\n").unwrap();
        assert_eq!(config.speech_rate, 2.0);
        assert_eq!(config.chunk_size, 1);
    }

    #[test]
    fn invalid_or_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert_eq!(load_config(&missing), AppConfig::default());

        let broken = dir.path().join("config.toml");
        fs::write(&broken, "[speech\nrate = ").unwrap();
        assert_eq!(load_config(&broken), AppConfig::default());
    }
}
