//! Cloud library sync: auth, saved articles and collections.

pub mod auth;
pub mod client;
pub mod models;

pub use auth::{AuthManager, UserInfo};
pub use client::{CloudClient, CloudError, CloudResult, validate_collection_name};
pub use models::{Article, ArticleCreate, ArticleUpdate, Collection, CollectionCreate, CollectionUpdate};

use crate::cast;
use crate::text_utils::Document;
use chrono::Utc;
use tracing::info;

/// Title for a saved article: the page title, else the opening words.
pub fn article_title(page_title: Option<&str>, doc: &Document) -> String {
    page_title
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| doc.title_hint())
}

pub fn save_article(
    auth: &mut AuthManager,
    article: &ArticleCreate,
) -> anyhow::Result<Article> {
    let saved = auth.require_auth()?.create_article(article)?;
    auth.touch_last_sync(Utc::now())?;
    info!(id = %saved.id, title = %saved.title, "Article saved to cloud");
    Ok(saved)
}

/// Word index for a saved playback position.
pub fn position_to_word(seconds: u64, rate: f32, len: usize) -> usize {
    let word = cast::seconds_to_words(seconds as f64, cast::DEFAULT_WORDS_PER_MINUTE, rate);
    word.min(len.saturating_sub(1))
}

/// Playback position in whole seconds for a word index.
pub fn word_to_position(word: usize, rate: f32) -> u64 {
    cast::words_to_seconds(word, cast::DEFAULT_WORDS_PER_MINUTE, rate).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_prefers_page_title() {
        let doc = Document::from_text("one two three four five six seven eight nine ten eleven");
        assert_eq!(article_title(Some(" My Page "), &doc), "My Page");
        assert_eq!(
            article_title(None, &doc),
            "one two three four five six seven eight nine ten..."
        );
        assert_eq!(article_title(Some("  "), &doc), doc.title_hint());
    }

    #[test]
    fn positions_map_through_words() {
        assert_eq!(position_to_word(60, 1.0, 1000), 150);
        assert_eq!(position_to_word(60, 1.0, 100), 99);
        assert_eq!(word_to_position(150, 1.0), 60);
        assert_eq!(word_to_position(0, 1.5), 0);
        let word = position_to_word(word_to_position(300, 1.25), 1.25, 1000);
        assert!(word.abs_diff(300) <= 1);
    }
}
