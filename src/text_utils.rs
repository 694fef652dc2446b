//! Word tokenization for playback and highlighting.
//!
//! A [`Document`] is the unit the playback controller works on: an ordered,
//! immutable list of whitespace-delimited words. Loading new text replaces the
//! whole document.

use std::ops::Range;

/// Title fallback length when the page has no `<title>`.
pub const TITLE_HINT_WORDS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    words: Vec<String>,
}

impl Document {
    pub fn from_text(text: &str) -> Self {
        Self {
            words: split_words(text),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn word(&self, idx: usize) -> Option<&str> {
        self.words.get(idx).map(String::as_str)
    }

    /// Join the words in `range` with single spaces; out-of-range bounds are
    /// clamped.
    pub fn join(&self, range: Range<usize>) -> String {
        let end = range.end.min(self.words.len());
        let start = range.start.min(end);
        self.words[start..end].join(" ")
    }

    /// First few words followed by an ellipsis, used as a title when the
    /// source has none.
    pub fn title_hint(&self) -> String {
        let mut hint = self.join(0..TITLE_HINT_WORDS);
        hint.push_str("...");
        hint
    }
}

/// Split on any run of whitespace, dropping empty pieces.
pub fn split_words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
