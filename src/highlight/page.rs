//! In-page highlighting over a text-node model of the host page.
//!
//! The page is held as a list of fragments, each remembering which original
//! text node it came from. Marking a word splits its node into
//! before / marker / after; removing the marker merges fragments of the same
//! origin back together, so the original nodes come back exactly.

use crate::extract::{self, TextNode};
use regex::{Regex, RegexBuilder};
use scraper::Html;
use tracing::{debug, trace};

const STRIPPED_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':'];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fragment {
    origin: usize,
    text: String,
    marked: bool,
}

/// Location of the current marker in original-node coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMark {
    pub node: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct PageDom {
    fragments: Vec<Fragment>,
    blocks: Vec<usize>,
    marked: bool,
    last_hit: Option<PageMark>,
    last_cursor: Option<usize>,
}

impl PageDom {
    pub fn from_nodes(nodes: Vec<TextNode>) -> Self {
        let blocks = nodes.iter().map(|node| node.block).collect();
        let fragments = nodes
            .into_iter()
            .enumerate()
            .map(|(origin, node)| Fragment {
                origin,
                text: node.text,
                marked: false,
            })
            .collect();
        Self {
            fragments,
            blocks,
            marked: false,
            last_hit: None,
            last_cursor: None,
        }
    }

    pub fn from_html(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        Self::from_nodes(extract::visible_text_nodes(&parsed))
    }

    /// One node per line, used when the source had no markup.
    pub fn from_plain_text(text: &str) -> Self {
        Self::from_nodes(
            text.lines()
                .enumerate()
                .map(|(block, line)| TextNode {
                    text: line.to_string(),
                    block,
                })
                .collect(),
        )
    }

    pub fn fragment_texts(&self) -> Vec<&str> {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }

    pub fn has_marker(&self) -> bool {
        self.marked
    }

    pub fn marked_text(&self) -> Option<&str> {
        self.fragments
            .iter()
            .find(|f| f.marked)
            .map(|f| f.text.as_str())
    }

    /// Mark the occurrence of `word` for the token at `cursor`.
    ///
    /// The search resumes after the previous hit while the cursor moves
    /// forward, and restarts from the top of the page when it moves back.
    /// Returns `None` when no node contains the word.
    pub fn mark(&mut self, word: &str, cursor: usize) -> Option<PageMark> {
        self.remove_marker();

        let needle = word.replace(STRIPPED_PUNCTUATION, "");
        if needle.is_empty() || self.fragments.is_empty() {
            return None;
        }
        let pattern = word_pattern(&needle)?;

        let from = match (self.last_cursor, self.last_hit) {
            (Some(last), Some(hit)) if cursor > last => (hit.node, hit.end),
            _ => (0, 0),
        };
        self.last_cursor = Some(cursor);

        let Some(hit) = self.find(&pattern, from) else {
            trace!(word = needle, "Word not found on page");
            return None;
        };
        self.split_at(hit);
        self.last_hit = Some(hit);
        Some(hit)
    }

    /// Merge marker fragments back into their original nodes.
    pub fn remove_marker(&mut self) {
        if !self.marked {
            return;
        }
        let mut merged: Vec<Fragment> = Vec::with_capacity(self.blocks.len());
        for fragment in self.fragments.drain(..) {
            match merged.last_mut() {
                Some(last) if last.origin == fragment.origin => {
                    last.text.push_str(&fragment.text);
                }
                _ => merged.push(Fragment {
                    marked: false,
                    ..fragment
                }),
            }
        }
        self.fragments = merged;
        self.marked = false;
    }

    /// Drop the marker and forget the search position.
    pub fn reset(&mut self) {
        self.remove_marker();
        self.last_hit = None;
        self.last_cursor = None;
    }

    /// Text of the block holding the marker, with the marked word bracketed.
    pub fn marked_block(&self) -> Option<String> {
        let marked = self.fragments.iter().find(|f| f.marked)?;
        let block = self.blocks.get(marked.origin).copied()?;
        let mut line = String::new();
        for fragment in &self.fragments {
            if self.blocks.get(fragment.origin) != Some(&block) {
                continue;
            }
            if fragment.marked {
                line.push('[');
                line.push_str(&fragment.text);
                line.push(']');
            } else {
                line.push_str(&fragment.text);
            }
        }
        Some(line.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    // Only valid while no marker is present: fragment index == origin.
    fn find(&self, pattern: &Regex, from: (usize, usize)) -> Option<PageMark> {
        let count = self.fragments.len();
        let (first, offset) = from;
        for step in 0..=count {
            let node = (first + step) % count;
            let text = &self.fragments[node].text;
            let start = if step == 0 { offset.min(text.len()) } else { 0 };
            if let Some(found) = pattern.find_at(text, start) {
                return Some(PageMark {
                    node,
                    start: found.start(),
                    end: found.end(),
                });
            }
        }
        None
    }

    fn split_at(&mut self, hit: PageMark) {
        let original = self.fragments.remove(hit.node);
        let before = original.text[..hit.start].to_string();
        let marked = original.text[hit.start..hit.end].to_string();
        let after = original.text[hit.end..].to_string();
        let pieces = [(before, false), (marked, true), (after, false)];
        for (offset, (text, is_marked)) in pieces.into_iter().enumerate() {
            self.fragments.insert(
                hit.node + offset,
                Fragment {
                    origin: original.origin,
                    text,
                    marked: is_marked,
                },
            );
        }
        self.marked = true;
        debug!(node = hit.node, start = hit.start, "Page marker placed");
    }
}

fn word_pattern(needle: &str) -> Option<Regex> {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(needle)))
        .case_insensitive(true)
        .build()
        .ok()
}
