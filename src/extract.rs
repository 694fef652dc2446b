//! Text extraction from pages, plain-text files and selections.
//!
//! Page text is gathered by walking the visible text nodes of the document
//! body. Non-content elements (scripts, navigation, headers, footers, ...)
//! and the reader's own panel are skipped.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;

/// Element id of the reader panel; its text never counts as page content.
pub const PANEL_ELEMENT_ID: &str = "read-aloud-panel";

static RE_HORIZONTAL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{00A0}]+").unwrap());

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "nav", "footer", "header", "head", "template",
];

const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "body",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "li",
    "main",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "td",
    "th",
    "tr",
    "ul",
];

/// Text loaded from one source, ready for tokenization.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub text: String,
    /// Original markup, kept so in-page highlighting can rebuild the text
    /// nodes. `None` for plain-text sources.
    pub html: Option<String>,
}

/// One visible text node. Nodes sharing `block` belong to the same block
/// element and render on the same line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    pub text: String,
    pub block: usize,
}

/// Load a URL, an HTML file or a plain-text file.
pub fn load_source(source: &str) -> Result<ExtractedPage> {
    if source.starts_with("http://") || source.starts_with("https://") {
        info!(url = source, "Fetching page");
        let body = reqwest::blocking::get(source)
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .with_context(|| format!("Fetching {source}"))?;
        return Ok(from_html(body));
    }

    let path = Path::new(source);
    let contents =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let is_html = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "html" | "htm" | "xhtml"))
        .unwrap_or(false);
    if is_html {
        Ok(from_html(contents))
    } else {
        debug!(path = %path.display(), "Loading plain text source");
        Ok(ExtractedPage {
            title: None,
            text: normalize_text(&contents),
            html: None,
        })
    }
}

fn from_html(html: String) -> ExtractedPage {
    let parsed = Html::parse_document(&html);
    let text = join_text_nodes(&visible_text_nodes(&parsed));
    ExtractedPage {
        title: page_title(&parsed),
        text,
        html: Some(html),
    }
}

/// Trimmed selection text, or `None` when nothing meaningful is selected.
pub fn selection_text(selection: &str) -> Option<String> {
    let trimmed = selection.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(normalize_text(trimmed))
    }
}

pub fn page_title(html: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let title = html
        .select(&selector)
        .next()?
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    Some(title).filter(|t| !t.is_empty())
}

/// Walk the body in document order and collect text nodes that are visible
/// page content.
pub fn visible_text_nodes(html: &Html) -> Vec<TextNode> {
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| html.select(&selector).next())
        .unwrap_or_else(|| html.root_element());

    let mut nodes = Vec::new();
    let mut block = 0usize;
    let mut last_block_id = None;

    for node in body.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let mut block_id = None;
        let mut skipped = false;
        for ancestor in node.ancestors().filter_map(ElementRef::wrap) {
            let element = ancestor.value();
            if SKIPPED_TAGS.contains(&element.name()) || element.id() == Some(PANEL_ELEMENT_ID) {
                skipped = true;
                break;
            }
            if block_id.is_none() && BLOCK_TAGS.contains(&element.name()) {
                block_id = Some(ancestor.id());
            }
        }
        if skipped {
            continue;
        }
        if last_block_id.is_some() && block_id != last_block_id {
            block += 1;
        }
        last_block_id = block_id;
        nodes.push(TextNode {
            text: text.to_string(),
            block,
        });
    }
    nodes
}

fn join_text_nodes(nodes: &[TextNode]) -> String {
    let mut joined = String::new();
    let mut current_block = None;
    for node in nodes {
        if current_block.is_some() && current_block != Some(node.block) {
            joined.push('\n');
        }
        current_block = Some(node.block);
        joined.push_str(&node.text);
    }
    normalize_text(&joined)
}

/// NFC-normalize, collapse runs of spaces, trim every line and drop blank
/// lines.
fn normalize_text(text: &str) -> String {
    let composed: String = text.nfc().collect();
    composed
        .lines()
        .map(|line| RE_HORIZONTAL_WS.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
