//! Word highlighting: either a context panel or markers inside the page.

pub mod page;
pub mod panel;

use crate::text_utils::Document;
use page::PageDom;
use panel::PanelView;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Narrow surface the playback session drives.
pub trait HighlightSink {
    fn show(&mut self, doc: &Document, cursor: usize);
    fn clear(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HighlightMode {
    #[default]
    Panel,
    Page,
}

impl HighlightMode {
    pub fn toggled(self) -> Self {
        match self {
            HighlightMode::Panel => HighlightMode::Page,
            HighlightMode::Page => HighlightMode::Panel,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HighlightMode::Panel => "panel",
            HighlightMode::Page => "page",
        }
    }
}

/// Owns both highlight targets; only one is active at a time.
///
/// Rendered output is buffered as a frame for the terminal front end to
/// print.
#[derive(Debug)]
pub struct HighlightRenderer {
    mode: HighlightMode,
    panel: PanelView,
    page: PageDom,
    frame: Option<String>,
}

impl HighlightRenderer {
    pub fn new(mode: HighlightMode, context_words: usize, page: PageDom) -> Self {
        let mut renderer = Self {
            mode: HighlightMode::Panel,
            panel: PanelView::new(context_words),
            page,
            frame: None,
        };
        renderer.set_mode(mode);
        renderer
    }

    pub fn mode(&self) -> HighlightMode {
        self.mode
    }

    /// Switch modes, undoing everything the previous mode put on screen.
    pub fn set_mode(&mut self, mode: HighlightMode) {
        match mode {
            HighlightMode::Panel => {
                self.page.reset();
                self.panel.set_visible(true);
            }
            HighlightMode::Page => {
                self.panel.set_visible(false);
            }
        }
        self.mode = mode;
        self.frame = None;
        debug!(mode = mode.as_str(), "Highlight mode set");
    }

    pub fn toggle(&mut self) -> HighlightMode {
        self.set_mode(self.mode.toggled());
        self.mode
    }

    pub fn replace_page(&mut self, page: PageDom) {
        self.page.reset();
        self.page = page;
    }

    pub fn take_frame(&mut self) -> Option<String> {
        self.frame.take()
    }

    pub fn panel(&self) -> &PanelView {
        &self.panel
    }

    pub fn page(&self) -> &PageDom {
        &self.page
    }
}

impl HighlightSink for HighlightRenderer {
    fn show(&mut self, doc: &Document, cursor: usize) {
        self.frame = match self.mode {
            HighlightMode::Panel => self.panel.show(doc, cursor),
            HighlightMode::Page => {
                let word = doc.word(cursor).unwrap_or_default();
                self.page
                    .mark(word, cursor)
                    .and_then(|_| self.page.marked_block())
            }
        };
    }

    fn clear(&mut self) {
        self.panel.clear();
        self.page.reset();
        self.frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "alpha beta gamma\ndelta epsilon";

    fn renderer(mode: HighlightMode) -> (HighlightRenderer, Document) {
        let doc = Document::from_text(TEXT);
        let page = PageDom::from_plain_text(TEXT);
        (HighlightRenderer::new(mode, 15, page), doc)
    }

    #[test]
    fn panel_mode_renders_context() {
        let (mut renderer, doc) = renderer(HighlightMode::Panel);
        renderer.show(&doc, 1);
        assert_eq!(
            renderer.take_frame().as_deref(),
            Some("alpha [beta] gamma delta epsilon")
        );
        assert!(!renderer.page().has_marker());
    }

    #[test]
    fn page_mode_marks_in_page_and_hides_panel() {
        let (mut renderer, doc) = renderer(HighlightMode::Page);
        renderer.show(&doc, 3);
        assert_eq!(renderer.take_frame().as_deref(), Some("[delta] epsilon"));
        assert!(renderer.page().has_marker());
        assert!(!renderer.panel().is_visible());
        assert!(renderer.panel().window().is_none());
    }

    #[test]
    fn toggling_removes_other_mode_artifacts() {
        let (mut renderer, doc) = renderer(HighlightMode::Page);
        renderer.show(&doc, 2);
        assert!(renderer.page().has_marker());

        assert_eq!(renderer.toggle(), HighlightMode::Panel);
        assert!(!renderer.page().has_marker());
        assert_eq!(
            renderer.page().fragment_texts(),
            vec!["alpha beta gamma", "delta epsilon"]
        );

        renderer.show(&doc, 2);
        assert!(renderer.panel().window().is_some());
        assert_eq!(renderer.toggle(), HighlightMode::Page);
        assert!(renderer.panel().window().is_none());
    }

    #[test]
    fn clear_drops_marker_and_frame() {
        let (mut renderer, doc) = renderer(HighlightMode::Page);
        renderer.show(&doc, 0);
        renderer.clear();
        assert!(!renderer.page().has_marker());
        assert!(renderer.take_frame().is_none());
    }

    #[test]
    fn mode_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: HighlightMode,
        }
        let parsed: Wrapper = toml::from_str("mode = \"page\"").unwrap();
        assert_eq!(parsed.mode, HighlightMode::Page);
    }
}
