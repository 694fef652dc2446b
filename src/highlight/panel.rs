use crate::text_utils::Document;

/// Context window around the cursor rendered inside the reader panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelWindow {
    pub start: usize,
    pub end: usize,
    pub current: usize,
    pub leading_ellipsis: bool,
    pub trailing_ellipsis: bool,
}

impl PanelWindow {
    pub fn around(doc: &Document, cursor: usize, context: usize) -> Self {
        let start = cursor.saturating_sub(context);
        let end = doc.len().min(cursor.saturating_add(context).saturating_add(1));
        Self {
            start: start.min(end),
            end,
            current: cursor,
            leading_ellipsis: start > 0,
            trailing_ellipsis: end < doc.len(),
        }
    }

    /// Words of the window with the current one wrapped in brackets.
    pub fn render(&self, doc: &Document) -> String {
        let mut out = String::new();
        if self.leading_ellipsis {
            out.push_str("... ");
        }
        let words: Vec<String> = (self.start..self.end)
            .filter_map(|idx| {
                let word = doc.word(idx)?;
                Some(if idx == self.current {
                    format!("[{word}]")
                } else {
                    word.to_string()
                })
            })
            .collect();
        out.push_str(&words.join(" "));
        if self.trailing_ellipsis {
            out.push_str(" ...");
        }
        out
    }
}

/// Panel-mode highlight state. Hidden while page highlighting is active.
#[derive(Debug, Clone)]
pub struct PanelView {
    context: usize,
    visible: bool,
    window: Option<PanelWindow>,
}

impl PanelView {
    pub fn new(context: usize) -> Self {
        Self {
            context,
            visible: true,
            window: None,
        }
    }

    pub fn show(&mut self, doc: &Document, cursor: usize) -> Option<String> {
        if !self.visible || doc.is_empty() {
            self.window = None;
            return None;
        }
        let window = PanelWindow::around(doc, cursor, self.context);
        let rendered = window.render(doc);
        self.window = Some(window);
        Some(rendered)
    }

    pub fn clear(&mut self) {
        self.window = None;
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if !visible {
            self.window = None;
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn window(&self) -> Option<&PanelWindow> {
        self.window.as_ref()
    }
}
