use similar::{ChangeTag, TextDiff};
use std::borrow::Cow;

/// Opens a deleted span in colour output
pub const DELETE_START: &str = "%r";
/// Opens an inserted span in colour output
pub const INSERT_START: &str = "%g";
/// Closes a deleted or inserted span
pub const MARK_END: &str = "%w";

/// Output style of the word diff engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffMode {
    /// Inline text with deletion/insertion markers
    #[default]
    Colour,
    /// Normalized deleted/inserted phrases, accumulated across calls
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Copy,
    Delete,
    Insert,
}

/// Contiguous run of text with a single classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    pub text: String,
}

impl Span {
    /// Text as placed between markers. A whitespace-only deletion has its
    /// line breaks escaped so the markers stay on one line.
    pub fn display_text(&self) -> Cow<'_, str> {
        if self.kind == SpanKind::Delete && self.text.trim().is_empty() {
            Cow::Owned(self.text.replace('\n', "\\n").replace('\r', "\\r"))
        } else {
            Cow::Borrowed(&self.text)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedDiff {
    Colour(String),
    Stats {
        deletes: Vec<String>,
        inserts: Vec<String>,
    },
}

/// Split both strings into word and whitespace tokens, align them on their
/// longest common subsequence and merge neighbouring tokens of the same kind.
pub fn word_spans(from: &str, to: &str) -> Vec<Span> {
    let diff = TextDiff::from_words(from, to);
    let mut spans: Vec<Span> = Vec::new();

    for change in diff.iter_all_changes() {
        let kind = match change.tag() {
            ChangeTag::Equal => SpanKind::Copy,
            ChangeTag::Delete => SpanKind::Delete,
            ChangeTag::Insert => SpanKind::Insert,
        };

        match spans.last_mut() {
            Some(last) if last.kind == kind => last.text.push_str(change.value()),
            _ => spans.push(Span {
                kind,
                text: change.value().to_string(),
            }),
        }
    }

    spans
}

/// Word-level diff between upstream and customized text.
///
/// In [`DiffMode::Stats`] deleted and inserted phrases accumulate until
/// [`reset`](Self::reset) is called, so one engine can be reused for many
/// pairs one after another.
#[derive(Debug, Clone, Default)]
pub struct WordDiffEngine {
    mode: DiffMode,
    deletes: Vec<String>,
    inserts: Vec<String>,
}

impl WordDiffEngine {
    pub fn new(mode: DiffMode) -> Self {
        Self {
            mode,
            deletes: Vec::new(),
            inserts: Vec::new(),
        }
    }

    pub fn mode(&self) -> DiffMode {
        self.mode
    }

    pub fn diff(&mut self, from: &str, to: &str) -> RenderedDiff {
        let spans = word_spans(from, to);
        match self.mode {
            DiffMode::Colour => RenderedDiff::Colour(render_colour(&spans)),
            DiffMode::Stats => {
                self.collect_stats(&spans);
                RenderedDiff::Stats {
                    deletes: self.deletes.clone(),
                    inserts: self.inserts.clone(),
                }
            }
        }
    }

    /// Drop everything accumulated by previous stats diffs
    pub fn reset(&mut self) {
        self.deletes.clear();
        self.inserts.clear();
    }

    pub fn deletes(&self) -> &[String] {
        &self.deletes
    }

    pub fn inserts(&self) -> &[String] {
        &self.inserts
    }

    fn collect_stats(&mut self, spans: &[Span]) {
        for span in spans {
            let target = match span.kind {
                SpanKind::Copy => continue,
                SpanKind::Delete => &mut self.deletes,
                SpanKind::Insert => &mut self.inserts,
            };
            let token = normalize_token(&span.text);
            if !token.is_empty() {
                target.push(token);
            }
        }
    }
}

fn render_colour(spans: &[Span]) -> String {
    let mut out = String::new();

    for span in spans {
        let (start, end) = match span.kind {
            SpanKind::Copy => ("", ""),
            SpanKind::Delete => (DELETE_START, MARK_END),
            SpanKind::Insert => (INSERT_START, MARK_END),
        };
        out.push_str(start);
        out.push_str(&span.display_text());
        out.push_str(end);
    }

    out
}

/// Lowercase, keep ASCII alphanumerics and spaces, trim
fn normalize_token(text: &str) -> String {
    let kept: String = text
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();
    kept.trim().to_string()
}
