//! Raw markup -> visible text.
//!
//! Order matters here: script/style subtrees are detached from the parsed tree before any
//! text is read, so executable or styling text can never leak into the output.

use html_scraper::{Html, Selector};
use pagesift_core::{CleanText, RawPage};

const NON_CONTENT: &str = "script, style";

/// Line boundaries recognised when re-splitting extracted text.
const LINE_BOUNDARIES: [char; 10] = [
    '\n', '\r', '\x0b', '\x0c', '\x1c', '\x1d', '\x1e', '\u{85}', '\u{2028}', '\u{2029}',
];

fn is_line_boundary(c: char) -> bool {
    LINE_BOUNDARIES.contains(&c)
}

fn strip_non_content(doc: &mut Html) {
    let Ok(sel) = Selector::parse(NON_CONTENT) else {
        return;
    };
    let ids: Vec<_> = doc.select(&sel).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// Text nodes under `<body>`, in document order, one per line.
fn body_text(doc: &Html) -> Option<String> {
    let sel = Selector::parse("body").ok()?;
    let body = doc.select(&sel).next()?;
    Some(body.text().collect::<Vec<_>>().join("\n"))
}

pub fn normalize_html(html: &str) -> CleanText {
    let mut doc = Html::parse_document(html);
    strip_non_content(&mut doc);
    let Some(text) = body_text(&doc) else {
        return CleanText::default();
    };
    CleanText::from_lines(text.split(is_line_boundary))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentNormalizer;

impl ContentNormalizer {
    pub fn normalize(&self, raw: &RawPage) -> CleanText {
        let out = normalize_html(&raw.html);
        tracing::debug!(
            url = %raw.final_url,
            html_bytes = raw.html.len(),
            text_chars = out.char_count(),
            "normalized page"
        );
        out
    }
}
