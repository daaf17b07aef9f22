use scraper::{ElementRef, Node};
use serde::Serialize;
use serde_json::{json, Value};

use super::blocks::SPAN_LIMIT;
use super::{first_descendant, text_of, truncate_chars};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Style {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    pub code: bool,
}

impl Style {
    /// Styling comes from the wrapping tag alone; nested tags are not merged.
    pub fn for_tag(tag: &str) -> Self {
        Style {
            bold: matches!(tag, "b" | "strong"),
            italic: matches!(tag, "i" | "em"),
            strikethrough: matches!(tag, "s" | "strike" | "del"),
            underline: tag == "u",
            code: tag == "code",
        }
    }

    pub fn is_plain(&self) -> bool {
        *self == Style::default()
    }
}

/// A run of text sharing one style/link combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RichTextSpan {
    pub content: String,
    pub style: Style,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl RichTextSpan {
    pub fn plain(text: &str) -> Self {
        RichTextSpan {
            content: truncate_chars(text, SPAN_LIMIT),
            style: Style::default(),
            link: None,
        }
    }

    pub fn styled(text: &str, style: Style) -> Self {
        RichTextSpan {
            style,
            ..RichTextSpan::plain(text)
        }
    }

    pub fn to_notion(&self) -> Value {
        let mut text = json!({ "content": self.content });
        if let Some(url) = &self.link {
            text["link"] = json!({ "url": url });
        }
        let mut span = json!({ "type": "text", "text": text });
        if !self.style.is_plain() {
            span["annotations"] = json!(self.style);
        }
        span
    }
}

/// Turn the inline content of one node into ordered spans.
pub fn tokenize(element: ElementRef<'_>) -> Vec<RichTextSpan> {
    let mut spans = Vec::new();

    for child in element.children() {
        match child.value() {
            Node::Text(text) if !text.is_empty() => spans.push(RichTextSpan::plain(text)),
            Node::Element(_) => {
                let Some(inner) = ElementRef::wrap(child) else {
                    continue;
                };
                let content = text_of(inner);
                if content.is_empty() {
                    continue;
                }
                let mut span = RichTextSpan::styled(&content, Style::for_tag(inner.value().name()));
                span.link = link_target(inner);
                spans.push(span);
            }
            _ => {}
        }
    }

    // Never drop text: markup we could not split still yields one plain run.
    if spans.is_empty() {
        let full = text_of(element);
        if !full.trim().is_empty() {
            spans.push(RichTextSpan::plain(&full));
        }
    }

    spans
}

/// The element's own href wins over the first nested anchor's.
fn link_target(element: ElementRef<'_>) -> Option<String> {
    let href = |e: ElementRef<'_>| {
        e.value()
            .attr("href")
            .filter(|h| !h.is_empty())
            .map(str::to_string)
    };
    if element.value().name() == "a" {
        if let Some(url) = href(element) {
            return Some(url);
        }
    }
    first_descendant(element, "a").and_then(href)
}
