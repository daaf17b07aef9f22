use scraper::ElementRef;
use serde::Serialize;
use serde_json::{json, Value};

use super::rich_text::{self, RichTextSpan};
use super::{first_descendant, text_of, truncate_chars};

/// Hard cap on a single span imposed by the block store.
pub const SPAN_LIMIT: usize = 2000;
/// Paragraphs longer than this skip tokenization and become one plain span.
pub const LONG_PARAGRAPH: usize = 1900;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph { spans: Vec<RichTextSpan> },
    Heading { level: u8, spans: Vec<RichTextSpan> },
    BulletItem { spans: Vec<RichTextSpan> },
    NumberedItem { spans: Vec<RichTextSpan> },
    Quote { spans: Vec<RichTextSpan> },
    Code { spans: Vec<RichTextSpan> },
    Image { url: String },
    Embed { url: String },
    Divider,
    TableOfContents,
}

impl Block {
    pub fn paragraph(text: &str) -> Self {
        Block::Paragraph {
            spans: vec![RichTextSpan::plain(text)],
        }
    }

    pub fn spans(&self) -> &[RichTextSpan] {
        match self {
            Block::Paragraph { spans }
            | Block::Heading { spans, .. }
            | Block::BulletItem { spans }
            | Block::NumberedItem { spans }
            | Block::Quote { spans }
            | Block::Code { spans } => spans,
            Block::Image { .. } | Block::Embed { .. } | Block::Divider | Block::TableOfContents => &[],
        }
    }

    pub fn plain_text(&self) -> String {
        self.spans().iter().map(|s| s.content.as_str()).collect()
    }

    /// Retag a bullet as a numbered item; every other variant is returned as is.
    pub fn into_numbered(self) -> Self {
        match self {
            Block::BulletItem { spans } => Block::NumberedItem { spans },
            other => other,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Block::Paragraph { .. } => "paragraph",
            Block::Heading { level: 3, .. } => "heading_3",
            Block::Heading { .. } => "heading_2",
            Block::BulletItem { .. } => "bulleted_list_item",
            Block::NumberedItem { .. } => "numbered_list_item",
            Block::Quote { .. } => "quote",
            Block::Code { .. } => "code",
            Block::Image { .. } => "image",
            Block::Embed { .. } => "embed",
            Block::Divider => "divider",
            Block::TableOfContents => "table_of_contents",
        }
    }

    /// Destination JSON: `{object, type, <type>: payload}`.
    pub fn to_notion(&self) -> Value {
        let rich_text = || Value::Array(self.spans().iter().map(RichTextSpan::to_notion).collect());
        let payload = match self {
            Block::Code { .. } => json!({ "rich_text": rich_text(), "language": "plain text" }),
            Block::Image { url } => json!({ "type": "external", "external": { "url": url } }),
            Block::Embed { url } => json!({ "url": url }),
            Block::Divider | Block::TableOfContents => json!({}),
            _ => json!({ "rich_text": rich_text() }),
        };
        let kind = self.kind();
        json!({ "object": "block", "type": kind, kind: payload })
    }
}

/// Classify one direct child of a container. First matching rule wins;
/// a rule whose content comes out empty falls through to the next one.
pub fn classify(element: ElementRef<'_>) -> Option<Block> {
    let tag = element.value().name();

    if tag == "pre" {
        let code = text_of(element);
        if code.trim().is_empty() {
            return None;
        }
        return Some(Block::Code {
            spans: vec![RichTextSpan::plain(&code)],
        });
    }

    if let Some(level) = heading_level(tag) {
        let spans = rich_text::tokenize(element);
        if !spans.is_empty() {
            return Some(Block::Heading { level, spans });
        }
    }

    if tag == "li" {
        let spans = rich_text::tokenize(element);
        if !spans.is_empty() {
            return Some(Block::BulletItem { spans });
        }
    }

    // Lists are expanded by the walker; a stray container is not a block.
    if tag == "ul" {
        return None;
    }

    if tag == "blockquote" {
        let spans = rich_text::tokenize(element);
        if !spans.is_empty() {
            return Some(Block::Quote { spans });
        }
    }

    if let Some(url) = image_source(element) {
        return Some(Block::Image { url });
    }

    if tag == "p" {
        return paragraph(element);
    }

    None
}

fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" | "h2" => Some(2),
        "h3" => Some(3),
        _ => None,
    }
}

/// Absolute source of the node itself when it is an `img`, else of its first
/// descendant `img`. Relative and `data:` sources are dropped.
fn image_source(element: ElementRef<'_>) -> Option<String> {
    let img = match element.value().name() {
        "img" => element,
        _ => first_descendant(element, "img")?,
    };
    img.value()
        .attr("src")
        .filter(|src| src.starts_with("http"))
        .map(str::to_string)
}

fn paragraph(element: ElementRef<'_>) -> Option<Block> {
    let full = text_of(element);
    let text = full.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().count() > LONG_PARAGRAPH {
        return Some(Block::Paragraph {
            spans: vec![RichTextSpan::plain(&truncate_chars(text, LONG_PARAGRAPH))],
        });
    }
    let spans = rich_text::tokenize(element);
    if spans.is_empty() {
        return None;
    }
    Some(Block::Paragraph { spans })
}
