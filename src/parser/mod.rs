pub mod blocks;
pub mod media;
pub mod rich_text;
pub mod walker;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use blocks::Block;

/// Content regions tried in order when a full page is converted.
static CONTENT_REGIONS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["div.available-content", "div.body", "article"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

/// Ordered blocks of one source document plus the last embedded video id seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentDocument {
    pub blocks: Vec<Block>,
    pub embed_id: Option<String>,
}

impl ContentDocument {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in the destination JSON shape.
    pub fn to_notion(&self) -> Vec<serde_json::Value> {
        self.blocks.iter().map(Block::to_notion).collect()
    }
}

/// Container → walker → classifier → tokenizer.
pub fn convert(root: ElementRef<'_>) -> ContentDocument {
    walker::walk(root)
}

/// Convert a full page, walking only its article body.
pub fn convert_html(html: &str) -> ContentDocument {
    let document = Html::parse_document(html);
    match content_region(&document) {
        Some(region) => convert(region),
        None => ContentDocument::default(),
    }
}

/// Convert an HTML fragment such as an RSS `content:encoded` body.
pub fn convert_fragment(html: &str) -> ContentDocument {
    let fragment = Html::parse_fragment(html);
    let root = content_region(&fragment).unwrap_or_else(|| fragment.root_element());
    convert(root)
}

fn content_region(document: &Html) -> Option<ElementRef<'_>> {
    CONTENT_REGIONS
        .iter()
        .find_map(|selector| document.select(selector).next())
}

pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// First element below `element` (never `element` itself) with the given tag.
pub(crate) fn first_descendant<'a>(element: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == tag)
}

/// Cap a string at `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
