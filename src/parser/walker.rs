use scraper::ElementRef;
use tracing::debug;

use super::blocks::{classify, Block};
use super::media::{is_video_platform, video_id};
use super::{first_descendant, ContentDocument};

/// Walk a content container depth-first in document order.
pub fn walk(root: ElementRef<'_>) -> ContentDocument {
    let mut doc = ContentDocument::default();
    walk_container(root, &mut doc);
    doc
}

fn walk_container(container: ElementRef<'_>, doc: &mut ContentDocument) {
    for element in container.children().filter_map(ElementRef::wrap) {
        // Detection never stops the walk; the last embed seen wins.
        if let Some(id) = embedded_video(element) {
            debug!("embedded video {}", id);
            doc.embed_id = Some(id);
        }

        match element.value().name() {
            "div" => walk_container(element, doc),
            "a" if first_descendant(element, "img").is_some() => walk_container(element, doc),
            tag @ ("ul" | "ol") => expand_list(element, tag == "ol", &mut doc.blocks),
            _ => doc.blocks.extend(classify(element)),
        }
    }
}

/// Only direct `li` children are visited; nested sub-lists are flattened away.
fn expand_list(list: ElementRef<'_>, numbered: bool, blocks: &mut Vec<Block>) {
    let items = list
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == "li");

    for item in items {
        if let Some(block) = classify(item) {
            blocks.push(if numbered { block.into_numbered() } else { block });
        }
    }
}

fn embedded_video(element: ElementRef<'_>) -> Option<String> {
    let mut found = None;

    if element.value().name() == "iframe" {
        if let Some(src) = element.value().attr("src").filter(|src| is_video_platform(src)) {
            found = video_id(src);
        }
    }

    let watch_link = first_descendant(element, "a")
        .and_then(|a| a.value().attr("href"))
        .filter(|href| href.contains("youtube.com/watch"));
    if let Some(id) = watch_link.and_then(video_id) {
        found = Some(id);
    }

    found
}
