use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::parser::blocks::{Block, SPAN_LIMIT};
use crate::parser::rich_text::{RichTextSpan, Style};
use crate::parser::{truncate_chars, ContentDocument};
use crate::transcript::transcript_blocks;

/// The block store accepts at most this many children per append.
pub const APPEND_BATCH: usize = 100;

/// Everything needed to create one imported post.
#[derive(Debug, Clone)]
pub struct PostPage {
    pub title: String,
    pub date: NaiveDate,
    pub url: String,
    pub content: ContentDocument,
    pub video_url: Option<String>,
    pub transcript: String,
}

impl PostPage {
    pub fn properties(&self) -> Value {
        let mut props = json!({
            "Name": { "title": [{ "text": { "content": truncate_chars(&self.title, SPAN_LIMIT) } }] },
            "Date": { "date": { "start": self.date.format("%Y-%m-%d").to_string() } },
            "Type": { "select": { "name": "Newsletter" } },
            "Content Status": { "select": { "name": "Complete" } },
        });
        if !self.url.is_empty() {
            props["URL"] = json!({ "url": self.url });
        }
        if let Some(video) = &self.video_url {
            props["YouTube URL"] = json!({ "url": video });
        }
        props
    }

    /// Page body: table of contents, the article section, then the video section.
    pub fn children(&self) -> Vec<Value> {
        let mut children = vec![Block::TableOfContents.to_notion(), Block::Divider.to_notion()];

        if !self.content.is_empty() {
            children.push(section_heading("Substack Content"));
            if !self.url.is_empty() {
                children.push(bookmark(&self.url));
            }
            children.extend(self.content.to_notion());
            children.push(Block::Divider.to_notion());
        }

        if let Some(video) = &self.video_url {
            children.push(section_heading("YouTube"));
            children.push(Block::Embed { url: video.clone() }.to_notion());
            if !self.transcript.is_empty() {
                children.extend(transcript_section(&self.transcript));
            }
        }

        children
    }

    /// Create-page payload; children are appended separately in batches.
    pub fn create_payload(&self, database_id: Option<&str>) -> Value {
        json!({
            "parent": { "database_id": database_id.unwrap_or_default() },
            "properties": self.properties(),
            "children": [],
        })
    }
}

/// Blocks appended to an existing page once its video has been found.
#[derive(Debug, Clone)]
pub struct RepairPage {
    pub video_url: String,
    pub transcript: String,
    /// Video lives on the post page itself rather than on YouTube.
    pub native: bool,
}

impl RepairPage {
    /// Property update; native videos keep the page's existing URL fields.
    pub fn properties(&self) -> Option<Value> {
        if self.native {
            return None;
        }
        Some(json!({ "properties": { "YouTube URL": { "url": self.video_url } } }))
    }

    pub fn children(&self) -> Vec<Value> {
        let mut children = vec![Block::Divider.to_notion()];
        if self.native {
            children.push(section_heading("Substack Video"));
            children.push(callout("Watch Video on Substack", "\u{1f4fa}"));
        } else {
            children.push(section_heading("YouTube (Repaired)"));
            children.push(Block::Embed { url: self.video_url.clone() }.to_notion());
        }
        if !self.transcript.is_empty() {
            children.extend(transcript_section(&self.transcript));
        }
        children
    }
}

/// Split children into append requests.
pub fn batches(children: &[Value]) -> Vec<Value> {
    children
        .chunks(APPEND_BATCH)
        .map(|chunk| json!({ "children": chunk }))
        .collect()
}

pub fn cover_payload(image_url: &str) -> Value {
    json!({ "cover": { "type": "external", "external": { "url": image_url } } })
}

fn transcript_section(transcript: &str) -> Vec<Value> {
    let label = RichTextSpan::styled(
        "Transcript:",
        Style {
            bold: true,
            italic: true,
            ..Style::default()
        },
    );
    let mut blocks = vec![Block::Paragraph { spans: vec![label] }.to_notion()];
    blocks.extend(transcript_blocks(transcript).iter().map(Block::to_notion));
    blocks
}

/// Top-level section titles sit above the article's own heading levels.
fn section_heading(text: &str) -> Value {
    json!({
        "object": "block",
        "type": "heading_1",
        "heading_1": { "rich_text": [RichTextSpan::plain(text).to_notion()] },
    })
}

fn bookmark(url: &str) -> Value {
    json!({ "object": "block", "type": "bookmark", "bookmark": { "url": url } })
}

fn callout(text: &str, emoji: &str) -> Value {
    json!({
        "object": "block",
        "type": "callout",
        "callout": {
            "rich_text": [RichTextSpan::plain(text).to_notion()],
            "icon": { "emoji": emoji },
        },
    })
}
