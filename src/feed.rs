use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use quick_xml::events::{BytesStart, Event};
use serde::Deserialize;

use crate::parser::media::video_id;

/// One post or video from a source or companion catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub slug: String,
    pub published: Option<NaiveDate>,
    /// Inline body HTML when the feed carries it.
    pub content_html: Option<String>,
    pub video_id: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Title,
    Link,
    Published,
    Content,
    Summary,
    VideoId,
}

/// Parse an RSS 2.0 or Atom feed and return its items/entries in order.
pub fn parse(xml: &str) -> Result<Vec<FeedEntry>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut summary: Option<String> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"item" | b"entry" => {
                    current = Some(FeedEntry::default());
                    summary = None;
                }
                name if current.is_some() => {
                    if name == b"link" {
                        if let (Some(entry), Some(href)) = (current.as_mut(), alternate_href(&e)?) {
                            entry.link = href;
                        }
                    }
                    field = field_for(name);
                    text.clear();
                }
                _ => {}
            },
            // Atom links are self-closing: <link rel="alternate" href="…"/>
            Ok(Event::Empty(e)) if e.name().as_ref() == b"link" => {
                if let (Some(entry), Some(href)) = (current.as_mut(), alternate_href(&e)?) {
                    entry.link = href;
                }
            }
            Ok(Event::Text(e)) if field.is_some() => text.push_str(&e.unescape()?),
            Ok(Event::CData(e)) if field.is_some() => text.push_str(&String::from_utf8_lossy(&e)),
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"item" | b"entry" => {
                    if let Some(mut entry) = current.take() {
                        if entry.content_html.is_none() {
                            entry.content_html = summary.take();
                        }
                        finish(&mut entry);
                        entries.push(entry);
                    }
                    field = None;
                }
                name if field.is_some() && field_for(name) == field => {
                    if let Some(entry) = current.as_mut() {
                        store(entry, &mut summary, field, std::mem::take(&mut text));
                    }
                    field = None;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn field_for(name: &[u8]) -> Option<Field> {
    match name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"pubDate" | b"published" => Some(Field::Published),
        b"content:encoded" | b"content" => Some(Field::Content),
        b"description" | b"summary" => Some(Field::Summary),
        b"yt:videoId" => Some(Field::VideoId),
        _ => None,
    }
}

fn store(entry: &mut FeedEntry, summary: &mut Option<String>, field: Option<Field>, value: String) {
    let value = value.trim().to_string();
    if value.is_empty() {
        return;
    }
    match field {
        Some(Field::Title) => entry.title = value,
        Some(Field::Link) => entry.link = value,
        Some(Field::Published) => entry.published = publish_date(&value),
        Some(Field::Content) => entry.content_html = Some(value),
        Some(Field::Summary) => *summary = Some(value),
        Some(Field::VideoId) => entry.video_id = Some(value),
        None => {}
    }
}

fn alternate_href(e: &BytesStart<'_>) -> Result<Option<String>> {
    let rel = e.try_get_attribute("rel")?;
    if let Some(rel) = rel {
        if rel.unescape_value()? != "alternate" {
            return Ok(None);
        }
    }
    match e.try_get_attribute("href")? {
        Some(href) => Ok(Some(href.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn finish(entry: &mut FeedEntry) {
    entry.title = entry.title.trim().to_string();
    if entry.video_id.is_none() {
        entry.video_id = video_id(&entry.link);
    }
    // Watch links keep their query: it carries the video id.
    if !entry.link.contains("youtube.com/watch") {
        entry.link = clean_link(&entry.link);
    }
    if entry.slug.is_empty() {
        entry.slug = slug_from_link(&entry.link);
    }
}

/// Drop tracking query strings from a post link.
pub fn clean_link(link: &str) -> String {
    link.split('?').next().unwrap_or("").trim().to_string()
}

/// Last non-empty path segment of a link.
pub fn slug_from_link(link: &str) -> String {
    link.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string()
}

/// Normalize an RFC 2822 (RSS) or RFC 3339 (Atom/API) timestamp to a calendar date.
pub fn publish_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}

#[derive(Deserialize)]
struct ArchivePost {
    #[serde(default)]
    title: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    canonical_url: String,
    #[serde(default)]
    post_date: String,
    #[serde(default)]
    body_html: Option<String>,
}

/// Read a feed file: `.json` files are archive listings, anything else is XML.
pub fn load(path: &Path) -> Result<Vec<FeedEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read feed {}", path.display()))?;
    let entries = if path.extension().is_some_and(|ext| ext == "json") {
        parse_archive(&raw)?
    } else {
        parse(&raw).with_context(|| format!("Failed to parse feed {}", path.display()))?
    };
    Ok(entries)
}

/// Parse the JSON list returned by a publication's archive endpoint.
pub fn parse_archive(json: &str) -> Result<Vec<FeedEntry>> {
    let posts: Vec<ArchivePost> =
        serde_json::from_str(json).context("Archive is not a JSON list of posts")?;

    Ok(posts
        .into_iter()
        .map(|post| {
            let link = if post.canonical_url.is_empty() {
                post.slug.clone()
            } else {
                post.canonical_url
            };
            let mut entry = FeedEntry {
                title: post.title,
                link,
                slug: post.slug,
                published: publish_date(&post.post_date),
                content_html: post.body_html.filter(|html| !html.trim().is_empty()),
                video_id: None,
            };
            finish(&mut entry);
            entry
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_items() {
        let xml = std::fs::read_to_string("tests/fixtures/posts.xml").unwrap();
        let entries = parse(&xml).unwrap();
        assert_eq!(entries.len(), 3);

        let first = &entries[0];
        assert_eq!(first.title, "Scaling Postgres at Acme");
        assert_eq!(first.link, "https://acme.substack.com/p/scaling-postgres");
        assert_eq!(first.slug, "scaling-postgres");
        assert_eq!(first.published, NaiveDate::from_ymd_opt(2024, 3, 4));
        let body = first.content_html.as_deref().unwrap();
        assert!(body.contains("<h2>Why we moved</h2>"));

        // description is the fallback body
        assert!(entries[2].content_html.as_deref().unwrap().contains("Short note"));
    }

    #[test]
    fn atom_entries() {
        let xml = std::fs::read_to_string("tests/fixtures/videos.xml").unwrap();
        let entries = parse(&xml).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].title, "Scaling Postgres: Lessons From Acme");
        assert_eq!(entries[0].video_id.as_deref(), Some("pg2024"));
        assert_eq!(entries[0].link, "https://www.youtube.com/watch?v=pg2024");
        assert_eq!(entries[0].published, NaiveDate::from_ymd_opt(2024, 3, 5));
    }

    #[test]
    fn channel_title_is_not_an_entry() {
        let xml = r#"<rss><channel><title>Acme Blog</title>
            <item><title>Only &amp; Post</title><link>https://a.example/p/only</link></item>
        </channel></rss>"#;
        let entries = parse(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Only & Post");
    }

    #[test]
    fn malformed_feed_is_an_error() {
        assert!(parse("<rss><channel><item><title>x</item></channel></rss>").is_err());
    }

    #[test]
    fn load_by_extension() {
        let entries = load(Path::new("tests/fixtures/videos.xml")).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(load(Path::new("tests/fixtures/nope.json")).is_err());
    }

    #[test]
    fn links_and_slugs() {
        assert_eq!(clean_link("https://a.example/p/post?utm_source=rss"), "https://a.example/p/post");
        assert_eq!(slug_from_link("https://a.example/p/post/"), "post");
        assert_eq!(slug_from_link(""), "");
    }

    #[test]
    fn dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 4);
        assert_eq!(publish_date("Mon, 04 Mar 2024 09:30:00 GMT"), expected);
        assert_eq!(publish_date("2024-03-04T09:30:00.000Z"), expected);
        assert_eq!(publish_date("2024-03-04"), expected);
        assert_eq!(publish_date("yesterday"), None);
    }

    #[test]
    fn archive_posts() {
        let json = r#"[
            {"title": " Scaling Postgres at Acme ", "slug": "scaling-postgres",
             "canonical_url": "https://acme.substack.com/p/scaling-postgres",
             "post_date": "2024-03-04T09:30:00.000Z"},
            {"title": "Draft", "slug": "draft", "post_date": "", "body_html": "<p>Hi</p>"}
        ]"#;
        let entries = parse_archive(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Scaling Postgres at Acme");
        assert_eq!(entries[0].published, NaiveDate::from_ymd_opt(2024, 3, 4));
        assert!(entries[0].content_html.is_none());
        assert_eq!(entries[1].link, "draft");
        assert_eq!(entries[1].published, None);
        assert_eq!(entries[1].content_html.as_deref(), Some("<p>Hi</p>"));
        assert!(parse_archive("{\"not\": \"a list\"}").is_err());
    }
}
