use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;

static VIDEO_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:youtube(?:-nocookie)?\.com/(?:watch\?(?:[^#\s]*&)?v=|embed/|shorts/|live/|v/)|youtu\.be/)([A-Za-z0-9_-]+)",
    )
    .unwrap()
});
static VTT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"https:[^"']+\.vtt"#).unwrap());

static OG_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());
static TWITTER_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="twitter:image"]"#).unwrap());
static IFRAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("iframe").unwrap());

/// Where a post's video can be watched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum VideoSource {
    /// Caption file of a video hosted on the post page itself.
    NativeCaptions(String),
    YouTube(String),
}

/// True when an embed source points at a video platform we know how to resolve.
pub fn is_video_platform(src: &str) -> bool {
    src.contains("youtube") || src.contains("youtu.be")
}

/// Extract the video id from a watch, short-link, embed, shorts or live URL.
pub fn video_id(url: &str) -> Option<String> {
    VIDEO_ID_RE
        .captures(url)
        .map(|caps| caps[1].to_string())
}

pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

/// Cover image advertised by the page's social metadata.
pub fn cover_image(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    [&*OG_IMAGE, &*TWITTER_IMAGE].into_iter().find_map(|selector| {
        document
            .select(selector)
            .filter_map(|meta| meta.value().attr("content"))
            .find(|content| !content.is_empty())
            .map(str::to_string)
    })
}

/// Native caption files take priority over YouTube embeds.
pub fn video_source(html: &str) -> Option<VideoSource> {
    if let Some(m) = VTT_RE.find(html) {
        // Page state embeds URLs JSON-escaped as `https:\/\/…`.
        return Some(VideoSource::NativeCaptions(m.as_str().replace("\\/", "/")));
    }

    let document = Html::parse_document(html);
    document
        .select(&IFRAME)
        .filter_map(|iframe| iframe.value().attr("src"))
        .filter(|src| is_video_platform(src))
        .find_map(video_id)
        .map(VideoSource::YouTube)
}
