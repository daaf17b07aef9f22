use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde_json::json;
use tracing::{info, warn};

use crate::config::MatchPolicy;
use crate::feed::FeedEntry;
use crate::page::{batches, PostPage, RepairPage};
use crate::parser::media::{video_id, video_source, watch_url, VideoSource};
use crate::parser::{convert_fragment, convert_html, ContentDocument};
use crate::titles::TitleIndex;
use crate::transcript::clean_transcript;

const CHUNK: usize = 50;

/// Where pre-fetched collaborator output lives on disk.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Full post pages saved as `<slug>.html`.
    pub pages_dir: Option<PathBuf>,
    /// Caption files saved as `<video id>.vtt`.
    pub captions_dir: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub database_id: Option<String>,
    pub policy: MatchPolicy,
}

#[derive(Debug, Default, PartialEq)]
pub struct ImportStats {
    pub total: usize,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Existing catalog titles, one per line; blank lines are ignored.
pub fn load_titles(path: &Path) -> Result<TitleIndex> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read titles from {}", path.display()))?;
    Ok(TitleIndex::from_titles(
        raw.lines().map(str::trim).filter(|l| !l.is_empty()),
    ))
}

/// Drop untitled entries and entries already in the catalog. Returns the
/// survivors and the number skipped.
pub fn select_new(entries: Vec<FeedEntry>, index: &TitleIndex) -> (Vec<FeedEntry>, usize) {
    let mut fresh = Vec::new();
    let mut skipped = 0;

    for entry in entries {
        if entry.title.is_empty() {
            continue;
        }
        if index.contains(&entry.title) {
            info!("Skipping (already in DB): {}", preview(&entry.title, 30));
            skipped += 1;
            continue;
        }
        fresh.push(entry);
    }

    (fresh, skipped)
}

/// Convert, import and write one payload per new entry. A title joins `index`
/// only once its payload is on disk, so a repeat later in the feed is skipped
/// while a repeat of a failed entry gets another chance.
pub fn run(
    entries: Vec<FeedEntry>,
    index: &mut TitleIndex,
    videos: &[FeedEntry],
    opts: &ImportOptions,
) -> Result<ImportStats> {
    let total = entries.len();
    let (fresh, skipped) = select_new(entries, index);
    let mut stats = ImportStats {
        total,
        skipped,
        ..ImportStats::default()
    };
    if fresh.is_empty() {
        info!("No new posts found. Database is up to date.");
        return Ok(stats);
    }

    fs::create_dir_all(&opts.out_dir)
        .with_context(|| format!("Failed to create {}", opts.out_dir.display()))?;

    let pb = ProgressBar::new(fresh.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut written = 0usize;
    for chunk in fresh.chunks(CHUNK) {
        let pages: Vec<_> = chunk
            .par_iter()
            .map(|entry| prepare(entry, videos, opts))
            .collect();

        for (entry, page) in chunk.iter().zip(pages) {
            if index.contains(&entry.title) {
                info!("Skipping (already in DB): {}", preview(&entry.title, 30));
                stats.skipped += 1;
                continue;
            }
            let outcome = page.and_then(|page| write_page(&page, &entry.slug, written + 1, opts));
            match outcome {
                Ok(()) => {
                    written += 1;
                    index.insert(&entry.title);
                    stats.imported += 1;
                }
                Err(e) => {
                    warn!("Import failed for {}: {:#}", entry.title, e);
                    stats.failed += 1;
                }
            }
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    info!(
        "Imported {} new items ({} skipped, {} failed).",
        stats.imported, stats.skipped, stats.failed
    );
    Ok(stats)
}

/// Build the page for one new entry. Pure apart from reading collaborator files.
pub fn prepare(entry: &FeedEntry, videos: &[FeedEntry], opts: &ImportOptions) -> Result<PostPage> {
    info!("New post found: {}", entry.title);
    let content = load_content(entry, opts)?;

    let video_url = match &content.embed_id {
        Some(id) => {
            info!("Found embedded video ID: {}", id);
            Some(watch_url(id))
        }
        None => match_video(&entry.title, videos, &opts.policy),
    };
    if video_url.is_none() {
        info!("No YouTube video found for this post.");
    }

    let transcript = match video_url.as_deref().and_then(video_id) {
        Some(id) => load_captions(opts.captions_dir.as_deref(), &id)?,
        None => String::new(),
    };

    Ok(PostPage {
        title: entry.title.clone(),
        date: entry.published.unwrap_or_else(|| Local::now().date_naive()),
        url: entry.link.clone(),
        content,
        video_url,
        transcript,
    })
}

/// A saved page wins over inline feed content, as it carries the full post.
fn load_content(entry: &FeedEntry, opts: &ImportOptions) -> Result<ContentDocument> {
    if let Some(dir) = &opts.pages_dir {
        let path = dir.join(format!("{}.html", entry.slug));
        if path.is_file() {
            let html = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return Ok(convert_html(&html));
        }
    }
    match &entry.content_html {
        Some(html) => Ok(convert_fragment(html)),
        None => {
            warn!("No content available for {}", entry.slug);
            Ok(ContentDocument::default())
        }
    }
}

/// Companion video for a post title: only exact or strong matches count.
pub fn match_video(title: &str, videos: &[FeedEntry], policy: &MatchPolicy) -> Option<String> {
    if videos.is_empty() {
        return None;
    }
    info!("No embedded video, checking YouTube feed...");
    let titles: Vec<&str> = videos.iter().map(|v| v.title.as_str()).collect();
    let result = policy.evaluate(title, &titles);
    if !result.is_match() {
        return None;
    }
    let video = &videos[result.position?];
    match &video.video_id {
        Some(id) => Some(watch_url(id)),
        None => Some(video.link.clone()).filter(|link| !link.is_empty()),
    }
}

fn load_captions(dir: Option<&Path>, video_id: &str) -> Result<String> {
    let Some(dir) = dir else {
        return Ok(String::new());
    };
    let path = dir.join(format!("{}.vtt", video_id));
    if !path.is_file() {
        return Ok(String::new());
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let text = clean_transcript(&raw);
    info!("Transcript found ({} chars)", text.len());
    Ok(text)
}

fn write_page(page: &PostPage, slug: &str, n: usize, opts: &ImportOptions) -> Result<()> {
    let path = opts.out_dir.join(format!("{:03}-{}.json", n, file_stem(slug)));
    let payload = json!({
        "create": page.create_payload(opts.database_id.as_deref()),
        "append": batches(&page.children()),
    });
    fs::write(&path, serde_json::to_string_pretty(&payload)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Slugs come from feeds verbatim; keep them to one path component.
fn file_stem(slug: &str) -> String {
    let stem = slug.replace(['/', '\\'], "-");
    let stem = stem.trim_matches(['-', '.']);
    if stem.is_empty() {
        "post".to_string()
    } else {
        stem.to_string()
    }
}

/// Repair an imported page whose video was missing. Returns `None` when the
/// page has no video we can use.
pub fn repair(page_html: &str, page_url: &str, captions: Option<&str>) -> Option<RepairPage> {
    let transcript = captions.map(clean_transcript).unwrap_or_default();
    match video_source(page_html)? {
        VideoSource::YouTube(id) => Some(RepairPage {
            video_url: watch_url(&id),
            transcript,
            native: false,
        }),
        VideoSource::NativeCaptions(_) if !transcript.is_empty() => Some(RepairPage {
            video_url: page_url.to_string(),
            transcript,
            native: true,
        }),
        VideoSource::NativeCaptions(_) => {
            info!("No video access. Skipping.");
            None
        }
    }
}

/// Shorten a title for log lines.
pub fn preview(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from("tests/fixtures").join(name)
    }

    fn posts() -> Vec<FeedEntry> {
        feed::parse(&fs::read_to_string(fixture("posts.xml")).unwrap()).unwrap()
    }

    fn videos() -> Vec<FeedEntry> {
        feed::parse(&fs::read_to_string(fixture("videos.xml")).unwrap()).unwrap()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("post_sync_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn loads_titles_file() {
        let index = load_titles(&fixture("existing_titles.txt")).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.contains("Rust Weekly #12"));
        assert!(load_titles(&fixture("missing.txt")).is_err());
    }

    #[test]
    fn skips_known_titles() {
        let index = TitleIndex::from_titles(["Rust Weekly #12"]);
        let mut entries = posts();
        entries.push(FeedEntry::default());
        let (fresh, skipped) = select_new(entries, &index);
        let titles: Vec<_> = fresh.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Scaling Postgres at Acme", "A Quick Update"]);
        assert_eq!(skipped, 1);
    }

    fn titled(title: &str, slug: &str) -> FeedEntry {
        FeedEntry {
            title: title.into(),
            slug: slug.into(),
            content_html: Some("<p>Body</p>".into()),
            ..FeedEntry::default()
        }
    }

    #[test]
    fn repeat_within_feed_is_skipped_after_import() {
        let out = scratch_dir("repeat_out");
        let opts = ImportOptions {
            out_dir: out.clone(),
            ..ImportOptions::default()
        };
        let mut index = TitleIndex::default();
        let entries = vec![titled("Same Title", "a"), titled("same title ", "b")];

        let stats = run(entries, &mut index, &[], &opts).unwrap();
        assert_eq!(
            stats,
            ImportStats { total: 2, imported: 1, skipped: 1, failed: 0 }
        );
        assert!(out.join("001-a.json").is_file());
        assert!(!out.join("002-b.json").exists());

        let _ = fs::remove_dir_all(out);
    }

    #[test]
    fn repeat_of_failed_entry_is_imported() {
        let pages = scratch_dir("retry_pages");
        fs::create_dir_all(&pages).unwrap();
        fs::write(pages.join("a.html"), [0xff, 0xfe, 0xfd]).unwrap();
        fs::copy(fixture("post.html"), pages.join("b.html")).unwrap();

        let out = scratch_dir("retry_out");
        let opts = ImportOptions {
            pages_dir: Some(pages.clone()),
            out_dir: out.clone(),
            ..ImportOptions::default()
        };
        let mut index = TitleIndex::default();
        let entries = vec![titled("Same Title", "a"), titled("Same Title", "b")];

        let stats = run(entries, &mut index, &[], &opts).unwrap();
        assert_eq!(
            stats,
            ImportStats { total: 2, imported: 1, skipped: 0, failed: 1 }
        );
        assert!(index.contains("Same Title"));
        assert!(out.join("001-b.json").is_file());

        let _ = fs::remove_dir_all(pages);
        let _ = fs::remove_dir_all(out);
    }

    #[test]
    fn slug_separators_stay_in_one_file() {
        assert_eq!(file_stem("nested/first"), "nested-first");
        assert_eq!(file_stem("a\\b"), "a-b");
        assert_eq!(file_stem("/"), "post");
        assert_eq!(file_stem(""), "post");
        assert_eq!(file_stem("../up"), "up");
    }

    #[test]
    fn write_failure_does_not_stop_the_run() {
        let out = scratch_dir("write_out");
        // A directory squatting on the first payload's path makes that write fail.
        fs::create_dir_all(out.join("001-first.json")).unwrap();
        let opts = ImportOptions {
            out_dir: out.clone(),
            ..ImportOptions::default()
        };
        let archive = r#"[
            {"title": "First", "slug": "first", "body_html": "<p>One</p>"},
            {"title": "Nested", "slug": "nested/second", "body_html": "<p>Two</p>"}
        ]"#;
        let entries = feed::parse_archive(archive).unwrap();
        let mut index = TitleIndex::default();

        let stats = run(entries, &mut index, &[], &opts).unwrap();
        assert_eq!(
            stats,
            ImportStats { total: 2, imported: 1, skipped: 0, failed: 1 }
        );
        assert!(!index.contains("First"));
        assert!(index.contains("Nested"));
        assert!(out.join("001-nested-second.json").is_file());

        let _ = fs::remove_dir_all(out);
    }

    #[test]
    fn strong_video_match() {
        let url = match_video("Scaling Postgres at Acme", &videos(), &MatchPolicy::default());
        assert_eq!(url.as_deref(), Some("https://www.youtube.com/watch?v=pg2024"));
        assert_eq!(match_video("A Quick Update", &videos(), &MatchPolicy::default()), None);
        assert_eq!(match_video("Anything", &[], &MatchPolicy::default()), None);
    }

    #[test]
    fn prepare_prefers_embedded_video() {
        let entry = posts().into_iter().nth(1).unwrap();
        let page = prepare(&entry, &videos(), &ImportOptions::default()).unwrap();
        assert_eq!(page.video_url.as_deref(), Some("https://www.youtube.com/watch?v=rw12xyz"));
        assert_eq!(page.content.blocks.len(), 2);
        assert!(page.transcript.is_empty());
    }

    #[test]
    fn prepare_reads_saved_page_and_captions() {
        let captions = scratch_dir("captions");
        fs::create_dir_all(&captions).unwrap();
        fs::copy(fixture("captions.vtt"), captions.join("abc123.vtt")).unwrap();

        let pages = scratch_dir("pages");
        fs::create_dir_all(&pages).unwrap();
        fs::copy(fixture("post.html"), pages.join("scaling-postgres.html")).unwrap();

        let opts = ImportOptions {
            pages_dir: Some(pages.clone()),
            captions_dir: Some(captions.clone()),
            ..ImportOptions::default()
        };
        let entry = posts().into_iter().next().unwrap();
        let page = prepare(&entry, &videos(), &opts).unwrap();

        // The saved page embeds abc123, which beats the fuzzy feed match.
        assert_eq!(page.video_url.as_deref(), Some("https://www.youtube.com/watch?v=abc123"));
        assert!(page.transcript.starts_with("Hi everyone"));
        assert!(page.content.blocks.len() > 5);

        let _ = fs::remove_dir_all(captions);
        let _ = fs::remove_dir_all(pages);
    }

    #[test]
    fn run_writes_payloads_and_grows_index() {
        let out = scratch_dir("out");
        let opts = ImportOptions {
            out_dir: out.clone(),
            database_id: Some("db-1".into()),
            ..ImportOptions::default()
        };
        let mut index = load_titles(&fixture("existing_titles.txt")).unwrap();

        let stats = run(posts(), &mut index, &videos(), &opts).unwrap();
        assert_eq!(
            stats,
            ImportStats { total: 3, imported: 2, skipped: 1, failed: 0 }
        );
        assert!(index.contains("Scaling Postgres at Acme"));
        assert!(index.contains("A Quick Update"));

        let written = fs::read_to_string(out.join("001-scaling-postgres.json")).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(payload["create"]["parent"]["database_id"], "db-1");
        assert_eq!(
            payload["create"]["properties"]["YouTube URL"]["url"],
            "https://www.youtube.com/watch?v=pg2024"
        );
        assert!(out.join("002-a-quick-update.json").is_file());

        // Second run over the same feed imports nothing.
        let again = run(posts(), &mut index, &videos(), &opts).unwrap();
        assert_eq!(again.imported, 0);
        assert_eq!(again.skipped, 3);

        let _ = fs::remove_dir_all(out);
    }

    #[test]
    fn repair_from_youtube_iframe() {
        let html = fs::read_to_string(fixture("post.html")).unwrap();
        let repair = repair(&html, "https://acme.substack.com/p/scaling-postgres", None).unwrap();
        assert!(!repair.native);
        assert_eq!(repair.video_url, "https://www.youtube.com/watch?v=abc123");
    }

    #[test]
    fn repair_native_needs_transcript() {
        let html = r#"<script>{"captions":"https://cdn.example.com/en.vtt"}</script>"#;
        assert!(repair(html, "https://a.example/p/x", None).is_none());

        let captions = fs::read_to_string(fixture("captions.vtt")).unwrap();
        let repair = repair(html, "https://a.example/p/x", Some(&captions)).unwrap();
        assert!(repair.native);
        assert_eq!(repair.video_url, "https://a.example/p/x");
        assert!(repair.transcript.ends_with("why they matter."));
    }

    #[test]
    fn preview_shortens() {
        assert_eq!(preview("short", 30), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
    }
}
