mod config;
mod feed;
mod page;
mod parser;
mod sync;
mod titles;
mod transcript;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;

use crate::config::{MatchPolicy, Settings};

#[derive(Parser)]
#[command(name = "post_sync", about = "Newsletter to block-document importer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a saved post page to blocks
    Convert {
        path: PathBuf,
        /// Treat the file as a body fragment rather than a full page
        #[arg(long)]
        fragment: bool,
        /// Print block text instead of JSON
        #[arg(long)]
        text: bool,
    },
    /// Check whether a title is already in the catalog
    Check {
        title: String,
        /// Existing titles, one per line
        #[arg(short, long)]
        existing: PathBuf,
    },
    /// Find the companion video for a post title
    Match {
        title: String,
        /// Video feed (Atom/RSS)
        #[arg(short, long)]
        videos: PathBuf,
        /// Also print the similarity of every candidate in the window
        #[arg(long)]
        scores: bool,
    },
    /// Clean a caption file into plain text
    Transcript { path: PathBuf },
    /// Show the cover image and video source of a saved page
    Probe { path: PathBuf },
    /// Build the repair payload for a page missing its video
    Repair {
        path: PathBuf,
        /// Public URL of the page
        #[arg(long, default_value = "")]
        url: String,
        /// Caption file for the page's video
        #[arg(long)]
        captions: Option<PathBuf>,
    },
    /// Import new posts from a feed, writing one payload per post
    Import {
        /// Post feed (RSS/Atom, or archive .json)
        #[arg(short, long)]
        feed: PathBuf,
        /// Existing titles, one per line
        #[arg(short, long)]
        existing: Option<PathBuf>,
        /// Companion video feed
        #[arg(short, long)]
        videos: Option<PathBuf>,
        /// Directory of saved pages (<slug>.html)
        #[arg(long)]
        pages: Option<PathBuf>,
        /// Directory of caption files (<video id>.vtt)
        #[arg(long)]
        captions: Option<PathBuf>,
        #[arg(short, long, default_value = "out")]
        out: PathBuf,
        /// Max posts to import (default: whole feed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Convert { path, fragment, text } => {
            let html = read(&path)?;
            let doc = if fragment {
                parser::convert_fragment(&html)
            } else {
                parser::convert_html(&html)
            };
            if doc.is_empty() {
                println!("No content region found.");
                return Ok(());
            }
            if text {
                for line in doc.blocks.iter().map(|b| b.plain_text()).filter(|t| !t.is_empty()) {
                    println!("{}", line);
                }
                return Ok(());
            }
            print_json(&json!({ "embed_id": doc.embed_id, "children": doc.to_notion() }))
        }
        Commands::Check { title, existing } => {
            let index = sync::load_titles(&existing)?;
            if titles::is_duplicate(&title, index.keys()) {
                println!("Duplicate: '{}' is already in the catalog", title);
            } else {
                println!("New: '{}' ({} titles checked)", title, index.len());
            }
            Ok(())
        }
        Commands::Match { title, videos, scores } => {
            let policy = Settings::from_env()?.policy;
            let videos = feed::load(&videos)?;
            let candidates: Vec<&str> = videos.iter().map(|v| v.title.as_str()).collect();
            if scores {
                for candidate in candidates.iter().take(policy.window) {
                    println!("{:.3}  {}", titles::fuzzy::similarity(&title, candidate), candidate);
                }
            }
            let result = if policy == MatchPolicy::default() {
                titles::fuzzy::fuzzy_match(&title, &candidates)
            } else {
                policy.evaluate(&title, &candidates)
            };
            print_json(&result)
        }
        Commands::Transcript { path } => {
            let text = transcript::clean_transcript(&read(&path)?);
            if text.is_empty() {
                println!("No caption text found.");
            } else {
                println!("{}", text);
            }
            Ok(())
        }
        Commands::Probe { path } => {
            let html = read(&path)?;
            let cover = parser::media::cover_image(&html).map(|url| page::cover_payload(&url));
            let video = parser::media::video_source(&html);
            print_json(&json!({ "cover": cover, "video": video }))
        }
        Commands::Repair { path, url, captions } => {
            let html = read(&path)?;
            let captions = captions.as_deref().map(read).transpose()?;
            match sync::repair(&html, &url, captions.as_deref()) {
                Some(fix) => print_json(&json!({
                    "update": fix.properties(),
                    "append": page::batches(&fix.children()),
                })),
                None => {
                    println!("No usable video on page.");
                    Ok(())
                }
            }
        }
        Commands::Import {
            feed: feed_path,
            existing,
            videos,
            pages,
            captions,
            out,
            limit,
        } => {
            let settings = Settings::from_env()?;
            let mut entries = feed::load(&feed_path)?;
            if let Some(n) = limit {
                entries.truncate(n);
            }
            if entries.is_empty() {
                println!("Feed has no posts.");
                return Ok(());
            }
            let mut index = match &existing {
                Some(path) => sync::load_titles(path)?,
                None => titles::TitleIndex::default(),
            };
            if index.is_empty() {
                println!("No existing titles loaded; every post counts as new.");
            }
            let videos = match &videos {
                Some(path) => feed::load(path)?,
                None => Vec::new(),
            };
            println!(
                "Importing from {} posts ({} known titles, {} videos)...",
                entries.len(),
                index.len(),
                videos.len()
            );

            let opts = sync::ImportOptions {
                pages_dir: pages,
                captions_dir: captions,
                out_dir: out,
                database_id: settings.database_id.clone(),
                policy: settings.policy,
            };
            let stats = sync::run(entries, &mut index, &videos, &opts)?;
            println!(
                "Done: {} posts ({} imported, {} skipped, {} failed) -> {}",
                stats.total,
                stats.imported,
                stats.skipped,
                stats.failed,
                opts.out_dir.display()
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn read(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
