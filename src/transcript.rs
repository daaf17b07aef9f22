use crate::parser::blocks::{Block, SPAN_LIMIT};
use crate::parser::truncate_chars;

const HEADER_MARKER: &str = "WEBVTT";
const TIMING_SEPARATOR: &str = "-->";

/// Collapse a raw caption stream (WebVTT or SRT) into plain text.
///
/// Timing lines, blank lines, cue numbers and the stream header are dropped.
/// A line identical to the previously kept one is skipped, since captions
/// repeat across overlapping windows; earlier history is not consulted.
pub fn clean_transcript(raw: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let clean = line.trim();
        if is_noise(clean) {
            continue;
        }
        if kept.last() != Some(&clean) {
            kept.push(clean);
        }
    }

    kept.join(" ")
}

fn is_noise(line: &str) -> bool {
    line.is_empty()
        || line.contains(TIMING_SEPARATOR)
        || line.contains(HEADER_MARKER)
        || line.chars().all(|c| c.is_ascii_digit())
}

/// Split a transcript into paragraph blocks that each fit one span, breaking
/// at word boundaries. A single word longer than a span is hard split.
pub fn transcript_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word = word;
        let mut word_len = word.chars().count();

        while word_len > SPAN_LIMIT {
            if !current.is_empty() {
                blocks.push(Block::paragraph(&current));
                current.clear();
                current_len = 0;
            }
            let head = truncate_chars(word, SPAN_LIMIT);
            word = &word[head.len()..];
            word_len -= SPAN_LIMIT;
            blocks.push(Block::paragraph(&head));
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() { word_len } else { word_len + 1 };
        if current_len + needed > SPAN_LIMIT {
            blocks.push(Block::paragraph(&current));
            current.clear();
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        blocks.push(Block::paragraph(&current));
    }
    blocks
}
