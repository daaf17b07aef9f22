use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use super::{normalize, CatalogEntry};
use crate::config::MatchPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Exact,
    Strong,
    /// Near miss: reported, never acted on.
    Weak,
    #[serde(rename = "NONE")]
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: Option<CatalogEntry>,
    /// Index of the matched candidate in the list that was searched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub score: f64,
    pub decision: Decision,
}

impl MatchResult {
    fn unmatched(score: f64, decision: Decision) -> Self {
        MatchResult {
            matched: None,
            position: None,
            score,
            decision,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self.decision, Decision::Exact | Decision::Strong)
    }
}

/// Match a title against a candidate list with the default policy.
pub fn fuzzy_match<S: AsRef<str>>(reference: &str, candidates: &[S]) -> MatchResult {
    MatchPolicy::default().evaluate(reference, candidates)
}

impl MatchPolicy {
    pub fn evaluate<S: AsRef<str>>(&self, reference: &str, candidates: &[S]) -> MatchResult {
        let key = normalize(reference);
        if key.is_empty() {
            return MatchResult::unmatched(0.0, Decision::NoMatch);
        }

        let mut best: Option<(usize, f64)> = None;
        for (position, candidate) in candidates.iter().take(self.window).enumerate() {
            let raw = candidate.as_ref();
            let candidate_key = normalize(raw);
            if candidate_key.is_empty() {
                continue;
            }

            // First containment hit wins outright, even over a better fuzzy score seen earlier.
            if candidate_key.contains(&key) || key.contains(&candidate_key) {
                info!("Exact match found: '{}'", raw);
                return MatchResult {
                    matched: Some(CatalogEntry::new(raw)),
                    position: Some(position),
                    score: 1.0,
                    decision: Decision::Exact,
                };
            }

            let score = key_similarity(&key, &candidate_key);
            debug!("'{}' scored {:.2}", raw, score);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((position, score));
            }
        }

        let Some((position, score)) = best else {
            return MatchResult::unmatched(0.0, Decision::NoMatch);
        };
        let title = candidates[position].as_ref();

        if score > self.strong {
            info!("Close match found: '{}' ({:.2})", title, score);
            MatchResult {
                matched: Some(CatalogEntry::new(title)),
                position: Some(position),
                score,
                decision: Decision::Strong,
            }
        } else if score > self.weak {
            info!("Weak match (skipping): '{}' ({:.2})", title, score);
            MatchResult::unmatched(score, Decision::Weak)
        } else {
            MatchResult::unmatched(score, Decision::NoMatch)
        }
    }
}

/// Similarity in [0, 1] of two free-text titles, insensitive to word order
/// and to words present in only one of them.
pub fn similarity(a: &str, b: &str) -> f64 {
    key_similarity(&normalize(a), &normalize(b))
}

/// Token-set ratio: compare the shared words alone and with each side's
/// leftovers appended, all in sorted order, and keep the best edit ratio.
fn key_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let left: BTreeSet<&str> = a.split_whitespace().collect();
    let right: BTreeSet<&str> = b.split_whitespace().collect();

    let shared = join(left.intersection(&right));
    let left_full = append(&shared, &join(left.difference(&right)));
    let right_full = append(&shared, &join(right.difference(&left)));

    let mut score = ratio(&left_full, &right_full);
    if !shared.is_empty() {
        score = score
            .max(ratio(&shared, &left_full))
            .max(ratio(&shared, &right_full));
    }
    score
}

fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

fn join<'a>(words: impl Iterator<Item = &'a &'a str>) -> String {
    words.copied().collect::<Vec<_>>().join(" ")
}

fn append(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{} {}", head, tail),
    }
}
