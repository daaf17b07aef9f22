use std::str::FromStr;

use anyhow::{bail, Context, Result};

const DATABASE_ID_VAR: &str = "NOTION_DATABASE_ID";
const STRONG_VAR: &str = "TITLE_MATCH_STRONG";
const WEAK_VAR: &str = "TITLE_MATCH_WEAK";
const WINDOW_VAR: &str = "TITLE_MATCH_WINDOW";

/// Threshold bands for cross-catalog title matching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    /// Scores above this are acted on.
    pub strong: f64,
    /// Scores above this (and not strong) are reported only.
    pub weak: f64,
    /// Only the first `window` candidates are considered.
    pub window: usize,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        MatchPolicy {
            strong: 0.70,
            weak: 0.50,
            window: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Parent database stamped into page payloads.
    pub database_id: Option<String>,
    pub policy: MatchPolicy,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = MatchPolicy::default();
        let policy = MatchPolicy {
            strong: parse_var(&lookup, STRONG_VAR)?.unwrap_or(defaults.strong),
            weak: parse_var(&lookup, WEAK_VAR)?.unwrap_or(defaults.weak),
            window: parse_var(&lookup, WINDOW_VAR)?.unwrap_or(defaults.window),
        };

        for (name, value) in [(STRONG_VAR, policy.strong), (WEAK_VAR, policy.weak)] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be within 0..=1, got {}", name, value);
            }
        }
        if policy.weak > policy.strong {
            bail!(
                "{} ({}) must not exceed {} ({})",
                WEAK_VAR,
                policy.weak,
                STRONG_VAR,
                policy.strong
            );
        }

        let database_id = lookup(DATABASE_ID_VAR).filter(|id| !id.trim().is_empty());
        Ok(Settings { database_id, policy })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => {
            let value = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", name, raw))?;
            Ok(Some(value))
        }
        _ => Ok(None),
    }
}
