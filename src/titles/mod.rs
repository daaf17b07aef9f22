pub mod fuzzy;

use std::collections::HashSet;

use serde::Serialize;

/// A title as seen in a catalog, with its comparison key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub raw_title: String,
    pub normalized_key: String,
}

impl CatalogEntry {
    pub fn new(raw_title: &str) -> Self {
        CatalogEntry {
            raw_title: raw_title.to_string(),
            normalized_key: normalize(raw_title),
        }
    }
}

/// Canonical comparison key: lowercase, quotes and apostrophes removed (straight
/// or typographic), other punctuation treated as a word break, whitespace collapsed.
pub fn normalize(title: &str) -> String {
    let spaced: String = title
        .chars()
        .filter(|c| !is_quote(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_quote(c: char) -> bool {
    matches!(
        c,
        '\'' | '"' | '`' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{201C}' | '\u{201D}'
            | '\u{201E}' | '\u{201F}' | '\u{2032}' | '\u{2033}' | '\u{00AB}' | '\u{00BB}'
    )
}

/// Exact membership of the normalized title; within one catalog titles are
/// reproduced verbatim, so no fuzzy step here.
pub fn is_duplicate(title: &str, index: &HashSet<String>) -> bool {
    index.contains(&normalize(title))
}

/// Normalized-title set for one run. Grows as items are accepted, never shrinks.
#[derive(Debug, Clone, Default)]
pub struct TitleIndex {
    keys: HashSet<String>,
}

impl TitleIndex {
    pub fn from_titles<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = TitleIndex::default();
        for title in titles {
            index.insert(title.as_ref());
        }
        index
    }

    pub fn contains(&self, title: &str) -> bool {
        is_duplicate(title, &self.keys)
    }

    /// Record an accepted title. Titles with an empty key are not indexed.
    pub fn insert(&mut self, title: &str) -> CatalogEntry {
        let entry = CatalogEntry::new(title);
        if !entry.normalized_key.is_empty() {
            self.keys.insert(entry.normalized_key.clone());
        }
        entry
    }

    pub fn keys(&self) -> &HashSet<String> {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_and_case_collapse() {
        let key = normalize("Hello World");
        assert_eq!(key, "hello world");
        assert_eq!(normalize("  hello   world  "), key);
        assert_eq!(normalize("Hello World "), key);
        assert_eq!(normalize("HELLO\tWORLD\n"), key);
    }

    #[test]
    fn smart_and_straight_quotes_match() {
        assert_eq!(normalize("Don\u{2019}t Panic"), normalize("Don't Panic"));
        assert_eq!(normalize("\u{201C}Quoted\u{201D} Title"), normalize("\"Quoted\" Title"));
        assert_eq!(normalize("Don't Panic"), "dont panic");
    }

    #[test]
    fn punctuation_is_a_word_break() {
        assert_eq!(normalize("Rust: Part 1"), "rust part 1");
        assert_eq!(normalize("State-of-the-Art!"), "state of the art");
        assert_eq!(normalize("Hello, World."), normalize("hello world"));
    }

    #[test]
    fn unicode_letters_survive() {
        assert_eq!(normalize("Café Über"), "café über");
        assert_eq!(normalize("?!..."), "");
    }

    #[test]
    fn duplicate_detection() {
        let index: HashSet<String> = [normalize("My Post")].into_iter().collect();
        assert!(is_duplicate("my post", &index));
        assert!(is_duplicate("  My   Post ", &index));
        assert!(!is_duplicate("My Other Post", &index));
    }

    #[test]
    fn index_grows_within_run() {
        let mut index = TitleIndex::from_titles(["First Post", "Second Post"]);
        assert_eq!(index.len(), 2);
        assert!(!index.contains("Third Post"));

        let entry = index.insert("Third Post");
        assert_eq!(entry.normalized_key, "third post");
        assert!(index.contains("third post "));
        assert_eq!(index.len(), 3);

        index.insert("Third Post");
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn empty_titles_are_not_indexed() {
        let mut index = TitleIndex::default();
        index.insert("   ");
        assert!(index.is_empty());
        assert!(!index.contains(""));
    }
}
