// Declarative entry filtering used by macro plugin selectors
use serde::{Deserialize, Serialize};

use crate::model::Entry;

/// A declarative predicate over [`Entry`] values.
///
/// `search_text` is a whitespace-separated list of clauses. A clause may be
/// prefixed with `name:`, `sample:` or `tag:` to target one field; an
/// unprefixed clause matches against the entry name. All clauses must match
/// (case-insensitive substring). `star` and `done` additionally require the
/// corresponding note flag to equal the given value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFilter {
    #[serde(default)]
    pub search_text: String,
    #[serde(default)]
    pub star: Option<bool>,
    #[serde(default)]
    pub done: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Clause {
    Name(String),
    Sample(String),
    Tag(String),
}

impl Clause {
    fn parse(token: &str) -> Option<Self> {
        let clause = if let Some(rest) = token.strip_prefix("name:") {
            Clause::Name(rest.to_lowercase())
        } else if let Some(rest) = token.strip_prefix("sample:") {
            Clause::Sample(rest.to_lowercase())
        } else if let Some(rest) = token.strip_prefix("tag:") {
            Clause::Tag(rest.to_lowercase())
        } else {
            Clause::Name(token.to_lowercase())
        };
        match &clause {
            Clause::Name(text) | Clause::Sample(text) | Clause::Tag(text) => {
                if text.is_empty() {
                    return None;
                }
            }
        }
        Some(clause)
    }

    fn matches(&self, entry: &Entry) -> bool {
        match self {
            Clause::Name(text) => entry.name.to_lowercase().contains(text),
            Clause::Sample(text) => entry
                .sample_name_without_extension()
                .to_lowercase()
                .contains(text),
            Clause::Tag(text) => entry.notes.tag.to_lowercase().contains(text),
        }
    }
}

impl EntryFilter {
    pub fn new(search_text: impl Into<String>) -> Self {
        EntryFilter {
            search_text: search_text.into(),
            star: None,
            done: None,
        }
    }

    pub fn with_star(mut self, star: bool) -> Self {
        self.star = Some(star);
        self
    }

    pub fn with_done(mut self, done: bool) -> Self {
        self.done = Some(done);
        self
    }

    fn clauses(&self) -> Vec<Clause> {
        self.search_text
            .split_whitespace()
            .filter_map(Clause::parse)
            .collect()
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        if let Some(star) = self.star {
            if entry.notes.star != star {
                return false;
            }
        }
        if let Some(done) = self.done {
            if entry.notes.done != done {
                return false;
            }
        }
        self.clauses().iter().all(|clause| clause.matches(entry))
    }

    /// Indices of all matching entries, in input order.
    pub fn select(&self, entries: &[Entry]) -> Vec<usize> {
        entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| self.matches(entry))
            .map(|(index, _)| index)
            .collect()
    }

    /// True when the filter matches every entry unconditionally.
    pub fn is_empty(&self) -> bool {
        self.star.is_none() && self.done.is_none() && self.clauses().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Notes;

    fn entries() -> Vec<Entry> {
        let mut first = Entry::new("ka.wav", "ka", 0.0, 100.0);
        first.notes = Notes {
            done: true,
            star: false,
            tag: "vowel".to_string(),
        };
        let mut second = Entry::new("shi.wav", "shi", 0.0, 100.0);
        second.notes = Notes {
            done: false,
            star: true,
            tag: "fricative".to_string(),
        };
        let third = Entry::new("ka2.wav", "ka strong", 0.0, 100.0);
        vec![first, second, third]
    }

    #[test]
    fn test_unprefixed_clause_matches_name() {
        let filter = EntryFilter::new("ka");
        assert_eq!(filter.select(&entries()), vec![0, 2]);
    }

    #[test]
    fn test_prefixed_clauses() {
        assert_eq!(EntryFilter::new("sample:shi").select(&entries()), vec![1]);
        assert_eq!(EntryFilter::new("tag:vowel").select(&entries()), vec![0]);
        assert_eq!(EntryFilter::new("name:strong").select(&entries()), vec![2]);
    }

    #[test]
    fn test_clauses_combine_with_and() {
        let filter = EntryFilter::new("ka tag:vowel");
        assert_eq!(filter.select(&entries()), vec![0]);
    }

    #[test]
    fn test_star_and_done_flags() {
        assert_eq!(
            EntryFilter::default().with_star(true).select(&entries()),
            vec![1]
        );
        assert_eq!(
            EntryFilter::default().with_done(false).select(&entries()),
            vec![1, 2]
        );
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let filter = EntryFilter::new("KA");
        assert_eq!(filter.select(&entries()), vec![0, 2]);
    }

    #[test]
    fn test_empty_filter_selects_everything() {
        let filter = EntryFilter::default();
        assert!(filter.is_empty());
        assert_eq!(filter.select(&entries()), vec![0, 1, 2]);
    }
}
