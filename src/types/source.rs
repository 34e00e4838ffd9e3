//! Source citations.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A citation produced by a retrieval-style tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

impl Source {
    pub fn new(title: impl Into<String>, url: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            excerpt: excerpt.into(),
            favicon: None,
        }
    }
}

/// Insertion-ordered source collection, deduplicated by URL.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    sources: Vec<Source>,
    seen: HashSet<String>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a source; returns `false` if its URL was already present.
    pub fn insert(&mut self, source: Source) -> bool {
        if !self.seen.insert(source.url.clone()) {
            return false;
        }
        self.sources.push(source);
        true
    }

    pub fn extend(&mut self, sources: impl IntoIterator<Item = Source>) {
        for source in sources {
            self.insert(source);
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn as_slice(&self) -> &[Source] {
        &self.sources
    }

    pub fn to_vec(&self) -> Vec<Source> {
        self.sources.clone()
    }

    pub fn clear(&mut self) {
        self.sources.clear();
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_urls_keep_first_entry() {
        let mut set = SourceSet::new();
        assert!(set.insert(Source::new("A", "https://a.example", "first")));
        assert!(set.insert(Source::new("B", "https://b.example", "")));
        assert!(!set.insert(Source::new("A again", "https://a.example", "second")));

        assert_eq!(set.len(), 2);
        assert_eq!(set.as_slice()[0].excerpt, "first");
        assert_eq!(set.as_slice()[1].url, "https://b.example");
    }
}
