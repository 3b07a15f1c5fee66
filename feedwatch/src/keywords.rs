//! Keyword matching over the admin source pool and per-cycle digest accumulation.

use crate::html::strip_tags;
use crate::types::FeedEntry;
use regex::Regex;
use std::collections::HashSet;
use tracing::warn;

/// Case-insensitive whole-word matcher over a subscriber's keywords.
pub struct KeywordMatcher {
    patterns: Vec<(String, Regex)>,
}

impl KeywordMatcher {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = keywords
            .into_iter()
            .filter_map(|keyword| {
                let keyword = keyword.as_ref().trim().to_lowercase();
                if keyword.is_empty() {
                    return None;
                }
                match Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&keyword))) {
                    Ok(pattern) => Some((keyword, pattern)),
                    Err(e) => {
                        warn!("Skipping keyword {:?}: {}", keyword, e);
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The first keyword found in the entry's title or summary, in keyword order.
    pub fn first_match(&self, entry: &FeedEntry) -> Option<&str> {
        let summary = entry.summary.as_deref().map(strip_tags).unwrap_or_default();
        let haystack = format!("{}\n{}", entry.title, summary);
        self.patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(&haystack))
            .map(|(keyword, _)| keyword.as_str())
    }
}

/// One matched item awaiting a digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordHit {
    pub keyword: String,
    /// Namespace under which the item is marked seen after delivery.
    pub seen_namespace: String,
    /// Real source url, recorded in the keyword event log.
    pub source_url: String,
    pub source_label: String,
    pub item_id: String,
    pub title: String,
    pub link: Option<String>,
}

/// Matches collected during one subscriber cycle, grouped by keyword in first-seen
/// order. An item is claimed by one keyword only.
#[derive(Debug, Default)]
pub struct KeywordAccumulator {
    groups: Vec<(String, Vec<KeywordHit>)>,
    claimed: HashSet<(String, String)>,
}

impl KeywordAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// False when the item was already accumulated this cycle.
    pub fn push(&mut self, hit: KeywordHit) -> bool {
        if !self.claimed.insert((hit.seen_namespace.clone(), hit.item_id.clone())) {
            return false;
        }
        match self.groups.iter_mut().find(|(keyword, _)| *keyword == hit.keyword) {
            Some((_, hits)) => hits.push(hit),
            None => self.groups.push((hit.keyword.clone(), vec![hit])),
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    /// Per keyword, its hits split into chunks of at most `chunk_size`.
    pub fn into_chunks(self, chunk_size: usize) -> Vec<(String, Vec<Vec<KeywordHit>>)> {
        let size = chunk_size.max(1);
        self.groups
            .into_iter()
            .map(|(keyword, hits)| {
                let chunks = hits.chunks(size).map(|chunk| chunk.to_vec()).collect();
                (keyword, chunks)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, summary: &str) -> FeedEntry {
        FeedEntry {
            title: title.to_string(),
            summary: Some(summary.to_string()),
            ..Default::default()
        }
    }

    fn hit(keyword: &str, id: usize) -> KeywordHit {
        KeywordHit {
            keyword: keyword.to_string(),
            seen_namespace: "admin::https://wire.example/feed".to_string(),
            source_url: "https://wire.example/feed".to_string(),
            source_label: "Wire".to_string(),
            item_id: format!("item-{id}"),
            title: format!("Story {id}"),
            link: None,
        }
    }

    #[test]
    fn matches_whole_words_case_insensitively() {
        let matcher = KeywordMatcher::new(["Rust", "oil price"]);
        assert_eq!(matcher.first_match(&entry("Why RUST is popular", "")), Some("rust"));
        assert_eq!(matcher.first_match(&entry("Trusted sources", "")), None);
        assert_eq!(matcher.first_match(&entry("Markets", "<p>The <b>oil price</b> fell.</p>")), Some("oil price"));
    }

    #[test]
    fn first_keyword_claims_the_item() {
        let matcher = KeywordMatcher::new(["rust", "wasm"]);
        assert_eq!(matcher.first_match(&entry("Rust and WASM", "")), Some("rust"));

        let mut acc = KeywordAccumulator::new();
        assert!(acc.push(hit("rust", 1)));
        assert!(!acc.push(hit("wasm", 1)));
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn chunks_preserve_order() {
        let mut acc = KeywordAccumulator::new();
        for id in 0..23 {
            acc.push(hit("rates", id));
        }
        let chunks = acc.into_chunks(10);
        assert_eq!(chunks.len(), 1);
        let sizes: Vec<usize> = chunks[0].1.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
        assert_eq!(chunks[0].1[2][0].item_id, "item-20");
    }
}
