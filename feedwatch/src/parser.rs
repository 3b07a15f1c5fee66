use crate::html::{collapse_whitespace, strip_tags};
use crate::types::{FeedEntry, FeedwatchError, ParsedFeed, Result};
use feed_rs::parser;
use tracing::debug;

pub struct FeedParser;

impl FeedParser {
    /// Parse RSS, Atom or JSON Feed content. Anything else is a parse error.
    pub fn parse(content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        // An entry without a guid keeps an empty id so `item_id` falls back to its link.
        let feed = parser::Builder::new()
            .id_generator(|_, _, _| String::new())
            .build()
            .parse(content.as_bytes())
            .map_err(|e| FeedwatchError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| collapse_whitespace(&t.content)).filter(|t| !t.is_empty());
        let link = feed.links.first().map(|l| l.href.clone());
        let entries: Vec<FeedEntry> = feed.entries.into_iter().map(Self::parse_entry).collect();

        debug!("Parsed feed {:?} with {} entries", title, entries.len());

        Ok(ParsedFeed { title, link, entries })
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> FeedEntry {
        let title = entry
            .title
            .map(|t| strip_tags(&t.content))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        // Prefer the alternate (permalink) link when the feed marks one.
        let link = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref().map(|r| r == "alternate").unwrap_or(false))
            .or_else(|| entry.links.first())
            .map(|l| l.href.trim().to_string())
            .filter(|href| !href.is_empty());

        let guid = Some(entry.id.trim().to_string()).filter(|id| !id.is_empty());
        let summary = entry.summary.map(|s| s.content);
        let content = entry.content.and_then(|c| c.body);
        let author = entry.authors.first().map(|a| a.name.clone());
        let published_at = entry.published.or(entry.updated);
        let tags = entry.categories.into_iter().map(|c| c.term).collect();

        FeedEntry {
            guid,
            link,
            title,
            summary,
            content,
            author,
            published_at,
            tags,
        }
    }

    /// Cheap sniff used before handing a body to the full parser.
    pub fn is_valid_feed_content(content: &str) -> bool {
        let head: String = content.trim_start().chars().take(1024).collect::<String>().to_lowercase();
        head.contains("<rss")
            || head.contains("<feed")
            || head.contains("<rdf:rdf")
            || (head.starts_with('{') && head.contains("jsonfeed.org"))
    }
}
