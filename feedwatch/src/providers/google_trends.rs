use super::{Provider, ProviderContext, ProviderMessage, PROVIDER_ITEM_CAP};
use crate::locale::{format_age, format_long_date};
use crate::parser::FeedParser;
use crate::types::{FeedwatchError, Result, SubscriberId};
use crate::urls::site_host;
use async_trait::async_trait;
use chrono::Utc;
use html_escape::{decode_html_entities, encode_double_quoted_attribute, encode_text};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

static ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<item>(.*?)</item>").unwrap());
static ITEM_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<title>(.*?)</title>").unwrap());
static APPROX_TRAFFIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<ht:approx_traffic>(.*?)</ht:approx_traffic>").unwrap());

const FEED_PATHS: &[&str] = &["/trending/rss", "/trends/trendingsearches/daily/rss"];

/// Google Trends daily trending-searches feed as one ranked list.
pub struct GoogleTrendsProvider;

fn xml_text(raw: &str) -> String {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(raw);
    decode_html_entities(inner).trim().to_string()
}

/// `ht:approx_traffic` per item title. feed-rs does not surface the `ht:` extension.
fn approx_traffic(xml: &str) -> HashMap<String, String> {
    ITEM.captures_iter(xml)
        .filter_map(|item| {
            let body = item.get(1)?.as_str();
            let title = xml_text(ITEM_TITLE.captures(body)?.get(1)?.as_str());
            let traffic = xml_text(APPROX_TRAFFIC.captures(body)?.get(1)?.as_str());
            Some((title, traffic))
        })
        .collect()
}

fn geo_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.query_pairs().find(|(k, _)| k == "geo").map(|(_, v)| v.trim().to_uppercase()))
        .filter(|g| !g.is_empty())
        .unwrap_or_else(|| "Global".to_string())
}

fn explore_link(term: &str, geo: &str) -> Option<String> {
    let geo = if geo == "Global" { "" } else { geo };
    Url::parse_with_params("https://trends.google.com/trends/explore", &[("q", term), ("geo", geo)])
        .ok()
        .map(|u| u.to_string())
}

#[async_trait]
impl Provider for GoogleTrendsProvider {
    fn name(&self) -> &'static str {
        "google_trends"
    }

    fn seen_prefix(&self) -> &'static str {
        "trends::"
    }

    fn matches(&self, url: &str) -> bool {
        let Some(host) = site_host(url) else {
            return false;
        };
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        host == "trends.google.com" && FEED_PATHS.iter().any(|p| parsed.path().trim_end_matches('/') == *p)
    }

    async fn render(
        &self,
        ctx: ProviderContext<'_>,
        subscriber_id: SubscriberId,
        url: &str,
        locale: &str,
    ) -> Result<Option<ProviderMessage>> {
        let raw = ctx.fetcher.fetch_text(url).await.ok_or_else(|| FeedwatchError::Provider {
            provider: self.name().to_string(),
            message: format!("no response from {}", url),
        })?;
        let feed = FeedParser::parse(&raw)?;
        let traffic = approx_traffic(&raw);

        let namespace = self.seen_namespace(url);
        let seen = ctx.store.get_seen(subscriber_id, &namespace).await?;

        let terms: Vec<_> = feed
            .entries
            .iter()
            .filter(|e| !e.title.trim().is_empty())
            .map(|e| (format!("trend:{}", e.title.trim()), e))
            .collect();
        let fresh: Vec<_> = terms.iter().filter(|(id, _)| !seen.contains(id)).collect();
        if fresh.is_empty() {
            debug!("No new trends for {} at {}", subscriber_id, url);
            return Ok(None);
        }
        let shown: Vec<_> = fresh
            .iter()
            .copied()
            .chain(terms.iter().filter(|(id, _)| seen.contains(id)))
            .take(PROVIDER_ITEM_CAP)
            .collect();

        let geo = geo_of(url);
        let now = Utc::now();
        let date_locale = if geo == "IR" { "fa" } else { locale };
        let mut text = format!(
            "📊 Top search trends in {} (past 24h)\n{} | Google Trends\n",
            encode_text(&geo),
            encode_text(&format_long_date(now, date_locale))
        );

        for (index, (_, entry)) in shown.iter().enumerate() {
            let term = entry.title.trim();
            let searches = traffic
                .get(term)
                .map(|t| format!("{} searches", t.replace('+', "+ ").trim()))
                .unwrap_or_else(|| "-".to_string());
            let age = entry
                .published_at
                .map(|at| format_age(at, now, locale))
                .unwrap_or_else(|| "recently".to_string());
            let label = match explore_link(term, &geo) {
                Some(link) => format!("<a href=\"{}\">{}</a>", encode_double_quoted_attribute(&link), encode_text(term)),
                None => encode_text(term).into_owned(),
            };
            text.push_str(&format!("\n{}) {}\n{} • ↗️ Active • {}\n", index + 1, label, searches, age));
        }

        let item_ids = fresh.iter().map(|(id, _)| id.clone()).collect();
        Ok(Some(ProviderMessage {
            text: text.trim_end().to_string(),
            seen_namespace: namespace,
            item_ids,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_trending_feeds_only() {
        let provider = GoogleTrendsProvider;
        assert!(provider.matches("https://trends.google.com/trending/rss?geo=IR"));
        assert!(provider.matches("https://trends.google.com/trends/trendingsearches/daily/rss?geo=US"));
        assert!(!provider.matches("https://trends.google.com/trends/explore?q=rust"));
        assert!(!provider.matches("https://example.com/trending/rss"));
    }

    #[test]
    fn reads_traffic_extension() {
        let xml = r#"<rss xmlns:ht="https://trends.google.com/trending/rss"><channel>
            <item><title>solar eclipse</title><ht:approx_traffic>500,000+</ht:approx_traffic></item>
            <item><title><![CDATA[Tom &amp; Jerry]]></title><ht:approx_traffic>20,000+</ht:approx_traffic></item>
        </channel></rss>"#;
        let traffic = approx_traffic(xml);
        assert_eq!(traffic.get("solar eclipse").map(String::as_str), Some("500,000+"));
        assert_eq!(traffic.get("Tom & Jerry").map(String::as_str), Some("20,000+"));
    }

    #[test]
    fn geo_and_links() {
        assert_eq!(geo_of("https://trends.google.com/trending/rss?geo=ir"), "IR");
        assert_eq!(geo_of("https://trends.google.com/trending/rss"), "Global");
        assert_eq!(
            explore_link("solar eclipse", "US").as_deref(),
            Some("https://trends.google.com/trends/explore?q=solar+eclipse&geo=US")
        );
    }
}
