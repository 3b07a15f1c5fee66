//! Pure HTML heuristics: page html in, links or text out. No network access here.

use crate::urls::{same_site, site_host};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

static BOT_WALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(enable javascript|just a moment|cloudflare|access denied|verify you are a human)").unwrap()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static YEAR_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(19|20)\d{2}(/|-|$)").unwrap());

static ASSET_EXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(jpe?g|png|gif|webp|svg|pdf|zip|css|js|mp3|mp4|xml)$").unwrap());

const SKIP_TEXT_IN: &[&str] = &["script", "style", "noscript", "template", "svg", "nav", "footer", "form"];

const ARTICLE_MARKERS: &[&str] = &["/news/", "/article", "/post", "/blog/", "/stories/"];

/// Parses a selector literal known at compile time.
fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap()
}

static ARTICLE: Lazy<Selector> = Lazy::new(|| selector("article"));
static CONTAINERS: Lazy<Selector> = Lazy::new(|| selector("main, section, div"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("p"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("body"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static LINK_TAG: Lazy<Selector> = Lazy::new(|| selector("link[href]"));
static META: Lazy<Selector> = Lazy::new(|| selector("meta[content]"));

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Visible text of an element, skipping scripts, styles and navigation chrome.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|e| SKIP_TEXT_IN.contains(&e.name()))
                .unwrap_or(false)
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

fn paragraphs_text(element: ElementRef<'_>) -> String {
    element
        .select(&PARAGRAPH)
        .map(visible_text)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip markup from a feed summary or content fragment.
pub fn strip_tags(fragment: &str) -> String {
    if !fragment.contains('<') {
        return collapse_whitespace(fragment);
    }
    let doc = Html::parse_fragment(fragment);
    visible_text(doc.root_element())
}

/// Main article text: the `<article>` element, else the container holding the most
/// paragraph text, else all visible text.
pub fn extract_main_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let doc = Html::parse_document(html);

    if let Some(article) = doc.select(&ARTICLE).next() {
        let text = paragraphs_text(article);
        if !text.is_empty() {
            return text;
        }
        return visible_text(article);
    }

    let best = doc
        .select(&CONTAINERS)
        .map(paragraphs_text)
        .filter(|t| !t.is_empty())
        .max_by_key(|t| t.len());
    if let Some(text) = best {
        return text;
    }

    match doc.select(&BODY).next() {
        Some(body) => visible_text(body),
        None => visible_text(doc.root_element()),
    }
}

/// `<title>`, else the first `<h1>`.
pub fn page_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&TITLE)
        .chain(doc.select(&H1))
        .map(visible_text_any)
        .find(|t| !t.is_empty())
}

fn visible_text_any(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Bot walls and JS challenges, judged on the visible text rather than raw markup so
/// CDN script urls do not trigger it.
pub fn looks_like_bot_wall(html: &str) -> bool {
    let doc = Html::parse_document(html);
    let mut sample = doc.select(&TITLE).map(visible_text_any).collect::<Vec<_>>().join(" ");
    if let Some(body) = doc.select(&BODY).next() {
        sample.push(' ');
        sample.extend(visible_text(body).chars().take(2000));
    }
    BOT_WALL.is_match(&sample)
}

fn looks_like_article_path(path: &str) -> bool {
    if ASSET_EXT.is_match(path) {
        return false;
    }
    let lower = path.to_ascii_lowercase();
    if ARTICLE_MARKERS.iter().any(|marker| lower.contains(marker)) || YEAR_SEGMENT.is_match(&lower) {
        return true;
    }
    lower.split('/').filter(|segment| !segment.is_empty()).count() >= 2
}

/// Candidate article links of a listing page, absolute, same-site and deduplicated in
/// document order.
pub fn extract_article_links(html: &str, base: &str) -> Vec<String> {
    extract_article_anchors(html, base).into_iter().map(|(link, _)| link).collect()
}

/// Like [`extract_article_links`], paired with the anchor text of the first anchor
/// pointing at each link (empty for image-only anchors).
pub fn extract_article_anchors(html: &str, base: &str) -> Vec<(String, String)> {
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };
    let Some(base_host) = site_host(base) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut anchors = Vec::new();

    for anchor in doc.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("mailto:") || href.starts_with("javascript:") {
            continue;
        }
        let Ok(mut absolute) = base_url.join(href) else {
            continue;
        };
        if !matches!(absolute.scheme(), "http" | "https") {
            continue;
        }
        absolute.set_fragment(None);
        let link = absolute.to_string();
        let same = site_host(&link).map(|host| same_site(&host, &base_host)).unwrap_or(false);
        if !same || !looks_like_article_path(absolute.path()) {
            continue;
        }
        if link.trim_end_matches('/') == base.trim_end_matches('/') {
            continue;
        }
        if seen.insert(link.clone()) {
            anchors.push((link, visible_text_any(anchor)));
        }
    }
    anchors
}

/// Target of `<link rel="amphtml">`, resolved against the page url.
pub fn amp_link(html: &str, base: &str) -> Option<String> {
    link_with_rel(html, base, |rel, _| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("amphtml")))
        .into_iter()
        .next()
}

/// Feeds advertised through `<link rel="alternate">`.
pub fn alternate_feed_links(html: &str, base: &str) -> Vec<String> {
    link_with_rel(html, base, |rel, kind| {
        let kind = kind.to_ascii_lowercase();
        rel.eq_ignore_ascii_case("alternate")
            && (kind.contains("rss") || kind.contains("atom") || kind.contains("feed+json"))
    })
}

fn link_with_rel<P>(html: &str, base: &str, predicate: P) -> Vec<String>
where
    P: Fn(&str, &str) -> bool,
{
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    doc.select(&LINK_TAG)
        .filter(|link| {
            let rel = link.value().attr("rel").unwrap_or("");
            let kind = link.value().attr("type").unwrap_or("");
            predicate(rel, kind)
        })
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| base_url.join(href.trim()).ok())
        .map(|url| url.to_string())
        .collect()
}

/// `og:description`, else `<meta name="description">`.
pub fn meta_description(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let mut og = None;
    let mut plain = None;
    for meta in doc.select(&META) {
        let element = meta.value();
        let content = element.attr("content").map(collapse_whitespace).unwrap_or_default();
        if content.is_empty() {
            continue;
        }
        if element.attr("property").map(|p| p.eq_ignore_ascii_case("og:description")).unwrap_or(false) {
            og.get_or_insert(content);
        } else if element.attr("name").map(|n| n.eq_ignore_ascii_case("description")).unwrap_or(false) {
            plain.get_or_insert(content);
        }
    }
    og.or(plain)
}
