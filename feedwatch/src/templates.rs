//! Telegram-style HTML message templates. Every interpolated field is escaped here.

use crate::locale::{base_language, format_date, persian_digits, uses_jalali};
use crate::summarizer::SummaryResult;
use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};

/// Points shown by the search-fallback template.
const FALLBACK_POINTS: usize = 3;

struct Labels {
    source: &'static str,
    opportunities: &'static str,
    risks: &'static str,
    signal: &'static str,
    via_search: &'static str,
    untitled: &'static str,
    digest: &'static str,
}

const EN: Labels = Labels {
    source: "Source",
    opportunities: "Opportunities",
    risks: "Risks",
    signal: "Signal",
    via_search: "via web search",
    untitled: "Untitled",
    digest: "Keyword digest",
};

const FA: Labels = Labels {
    source: "منبع",
    opportunities: "فرصت‌ها",
    risks: "ریسک‌ها",
    signal: "سیگنال",
    via_search: "از جستجوی وب",
    untitled: "بدون عنوان",
    digest: "خلاصه کلیدواژه",
};

fn labels(locale: &str) -> &'static Labels {
    match base_language(locale).as_str() {
        "fa" => &FA,
        _ => &EN,
    }
}

/// Fields shared by every per-item template.
#[derive(Debug, Clone, Default)]
pub struct ItemHeader<'a> {
    pub title: &'a str,
    pub source: &'a str,
    pub link: Option<&'a str>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ItemHeader<'_> {
    fn lines(&self, locale: &str) -> Vec<String> {
        let labels = labels(locale);
        let title = if self.title.trim().is_empty() { labels.untitled } else { self.title.trim() };
        let date = self.published_at.map(|at| format_date(at, locale)).unwrap_or_default();
        let meta = if date.is_empty() {
            format!("<i>{}</i>", encode_text(self.source))
        } else {
            format!("<i>{}</i> | <i>{}</i>", encode_text(self.source), encode_text(&date))
        };
        vec![format!("<b>{}</b>", encode_text(title)), meta, String::new()]
    }

    fn link_line(&self, locale: &str) -> Option<String> {
        let link = self.link.filter(|l| !l.trim().is_empty())?;
        Some(format!(
            "\n<a href=\"{}\">{}</a>",
            encode_double_quoted_attribute(link),
            encode_text(labels(locale).source)
        ))
    }
}

/// Drop a lead prefix that merely repeats the title.
pub fn tidy_lead(lead: &str, title: &str) -> String {
    let lead = lead.trim();
    let title = title.trim();
    if title.is_empty() {
        return lead.to_string();
    }
    let lower_lead = lead.to_lowercase();
    let lower_title = title.to_lowercase();
    if lower_lead == lower_title {
        return String::new();
    }
    if lower_lead.starts_with(&lower_title) {
        let rest: String = lead.chars().skip(title.chars().count()).collect();
        let rest = rest.trim_start_matches(|c: char| c.is_whitespace() || ":.-|,".contains(c));
        if !rest.is_empty() {
            return rest.to_string();
        }
    }
    lead.to_string()
}

fn push_section(parts: &mut Vec<String>, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    parts.push(String::new());
    parts.push(format!("<b>{}</b>", encode_text(heading)));
    parts.extend(items.iter().map(|item| format!("• {}", encode_text(item))));
}

/// Full summary card.
pub fn rich(header: &ItemHeader<'_>, summary: &SummaryResult, locale: &str) -> String {
    let labels = labels(locale);
    let mut parts = header.lines(locale);

    let lead = tidy_lead(&summary.lead, header.title);
    if !lead.is_empty() {
        parts.push(format!("🔰 {}", encode_text(&lead)));
        parts.push(String::new());
    }
    parts.extend(summary.key_points.iter().map(|point| format!("✔️ {}", encode_text(point))));

    push_section(&mut parts, labels.opportunities, &summary.opportunities);
    push_section(&mut parts, labels.risks, &summary.risks);

    if !summary.signal.trim().is_empty() {
        parts.push(String::new());
        parts.push(format!("📌 <b>{}:</b> {}", encode_text(labels.signal), encode_text(summary.signal.trim())));
    }
    if let Some(link) = header.link_line(locale) {
        parts.push(link);
    }
    parts.join("\n").trim().to_string()
}

/// Lighter card for summaries built from web search results.
pub fn search_fallback(header: &ItemHeader<'_>, summary: &SummaryResult, locale: &str) -> String {
    let labels = labels(locale);
    let mut parts = header.lines(locale);

    let lead = tidy_lead(&summary.lead, header.title);
    if !lead.is_empty() {
        parts.push(format!("🔰 {}", encode_text(&lead)));
        parts.push(String::new());
    }
    parts.extend(
        summary
            .key_points
            .iter()
            .take(FALLBACK_POINTS)
            .map(|point| format!("✔️ {}", encode_text(point))),
    );
    parts.push(String::new());
    parts.push(format!("<i>🔎 {}</i>", encode_text(labels.via_search)));
    if let Some(link) = header.link_line(locale) {
        parts.push(link);
    }
    parts.join("\n").trim().to_string()
}

/// Title and source with an optional extractive lead.
pub fn minimal(header: &ItemHeader<'_>, lead: &str, locale: &str) -> String {
    let mut parts = header.lines(locale);
    let lead = tidy_lead(lead, header.title);
    if !lead.is_empty() {
        parts.push(encode_text(&lead).into_owned());
    }
    if let Some(link) = header.link_line(locale) {
        parts.push(link);
    }
    parts.join("\n").trim().to_string()
}

/// One item of a keyword digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestItem {
    pub title: String,
    pub link: Option<String>,
    pub source: String,
}

/// Position of one chunk within a digest. `part` is 1-based; `first_index` is the
/// 0-based index of the chunk's first item in the whole digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPosition {
    pub part: usize,
    pub parts: usize,
    pub first_index: usize,
}

/// One digest message. The part counter is only shown when there is more than one chunk.
pub fn keyword_digest(
    keyword: &str,
    items: &[DigestItem],
    position: ChunkPosition,
    at: DateTime<Utc>,
    locale: &str,
) -> String {
    let ChunkPosition { part, parts, first_index } = position;
    let labels = labels(locale);
    let numbering = |n: usize| {
        let n = n.to_string();
        if uses_jalali(locale) {
            persian_digits(&n)
        } else {
            n
        }
    };

    let mut heading = format!("🔎 <b>{}: {}</b>", encode_text(labels.digest), encode_text(keyword));
    if parts > 1 {
        heading.push_str(&format!(" ({}/{})", numbering(part), numbering(parts)));
    }
    let mut lines = vec![heading, format!("<i>{}</i>", encode_text(&format_date(at, locale))), String::new()];

    for (offset, item) in items.iter().enumerate() {
        let index = numbering(first_index + offset + 1);
        let title = if item.title.trim().is_empty() { labels.untitled } else { item.title.trim() };
        let title = match item.link.as_deref().filter(|l| !l.is_empty()) {
            Some(link) => format!(
                "<a href=\"{}\">{}</a>",
                encode_double_quoted_attribute(link),
                encode_text(title)
            ),
            None => encode_text(title).into_owned(),
        };
        lines.push(format!("{}. {} | <i>{}</i>", index, title, encode_text(&item.source)));
    }
    lines.join("\n")
}
