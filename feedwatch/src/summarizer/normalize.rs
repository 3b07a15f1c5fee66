//! Turns every backend response shape into one `SummaryResult`.

use super::SummaryResult;
use crate::html::collapse_whitespace;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

/// List items shorter than this are dropped.
pub const MIN_POINT_CHARS: usize = 8;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*```[a-zA-Z]*\s*$").unwrap());

static BULLET_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s•·\-–—\*\+▪◦●]+").unwrap());

static NUMBER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(?\d{1,2}[\.\)]\s+").unwrap());

static BULLET_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([•·\-–—\*\+▪◦●]|\(?\d{1,2}[\.\)])\s+").unwrap());

static LEAD_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:#+\s*)?(?:\*\*)?(?:summary|tl;?dr|lead|overview|خلاصه)(?:\*\*)?\s*[:：]\s*(?:\*\*)?\s*(.+)$").unwrap()
});

static SECTION_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:#+\s*)?(?:\*\*)?(key points|points|highlights|bullets|opportunities|risks|signal|takeaway)(?:\*\*)?\s*(?:[:：]\s*(?:\*\*)?\s*(.*))?$",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Points,
    Opportunities,
    Risks,
    Signal,
}

pub fn strip_code_fences(raw: &str) -> String {
    CODE_FENCE.replace_all(raw, "").trim().to_string()
}

pub fn strip_bullet(line: &str) -> String {
    let without_bullet = BULLET_PREFIX.replace(line, "");
    let without_number = NUMBER_PREFIX.replace(&without_bullet, "");
    collapse_whitespace(without_number.trim_matches('*'))
}

/// Strip markers, drop short items, dedupe case-insensitively, cap the count.
pub fn clean_list<I>(items: I, cap: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if out.len() >= cap {
            break;
        }
        let cleaned = strip_bullet(&item);
        if cleaned.chars().count() < MIN_POINT_CHARS {
            continue;
        }
        if seen.insert(cleaned.to_lowercase()) {
            out.push(cleaned);
        }
    }
    out
}

pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        current.push(c);
        if matches!(c, '.' | '!' | '?' | '؟' | '。') {
            let at_break = chars.get(i + 1).map(|n| n.is_whitespace()).unwrap_or(true);
            if at_break {
                let sentence = collapse_whitespace(&current);
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                current.clear();
            }
        }
    }
    let rest = collapse_whitespace(&current);
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

pub fn cap_sentences(text: &str, max: usize) -> String {
    split_sentences(text).into_iter().take(max).collect::<Vec<_>>().join(" ")
}

fn finish(lead: String, points: Vec<String>, opportunities: Vec<String>, risks: Vec<String>, signal: String, cap: usize) -> SummaryResult {
    SummaryResult {
        lead: cap_sentences(&strip_bullet(&lead), 3),
        key_points: clean_list(points, cap),
        opportunities: clean_list(opportunities, cap),
        risks: clean_list(risks, cap),
        signal: cap_sentences(&strip_bullet(&signal), 1),
    }
}

#[derive(Debug, Deserialize)]
struct StrictSummary {
    #[serde(default)]
    lead: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    opportunities: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
    #[serde(default)]
    signal: String,
}

/// Exact schema only. `None` means the response was malformed.
pub fn parse_strict(raw: &str, cap: usize) -> Option<SummaryResult> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Some(SummaryResult::default());
    }
    let parsed: StrictSummary = serde_json::from_str(&body).ok()?;
    Some(finish(parsed.lead, parsed.key_points, parsed.opportunities, parsed.risks, parsed.signal, cap))
}

/// First JSON object found in the response, accepting common key aliases and
/// string-or-array sections. `None` means no usable object was found.
pub fn parse_relaxed(raw: &str, cap: usize) -> Option<SummaryResult> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Some(SummaryResult::default());
    }
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: Value = serde_json::from_str(&body[start..=end]).ok()?;
    if !value.is_object() {
        return None;
    }
    Some(finish(
        text_field(&value, &["lead", "tldr", "tl_dr", "summary"]),
        list_field(&value, &["key_points", "bullets", "points", "highlights"]),
        list_field(&value, &["opportunities"]),
        list_field(&value, &["risks"]),
        text_field(&value, &["signal", "takeaway"]),
        cap,
    ))
}

fn text_field(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .map(|field| match field {
            Value::String(s) => s.trim().to_string(),
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(" "),
            _ => String::new(),
        })
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn list_field(value: &Value, keys: &[&str]) -> Vec<String> {
    for key in keys {
        let items: Vec<String> = match value.get(*key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(_) => item.get("text").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) => s.lines().map(str::to_string).collect(),
            _ => Vec::new(),
        };
        if !items.is_empty() {
            return items;
        }
    }
    Vec::new()
}

/// Heuristic extraction from prose: the first labeled line is the lead, bulleted or
/// numbered lines are points, section headings route bullets to their list.
pub fn salvage_freeform(raw: &str, cap: usize) -> SummaryResult {
    let body = strip_code_fences(raw);
    let mut lead = String::new();
    let mut first_plain: Option<String> = None;
    let mut section = Section::Points;
    let mut points = Vec::new();
    let mut opportunities = Vec::new();
    let mut risks = Vec::new();
    let mut signal = String::new();

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(caps) = LEAD_LABEL.captures(trimmed) {
            if lead.is_empty() {
                lead = caps[1].trim().to_string();
            }
            continue;
        }
        if let Some(caps) = SECTION_LABEL.captures(trimmed) {
            section = match caps[1].to_lowercase().as_str() {
                "opportunities" => Section::Opportunities,
                "risks" => Section::Risks,
                "signal" | "takeaway" => Section::Signal,
                _ => Section::Points,
            };
            if let Some(rest) = caps.get(2).map(|m| m.as_str().trim()).filter(|r| !r.is_empty()) {
                match section {
                    Section::Signal => signal = rest.to_string(),
                    Section::Opportunities => opportunities.push(rest.to_string()),
                    Section::Risks => risks.push(rest.to_string()),
                    Section::Points => points.push(rest.to_string()),
                }
            }
            continue;
        }
        if BULLET_LINE.is_match(trimmed) {
            let item = trimmed.to_string();
            match section {
                Section::Points => points.push(item),
                Section::Opportunities => opportunities.push(item),
                Section::Risks => risks.push(item),
                Section::Signal if signal.is_empty() => signal = item,
                Section::Signal => {}
            }
            continue;
        }
        if section == Section::Signal && signal.is_empty() {
            signal = trimmed.to_string();
            continue;
        }
        if first_plain.is_none() {
            first_plain = Some(trimmed.to_string());
        }
    }

    if lead.is_empty() {
        lead = first_plain.unwrap_or_default();
    }
    finish(lead, points, opportunities, risks, signal, cap)
}

pub fn lead_only(raw: &str) -> SummaryResult {
    let body = strip_code_fences(raw);
    let text = match LEAD_LABEL.captures(body.trim()) {
        Some(caps) => caps[1].to_string(),
        None => body.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" "),
    };
    SummaryResult {
        lead: cap_sentences(&strip_bullet(&text), 3),
        ..Default::default()
    }
}

pub fn points_only(raw: &str, cap: usize) -> SummaryResult {
    let body = strip_code_fences(raw);
    let lines: Vec<&str> = body.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let bulleted: Vec<String> = lines.iter().filter(|l| BULLET_LINE.is_match(l)).map(|l| l.to_string()).collect();
    let items = if bulleted.is_empty() {
        lines.iter().map(|l| l.to_string()).collect()
    } else {
        bulleted
    };
    SummaryResult {
        key_points: clean_list(items, cap),
        ..Default::default()
    }
}
