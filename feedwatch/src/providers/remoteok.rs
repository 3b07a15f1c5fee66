use super::{Provider, ProviderContext, ProviderMessage, PROVIDER_ITEM_CAP};
use crate::locale::{base_language, format_date, persian_digits};
use crate::types::{FeedwatchError, Result, SubscriberId};
use crate::urls::site_host;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

static LISTING_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^/remote-([a-z0-9\-]+)-jobs$").unwrap());
static JOB_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^/remote-jobs/[a-z0-9\-]+-(\d+)$").unwrap());

const STOP_WORDS: &[&str] = &["and", "or", "the", "a", "an"];
const MAX_TAGS_SHOWN: usize = 5;

/// What a remoteok.com url asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOkTarget {
    Listing { tags: Vec<String> },
    Job { id: String },
}

pub fn parse_target(url: &str) -> Option<RemoteOkTarget> {
    if site_host(url).as_deref() != Some("remoteok.com") {
        return None;
    }
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path().trim_end_matches('/');
    if let Some(caps) = JOB_PATH.captures(path) {
        return Some(RemoteOkTarget::Job { id: caps[1].to_string() });
    }
    let caps = LISTING_PATH.captures(path)?;
    let tags = caps[1]
        .split('-')
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t))
        .map(|t| t.to_lowercase())
        .collect();
    Some(RemoteOkTarget::Listing { tags })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteJob {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub salary_min: Option<f64>,
    #[serde(default)]
    pub salary_max: Option<f64>,
    #[serde(default)]
    pub epoch: Option<i64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl RemoteJob {
    pub fn job_id(&self) -> Option<String> {
        let id = match &self.id {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!id.is_empty()).then_some(id)
    }

    fn posted_at(&self) -> Option<DateTime<Utc>> {
        self.date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc))
            .or_else(|| self.epoch.and_then(|e| DateTime::from_timestamp(e, 0)))
    }

    fn matches_tags(&self, wanted: &[String]) -> bool {
        if wanted.is_empty() {
            return true;
        }
        let haystack = format!(
            "{} {} {} {}",
            self.position.as_deref().unwrap_or(""),
            self.company.as_deref().unwrap_or(""),
            self.tags.join(" "),
            self.description.as_deref().unwrap_or("")
        )
        .to_lowercase();
        wanted.iter().all(|tag| haystack.contains(tag.as_str()))
    }
}

/// Jobs of the API response; the leading legal notice and malformed rows are skipped.
pub fn parse_jobs(body: &str) -> Result<Vec<RemoteJob>> {
    let rows: Vec<Value> = serde_json::from_str(body)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| serde_json::from_value::<RemoteJob>(row).ok())
        .filter(|job| job.job_id().is_some())
        .collect())
}

fn thousands(value: f64) -> String {
    let digits = (value.round() as i64).to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

struct Labels {
    position: &'static str,
    company: &'static str,
    location: &'static str,
    skills: &'static str,
    salary: &'static str,
    posted: &'static str,
    per_year: &'static str,
    unknown: &'static str,
    link: &'static str,
}

const EN: Labels = Labels {
    position: "Position",
    company: "Company",
    location: "Location",
    skills: "Skills",
    salary: "Salary",
    posted: "Posted",
    per_year: "per year",
    unknown: "Not specified",
    link: "View listing",
};

const FA: Labels = Labels {
    position: "موقعیت شغلی",
    company: "شرکت",
    location: "موقعیت مکانی",
    skills: "مهارت‌ها",
    salary: "حقوق",
    posted: "تاریخ انتشار",
    per_year: "در سال",
    unknown: "نامشخص",
    link: "لینک آگهی",
};

fn salary_line(job: &RemoteJob, labels: &Labels, persian: bool) -> String {
    let localize = |s: String| if persian { persian_digits(&s) } else { s };
    let positive = |v: Option<f64>| v.filter(|v| *v > 0.0);
    match (positive(job.salary_min), positive(job.salary_max)) {
        (Some(min), Some(max)) if max > min => localize(format!(
            "${} - ${} {}",
            thousands(min),
            thousands(max),
            labels.per_year
        )),
        (Some(one), _) | (None, Some(one)) => localize(format!("${} {}", thousands(one), labels.per_year)),
        (None, None) => labels.unknown.to_string(),
    }
}

fn format_job(job: &RemoteJob, locale: &str, now: DateTime<Utc>) -> String {
    let persian = base_language(locale) == "fa";
    let labels = if persian { &FA } else { &EN };
    let title = job.position.as_deref().filter(|t| !t.trim().is_empty()).unwrap_or("Job");
    let company = job.company.as_deref().filter(|c| !c.trim().is_empty()).unwrap_or("Unknown");
    let location = job.location.as_deref().filter(|l| !l.trim().is_empty()).unwrap_or("Remote");
    let posted = job.posted_at().unwrap_or(now);
    let tags = job.tags.iter().take(MAX_TAGS_SHOWN).cloned().collect::<Vec<_>>().join(", ");
    let tags = if tags.is_empty() { "-".to_string() } else { tags };

    let mut lines = vec![
        format!("<b>{}</b>", encode_text(title)),
        format!("<i>{} | {}</i>", encode_text(company), posted.format("%Y-%m-%d")),
        String::new(),
        format!("🔰 {}: {}", labels.position, encode_text(title)),
        format!("🏢 {}: {}", labels.company, encode_text(company)),
        format!("🌍 {}: {}", labels.location, encode_text(location)),
        format!("🏷️ {}: {}", labels.skills, encode_text(&tags)),
        format!("💰 {}: {}", labels.salary, salary_line(job, labels, persian)),
        format!("🗓 {}: {}", labels.posted, format_date(posted, locale)),
    ];
    if let Some(url) = job.url.as_deref().filter(|u| !u.is_empty()) {
        lines.push(String::new());
        lines.push(format!("🔗 <a href=\"{}\">{}</a>", encode_double_quoted_attribute(url), labels.link));
    }
    lines.join("\n")
}

/// Job listings from the remoteok.com JSON API, filtered by the tags in the url.
pub struct RemoteOkProvider {
    api_url: String,
}

impl Default for RemoteOkProvider {
    fn default() -> Self {
        Self {
            api_url: "https://remoteok.com/api".to_string(),
        }
    }
}

impl RemoteOkProvider {
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self { api_url: api_url.into() }
    }
}

#[async_trait]
impl Provider for RemoteOkProvider {
    fn name(&self) -> &'static str {
        "remoteok"
    }

    fn seen_prefix(&self) -> &'static str {
        "remoteok::"
    }

    fn matches(&self, url: &str) -> bool {
        parse_target(url).is_some()
    }

    async fn render(
        &self,
        ctx: ProviderContext<'_>,
        subscriber_id: SubscriberId,
        url: &str,
        locale: &str,
    ) -> Result<Option<ProviderMessage>> {
        let Some(target) = parse_target(url) else {
            return Ok(None);
        };
        let body = ctx.fetcher.fetch_text(&self.api_url).await.ok_or_else(|| FeedwatchError::Provider {
            provider: self.name().to_string(),
            message: format!("no response from {}", self.api_url),
        })?;
        let mut jobs = parse_jobs(&body)?;
        jobs.sort_by_key(|job| std::cmp::Reverse(job.epoch.unwrap_or(0)));

        let selected: Vec<RemoteJob> = match &target {
            RemoteOkTarget::Listing { tags } => jobs.into_iter().filter(|job| job.matches_tags(tags)).collect(),
            RemoteOkTarget::Job { id } => jobs.into_iter().filter(|job| job.job_id().as_deref() == Some(id.as_str())).collect(),
        };
        if selected.is_empty() {
            if let RemoteOkTarget::Job { id } = &target {
                warn!("RemoteOK job {} not found in the API listing", id);
            }
            return Ok(None);
        }

        let namespace = self.seen_namespace(url);
        let seen = ctx.store.get_seen(subscriber_id, &namespace).await?;
        let fresh: Vec<(String, &RemoteJob)> = selected
            .iter()
            .filter_map(|job| job.job_id().map(|id| (format!("remoteok:{}", id), job)))
            .filter(|(id, _)| !seen.contains(id))
            .take(PROVIDER_ITEM_CAP)
            .collect();
        if fresh.is_empty() {
            debug!("No new RemoteOK jobs for {} at {}", subscriber_id, url);
            return Ok(None);
        }

        let now = Utc::now();
        let text = fresh
            .iter()
            .map(|(_, job)| format_job(job, locale, now))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(Some(ProviderMessage {
            text,
            seen_namespace: namespace,
            item_ids: fresh.into_iter().map(|(id, _)| id).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const API: &str = r#"[
        {"legal": "API terms of service"},
        {"id": "1001", "epoch": 1710900000, "position": "Senior Rust Engineer", "company": "Ferrous",
         "tags": ["rust", "backend"], "location": "Worldwide", "salary_min": 120000, "salary_max": 160000,
         "url": "https://remoteok.com/remote-jobs/1001"},
        {"id": 1002, "epoch": 1710990000, "position": "Marketing Lead", "company": "Brandly",
         "tags": ["marketing"], "salary_min": 0, "salary_max": 0}
    ]"#;

    #[test]
    fn url_targets() {
        assert_eq!(
            parse_target("https://remoteok.com/remote-rust-and-backend-jobs"),
            Some(RemoteOkTarget::Listing {
                tags: vec!["rust".to_string(), "backend".to_string()]
            })
        );
        assert_eq!(
            parse_target("https://www.remoteok.com/remote-jobs/senior-rust-engineer-ferrous-1001"),
            Some(RemoteOkTarget::Job { id: "1001".to_string() })
        );
        assert_eq!(parse_target("https://remoteok.com/about"), None);
        assert_eq!(parse_target("https://example.com/remote-rust-jobs"), None);
    }

    #[test]
    fn parses_api_rows_and_filters_tags() {
        let jobs = parse_jobs(API).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].job_id().as_deref(), Some("1002"));
        let rust = vec!["rust".to_string()];
        assert!(jobs[0].matches_tags(&rust));
        assert!(!jobs[1].matches_tags(&rust));
    }

    #[test]
    fn job_card_is_localized() {
        let jobs = parse_jobs(API).unwrap();
        let now = Utc::now();
        let en = format_job(&jobs[0], "en", now);
        assert!(en.contains("💰 Salary: $120,000 - $160,000 per year"));
        assert!(en.contains("🗓 Posted: 2024-03-20"));
        let fa = format_job(&jobs[1], "fa", now);
        assert!(fa.contains("💰 حقوق: نامشخص"));
        assert!(fa.contains("🔰 موقعیت شغلی: Marketing Lead"));
    }

    #[test]
    fn thousands_separator() {
        assert_eq!(thousands(1234567.0), "1,234,567");
        assert_eq!(thousands(999.0), "999");
    }
}
