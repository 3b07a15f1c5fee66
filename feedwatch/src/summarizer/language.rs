use crate::config::FetchConfig;
use crate::types::{FeedwatchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use whatlang::Lang;

/// Dominant language of a text as an ISO 639-1 code where one exists.
/// Very short samples are not judged.
pub fn detect_language(text: &str) -> Option<String> {
    if text.trim().chars().count() < 12 {
        return None;
    }
    let info = whatlang::detect(text)?;
    let code = match info.lang() {
        Lang::Eng => "en",
        Lang::Pes => "fa",
        Lang::Ara => "ar",
        Lang::Urd => "ur",
        Lang::Deu => "de",
        Lang::Fra => "fr",
        Lang::Spa => "es",
        Lang::Ita => "it",
        Lang::Por => "pt",
        Lang::Nld => "nl",
        Lang::Rus => "ru",
        Lang::Ukr => "uk",
        Lang::Pol => "pl",
        Lang::Tur => "tr",
        Lang::Hin => "hi",
        Lang::Cmn => "zh",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        other => other.code(),
    };
    Some(code.to_string())
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String>;
}

/// Translation over the public Google Translate web endpoint.
pub struct GoogleTranslate {
    client: Client,
    endpoint: String,
}

impl GoogleTranslate {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            endpoint: "https://translate.googleapis.com/translate_a/single".to_string(),
        })
    }
}

#[async_trait]
impl Translator for GoogleTranslate {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("client", "gtx"), ("sl", "auto"), ("tl", target_lang), ("dt", "t"), ("q", text)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FeedwatchError::Status {
                status: response.status().as_u16(),
                url: self.endpoint.clone(),
            });
        }
        let body: Value = response.json().await?;
        let translated = parse_translation(&body);
        if translated.is_empty() {
            return Err(FeedwatchError::Parse("empty translation response".to_string()));
        }
        Ok(translated)
    }
}

/// The endpoint answers `[[["translated", "source", ...], ...], ...]`.
fn parse_translation(body: &Value) -> String {
    body.get(0)
        .and_then(Value::as_array)
        .map(|segments| {
            segments
                .iter()
                .filter_map(|segment| segment.get(0).and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_common_languages() {
        assert_eq!(
            detect_language("The central bank kept interest rates unchanged on Thursday, citing slowing inflation.").as_deref(),
            Some("en")
        );
        assert_eq!(
            detect_language("بانک مرکزی روز پنجشنبه نرخ بهره را بدون تغییر نگه داشت و به کاهش تورم اشاره کرد.").as_deref(),
            Some("fa")
        );
        assert_eq!(detect_language("ok"), None);
    }

    #[test]
    fn joins_translation_segments() {
        let body = json!([[["Hallo ", "Hello ", null], ["Welt", "world", null]], null, "en"]);
        assert_eq!(parse_translation(&body), "Hallo Welt");
        assert_eq!(parse_translation(&json!({})), "");
    }
}
