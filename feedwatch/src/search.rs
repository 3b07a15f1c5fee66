use crate::types::Result;
use async_trait::async_trait;
use interfaces::defs::{SearchCapability, SearchHit};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

#[derive(Serialize)]
struct SerperQuery<'a> {
    q: &'a str,
    num: usize,
    hl: &'a str,
    gl: &'a str,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Web search through the Serper Google Search API.
pub struct SerperSearch {
    client: Client,
    api_key: String,
    endpoint: String,
    language: String,
    country: String,
}

impl SerperSearch {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: SERPER_ENDPOINT.to_string(),
            language: "en".to_string(),
            country: "us".to_string(),
        })
    }

    pub fn with_region(mut self, language: impl Into<String>, country: impl Into<String>) -> Self {
        self.language = language.into();
        self.country = country.into();
        self
    }

    async fn search(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        let body = SerperQuery {
            q: text,
            num: k,
            hl: &self.language,
            gl: &self.country,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: SerperResponse = response.json().await?;
        Ok(organic_hits(parsed, k))
    }
}

fn organic_hits(response: SerperResponse, k: usize) -> Vec<SearchHit> {
    response
        .organic
        .into_iter()
        .filter(|hit| !hit.link.trim().is_empty())
        .take(k)
        .map(|hit| SearchHit {
            title: hit.title,
            link: hit.link,
            snippet: hit.snippet,
        })
        .collect()
}

#[async_trait]
impl SearchCapability for SerperSearch {
    async fn query(&self, text: &str, k: usize) -> Vec<SearchHit> {
        if text.trim().is_empty() || k == 0 {
            return Vec::new();
        }
        match self.search(text, k).await {
            Ok(hits) => {
                debug!("Search for {:?} returned {} hits", text, hits.len());
                hits
            }
            Err(e) => {
                warn!("Search for {:?} failed: {}", text, e);
                Vec::new()
            }
        }
    }
}
