pub mod backend;
pub mod breaker;
pub mod credentials;
pub mod language;
pub mod normalize;

pub use backend::{GeminiBackend, LlmBackend};
pub use breaker::CircuitBreaker;
pub use credentials::CredentialPool;
pub use language::{detect_language, GoogleTranslate, Translator};

use crate::config::SummaryConfig;
use crate::locale::base_language;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Normalized summary of one article. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryResult {
    pub lead: String,
    pub key_points: Vec<String>,
    pub opportunities: Vec<String>,
    pub risks: Vec<String>,
    pub signal: String,
}

impl SummaryResult {
    /// Renderable only with a lead or at least one key point.
    pub fn is_empty(&self) -> bool {
        self.lead.trim().is_empty() && self.key_points.is_empty()
    }

    fn language_sample(&self) -> String {
        let mut sample = self.lead.clone();
        for point in &self.key_points {
            sample.push(' ');
            sample.push_str(point);
        }
        sample.chars().take(400).collect()
    }
}

/// Rungs of the attempt ladder, tried in order until one yields content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Strict,
    Relaxed,
    Freeform,
    LeadOnly,
    PointsOnly,
}

impl Attempt {
    pub const LADDER: [Attempt; 5] = [
        Attempt::Strict,
        Attempt::Relaxed,
        Attempt::Freeform,
        Attempt::LeadOnly,
        Attempt::PointsOnly,
    ];

    fn prompt(self, title: &str, text: &str, lang: &str, max_points: usize) -> String {
        let instructions = match self {
            Attempt::Strict => format!(
                "You are a news editor. Summarize the article in language '{lang}'. \
                 Respond with ONLY a JSON object, no markdown and no commentary, with exactly these keys: \
                 {{\"lead\": \"1-3 sentence summary\", \"key_points\": [\"up to {max_points} short factual points\"], \
                 \"opportunities\": [\"...\"], \"risks\": [\"...\"], \"signal\": \"one sentence takeaway\"}}. \
                 Use empty arrays for sections that do not apply."
            ),
            Attempt::Relaxed => format!(
                "Summarize the article in language '{lang}' as JSON. Use any of the keys lead, key_points, \
                 opportunities, risks, signal; partial answers are fine. \
                 (Please ensure at least 3 key points, at most {max_points}.)"
            ),
            Attempt::Freeform => format!(
                "Summarize the article in language '{lang}'. Start with one line 'Summary: ...' of 1-3 sentences, \
                 then list up to {max_points} key points, one per line, each starting with '- '."
            ),
            Attempt::LeadOnly => format!(
                "Write a 1-3 sentence summary of the article in language '{lang}'. Plain text only."
            ),
            Attempt::PointsOnly => format!(
                "List up to {max_points} key facts from the article in language '{lang}', \
                 one per line, each starting with '- '."
            ),
        };
        format!("{instructions}\n\nTitle: {title}\n\nArticle:\n{text}")
    }

    /// `None` when a structured attempt got a malformed response.
    fn interpret(self, raw: &str, max_points: usize) -> Option<SummaryResult> {
        match self {
            Attempt::Strict => normalize::parse_strict(raw, max_points),
            Attempt::Relaxed => normalize::parse_relaxed(raw, max_points),
            Attempt::Freeform => Some(normalize::salvage_freeform(raw, max_points)),
            Attempt::LeadOnly => Some(normalize::lead_only(raw)),
            Attempt::PointsOnly => Some(normalize::points_only(raw, max_points)),
        }
    }
}

/// Multi-attempt summarizer guarded by a circuit breaker and drawing credentials
/// round-robin. Constructed once and shared by every subscriber task.
pub struct SummarizationPipeline {
    backend: Arc<dyn LlmBackend>,
    translator: Option<Arc<dyn Translator>>,
    credentials: CredentialPool,
    breaker: CircuitBreaker,
    config: SummaryConfig,
}

impl SummarizationPipeline {
    pub fn new(backend: Arc<dyn LlmBackend>, translator: Option<Arc<dyn Translator>>, config: SummaryConfig) -> Self {
        let credentials = CredentialPool::new(config.credentials.clone());
        let breaker = CircuitBreaker::new(config.breaker_threshold, Duration::from_secs(config.breaker_cooldown_secs));
        info!(
            "Summarization pipeline using {} with {} credentials",
            backend.name(),
            credentials.len()
        );
        Self {
            backend,
            translator,
            credentials,
            breaker,
            config,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Summarize an article for a reader of `locale`. Returns the empty result when
    /// every attempt fails, the input is too thin, or the breaker is open.
    pub async fn summarize(&self, title: &str, text: &str, locale: &str) -> SummaryResult {
        let input: String = text.trim().chars().take(self.config.max_input_chars).collect();
        if input.chars().count() < self.config.min_input_chars {
            debug!("Input for {:?} too short to summarize ({} chars)", title, input.chars().count());
            return SummaryResult::default();
        }
        if self.credentials.is_empty() {
            debug!("No summarization credentials configured");
            return SummaryResult::default();
        }
        let lang = base_language(locale);
        let max_points = self.config.max_points;

        for attempt in Attempt::LADDER {
            if !self.breaker.try_acquire().await {
                debug!("Circuit breaker open, skipping summary of {:?}", title);
                return SummaryResult::default();
            }
            let Some(credential) = self.credentials.next() else {
                return SummaryResult::default();
            };

            let prompt = attempt.prompt(title, &input, &lang, max_points);
            match self.backend.generate(&prompt, credential).await {
                Ok(raw) => match attempt.interpret(&raw, max_points) {
                    Some(result) => {
                        self.breaker.record_success().await;
                        if !result.is_empty() {
                            debug!("{:?} attempt produced a summary for {:?}", attempt, title);
                            return self.enforce_language(result, &lang).await;
                        }
                    }
                    None => {
                        debug!("{:?} attempt returned malformed output for {:?}", attempt, title);
                        self.breaker.record_failure().await;
                    }
                },
                Err(e) => {
                    warn!("{:?} summary attempt failed for {:?}: {}", attempt, title, e);
                    self.breaker.record_failure().await;
                }
            }
        }
        SummaryResult::default()
    }

    /// Translate every field when strict mode is on or the detected language differs
    /// from the target. Fields whose translation fails are kept as they are.
    async fn enforce_language(&self, result: SummaryResult, target: &str) -> SummaryResult {
        let Some(translator) = &self.translator else {
            return result;
        };
        if target.is_empty() {
            return result;
        }
        let detected = detect_language(&result.language_sample());
        let mismatch = detected.as_deref().map(|d| d != target).unwrap_or(false);
        if !self.config.strict_language && !mismatch {
            return result;
        }
        debug!("Translating summary from {:?} to {}", detected, target);

        let translate = |text: String| {
            let translator = translator.clone();
            let target = target.to_string();
            async move {
                if text.trim().is_empty() {
                    return text;
                }
                match translator.translate(&text, &target).await {
                    Ok(translated) => translated,
                    Err(e) => {
                        warn!("Translation to {} failed: {}", target, e);
                        text
                    }
                }
            }
        };

        let SummaryResult {
            lead,
            key_points,
            opportunities,
            risks,
            signal,
        } = result;
        let (lead, signal) = futures::join!(translate(lead), translate(signal));
        let key_points = join_all(key_points.into_iter().map(&translate)).await;
        let opportunities = join_all(opportunities.into_iter().map(&translate)).await;
        let risks = join_all(risks.into_iter().map(&translate)).await;

        SummaryResult {
            lead,
            key_points,
            opportunities,
            risks,
            signal,
        }
    }
}
