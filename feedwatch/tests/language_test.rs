mod common;

use common::*;
use feedwatch::summarizer::Translator;
use feedwatch::{SummarizationPipeline, SummaryConfig, SummaryResult};
use std::sync::Arc;

const ARTICLE: &str = "The central bank kept its benchmark rate unchanged on Wednesday. Policymakers pointed \
     to cooling inflation and a softer labour market, and said future moves would depend on incoming data \
     over the next quarter.";

const REPLY: &str = r#"{"lead": "The central bank held interest rates steady as inflation continued to cool.",
  "key_points": ["Benchmark rate left unchanged", "Inflation continues to cool down"],
  "opportunities": ["Borrowing costs may ease later this year"],
  "risks": ["Labour market weakness could deepen"],
  "signal": "Watch the inflation data before the next meeting."}"#;

fn english() -> SummaryResult {
    SummaryResult {
        lead: "The central bank held interest rates steady as inflation continued to cool.".to_string(),
        key_points: vec![
            "Benchmark rate left unchanged".to_string(),
            "Inflation continues to cool down".to_string(),
        ],
        opportunities: vec!["Borrowing costs may ease later this year".to_string()],
        risks: vec!["Labour market weakness could deepen".to_string()],
        signal: "Watch the inflation data before the next meeting.".to_string(),
    }
}

fn tagged(result: &SummaryResult, lang: &str) -> SummaryResult {
    let tag = |text: &String| format!("[{}] {}", lang, text);
    SummaryResult {
        lead: tag(&result.lead),
        key_points: result.key_points.iter().map(tag).collect(),
        opportunities: result.opportunities.iter().map(tag).collect(),
        risks: result.risks.iter().map(tag).collect(),
        signal: tag(&result.signal),
    }
}

fn pipeline_with(strict_language: bool, translator: &Arc<RecordingTranslator>) -> SummarizationPipeline {
    init_tracing();
    let backend = ScriptedBackend::new();
    backend.respond("exactly these keys", REPLY);
    let translator: Arc<dyn Translator> = translator.clone();
    SummarizationPipeline::new(
        backend,
        Some(translator),
        SummaryConfig {
            strict_language,
            ..summary_config()
        },
    )
}

#[tokio::test]
async fn matching_language_is_left_alone_without_strict_mode() {
    let translator = RecordingTranslator::new();
    let pipeline = pipeline_with(false, &translator);

    let result = pipeline.summarize("Central bank holds rates", ARTICLE, "en-US").await;

    assert_eq!(result, english());
    assert!(translator.calls().is_empty());
}

#[tokio::test]
async fn other_languages_get_every_field_translated() {
    let translator = RecordingTranslator::new();
    let pipeline = pipeline_with(false, &translator);

    let result = pipeline.summarize("Central bank holds rates", ARTICLE, "fa").await;

    assert_eq!(result, tagged(&english(), "fa"));
    let calls = translator.calls();
    assert_eq!(calls.len(), 6);
    assert!(calls.iter().all(|(_, target)| target == "fa"));
}

#[tokio::test]
async fn strict_mode_translates_even_matching_text() {
    let translator = RecordingTranslator::new();
    let pipeline = pipeline_with(true, &translator);

    let result = pipeline.summarize("Central bank holds rates", ARTICLE, "en").await;

    assert_eq!(result, tagged(&english(), "en"));
    assert_eq!(translator.calls().len(), 6);
}

#[tokio::test]
async fn failed_translations_keep_the_original_fields() {
    let translator = RecordingTranslator::new();
    translator.set_failing(true);
    let pipeline = pipeline_with(true, &translator);

    let result = pipeline.summarize("Central bank holds rates", ARTICLE, "fa").await;

    assert_eq!(result, english());
    assert_eq!(translator.calls().len(), 6);
}
