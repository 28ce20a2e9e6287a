use crate::enrich::models::TextAnalysis;
use crate::enrich::recover::recover_with_strategy;
use crate::enrich::sanitize::truncate_chars;
use crate::llm::{ChatCompletion, ChatMessage, ChatRequest};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const DESCRIPTION_LIMIT: usize = 1000;
const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.3;

const SYSTEM_PROMPT: &str = r#"You are a product data analyst for a home and lifestyle catalog.
Describe ONE unit of the product, never a bundle: ignore any quantity, lot or packaging wording.
Respond with a single JSON object and nothing else, using these keys (omit a key when unknown):
{
  "category": "main category",
  "subcategory": "more specific category",
  "functionality": "what the product is used for",
  "characteristics": "notable features",
  "material": "main material",
  "color": "main color",
  "style": "design style",
  "room": "room where it is typically used",
  "google_category": "Google product taxonomy path",
  "keywords": ["up to 15 search keywords"],
  "dimensions": "physical dimensions with units",
  "dimension_source": "title | description | ai_inference"
}"#;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    /// Linear backoff: one unit per attempt already made.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub product_type: Option<&'a str>,
    pub vendor: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis: TextAnalysis,
    /// `true` when `analysis` is the minimal stand-in rather than a parsed answer.
    pub degraded: bool,
    pub attempts: u32,
}

pub fn build_prompt(input: &AnalysisInput<'_>) -> String {
    format!(
        "Title: {title}\nDescription: {description}\nProduct type: {product_type}\nVendor: {vendor}",
        title = input.title,
        description = truncate_chars(input.description, DESCRIPTION_LIMIT),
        product_type = input.product_type.unwrap_or("unknown"),
        vendor = input.vendor.unwrap_or("unknown"),
    )
}

/// Category and attribute extraction. Never fails: exhausted retries or an
/// unparseable answer fall back to [`TextAnalysis::minimal`].
pub async fn analyze(
    llm: &dyn ChatCompletion,
    model: &str,
    input: &AnalysisInput<'_>,
    retry: RetryPolicy,
) -> AnalysisOutcome {
    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(input)),
        ],
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
    };

    let mut attempts = 0;
    let answer = loop {
        attempts += 1;
        match llm.complete(&request).await {
            Ok(text) => break Some(text),
            Err(err) if err.is_transient() && attempts < retry.max_attempts => {
                let delay = retry.delay_after(attempts);
                warn!(
                    target = "enrich.analysis",
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "text_analysis_retry"
                );
                sleep(delay).await;
            }
            Err(err) => {
                warn!(target = "enrich.analysis", attempt = attempts, error = %err, "text_analysis_failed");
                break None;
            }
        }
    };

    match answer.as_deref().and_then(recover_with_strategy) {
        Some((strategy, object)) => {
            debug!(target = "enrich.analysis", strategy = strategy.as_str(), "text_analysis_parsed");
            AnalysisOutcome {
                analysis: TextAnalysis::from_object(&object),
                degraded: false,
                attempts,
            }
        }
        None => {
            if answer.is_some() {
                warn!(target = "enrich.analysis", "text_analysis_unparseable");
            }
            AnalysisOutcome {
                analysis: TextAnalysis::minimal(input.product_type),
                degraded: true,
                attempts,
            }
        }
    }
}
