use crate::enrich::models::{ImageRef, VisionAnalysis};
use crate::enrich::recover::recover_object;
use crate::llm::{ChatCompletion, ChatMessage, ChatRequest};
use serde::Serialize;

/// Images sent to the vision service per product.
pub const MAX_VISION_IMAGES: usize = 2;
const MAX_TOKENS: u32 = 150;
const TEMPERATURE: f32 = 0.2;

// Only visually observable attributes: the answer must never name what the
// object is, how many there are, or how it is packaged.
const VISION_PROMPT: &str = r#"Look at the product photos and report only what is visually observable.
Do NOT name the type of object. Do NOT mention quantity, number of items, sets, lots or packaging.
Respond with a single JSON object and nothing else:
{"color": "dominant color", "material": "visible material", "style": "visual style", "description": "one short sentence about appearance"}"#;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VisionOutcome {
    Skipped { reason: &'static str },
    Analyzed { analysis: VisionAnalysis },
    Degraded { reason: String },
}

impl VisionOutcome {
    pub fn into_analysis(self) -> VisionAnalysis {
        match self {
            VisionOutcome::Analyzed { analysis } => analysis,
            VisionOutcome::Skipped { .. } | VisionOutcome::Degraded { .. } => {
                VisionAnalysis::default()
            }
        }
    }
}

/// Best-effort visual attribute extraction over the first images.
pub async fn analyze_images(
    llm: Option<&dyn ChatCompletion>,
    model: &str,
    images: &[ImageRef],
) -> VisionOutcome {
    let Some(llm) = llm else {
        return VisionOutcome::Skipped {
            reason: "vision_not_configured",
        };
    };
    let urls: Vec<&str> = images
        .iter()
        .map(|image| image.src.trim())
        .filter(|src| !src.is_empty())
        .take(MAX_VISION_IMAGES)
        .collect();
    if urls.is_empty() {
        return VisionOutcome::Skipped { reason: "no_images" };
    }

    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user_with_images(VISION_PROMPT, urls)],
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
    };

    match llm.complete(&request).await {
        Ok(text) => match recover_object(&text).map(|object| VisionAnalysis::from_object(&object)) {
            Some(analysis) if !analysis.is_empty() => VisionOutcome::Analyzed { analysis },
            Some(_) => VisionOutcome::Degraded {
                reason: "no_attributes".into(),
            },
            None => VisionOutcome::Degraded {
                reason: "unparseable_response".into(),
            },
        },
        Err(err) => VisionOutcome::Degraded {
            reason: err.to_string(),
        },
    }
}
