use crate::enrich::models::SeoContent;
use crate::enrich::recover::recover_object;
use crate::enrich::sanitize::truncate_chars;
use crate::llm::{ChatCompletion, ChatMessage, ChatRequest};
use serde_json::Value;

pub const TITLE_MAX: usize = 60;
pub const DESCRIPTION_MAX: usize = 155;
const MAX_TOKENS: u32 = 200;
const TEMPERATURE: f32 = 0.7;

const SYSTEM_PROMPT: &str = r#"You write SEO metadata for a single product.
Rules:
- title: 50 to 60 characters, must not repeat the original title word for word
- description: 140 to 155 characters
- never mention quantity, lots, sets or packaging
Respond with a single JSON object and nothing else: {"title": "...", "description": "..."}"#;

/// Owned so the generator can run on its own task.
#[derive(Debug, Clone)]
pub struct SeoRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub material: Option<String>,
    pub style: Option<String>,
    pub vendor: Option<String>,
}

impl SeoRequest {
    /// Original title and clipped description, used when generation fails.
    pub fn fallback(&self) -> SeoContent {
        SeoContent {
            title: self.title.clone(),
            description: truncate_chars(&self.description, DESCRIPTION_MAX),
        }
    }

    fn prompt(&self) -> String {
        let mut lines = vec![
            format!("Original title: {}", self.title),
            format!("Category: {}", self.category),
        ];
        if let Some(material) = &self.material {
            lines.push(format!("Material: {material}"));
        }
        if let Some(style) = &self.style {
            lines.push(format!("Style: {style}"));
        }
        if let Some(vendor) = &self.vendor {
            lines.push(format!("Brand: {vendor}"));
        }
        lines.push(format!(
            "Description: {}",
            truncate_chars(&self.description, 500)
        ));
        lines.join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct SeoOutcome {
    pub content: SeoContent,
    pub generated: bool,
}

pub async fn generate(llm: &dyn ChatCompletion, model: &str, request: &SeoRequest) -> SeoOutcome {
    let fallback = request.fallback();
    let chat = ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(request.prompt()),
        ],
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
    };

    let Ok(text) = llm.complete(&chat).await else {
        return SeoOutcome {
            content: fallback,
            generated: false,
        };
    };
    let Some(object) = recover_object(&text) else {
        return SeoOutcome {
            content: fallback,
            generated: false,
        };
    };

    let field = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    let title = field("title").map(|t| truncate_chars(t, TITLE_MAX));
    let description = field("description").map(|d| truncate_chars(d, DESCRIPTION_MAX));
    let generated = title.is_some() || description.is_some();
    SeoOutcome {
        content: SeoContent {
            title: title.unwrap_or(fallback.title),
            description: description.unwrap_or(fallback.description),
        },
        generated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::testing::ScriptedChat;

    fn request() -> SeoRequest {
        SeoRequest {
            title: "Lot de 3 coussins velours".into(),
            description: "x".repeat(300),
            category: "Décoration".into(),
            material: Some("velours".into()),
            style: None,
            vendor: Some("Maison".into()),
        }
    }

    #[tokio::test]
    async fn uses_generated_pair_and_clips_lengths() {
        let long_title = "T".repeat(80);
        let llm = ScriptedChat::new([Ok(format!(
            r#"{{"title": "{long_title}", "description": "Soft velvet cushion cover."}}"#
        ))]);
        let out = generate(&llm, "m", &request()).await;
        assert!(out.generated);
        assert_eq!(out.content.title.chars().count(), TITLE_MAX);
        assert_eq!(out.content.description, "Soft velvet cushion cover.");

        let prompt = llm.requests()[0].messages[1].text();
        assert!(prompt.contains("Material: velours"));
        assert!(!prompt.contains("Style:"));
        assert_eq!(llm.requests()[0].max_tokens, MAX_TOKENS);
    }

    #[tokio::test]
    async fn failure_falls_back_to_original_title() {
        let llm = ScriptedChat::new([Err(LlmError::Transport("dns".into()))]);
        let out = generate(&llm, "m", &request()).await;
        assert!(!out.generated);
        assert_eq!(out.content.title, "Lot de 3 coussins velours");
        assert_eq!(out.content.description.chars().count(), DESCRIPTION_MAX);
    }

    #[tokio::test]
    async fn partial_answer_fills_missing_field() {
        let llm = ScriptedChat::new([Ok(r#"{"title": "Velvet cushion, sage green"}"#.to_string())]);
        let out = generate(&llm, "m", &request()).await;
        assert!(out.generated);
        assert_eq!(out.content.title, "Velvet cushion, sage green");
        assert_eq!(out.content.description, "x".repeat(DESCRIPTION_MAX));
    }
}
