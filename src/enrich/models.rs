use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;

/// Upper bound on keywords kept from the text analysis, and on tags written back.
pub const MAX_KEYWORDS: usize = 15;

/// Product row as read from the catalog store.
///
/// The `ai_*` columns hold the values of a previous enrichment run; they act as
/// fallbacks when the current run cannot derive a value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogRecord {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default, rename = "ai_color")]
    pub stored_color: Option<String>,
    #[serde(default, rename = "ai_material")]
    pub stored_material: Option<String>,
    #[serde(default, rename = "ai_vision_analysis")]
    pub stored_vision_summary: Option<String>,
    #[serde(default)]
    pub enrichment_status: Option<String>,
}

impl CatalogRecord {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    pub fn product_type(&self) -> Option<&str> {
        non_blank(self.product_type.as_deref())
    }

    pub fn vendor(&self) -> Option<&str> {
        non_blank(self.vendor.as_deref())
    }
}

/// Image attached to a product, ordered by `position`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageRef {
    pub src: String,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionSource {
    Title,
    Description,
    AiInference,
}

impl DimensionSource {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "title" => Some(Self::Title),
            "description" => Some(Self::Description),
            "ai_inference" | "ai" | "inference" => Some(Self::AiInference),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::AiInference => "ai_inference",
        }
    }
}

/// Attributes recovered from the text-completion service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextAnalysis {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub functionality: Option<String>,
    pub characteristics: Option<String>,
    pub material: Option<String>,
    pub color: Option<String>,
    pub style: Option<String>,
    pub room: Option<String>,
    pub google_category: Option<String>,
    pub keywords: Vec<String>,
    pub dimensions: Option<String>,
    pub dimension_source: Option<DimensionSource>,
}

impl TextAnalysis {
    /// Stand-in used when the service fails or its answer cannot be parsed.
    pub fn minimal(product_type: Option<&str>) -> Self {
        Self {
            category: Some(
                non_blank(product_type)
                    .unwrap_or("uncategorized")
                    .to_string(),
            ),
            ..Self::default()
        }
    }

    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let dimensions = text_field(obj, &["dimensions", "dimension_text"]);
        let dimension_source = dimensions.as_ref().map(|_| {
            text_field(obj, &["dimension_source", "dimensions_source"])
                .and_then(|raw| DimensionSource::parse(&raw))
                .unwrap_or(DimensionSource::AiInference)
        });
        Self {
            category: text_field(obj, &["category"]),
            subcategory: text_field(obj, &["subcategory", "sub_category"]),
            functionality: text_field(obj, &["functionality"]),
            characteristics: text_field(obj, &["characteristics"]),
            material: text_field(obj, &["material"]),
            color: text_field(obj, &["color", "colour"]),
            style: text_field(obj, &["style"]),
            room: text_field(obj, &["room"]),
            google_category: text_field(obj, &["google_category", "taxonomy"]),
            keywords: keyword_field(obj),
            dimensions,
            dimension_source,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisionAnalysis {
    pub color: Option<String>,
    pub material: Option<String>,
    pub style: Option<String>,
    pub description: Option<String>,
}

impl VisionAnalysis {
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            color: text_field(obj, &["color", "colour"]),
            material: text_field(obj, &["material"]),
            style: text_field(obj, &["style"]),
            description: text_field(obj, &["description", "visual_description"]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeoContent {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Enriched,
    Preview,
}

/// The merged record. Serialized as-is into the partial update sent to the store.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentOutcome {
    pub category: String,
    pub subcategory: Option<String>,
    pub functionality: Option<String>,
    pub characteristics: Option<String>,
    pub style: String,
    pub room: Option<String>,
    pub brand: Option<String>,
    pub google_category: Option<String>,
    pub seo_title: String,
    pub seo_description: String,
    pub tags: String,
    #[serde(rename = "ai_vision_analysis")]
    pub vision_summary: String,
    #[serde(rename = "ai_color")]
    pub color: String,
    #[serde(rename = "ai_material")]
    pub material: String,
    pub dimensions_text: Option<String>,
    pub dimensions_source: Option<DimensionSource>,
    pub confidence_score: u8,
    pub enrichment_status: EnrichmentStatus,
    pub enriched_at: DateTime<Utc>,
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) => non_blank(Some(s)).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    })
}

fn keyword_field(obj: &Map<String, Value>) -> Vec<String> {
    let raw: Vec<String> = match obj.get("keywords").or_else(|| obj.get("tags")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s.split([',', ';']).map(str::to_string).collect(),
        _ => Vec::new(),
    };
    dedupe_keywords(raw)
}

/// Trims, drops blanks and case-insensitive duplicates, keeps the first
/// [`MAX_KEYWORDS`] in order of appearance.
pub fn dedupe_keywords<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for value in values {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
            continue;
        }
        out.push(trimmed.to_string());
        if out.len() == MAX_KEYWORDS {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn analysis_reads_all_fields() {
        let obj = object(json!({
            "category": "Décoration",
            "subcategory": "Coussins",
            "functionality": "Confort",
            "characteristics": ["doux", "lavable"],
            "material": "coton",
            "color": "gris",
            "style": "scandinave",
            "room": "salon",
            "google_category": "Home & Garden > Decor > Throw Pillows",
            "keywords": ["coussin", "Coussin", " déco ", ""],
            "dimensions": "45x45 cm",
            "dimension_source": "description"
        }));
        let analysis = TextAnalysis::from_object(&obj);
        assert_eq!(analysis.category.as_deref(), Some("Décoration"));
        assert_eq!(analysis.characteristics.as_deref(), Some("doux, lavable"));
        assert_eq!(analysis.keywords, vec!["coussin", "déco"]);
        assert_eq!(analysis.dimension_source, Some(DimensionSource::Description));
    }

    #[test]
    fn analysis_treats_blank_and_null_as_absent() {
        let obj = object(json!({"category": "  ", "material": null, "style": {"x": 1}}));
        let analysis = TextAnalysis::from_object(&obj);
        assert_eq!(analysis, TextAnalysis::default());
    }

    #[test]
    fn unknown_dimension_source_defaults_to_inference() {
        let obj = object(json!({"dimensions": "H 30 cm", "dimension_source": "guess"}));
        let analysis = TextAnalysis::from_object(&obj);
        assert_eq!(analysis.dimension_source, Some(DimensionSource::AiInference));
    }

    #[test]
    fn keywords_capped_and_accept_comma_string() {
        let many = (0..40).map(|i| format!("kw{i}")).collect::<Vec<_>>().join(",");
        let obj = object(json!({ "keywords": many }));
        let analysis = TextAnalysis::from_object(&obj);
        assert_eq!(analysis.keywords.len(), MAX_KEYWORDS);
        assert_eq!(analysis.keywords[0], "kw0");
    }

    #[test]
    fn minimal_uses_product_type_or_uncategorized() {
        assert_eq!(
            TextAnalysis::minimal(Some("Cushion")).category.as_deref(),
            Some("Cushion")
        );
        assert_eq!(
            TextAnalysis::minimal(Some("   ")).category.as_deref(),
            Some("uncategorized")
        );
        assert_eq!(
            TextAnalysis::minimal(None).category.as_deref(),
            Some("uncategorized")
        );
    }

    #[test]
    fn outcome_update_skips_absent_columns() {
        let outcome = EnrichmentOutcome {
            category: "Lamps".into(),
            subcategory: None,
            functionality: None,
            characteristics: None,
            style: String::new(),
            room: None,
            brand: Some("Acme".into()),
            google_category: None,
            seo_title: "t".into(),
            seo_description: "d".into(),
            tags: String::new(),
            vision_summary: String::new(),
            color: "charcoal".into(),
            material: String::new(),
            dimensions_text: None,
            dimensions_source: None,
            confidence_score: 42,
            enrichment_status: EnrichmentStatus::Enriched,
            enriched_at: Utc::now(),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert!(value.get("subcategory").is_none());
        assert_eq!(value["ai_color"], json!("charcoal"));
        assert_eq!(value["enrichment_status"], json!("enriched"));
        assert_eq!(value["ai_vision_analysis"], json!(""));
    }
}
