use crate::enrich::dimensions::DimensionMatch;
use crate::enrich::models::{
    CatalogRecord, DimensionSource, EnrichmentOutcome, EnrichmentStatus, SeoContent, TextAnalysis,
    VisionAnalysis, dedupe_keywords, non_blank,
};
use chrono::{DateTime, Utc};

pub struct MergeInputs<'a> {
    pub record: &'a CatalogRecord,
    pub analysis: &'a TextAnalysis,
    pub vision: &'a VisionAnalysis,
    pub seo: &'a SeoContent,
    pub regex_dimensions: Option<&'a DimensionMatch>,
}

/// First non-blank candidate, in precedence order, or an empty string.
pub fn first_present<'a, I>(candidates: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .find_map(non_blank)
        .unwrap_or_default()
        .to_string()
}

/// AI-supplied dimensions win; the regex match only fills the gap.
pub fn resolve_dimensions(
    analysis: &TextAnalysis,
    regex_dimensions: Option<&DimensionMatch>,
) -> Option<(String, DimensionSource)> {
    if let Some(text) = non_blank(analysis.dimensions.as_deref()) {
        let source = analysis
            .dimension_source
            .unwrap_or(DimensionSource::AiInference);
        return Some((text.to_string(), source));
    }
    regex_dimensions.map(|found| (found.text.clone(), found.source))
}

/// Combines every source field by field. The confidence score is filled in
/// by the caller once the merged record is known.
pub fn merge(
    inputs: &MergeInputs<'_>,
    status: EnrichmentStatus,
    now: DateTime<Utc>,
) -> EnrichmentOutcome {
    let MergeInputs {
        record,
        analysis,
        vision,
        seo,
        regex_dimensions,
    } = inputs;

    let dimensions = resolve_dimensions(analysis, *regex_dimensions);
    let tags = dedupe_keywords(&analysis.keywords).join(", ");

    EnrichmentOutcome {
        category: first_present([
            analysis.category.as_deref(),
            record.product_type(),
            Some("uncategorized"),
        ]),
        subcategory: analysis.subcategory.clone(),
        functionality: analysis.functionality.clone(),
        characteristics: analysis.characteristics.clone(),
        style: first_present([vision.style.as_deref(), analysis.style.as_deref()]),
        room: analysis.room.clone(),
        brand: record.vendor().map(str::to_string),
        google_category: analysis.google_category.clone(),
        seo_title: seo.title.clone(),
        seo_description: seo.description.clone(),
        tags,
        vision_summary: first_present([
            vision.description.as_deref(),
            record.stored_vision_summary.as_deref(),
        ]),
        color: first_present([
            vision.color.as_deref(),
            analysis.color.as_deref(),
            record.stored_color.as_deref(),
        ]),
        material: first_present([
            vision.material.as_deref(),
            analysis.material.as_deref(),
            record.stored_material.as_deref(),
        ]),
        dimensions_source: dimensions.as_ref().map(|(_, source)| *source),
        dimensions_text: dimensions.map(|(text, _)| text),
        confidence_score: 0,
        enrichment_status: status,
        enriched_at: now,
    }
}
