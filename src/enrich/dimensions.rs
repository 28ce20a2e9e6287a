use crate::enrich::models::DimensionSource;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

const NUMBER: &str = r"\d+(?:[.,]\d+)?";
// Longer alternatives first: the regex engine takes the leftmost alternative that matches.
const UNIT: &str = r"(?:inches|cm|mm|in|m)\b";
const LABELS: &str =
    r"(?:height|width|length|depth|diameter|hauteur|largeur|longueur|profondeur|diamètre)";

static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"{NUMBER}\s*[x×]\s*{NUMBER}(?:\s*[x×]\s*{NUMBER})?\s*{UNIT}"),
        format!(r"{LABELS}\s*:\s*{NUMBER}\s*{UNIT}"),
        format!(r"ø\s*:?\s*{NUMBER}\s*{UNIT}"),
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("dimension pattern"))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionMatch {
    pub text: String,
    pub source: DimensionSource,
}

/// Pulls physical dimensions out of the title and sanitized description.
///
/// Each text is scanned on its own, so a number ending the title never pairs
/// with a unit opening the description. Matches are collected title first,
/// in pattern order, then deduplicated and joined with `", "`. The source is
/// `title` when the first match came from the title.
pub fn extract_dimensions(title: &str, description: &str) -> Option<DimensionMatch> {
    let title_hits = matches_in(&title.to_lowercase());
    let source = if title_hits.is_empty() {
        DimensionSource::Description
    } else {
        DimensionSource::Title
    };

    let mut found: Vec<String> = Vec::new();
    for text in title_hits
        .into_iter()
        .chain(matches_in(&description.to_lowercase()))
    {
        if !found.contains(&text) {
            found.push(text);
        }
    }

    if found.is_empty() {
        return None;
    }
    Some(DimensionMatch {
        text: found.join(", "),
        source,
    })
}

fn matches_in(text: &str) -> Vec<String> {
    PATTERNS
        .iter()
        .flat_map(|pattern| pattern.find_iter(text))
        .map(|hit| hit.as_str().trim().to_string())
        .collect()
}
