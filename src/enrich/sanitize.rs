use once_cell::sync::Lazy;
use regex::Regex;

static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("markup pattern"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([,;.:])").expect("punctuation pattern"));

static REPEATED_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([,;.])(?:\s*[,;.])+").expect("repeated punctuation pattern"));

// Packaging and multiplicity phrases across the supported locales (en, fr, es, it, de).
static QUANTITY_PHRASES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?:lot|set|pack|bundle|paquet|lote|packung)\s+(?:(?:of|de|du|des|di|da|von)\s+)?\d+(?:\s*(?:pieces?|pcs|units?|items?|pièces?|unités?|piezas?|pezzi|stück))?\b",
        r"(?i)\b\d+\s*(?:pieces?|pcs|units?|items?|pièces?|unités?|piezas?|pezzi|stück)\b",
        r"(?i)\b(?:quantity|quantité|cantidad|quantità|menge|qty)\s*:\s*\d+",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("quantity pattern"))
    .collect()
});

const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
];

/// Removes markup and quantity/packaging phrases so attribute extraction
/// describes a single unit.
pub fn sanitize_description(input: &str) -> String {
    let stripped = MARKUP.replace_all(input, " ");
    let mut text = stripped.into_owned();
    for (entity, replacement) in ENTITIES {
        if text.contains(entity) {
            text = text.replace(entity, replacement);
        }
    }
    let mut text = WHITESPACE.replace_all(&text, " ").into_owned();
    for pattern in QUANTITY_PHRASES.iter() {
        text = pattern.replace_all(&text, " ").into_owned();
    }
    let text = WHITESPACE.replace_all(&text, " ");
    let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1");
    let text = REPEATED_PUNCT.replace_all(&text, "$1");
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-' | '–'))
        .to_string()
}

/// Truncates to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_french_lot_phrase() {
        assert_eq!(
            sanitize_description("Lot de 3 coussins décoratifs, 45x45cm"),
            "coussins décoratifs, 45x45cm"
        );
    }

    #[test]
    fn strips_markup_and_collapses_whitespace() {
        let html = "<p>Soft   <strong>linen</strong>&nbsp;cover</p>\n\n<ul><li>Washable</li></ul>";
        assert_eq!(sanitize_description(html), "Soft linen cover Washable");
    }

    #[test]
    fn removes_english_quantity_forms() {
        assert_eq!(
            sanitize_description("Pack of 4 ceramic mugs. Quantity: 4. Includes 4 pieces"),
            "ceramic mugs. Includes"
        );
        assert_eq!(
            sanitize_description("Pack of 4 ceramic mugs, quantity: 4, includes 4 pieces"),
            "ceramic mugs, includes"
        );
        assert_eq!(
            sanitize_description("Set of 2 pieces walnut bookends"),
            "walnut bookends"
        );
    }

    #[test]
    fn keeps_dimensions_and_plain_numbers() {
        let text = "Table 120 x 60 cm, height: 75 cm";
        assert_eq!(sanitize_description(text), text);
    }

    #[test]
    fn does_not_match_inside_words() {
        assert_eq!(sanitize_description("Sunset 3 lamp"), "Sunset 3 lamp");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(sanitize_description("   "), "");
        assert_eq!(sanitize_description("<br/>"), "");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("décoratif", 3), "déc");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
