use serde_json::{Map, Value};
use std::borrow::Cow;
use tracing::trace;

/// Ways of locating a JSON object inside a model answer, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    JsonFence,
    AnyFence,
    BraceSpan,
    StripControl,
}

const STRATEGIES: [Strategy; 5] = [
    Strategy::Direct,
    Strategy::JsonFence,
    Strategy::AnyFence,
    Strategy::BraceSpan,
    Strategy::StripControl,
];

#[derive(Debug)]
enum Attempt {
    Recovered(Map<String, Value>),
    NoCandidate,
    NotAnObject,
    Invalid(serde_json::Error),
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::JsonFence => "json_fence",
            Strategy::AnyFence => "any_fence",
            Strategy::BraceSpan => "brace_span",
            Strategy::StripControl => "strip_control",
        }
    }

    fn candidate(self, raw: &str) -> Option<Cow<'_, str>> {
        match self {
            Strategy::Direct => Some(Cow::Borrowed(raw.trim())),
            Strategy::JsonFence => fenced_block(raw, "```json").map(Cow::Borrowed),
            Strategy::AnyFence => fenced_block(raw, "```").map(Cow::Borrowed),
            Strategy::BraceSpan => balanced_object(raw).map(Cow::Borrowed),
            Strategy::StripControl => Some(Cow::Owned(strip_control(raw))),
        }
    }

    fn attempt(self, raw: &str) -> Attempt {
        let Some(candidate) = self.candidate(raw) else {
            return Attempt::NoCandidate;
        };
        match serde_json::from_str::<Value>(candidate.trim()) {
            Ok(Value::Object(map)) => Attempt::Recovered(map),
            Ok(_) => Attempt::NotAnObject,
            Err(err) => Attempt::Invalid(err),
        }
    }
}

/// Recovers a JSON object from an unreliable model answer.
///
/// Returns `None` when no strategy yields an object; callers treat that as
/// "fields absent".
pub fn recover_object(raw: &str) -> Option<Map<String, Value>> {
    recover_with_strategy(raw).map(|(_, object)| object)
}

pub fn recover_with_strategy(raw: &str) -> Option<(Strategy, Map<String, Value>)> {
    if raw.trim().is_empty() {
        return None;
    }
    STRATEGIES.iter().find_map(|strategy| match strategy.attempt(raw) {
        Attempt::Recovered(object) => Some((*strategy, object)),
        Attempt::Invalid(err) => {
            trace!(target = "enrich.recover", strategy = strategy.as_str(), error = %err, "json_strategy_invalid");
            None
        }
        miss => {
            trace!(target = "enrich.recover", strategy = strategy.as_str(), outcome = ?miss, "json_strategy_missed");
            None
        }
    })
}

fn fenced_block<'a>(raw: &'a str, opener: &str) -> Option<&'a str> {
    let start = raw.find(opener)? + opener.len();
    let rest = &raw[start..];
    let end = rest.find("```")?;
    // Drop an info string such as `json` or `JSON` left after a bare opener.
    let body = rest[..end].trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    Some(body.trim())
}

/// First `{...}` span whose braces balance, ignoring braces inside strings.
fn balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_control(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(*c, '\u{0}'..='\u{1f}' | '\u{7f}'..='\u{9f}'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_object() {
        let (strategy, obj) = recover_with_strategy(r#" {"category": "Lamps"} "#).unwrap();
        assert_eq!(strategy, Strategy::Direct);
        assert_eq!(obj["category"], "Lamps");
    }

    #[test]
    fn recovers_json_fence() {
        let raw = "Here you go:\n```json\n{\"category\": \"Cushions\"}\n```\nAnything else?";
        let (strategy, obj) = recover_with_strategy(raw).unwrap();
        assert_eq!(strategy, Strategy::JsonFence);
        assert_eq!(obj["category"], "Cushions");
    }

    #[test]
    fn recovers_bare_fence() {
        let raw = "```\n{\"color\": \"sage\"}\n```";
        let (strategy, obj) = recover_with_strategy(raw).unwrap();
        assert_eq!(strategy, Strategy::AnyFence);
        assert_eq!(obj["color"], "sage");
    }

    #[test]
    fn bare_fence_with_uppercase_tag() {
        let raw = "```JSON\n{\"color\": \"sage\"}\n```";
        assert_eq!(recover_object(raw).unwrap()["color"], "sage");
    }

    #[test]
    fn recovers_object_inside_prose() {
        let raw = r#"Sure! The product is {"category": "Rugs", "meta": {"note": "a } in text"}} hope it helps {"ignored": true}"#;
        let (strategy, obj) = recover_with_strategy(raw).unwrap();
        assert_eq!(strategy, Strategy::BraceSpan);
        assert_eq!(obj["category"], "Rugs");
        assert_eq!(obj["meta"]["note"], "a } in text");
        assert!(obj.get("ignored").is_none());
    }

    #[test]
    fn strips_control_characters_as_last_resort() {
        let raw = "{\"description\": \"soft\u{1}linen\u{85}\"}";
        let (strategy, obj) = recover_with_strategy(raw).unwrap();
        assert_eq!(strategy, Strategy::StripControl);
        assert_eq!(obj["description"], "softlinen");
    }

    #[test]
    fn empty_and_whitespace_yield_none() {
        assert!(recover_object("").is_none());
        assert!(recover_object(" \n\t ").is_none());
    }

    #[test]
    fn non_objects_and_garbage_yield_none() {
        assert!(recover_object("[1, 2, 3]").is_none());
        assert!(recover_object("no json here").is_none());
        assert!(recover_object("{\"unterminated\": ").is_none());
    }
}
