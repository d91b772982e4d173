//! JSON extraction from free-form LLM output.
//!
//! Models asked for JSON still wrap it in markdown fences, prepend prose, or
//! run out of tokens mid-object. [`extract_json_object`] finds the payload
//! object and distinguishes "truncated" from "absent" so the caller can word
//! its re-prompt accordingly.
//!
//! Strategies, in order:
//! 1. ```` ```json ```` fenced block
//! 2. any fenced block containing an object
//! 3. the largest balanced object in the text, later ones winning ties

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Error type for JSON extraction failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces, {unclosed_brackets} unclosed brackets")]
    Truncated {
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    #[error("No JSON object found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"```([A-Za-z]*)\s*\n?([\s\S]*?)\n?```").expect("fenced-block pattern is valid")
    })
}

/// Extract the JSON object carried by an LLM response.
pub fn extract_json_object(content: &str) -> Result<String, JsonExtractionError> {
    let trimmed = content.trim();

    // Labelled json fences first, then any fence.
    let mut fenced: Vec<(bool, &str)> = fenced_block_re()
        .captures_iter(trimmed)
        .filter_map(|caps| {
            let lang = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            caps.get(2)
                .map(|body| (lang.eq_ignore_ascii_case("json"), body.as_str().trim()))
        })
        .collect();
    fenced.sort_by_key(|(is_json, _)| !*is_json);

    for (_, body) in &fenced {
        if let Some(json) = largest_valid_object(body) {
            return Ok(json);
        }
    }

    if let Some(json) = largest_valid_object(trimmed) {
        return Ok(json);
    }

    if let Some(start) = trimmed.find('{') {
        let (braces, brackets, in_string) = unclosed_counts(&trimmed[start..]);
        if braces > 0 || brackets > 0 || in_string {
            return Err(JsonExtractionError::Truncated {
                unclosed_braces: braces,
                unclosed_brackets: brackets,
            });
        }
    }

    Err(JsonExtractionError::NotFound {
        content_preview: trimmed.chars().take(80).collect(),
    })
}

/// Largest balanced `{...}` that parses, preferring later ones on ties.
fn largest_valid_object(content: &str) -> Option<String> {
    let mut best: Option<&str> = None;
    for (start, _) in content.match_indices('{') {
        let Some(end) = find_matching_brace(&content[start..]) else {
            continue;
        };
        let candidate = &content[start..=start + end];
        if best.is_some_and(|b| b.len() > candidate.len()) {
            continue;
        }
        if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
            best = Some(candidate);
        }
    }
    best.map(str::to_string)
}

/// Index of the brace closing the object that starts at `s[0]`.
///
/// Braces inside string literals (including escaped quotes) are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn unclosed_counts(s: &str) -> (usize, usize, bool) {
    let mut braces: isize = 0;
    let mut brackets: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => braces += 1,
            '}' if !in_string => braces -= 1,
            '[' if !in_string => brackets += 1,
            ']' if !in_string => brackets -= 1,
            _ => {}
        }
    }
    (braces.max(0) as usize, brackets.max(0) as usize, in_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_object() {
        let input = r#"{"key": "value"}"#;
        assert_eq!(extract_json_object(input).unwrap(), input);
    }

    #[test]
    fn test_json_code_block() {
        let input = "Here you go:\n```json\n{\"surveys\": []}\n```\nEnjoy!";
        assert_eq!(extract_json_object(input).unwrap(), "{\"surveys\": []}");
    }

    #[test]
    fn test_json_fence_preferred_over_other_fence() {
        let input = "```text\n{\"a\": 1}\n```\n```json\n{\"b\": 2}\n```";
        assert_eq!(extract_json_object(input).unwrap(), "{\"b\": 2}");
    }

    #[test]
    fn test_prose_around_object_picks_largest() {
        let input = r#"For example {"x": 1}. Final answer: {"workspace": {"name": "Acme"}, "surveys": []}"#;
        let json = extract_json_object(input).unwrap();
        assert!(json.starts_with("{\"workspace\""));
    }

    #[test]
    fn test_braces_inside_strings() {
        let s = r#"{"text": "a } b { c", "n": 1} trailing"#;
        assert_eq!(find_matching_brace(s), Some(s.find(" trailing").unwrap() - 1));
    }

    #[test]
    fn test_truncated_detected() {
        let input = r#"{"surveys": [{"name": "Onboarding", "questions": ["#;
        let err = extract_json_object(input).unwrap_err();
        assert_eq!(
            err,
            JsonExtractionError::Truncated {
                unclosed_braces: 2,
                unclosed_brackets: 2,
            }
        );
    }

    #[test]
    fn test_not_found() {
        let err = extract_json_object("I cannot help with that.").unwrap_err();
        assert!(matches!(err, JsonExtractionError::NotFound { .. }));
    }
}
