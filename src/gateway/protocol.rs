//! Parsing helpers for the reasoning/action reply format.
//!
//! Completions look like:
//!
//! ```text
//! Reasoning: <free text, any length>
//! Action: <payload>
//! ```
//!
//! The payload is a bare JSON value, a fenced JSON block, or (for tool
//! selection) a single letter. Fences are tried first; otherwise the first
//! balanced `{...}` or `[...]` span is taken, tracking string literals so
//! braces inside strings do not confuse the depth count.

use regex::Regex;
use std::sync::OnceLock;

/// Delimiter separating reasoning from the machine-readable payload.
pub const ACTION_DELIMITER: &str = "Action:";

fn json_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n\s*```").expect("static regex"))
}

fn code_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:[A-Za-z0-9_+-]*)\s*\n(.*?)\n\s*```").expect("static regex"))
}

/// Split a completion at the first `Action:` delimiter.
///
/// Returns `(reasoning, action)` or `None` when the delimiter is absent.
pub fn split_action(text: &str) -> Option<(&str, &str)> {
    let at = text.find(ACTION_DELIMITER)?;
    let action = &text[at + ACTION_DELIMITER.len()..];
    Some((&text[..at], action))
}

/// Extract a JSON payload from action text.
///
/// Fenced blocks win; otherwise the first balanced object or array is
/// returned. `None` when neither is found.
pub fn extract_json(text: &str) -> Option<String> {
    if let Some(captures) = json_fence().captures(text) {
        let inner = captures.get(1).map(|m| m.as_str().trim())?;
        if !inner.is_empty() {
            return Some(inner.to_string());
        }
    }
    balanced_span(text).map(|s| s.to_string())
}

/// Extract a code payload from a completion.
///
/// Takes the first fenced block of any language; a completion without fences
/// is assumed to be code on its own and returned trimmed.
pub fn extract_code(text: &str) -> String {
    if let Some(captures) = code_fence().captures(text) {
        if let Some(inner) = captures.get(1) {
            return inner.as_str().trim().to_string();
        }
    }
    text.trim().to_string()
}

/// Find the first balanced `{...}` or `[...]` span.
///
/// String literals and escapes are honored; an unterminated span yields
/// `None` rather than a truncated slice.
fn balanced_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_action_delimiter() {
        let text = "Reasoning: think first.\nAction: {\"a\": 1}";
        let (reasoning, action) = split_action(text).unwrap();
        assert!(reasoning.contains("think first"));
        assert_eq!(action.trim(), "{\"a\": 1}");
    }

    #[test]
    fn missing_delimiter_is_none() {
        assert!(split_action("no payload here").is_none());
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "here you go\n```json\n{\"x\": [1, 2]}\n```\ndone";
        assert_eq!(extract_json(text).unwrap(), "{\"x\": [1, 2]}");
    }

    #[test]
    fn extracts_bare_object_with_nested_braces() {
        let text = "payload: {\"outer\": {\"inner\": 1}} trailing";
        assert_eq!(extract_json(text).unwrap(), "{\"outer\": {\"inner\": 1}}");
    }

    #[test]
    fn braces_inside_strings_do_not_close_the_span() {
        let text = r#"{"note": "a } inside", "n": 1}"#;
        assert_eq!(extract_json(text).unwrap(), text);
    }

    #[test]
    fn extracts_bare_array() {
        let text = "Action: [{\"id\": \"1\"}, {\"id\": \"2\"}]";
        assert_eq!(
            extract_json(text).unwrap(),
            "[{\"id\": \"1\"}, {\"id\": \"2\"}]"
        );
    }

    #[test]
    fn unterminated_payload_is_none() {
        assert!(extract_json("{\"open\": ").is_none());
    }

    #[test]
    fn extracts_fenced_python() {
        let text = "Sure:\n```python\nprint(1)\n```";
        assert_eq!(extract_code(text), "print(1)");
    }

    #[test]
    fn unfenced_code_is_returned_trimmed() {
        assert_eq!(extract_code("  print(1)\n"), "print(1)");
    }
}
