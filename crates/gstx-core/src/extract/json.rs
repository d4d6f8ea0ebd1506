//! Locating a JSON object inside free-form model output.

use serde_json::{Map, Value};

use crate::error::ExtractionError;

/// First balanced `{...}` span, skipping braces inside string literals.
///
/// Falls back to the span from the first `{` to the last `}` when no
/// balanced object closes.
pub fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in raw[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Parse the JSON object embedded in a model response.
pub fn parse_json_object(raw: &str) -> Result<Map<String, Value>, ExtractionError> {
    let candidate = extract_json(raw).ok_or(ExtractionError::NoJson)?;

    let value: Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(first_err) => {
            // the greedy span can still succeed when a stray brace closed early
            let start = raw.find('{').unwrap_or(0);
            let end = raw.rfind('}').map(|e| e + 1).unwrap_or(raw.len());
            let greedy = &raw[start..end];
            if greedy == candidate {
                return Err(ExtractionError::InvalidJson(first_err.to_string()));
            }
            serde_json::from_str(greedy).map_err(|_| ExtractionError::InvalidJson(first_err.to_string()))?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ExtractionError::NotAnObject),
    }
}
