//! Loading structured documents, strictly or from noisy model output.

use serde_json::Value;

use crate::error::VerifyError;

/// Parse `text` as JSON, keeping object key order.
pub fn parse_strict(text: &str) -> Result<Value, VerifyError> {
    serde_json::from_str(text).map_err(|e| VerifyError::MalformedDocument(e.to_string()))
}

/// Parse JSON that may be wrapped in a markdown code fence or surrounded by
/// prose: strict first, then without the fence, then the largest balanced
/// `{...}` span.
pub fn parse_lenient(text: &str) -> Result<Value, VerifyError> {
    if let Ok(doc) = parse_strict(text) {
        return Ok(doc);
    }
    let unfenced = strip_code_fence(text);
    if let Ok(doc) = parse_strict(unfenced) {
        return Ok(doc);
    }
    let candidate = largest_object(unfenced).unwrap_or(unfenced);
    parse_strict(candidate)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let mut body = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return trimmed,
    };
    if let Some(idx) = body.rfind('\n') {
        if body[idx + 1..].trim().starts_with("```") {
            body = &body[..idx];
        }
    } else if body.trim().starts_with("```") {
        body = "";
    }
    body.trim()
}

/// Widest span between a `{` and its matching `}`, ignoring string contents.
fn largest_object(text: &str) -> Option<&str> {
    let mut best: Option<(usize, usize)> = None;
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
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
            '{' => stack.push(idx),
            '}' => {
                if let Some(start) = stack.pop() {
                    let wider = best.map_or(true, |(s, e)| idx + 1 - start > e - s);
                    if wider {
                        best = Some((start, idx + 1));
                    }
                }
            }
            _ => {}
        }
    }
    best.map(|(start, end)| &text[start..end])
}
