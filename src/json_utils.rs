//! JSON extraction utilities for parsing LLM responses.

/// Extract a JSON block from LLM response text.
///
/// Handles two common patterns:
/// 1. JSON wrapped in ```json ... ``` code blocks
/// 2. Raw JSON objects (finds first { to last })
pub fn extract_json_block(text: &str) -> Option<&str> {
    // Look for ```json ... ``` blocks
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return Some(text[content_start..content_start + end].trim());
        }
    }

    // Try finding raw JSON object
    if let Some(start) = text.find('{')
        && let Some(end) = text.rfind('}')
    {
        return Some(&text[start..=end]);
    }

    None
}

/// Extract a single floating-point score from free-form model text, used by
/// the Retriever's observe step which is specified to return a bare float
/// rather than a JSON object. Takes the first token in the text that parses
/// as a float and clamps it into `[0, 1]`.
pub fn extract_float_score(text: &str) -> Option<f32> {
    text.split(|c: char| !c.is_ascii_digit() && c != '.' && c != '-')
        .filter(|tok| !tok.is_empty())
        .find_map(|tok| tok.parse::<f32>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}
