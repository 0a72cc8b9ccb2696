//! Model response parsing.
//!
//! A response is expected to contain one fenced code block holding the
//! program, optionally tagged `json`, and a line starting with
//! `Explanation:` carrying the narrative template.

const FENCE: &str = "```";
const EXPLANATION_MARKER: &str = "explanation:";

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub program: Option<String>,
    pub explanation: Option<String>,
}

pub fn parse_response(response: &str) -> ParsedResponse {
    ParsedResponse {
        program: extract_code_block(response),
        explanation: extract_explanation(response),
    }
}

/// Contents of the first fenced block, without the language tag.
pub fn extract_code_block(response: &str) -> Option<String> {
    let start = response.find(FENCE)?;
    let after_fence = &response[start + FENCE.len()..];
    // The rest of the opening line is the language tag.
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find(FENCE)?;
    let code = body[..end].trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

/// Text after the `Explanation:` marker outside the code block.
pub fn extract_explanation(response: &str) -> Option<String> {
    let mut in_block = false;
    for line in response.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with(FENCE) {
            in_block = !in_block;
            continue;
        }
        if in_block {
            continue;
        }
        let stripped = trimmed.trim_start_matches(|c| c == '*' || c == '#').trim_start();
        let has_marker = stripped
            .get(..EXPLANATION_MARKER.len())
            .map_or(false, |head| head.eq_ignore_ascii_case(EXPLANATION_MARKER));
        if has_marker {
            let text = stripped[EXPLANATION_MARKER.len()..]
                .trim()
                .trim_matches('*')
                .trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_response() {
        let response = "Here is the program:\n```json\n{\"table\":\"sales\",\"uses\":[],\"steps\":[]}\n```\nExplanation: Total sales in 2024 were {result}.";
        let parsed = parse_response(response);
        assert_eq!(
            parsed.program.as_deref(),
            Some("{\"table\":\"sales\",\"uses\":[],\"steps\":[]}")
        );
        assert_eq!(parsed.explanation.as_deref(), Some("Total sales in 2024 were {result}."));
    }

    #[test]
    fn test_untagged_fence() {
        assert_eq!(extract_code_block("```\n{}\n```").as_deref(), Some("{}"));
    }

    #[test]
    fn test_missing_or_empty_block() {
        assert_eq!(extract_code_block("no code here"), None);
        assert_eq!(extract_code_block("```json\n   \n```"), None);
        assert_eq!(extract_code_block("```json\n{\"unterminated\": true}"), None);
    }

    #[test]
    fn test_explanation_variants() {
        assert_eq!(
            extract_explanation("**Explanation:** Sales grew {result}.").as_deref(),
            Some("Sales grew {result}.")
        );
        assert_eq!(extract_explanation("```\nexplanation: inside\n```"), None);
        assert_eq!(extract_explanation("Explanation:   "), None);
    }
}
