// Extraction of JSON payloads from model output

use serde::de::DeserializeOwned;

use crate::types::{AppError, AppResult};

/// Strip markdown fences and surrounding prose from a model answer
pub fn extract_json_block(response: &str) -> &str {
    let fenced = if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
    } else if response.contains("```") {
        response.split("```").nth(1)
    } else {
        None
    };

    let candidate = fenced.unwrap_or(response).trim();

    // Fall back to the outermost object when prose surrounds it
    match (candidate.find('{'), candidate.rfind('}')) {
        (Some(start), Some(end)) if start < end => &candidate[start..=end],
        _ => candidate,
    }
}

/// Parse a model answer into `T`, reporting failures as malformed responses
pub fn parse_model_json<T: DeserializeOwned>(response: &str, what: &str) -> AppResult<T> {
    let json_str = extract_json_block(response);
    serde_json::from_str(json_str)
        .map_err(|e| AppError::MalformedResponse(format!("Failed to parse {} JSON: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        value: i32,
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here you go:\n```json\n{\"value\": 3}\n```\nthanks";
        assert_eq!(extract_json_block(text), "{\"value\": 3}");
    }

    #[test]
    fn test_extract_plain_fence_and_prose() {
        assert_eq!(extract_json_block("```\n{\"value\": 1}\n```"), "{\"value\": 1}");
        assert_eq!(extract_json_block("Result: {\"value\": 2} done"), "{\"value\": 2}");
    }

    #[test]
    fn test_parse_model_json() {
        let sample: Sample = parse_model_json("```json\n{\"value\": 7}\n```", "sample").unwrap();
        assert_eq!(sample.value, 7);

        let err = parse_model_json::<Sample>("no json at all", "sample").unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse(_)));
    }
}
