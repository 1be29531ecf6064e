use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::repair::{repair_content_field, RepairError};

const CONTENT_POINTER: &str = "/choices/0/message/content";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("response has no string at choices[0].message.content")]
    MalformedSchema,
    #[error("response could not be repaired: {0}")]
    Repair(#[from] RepairError),
}

/// Pull the generated text out of a chat-completion payload.
///
/// Well-formed payloads are read through `serde_json`. Payloads that do not
/// parse at all are handed to the field repair scanner instead.
pub fn decode_completion(raw: &str) -> Result<String, DecodeError> {
    debug!(bytes = raw.len(), "completion payload received");

    match serde_json::from_str::<Value>(raw) {
        Ok(value) => {
            let content = value
                .pointer(CONTENT_POINTER)
                .and_then(Value::as_str)
                .ok_or(DecodeError::MalformedSchema)?;
            debug!(chars = content.chars().count(), "completion parsed");
            Ok(content.to_string())
        }
        Err(err) => {
            warn!(error = %err, "completion did not parse, attempting field repair");
            let content = repair_content_field(raw)?;
            info!(chars = content.chars().count(), "content recovered by field repair");
            Ok(content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_payload() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"1. OpenAI news\n2. Google news"}}]}"#;
        assert_eq!(decode_completion(raw).unwrap(), "1. OpenAI news\n2. Google news");
    }

    #[test]
    fn parsed_but_missing_content() {
        let raw = r#"{"error":{"message":"rate limited","type":"requests"}}"#;
        assert_eq!(decode_completion(raw), Err(DecodeError::MalformedSchema));
    }

    #[test]
    fn parsed_but_content_not_string() {
        let raw = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert_eq!(decode_completion(raw), Err(DecodeError::MalformedSchema));
    }

    #[test]
    fn broken_fixture_is_repaired() {
        let raw = std::fs::read_to_string("tests/fixtures/completion_broken.json").unwrap();
        assert!(serde_json::from_str::<Value>(&raw).is_err());
        let content = decode_completion(&raw).unwrap();
        assert!(content.starts_with("2025年7月15日"));
        assert!(content.contains("\"preview\""));
        assert!(content.contains("2. **Anthropic ships Claude memory for teams**"));
    }

    #[test]
    fn repair_failure_propagates() {
        let err = decode_completion("<html>502 Bad Gateway</html>").unwrap_err();
        assert_eq!(err, DecodeError::Repair(RepairError::FieldNotFound));

        let err = decode_completion("{\"choices\":[{\"message\":{\"content\":\"cut\nshort").unwrap_err();
        assert!(matches!(err, DecodeError::Repair(RepairError::UnterminatedField { .. })));
    }
}
