//! Ticker Frame Codec
//!
//! Encodes control frames and classifies inbound text frames. Tick items
//! are not decoded here; the tick cache decodes them one by one.

use serde_json::Value;

use super::messages::{ControlMessage, InboundMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is JSON but not a recognised envelope.
    #[error("invalid frame: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the ticker stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickerCodec;

impl TickerCodec {
    /// Create a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode a control frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, message: &ControlMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }

    /// Classify an inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object with a string
    /// `type`, or a `ticks` frame whose `data` is not an array.
    pub fn decode(&self, text: &str) -> Result<InboundMessage, CodecError> {
        let mut frame: Value = serde_json::from_str(text.trim())?;

        let kind = frame
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::InvalidFormat(preview(text)))?
            .to_string();
        let data = frame
            .as_object_mut()
            .and_then(|object| object.remove("data"))
            .unwrap_or(Value::Null);

        match kind.as_str() {
            "ticks" => match data {
                Value::Array(items) => Ok(InboundMessage::Ticks(items)),
                other => Err(CodecError::InvalidFormat(format!(
                    "ticks data must be an array, got {}",
                    json_type(&other)
                ))),
            },
            "error" => Ok(InboundMessage::Error(match data {
                Value::String(message) => message,
                other => other.to_string(),
            })),
            _ => Ok(InboundMessage::Ignored(kind)),
        }
    }
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(50) {
        Some((end, _)) => format!("{}...", &trimmed[..end]),
        None => trimmed.to_string(),
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_tick_batch() {
        let frame = json!({
            "type": "ticks",
            "data": [{"instrument_token": 1, "last_price": 10}, {"bogus": true}]
        })
        .to_string();

        let InboundMessage::Ticks(items) = TickerCodec::new().decode(&frame).unwrap() else {
            panic!("expected ticks");
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn decodes_error_frame() {
        let decoded = TickerCodec::new()
            .decode(r#"{"type":"error","data":"Invalid access token"}"#)
            .unwrap();
        assert_eq!(decoded, InboundMessage::Error("Invalid access token".to_string()));
    }

    #[test]
    fn other_types_are_ignored() {
        let decoded = TickerCodec::new()
            .decode(r#"{"type":"order","data":{"order_id":"1"}}"#)
            .unwrap();
        assert_eq!(decoded, InboundMessage::Ignored("order".to_string()));
    }

    #[test]
    fn rejects_frames_without_type() {
        assert!(matches!(
            TickerCodec::new().decode(r#"{"data":[]}"#),
            Err(CodecError::InvalidFormat(_))
        ));
        assert!(matches!(
            TickerCodec::new().decode("not json"),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn rejects_non_array_tick_data() {
        assert!(matches!(
            TickerCodec::new().decode(r#"{"type":"ticks","data":{}}"#),
            Err(CodecError::InvalidFormat(_))
        ));
    }

    #[test]
    fn encodes_control_frames() {
        let text = TickerCodec::new()
            .encode(&ControlMessage::subscribe(&[5633]))
            .unwrap();
        assert_eq!(text, r#"{"a":"subscribe","v":[5633]}"#);
    }
}
