//! Ticker Wire Messages
//!
//! JSON control frames sent to the venue and the inbound frame shapes the
//! transport understands.
//!
//! ```json
//! {"a":"subscribe","v":[738561,5633]}
//! {"a":"mode","v":["full",[738561]]}
//! {"type":"ticks","data":[{"instrument_token":738561,"last_price":2450.5}]}
//! {"type":"error","data":"Invalid access token"}
//! ```

use serde::Serialize;
use serde_json::{Value, json};

use crate::application::ports::TickMode;
use crate::domain::subscription::InstrumentToken;
use crate::domain::tick::RawTick;

/// Outbound control frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlMessage {
    /// Action name.
    #[serde(rename = "a")]
    pub action: &'static str,
    /// Action payload.
    #[serde(rename = "v")]
    pub value: Value,
}

impl ControlMessage {
    /// Subscribe to instruments.
    #[must_use]
    pub fn subscribe(tokens: &[InstrumentToken]) -> Self {
        Self {
            action: "subscribe",
            value: json!(tokens),
        }
    }

    /// Unsubscribe from instruments.
    #[must_use]
    pub fn unsubscribe(tokens: &[InstrumentToken]) -> Self {
        Self {
            action: "unsubscribe",
            value: json!(tokens),
        }
    }

    /// Set the streaming mode for instruments.
    #[must_use]
    pub fn mode(mode: TickMode, tokens: &[InstrumentToken]) -> Self {
        Self {
            action: "mode",
            value: json!([mode.as_str(), tokens]),
        }
    }
}

/// Inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Tick batch, items left raw for per-item decoding.
    Ticks(Vec<RawTick>),
    /// Error reported by the venue.
    Error(String),
    /// A frame type the service does not consume (orders, broadcasts).
    Ignored(String),
}
