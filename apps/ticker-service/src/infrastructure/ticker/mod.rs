//! Venue Ticker Adapter
//!
//! WebSocket implementation of the transport port, plus a scripted mock
//! used by the session and HTTP tests.

pub mod client;
pub mod codec;
pub mod messages;
pub mod mock;
pub mod retry;

pub use client::{WsTickerTransport, WsTransportConfig, WsTransportFactory};
pub use codec::{CodecError, TickerCodec};
pub use messages::{ControlMessage, InboundMessage};
pub use mock::{MockTransportFactory, MockTransportHandle, TransportCall};
pub use retry::{ConnectRetry, ConnectRetryConfig};
