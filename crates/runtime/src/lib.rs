//! codecap runtime - transport, connection, and endpoint discovery
//!
//! This crate is the plumbing between `codecap-core` and a remote headless
//! browser speaking the Chrome DevTools Protocol:
//!
//! - **Endpoint**: resolving a configured browser address to a WebSocket URL
//! - **Transport**: bidirectional JSON messages over a WebSocket
//! - **Connection**: command/response correlation and event fan-out
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ codecap-core │  CdpPage, SessionDriver
//! └──────┬───────┘
//!        │ send_command / subscribe
//! ┌──────▼───────┐
//! │   runtime    │  This crate
//! │  ┌────────┐  │
//! │  │ Conn   │  │  id correlation, event broadcast
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  WebSocket (or in-memory fake)
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod transport;

pub use codecap_protocol::cdp::Event;
pub use connection::Connection;
pub use endpoint::BrowserEndpoint;
pub use error::{Error, Result};
#[cfg(any(test, feature = "fake-transport"))]
pub use transport::fake::{FakeTransportBuilder, FakeTransportController};
pub use transport::{Transport, TransportParts, TransportReceiver, WebSocketTransport};
