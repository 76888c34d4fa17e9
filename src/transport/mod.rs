//! The `transport` module is responsible for network communication with chat
//! clients over WebSockets.
//!
//! It defines the envelope format, the per-connection session loop and the
//! WebSocket accept loop that ties connections to the relay.

pub mod message;
pub mod session;
pub mod websocket;

pub use message::{Envelope, PayloadEnvelope};
pub use session::{Session, SessionOutcome};
pub use websocket::{bind, serve, start_websocket_server};

#[cfg(test)]
mod websocket_tests;
