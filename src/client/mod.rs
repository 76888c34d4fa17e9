//! The `client` module defines the relay's view of one connected client.
//!
//! A connection has two halves. `ConnectionHandle` is the cheap, cloneable
//! outbound side that the registry stores and the dispatcher writes to.
//! `Connection` owns the inbound frame stream and is driven by exactly one
//! session. `pump_outbound` moves queued frames onto the transport.

pub mod connection;

pub use connection::{
    CLOSE_GRACE, CloseCause, Connection, ConnectionHandle, ConnectionId, pump_outbound,
};
