//! # chatrelay
//!
//! `chatrelay` is the live-update core of a chat application. Clients keep a
//! WebSocket open, join one or more chats, and every message posted to a chat
//! is relayed to all connections currently in it.
//!
//! ## Core Modules
//!
//! - `broker`: the subscription registry and the fan-out dispatcher.
//! - `client`: one connected client, split into its outbound handle and inbound stream.
//! - `config`: loading server configuration.
//! - `transport`: the envelope format, per-connection sessions and the WebSocket server.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;
