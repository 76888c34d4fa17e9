//! Per-connection control loop.
//!
//! A session reads envelopes from its connection: subscribe requests go to the
//! registry, payloads go to the broadcast queue. When the loop ends for any
//! reason the connection is closed and removed from every topic. That cleanup
//! lives in a drop guard so it also runs if the task panics or is aborted.

use std::sync::Arc;

use futures_util::Stream;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{Registry, Relay};
use crate::client::{CloseCause, Connection, ConnectionHandle};
use crate::transport::message::Envelope;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    PeerClosed,
    TransportError,
    LocalClose,
    /// The dispatcher is gone, so payloads can no longer be relayed.
    RelayShutdown,
}

impl From<CloseCause> for SessionOutcome {
    fn from(cause: CloseCause) -> Self {
        match cause {
            CloseCause::PeerClosed => SessionOutcome::PeerClosed,
            CloseCause::TransportError => SessionOutcome::TransportError,
            CloseCause::LocalClose => SessionOutcome::LocalClose,
        }
    }
}

pub struct Session<S> {
    connection: Connection<S>,
    relay: Relay,
    require_subscription: bool,
}

impl<S> Session<S>
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    pub fn new(connection: Connection<S>, relay: Relay) -> Self {
        Self {
            connection,
            relay,
            require_subscription: false,
        }
    }

    /// Only relay payloads for chats this connection has joined.
    pub fn require_subscription(mut self, required: bool) -> Self {
        self.require_subscription = required;
        self
    }

    pub async fn run(self) -> SessionOutcome {
        let Session {
            mut connection,
            relay,
            require_subscription,
        } = self;
        let _cleanup = Cleanup {
            handle: connection.handle().clone(),
            registry: relay.registry().clone(),
        };
        let id = connection.id();
        let registry = relay.registry();
        let mut frames: u64 = 0;

        info!(connection = %id, "session active");

        let outcome = loop {
            let envelope = match connection.receive().await {
                Ok(envelope) => envelope,
                Err(e) if e.is_fatal_for_connection() => {
                    break connection
                        .close_cause()
                        .map_or(SessionOutcome::PeerClosed, SessionOutcome::from);
                }
                Err(e) => {
                    warn!(connection = %id, error = %e, "ignoring malformed frame");
                    continue;
                }
            };
            frames += 1;

            match envelope {
                Envelope::Subscribe { topic } => {
                    if registry.subscribe(&topic, connection.handle()) {
                        info!(connection = %id, topic = %topic, "subscribed");
                    } else {
                        debug!(connection = %id, topic = %topic, "already subscribed");
                    }
                }
                Envelope::Payload(payload) => {
                    if require_subscription && !registry.is_subscribed(payload.topic(), id) {
                        warn!(
                            connection = %id,
                            topic = payload.topic(),
                            "dropping payload for a chat the connection has not joined"
                        );
                        continue;
                    }

                    let topic = payload.topic().to_string();
                    // enqueue may wait for queue space; a local close must still win
                    let queued = tokio::select! {
                        queued = relay.queue().enqueue(payload) => queued,
                        _ = connection.handle().closed() => break SessionOutcome::LocalClose,
                    };
                    match queued {
                        Ok(()) => debug!(connection = %id, topic = %topic, "payload queued"),
                        Err(e) => {
                            warn!(connection = %id, error = %e, "relay unavailable");
                            break SessionOutcome::RelayShutdown;
                        }
                    }
                }
            }
        };

        let duration = chrono::Utc::now() - connection.handle().connected_at();
        info!(
            connection = %id,
            ?outcome,
            frames,
            duration_secs = duration.num_seconds(),
            "session closed"
        );
        outcome
    }
}

/// Closes the connection and removes it from the registry when dropped.
struct Cleanup {
    handle: ConnectionHandle,
    registry: Arc<Registry>,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.handle.close();
        let topics = self.registry.unsubscribe_all(self.handle.id());
        debug!(connection = %self.handle.id(), topics, "cleaned up connection");
    }
}
