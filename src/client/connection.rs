use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::transport::message::Envelope;
use crate::utils::error::RelayError;

/// Identity of one live client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Outbound side of a connection.
///
/// Clones share the same outbound queue and the same close signal, so closing
/// any clone closes the connection for all of them.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<WsMessage>,
    closed: Arc<watch::Sender<bool>>,
    connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    /// Creates a handle with an outbound queue of `buffer` frames. The returned
    /// receiver is meant for `pump_outbound`.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<WsMessage>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let (closed, _) = watch::channel(false);
        let handle = Self {
            id: ConnectionId::new(),
            sender,
            closed: Arc::new(closed),
            connected_at: Utc::now(),
        };
        (handle, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queues one frame for the peer without waiting.
    ///
    /// Fails with `ConnectionClosed` once the connection is closed, and with
    /// `DispatchWriteFailure` when the peer is not draining its queue.
    pub fn send(&self, frame: WsMessage) -> Result<(), RelayError> {
        if self.is_closed() {
            return Err(RelayError::ConnectionClosed);
        }
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Closed(_) => RelayError::ConnectionClosed,
            TrySendError::Full(_) => RelayError::DispatchWriteFailure {
                connection: self.id,
                reason: "outbound queue full".to_string(),
            },
        })
    }

    /// Closes the connection. Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once `close` has been called on any clone of this handle.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// Why a connection stopped producing frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// Close frame or end of stream from the peer.
    PeerClosed,
    /// The transport failed while reading.
    TransportError,
    /// `close` was called on the handle.
    LocalClose,
}

/// Inbound side of a connection, owned by its session.
pub struct Connection<S> {
    handle: ConnectionHandle,
    inbound: S,
    close_cause: Option<CloseCause>,
}

impl<S> Connection<S>
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    pub fn new(handle: ConnectionHandle, inbound: S) -> Self {
        Self {
            handle,
            inbound,
            close_cause: None,
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    /// Set once `receive` has returned `ConnectionClosed`.
    pub fn close_cause(&self) -> Option<CloseCause> {
        self.close_cause
    }

    /// Waits for the next envelope.
    ///
    /// Control frames are skipped. A frame that is not a valid envelope yields
    /// `Protocol` and the connection stays usable. Closing the handle wakes a
    /// pending call with `ConnectionClosed`.
    pub async fn receive(&mut self) -> Result<Envelope, RelayError> {
        if self.close_cause.is_some() {
            return Err(RelayError::ConnectionClosed);
        }
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.handle.closed() => return Err(self.closed_by(CloseCause::LocalClose)),
                frame = self.inbound.next() => frame,
            };

            match frame {
                Some(Ok(WsMessage::Text(text))) => return Envelope::parse(text.as_str()),
                Some(Ok(WsMessage::Binary(data))) => {
                    return match std::str::from_utf8(&data) {
                        Ok(text) => Envelope::parse(text),
                        Err(_) => Err(RelayError::protocol("binary frame is not utf-8")),
                    };
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(self.closed_by(CloseCause::PeerClosed));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(connection = %self.handle.id, error = %e, "read failed");
                    return Err(self.closed_by(CloseCause::TransportError));
                }
            }
        }
    }

    pub fn send(&self, frame: WsMessage) -> Result<(), RelayError> {
        self.handle.send(frame)
    }

    pub fn close(&self) -> bool {
        self.handle.close()
    }

    fn closed_by(&mut self, cause: CloseCause) -> RelayError {
        self.close_cause.get_or_insert(cause);
        RelayError::ConnectionClosed
    }
}

/// How long a closing connection gets to take its Close frame.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Forwards queued frames to the transport until the connection closes.
///
/// A failed write closes the handle so the owning session tears down. Closing
/// the handle abandons a write the peer is not taking; the Close frame that
/// follows gets at most `CLOSE_GRACE`.
pub async fn pump_outbound<K>(
    handle: ConnectionHandle,
    mut outbound: mpsc::Receiver<WsMessage>,
    mut sink: K,
) where
    K: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = handle.closed() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let written = tokio::select! {
            biased;
            _ = handle.closed() => break,
            written = sink.send(frame) => written,
        };
        if let Err(e) = written {
            debug!(connection = %handle.id, error = %e, "write failed");
            handle.close();
            return;
        }
    }

    let farewell = async {
        let _ = sink.send(WsMessage::Close(None)).await;
        let _ = sink.close().await;
    };
    if tokio::time::timeout(CLOSE_GRACE, farewell).await.is_err() {
        debug!(connection = %handle.id, "peer did not take the close frame");
    }
    debug!(connection = %handle.id, "send loop closed");
}
