//! WebSocket transport
//!
//! Accepts TCP connections, performs the WebSocket handshake and hands each
//! connection to its own session task, with a writer task pumping outbound
//! frames. Binding the listener is the only failure that reaches the caller;
//! accept errors are retried and everything else is handled per connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_tungstenite::accept_async;
use tracing::{error, info, warn};
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

use crate::broker::Relay;
use crate::client::{CLOSE_GRACE, Connection, ConnectionHandle, pump_outbound};
use crate::config::{RelaySettings, Settings};
use crate::transport::session::Session;
use crate::utils::error::RelayError;

pub async fn bind(addr: &str) -> Result<TcpListener, RelayError> {
    TcpListener::bind(addr).await.map_err(|source| RelayError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Pause after a failed accept, e.g. while out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections on `listener` forever. Accept errors are logged and
/// retried; they never stop the server.
pub async fn serve(listener: TcpListener, relay: Relay, settings: RelaySettings) {
    if let Ok(addr) = listener.local_addr() {
        info!("WebSocket server listening on ws://{addr}");
    }
    let permits = Arc::new(Semaphore::new(
        settings.max_connections.min(Semaphore::MAX_PERMITS),
    ));
    let listener = &listener;

    loop {
        let (stream, peer) = accept_with_backoff(move || listener.accept()).await;
        tokio::spawn(handle_stream(
            stream,
            peer,
            relay.clone(),
            settings.clone(),
            permits.clone(),
        ));
    }
}

/// Calls `accept` until it succeeds, sleeping `ACCEPT_BACKOFF` after each error.
pub(crate) async fn accept_with_backoff<F, Fut, T>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                error!(error = %e, "accept failed, retrying");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

pub async fn start_websocket_server(
    addr: &str,
    relay: Relay,
    settings: Settings,
) -> Result<(), RelayError> {
    let listener = bind(addr).await?;
    serve(listener, relay, settings.relay).await;
    Ok(())
}

async fn handle_stream(
    stream: TcpStream,
    peer: SocketAddr,
    relay: Relay,
    settings: RelaySettings,
    permits: Arc<Semaphore>,
) {
    let mut ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "WebSocket handshake error");
            return;
        }
    };

    let Ok(_permit) = permits.try_acquire_owned() else {
        warn!(%peer, "connection limit reached, rejecting");
        let frame = CloseFrame {
            code: CloseCode::Again,
            reason: "server is full".into(),
        };
        let _ = ws_stream.close(Some(frame)).await;
        return;
    };

    let (ws_sender, ws_receiver) = ws_stream.split();
    let (handle, outbound) = ConnectionHandle::new(settings.outbound_buffer);
    info!(%peer, connection = %handle.id(), "client connected");

    let mut writer = tokio::spawn(pump_outbound(handle.clone(), outbound, ws_sender));

    Session::new(Connection::new(handle, ws_receiver), relay)
        .require_subscription(settings.require_subscription)
        .run()
        .await;

    // the session closed the handle, so the writer is already winding down
    if tokio::time::timeout(CLOSE_GRACE * 2, &mut writer).await.is_err() {
        warn!(%peer, "writer did not stop, aborting it");
        writer.abort();
    }
}
