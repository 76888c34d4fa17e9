//! CLI for chatrelay
//!
//! Subcommands:
//! - `server`: run the WebSocket relay
//! - `client`: join a chat, post one message and print what comes back

use chatrelay::broker::Relay;
use chatrelay::config::load_config;
use chatrelay::transport::websocket::start_websocket_server;
use chatrelay::utils::logging;
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chatrelay")]
enum Command {
    /// Start the WebSocket server
    Server,
    /// Run a smoke-test client against a running server
    Client {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8000")]
        url: String,
        /// Chat to join and post to
        #[arg(long, default_value = "general")]
        chat: String,
    },
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();

    match cmd {
        Command::Server => {
            if let Err(e) = run_server().await {
                error!("Server failed: {}", e);
                std::process::exit(1);
            }
        }
        Command::Client { url, chat } => {
            logging::init("info");
            if let Err(e) = run_client(&url, &chat).await {
                error!("Client failed: {}", e);
            }
        }
    }
}

async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            return Err(e.into());
        }
    };
    logging::init(&config.log.level);

    let (relay, dispatcher) = Relay::new(config.relay.queue_capacity);
    tokio::spawn(dispatcher.run());

    let addr = config.server.addr();

    tokio::select! {
        result = start_websocket_server(&addr, relay, config.clone()) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_client(url: &str, chat: &str) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;

    let setup = json!({ "messageType": "setup", "chat": chat });
    ws_stream
        .send(WsMessage::Text(setup.to_string().into()))
        .await?;

    let message = json!({ "chat": chat, "sender": "chatrelay-cli", "content": "Hello from the CLI" });
    ws_stream
        .send(WsMessage::Text(message.to_string().into()))
        .await?;

    if let Some(Ok(WsMessage::Text(incoming))) = ws_stream.next().await {
        println!("Incoming: {incoming}");
    }

    ws_stream.close(None).await?;
    Ok(())
}
