use serde::Deserialize;
use tokio::sync::Semaphore;

/// Top-level configuration settings for the application.
///
/// Includes settings for the listening server, the relay core and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the server will bind to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration settings for the relay core.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    /// Bound of the broadcast queue shared by all sessions.
    pub queue_capacity: usize,
    /// Bound of each connection's outbound frame queue.
    pub outbound_buffer: usize,
    pub max_connections: usize,
    /// Drop payloads for chats the sending connection never joined.
    pub require_subscription: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialRelaySettings {
    pub queue_capacity: Option<usize>,
    pub outbound_buffer: Option<usize>,
    pub max_connections: Option<usize>,
    pub require_subscription: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            relay: RelaySettings {
                queue_capacity: 1024,
                outbound_buffer: 256,
                max_connections: 1000,
                require_subscription: false,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Overlays whatever the partial sources provided onto the defaults.
    pub fn merged(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let server = partial.server.unwrap_or_default();
        let relay = partial.relay.unwrap_or_default();
        let log = partial.log.unwrap_or_default();

        Self {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
            },
            relay: RelaySettings {
                // zero-capacity tokio channels panic, so clamp to 1
                queue_capacity: relay
                    .queue_capacity
                    .unwrap_or(default.relay.queue_capacity)
                    .max(1),
                outbound_buffer: relay
                    .outbound_buffer
                    .unwrap_or(default.relay.outbound_buffer)
                    .max(1),
                // larger counts make the connection-limit semaphore panic
                max_connections: relay
                    .max_connections
                    .unwrap_or(default.relay.max_connections)
                    .min(Semaphore::MAX_PERMITS),
                require_subscription: relay
                    .require_subscription
                    .unwrap_or(default.relay.require_subscription),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }
}
