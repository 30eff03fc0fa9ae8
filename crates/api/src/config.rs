use std::time::Duration;

use uplink_worker::WorkerConfig;

use crate::auth::jwt::JwtConfig;

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Outbound queue length per connection (default: `64`).
    pub send_buffer: usize,
    /// Seconds between heartbeat sweeps (default: `30`).
    pub heartbeat_interval_secs: u64,
    /// Seconds without inbound traffic before a connection is evicted
    /// (default: `90`).
    pub idle_timeout_secs: u64,
}

impl WsConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            send_buffer: crate::ws::manager::DEFAULT_SEND_BUFFER,
            heartbeat_interval_secs: 30,
            idle_timeout_secs: 90,
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on draining jobs and event services at shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Broker ring-buffer capacity (default: `1024`).
    pub event_bus_capacity: usize,
    /// JWT token configuration.
    pub jwt: JwtConfig,
    pub ws: WsConfig,
    pub worker: WorkerConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                    |
    /// |------------------------------|----------------------------|
    /// | `HOST`                       | `0.0.0.0`                  |
    /// | `PORT`                       | `3000`                     |
    /// | `CORS_ORIGINS`               | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`                       |
    /// | `EVENT_BUS_CAPACITY`         | `1024`                     |
    /// | `WS_SEND_BUFFER`             | `64`                       |
    /// | `WS_HEARTBEAT_INTERVAL_SECS` | `30`                       |
    /// | `WS_IDLE_TIMEOUT_SECS`       | `90`                       |
    ///
    /// JWT and worker settings are read by [`JwtConfig::from_env`] and
    /// [`WorkerConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let event_bus_capacity: usize = std::env::var("EVENT_BUS_CAPACITY")
            .unwrap_or_else(|_| uplink_events::bus::DEFAULT_CAPACITY.to_string())
            .parse()
            .expect("EVENT_BUS_CAPACITY must be a valid usize");

        let ws_defaults = WsConfig::default();

        let send_buffer: usize = std::env::var("WS_SEND_BUFFER")
            .unwrap_or_else(|_| ws_defaults.send_buffer.to_string())
            .parse()
            .expect("WS_SEND_BUFFER must be a valid usize");

        let heartbeat_interval_secs: u64 = std::env::var("WS_HEARTBEAT_INTERVAL_SECS")
            .unwrap_or_else(|_| ws_defaults.heartbeat_interval_secs.to_string())
            .parse()
            .expect("WS_HEARTBEAT_INTERVAL_SECS must be a valid u64");

        let idle_timeout_secs: u64 = std::env::var("WS_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| ws_defaults.idle_timeout_secs.to_string())
            .parse()
            .expect("WS_IDLE_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            event_bus_capacity,
            jwt: JwtConfig::from_env(),
            ws: WsConfig {
                send_buffer: send_buffer.max(1),
                heartbeat_interval_secs: heartbeat_interval_secs.max(1),
                idle_timeout_secs,
            },
            worker: WorkerConfig::from_env(),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
