use std::time::Duration;

use clap::{builder::RangedU64ValueParser, Parser};

const DEFAULT_OUTBOUND_CAPACITY: usize = 100;
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Room based WebSocket chat relay
#[derive(Parser, Debug, Clone)]
#[command(name = "relay", version, about = "Room based WebSocket chat relay")]
pub struct Config {
    /// Bind address
    #[arg(long, env = "RELAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "RELAY_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Enable structured JSON logging
    #[arg(long, env = "RELAY_JSON_LOGS")]
    pub json_logs: bool,

    /// How long a broadcast waits for a slow client before skipping it, in milliseconds
    #[arg(long, env = "RELAY_SEND_TIMEOUT_MS", default_value_t = DEFAULT_SEND_TIMEOUT.as_millis() as u64)]
    pub send_timeout_ms: u64,

    /// How many events may be queued for a single client
    #[arg(
        long,
        env = "RELAY_OUTBOUND_CAPACITY",
        default_value_t = DEFAULT_OUTBOUND_CAPACITY,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub outbound_capacity: usize,

    /// How long a shutdown waits for open connections to close, in milliseconds
    #[arg(long, env = "RELAY_SHUTDOWN_TIMEOUT_MS", default_value_t = DEFAULT_SHUTDOWN_TIMEOUT.as_millis() as u64)]
    pub shutdown_timeout_ms: u64,
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn settings(&self) -> RelaySettings {
        RelaySettings {
            outbound_capacity: self.outbound_capacity,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Per connection tuning shared by every session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub outbound_capacity: usize,
    pub send_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        RelaySettings {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}
