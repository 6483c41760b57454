//! Relay configuration, read from command-line flags or `PARLEY_*` env vars.

use std::time::Duration;

use clap::Parser;

use crate::signaling::DEFAULT_SIGNALING_PORT;

const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
const DEFAULT_PONG_TIMEOUT_SECS: u64 = 10;
const DEFAULT_COMMAND_QUEUE: usize = 1024;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "parley")]
#[command(about = "WebRTC signaling relay: room discovery and offer/answer/candidate forwarding")]
#[command(version)]
pub struct RelayConfig {
    /// Bind address
    #[arg(short, long, env = "PARLEY_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to listen on
    #[arg(short, long, env = "PARLEY_PORT", default_value_t = DEFAULT_SIGNALING_PORT)]
    pub port: u16,

    /// Seconds between WebSocket pings
    #[arg(long, env = "PARLEY_PING_INTERVAL_SECS", default_value_t = DEFAULT_PING_INTERVAL_SECS)]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before dropping the connection
    #[arg(long, env = "PARLEY_PONG_TIMEOUT_SECS", default_value_t = DEFAULT_PONG_TIMEOUT_SECS)]
    pub pong_timeout_secs: u64,

    /// Capacity of the relay command queue
    #[arg(long, env = "PARLEY_COMMAND_QUEUE", default_value_t = DEFAULT_COMMAND_QUEUE)]
    pub command_queue: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_SIGNALING_PORT,
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            pong_timeout_secs: DEFAULT_PONG_TIMEOUT_SECS,
            command_queue: DEFAULT_COMMAND_QUEUE,
        }
    }
}

impl RelayConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Never zero: tokio intervals reject a zero period.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    /// Never zero, or every connection would drop on its first ping.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs.max(1))
    }
}
