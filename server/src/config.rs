//! Gateway configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind; `0` lets the OS pick one.
    pub port: u16,
    /// How long a session with no bound connection survives.
    pub idle_timeout_secs: u64,
    /// How often the dispatcher looks for idle sessions.
    pub sweep_interval_secs: u64,
    /// Outbound messages buffered per connection before drops start.
    pub outbound_queue: usize,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            idle_timeout_secs: 30 * 60,
            sweep_interval_secs: 60,
            outbound_queue: 64,
        }
    }
}
