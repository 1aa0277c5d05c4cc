//
// Copyright 2025-2026 The gomokud Authors. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Default port for the board-game front end.
pub const DEFAULT_PORT: u16 = 8023;

/// Server configuration
///
/// # Example
///
/// ```
/// use gomokud_server::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::default()
///     .with_max_connections(500)
///     .with_read_timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections
    ///
    /// Connections accepted above this limit are logged and dropped without
    /// a greeting.
    pub max_connections: usize,

    /// Timeout for a single read attempt
    ///
    /// Expiry is not an error: the worker loops and tries again. It bounds
    /// how long a worker can go without noticing a close request.
    pub read_timeout: Duration,

    /// Timeout for write operations
    pub write_timeout: Duration,

    /// Timeout for joining each connection worker during shutdown
    pub shutdown_timeout: Duration,

    /// Line sent to a client immediately after it is registered
    pub greeting: String,

    /// Line broadcast to all clients when a new client joins
    pub join_notice: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1000,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            greeting: "Welcome to TelnetServer.".to_string(),
            join_notice: "New client joined.".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the given bind address
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the maximum number of concurrent connections
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the read timeout duration
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout duration
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the per-worker join timeout used during shutdown
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the greeting line
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Set the join notice line
    pub fn with_join_notice(mut self, notice: impl Into<String>) -> Self {
        self.join_notice = notice.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address.port(), DEFAULT_PORT);
        assert_eq!(config.greeting, "Welcome to TelnetServer.");
        assert_eq!(config.join_notice, "New client joined.");
    }

    #[test]
    fn test_builder_methods() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_max_connections(2)
            .with_read_timeout(Duration::from_millis(50))
            .with_greeting("hi");
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.read_timeout, Duration::from_millis(50));
        assert_eq!(config.greeting, "hi");
    }
}
