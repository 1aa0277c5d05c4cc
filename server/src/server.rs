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

//! Telnet server: the listening socket and the accept loop

use crate::{
    CommandProcessor, ConnectionRegistry, Result, ServerConfig, ServerError, ServerMetrics,
    ServerSnapshot, ShutdownCoordinator, WorkerConfig,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Listen backlog for the server socket
const LISTEN_BACKLOG: u32 = 10;

/// Initial accept retry delay; doubles up to [`MAX_ACCEPT_BACKOFF`]
const INITIAL_ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Cap on the accept retry delay
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(5);

/// How long `shutdown` waits for the accept loop to exit
const ACCEPT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Line-oriented telnet server
///
/// Binds in [`new`](Self::new) (with address reuse enabled), accepts in a
/// spawned loop after [`start`](Self::start), and tears everything down in
/// [`shutdown`](Self::shutdown): accept loop joined first, then every
/// connection worker, then the listening socket released.
///
/// # Example
///
/// ```no_run
/// use gomokud_server::{LineLogProcessor, ServerConfig, TelnetServer};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = TelnetServer::new(ServerConfig::default()).await?;
///     server.start(Arc::new(LineLogProcessor)).await?;
///     tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct TelnetServer {
    /// Server configuration
    config: ServerConfig,
    /// Connection registry
    registry: Arc<ConnectionRegistry>,
    /// Server metrics
    metrics: Arc<ServerMetrics>,
    /// Listening socket; taken on shutdown so the port is released
    listener: Arc<tokio::sync::Mutex<Option<TcpListener>>>,
    /// Actual bind address
    bind_address: SocketAddr,
    /// Server start time
    started_at: Instant,
    /// Guards against a second `start`
    started: AtomicBool,
    /// Shutdown sequencing
    coordinator: Arc<ShutdownCoordinator>,
    /// Accept loop task handle
    accept_handle: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl TelnetServer {
    /// Bind the listening socket with the given configuration.
    ///
    /// Binds with `SO_REUSEADDR` and a backlog of 10 but does not accept yet;
    /// call [`start`](Self::start) for that. Any socket, bind or listen
    /// failure is fatal and returned to the caller.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let socket = match config.bind_address {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(config.bind_address)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        let actual_addr = listener.local_addr()?;

        let metrics = Arc::new(ServerMetrics::new());

        let worker_config = WorkerConfig {
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            ..Default::default()
        };

        let registry = Arc::new(ConnectionRegistry::new(metrics.clone(), worker_config));

        info!("server bound to {}", actual_addr);

        Ok(Self {
            config,
            registry,
            metrics,
            listener: Arc::new(tokio::sync::Mutex::new(Some(listener))),
            bind_address: actual_addr,
            started_at: Instant::now(),
            started: AtomicBool::new(false),
            coordinator: Arc::new(ShutdownCoordinator::new()),
            accept_handle: Arc::new(tokio::sync::Mutex::new(None)),
        })
    }

    /// Start accepting connections, feeding decoded lines to `processor`.
    ///
    /// Spawns the accept loop; the server runs until [`shutdown`](Self::shutdown).
    pub async fn start(&self, processor: Arc<dyn CommandProcessor>) -> Result<()> {
        if !self.coordinator.is_running() {
            return Err(ServerError::ServerNotRunning);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        info!("starting server on {}", self.bind_address);

        let handle = self.spawn_accept_loop(processor);
        *self.accept_handle.lock().await = Some(handle);

        Ok(())
    }

    /// Spawn the accept loop task
    fn spawn_accept_loop(&self, processor: Arc<dyn CommandProcessor>) -> JoinHandle<()> {
        let listener = self.listener.clone();
        let registry = self.registry.clone();
        let metrics = self.metrics.clone();
        let config = self.config.clone();
        let coordinator = self.coordinator.clone();

        tokio::spawn(async move {
            let mut backoff = INITIAL_ACCEPT_BACKOFF;

            loop {
                if !coordinator.is_running() {
                    break;
                }

                let accepted = tokio::select! {
                    result = Self::accept_one(&listener) => match result {
                        Some(r) => r,
                        None => break,
                    },
                    _ = coordinator.cancelled() => break,
                };

                match accepted {
                    Ok((socket, peer_addr)) => {
                        backoff = INITIAL_ACCEPT_BACKOFF;
                        Self::handle_accepted(
                            socket, peer_addr, &registry, &metrics, &config, &processor,
                        )
                        .await;
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed, retrying in {backoff:?}");
                        metrics.connection_error();

                        // Back off so a persistent fault cannot spin the loop
                        tokio::select! {
                            _ = tokio::time::sleep(backoff) => {}
                            _ = coordinator.cancelled() => break,
                        }
                        backoff = (backoff * 2).min(MAX_ACCEPT_BACKOFF);
                    }
                }
            }

            info!("accept loop terminated");
        })
    }

    /// Accept a single connection, or `None` if the listener is gone.
    async fn accept_one(
        listener: &tokio::sync::Mutex<Option<TcpListener>>,
    ) -> Option<std::io::Result<(TcpStream, SocketAddr)>> {
        let guard = listener.lock().await;
        match guard.as_ref() {
            Some(listener) => Some(listener.accept().await),
            None => None,
        }
    }

    /// Register a freshly accepted socket: admission check, greeting, join
    /// notice.
    async fn handle_accepted(
        socket: TcpStream,
        peer_addr: SocketAddr,
        registry: &ConnectionRegistry,
        metrics: &ServerMetrics,
        config: &ServerConfig,
        processor: &Arc<dyn CommandProcessor>,
    ) {
        debug!(%peer_addr, "accepted connection");

        if registry.connection_count() >= config.max_connections {
            let err = ServerError::MaxConnectionsReached(config.max_connections);
            warn!(%peer_addr, error = %err, "rejecting connection");
            metrics.connection_error();
            drop(socket);
            return;
        }

        match registry.add_connection(socket, processor.clone()) {
            Ok(id) => {
                info!(%id, %peer_addr, "connection established");

                if let Err(e) = registry.send_to(id, &config.greeting).await {
                    warn!(%id, error = %e, "failed to queue greeting");
                }

                let result = registry.broadcast(&config.join_notice).await;
                if !result.all_succeeded() {
                    debug!(
                        failed = result.failed,
                        total = result.total,
                        "join notice not delivered to every client"
                    );
                }
            }
            Err(e) => {
                error!(%peer_addr, error = %e, "failed to register connection");
                metrics.connection_error();
            }
        }
    }

    /// Shut down gracefully.
    ///
    /// Stops the accept loop and joins it, signals every worker to close and
    /// joins them all, then releases the listening socket. After this
    /// returns, no server task touches any socket and the port can be
    /// rebound immediately.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.coordinator.request_stop() {
            return Err(ServerError::ServerNotRunning);
        }

        info!("shutting down server");

        if let Some(handle) = self.accept_handle.lock().await.take() {
            if timeout(ACCEPT_JOIN_TIMEOUT, handle).await.is_err() {
                warn!("accept loop did not exit in time");
            }
        }

        self.registry.shutdown(self.config.shutdown_timeout).await;

        // Release the listening socket
        self.listener.lock().await.take();

        self.coordinator.mark_stopped();
        info!("server shutdown complete");

        Ok(())
    }

    /// Check if the server is accepting connections
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && self.coordinator.is_running()
    }

    /// Get the server's bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Get the number of live connections
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            active_connections: self.registry.connection_count(),
            total_connections: self.metrics.total_connections(),
            bind_address: self.bind_address(),
            uptime: self.started_at.elapsed(),
            started_at: self.started_at,
        }
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Get the connection registry
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Get the shutdown coordinator
    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for TelnetServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelnetServer")
            .field("bind_address", &self.bind_address())
            .field("state", &self.coordinator.state())
            .field("connection_count", &self.connection_count())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

impl Drop for TelnetServer {
    fn drop(&mut self) {
        if self.coordinator.is_running() && self.started.load(Ordering::SeqCst) {
            warn!("TelnetServer dropped while still running");
            self.coordinator.request_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LineLogProcessor;

    fn test_config() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
    }

    #[tokio::test]
    async fn test_server_lifecycle() {
        let server = TelnetServer::new(test_config()).await.unwrap();
        assert!(!server.is_running());

        server.start(Arc::new(LineLogProcessor)).await.unwrap();
        assert!(server.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;

        server.shutdown().await.unwrap();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_server_double_start() {
        let server = TelnetServer::new(test_config()).await.unwrap();
        server.start(Arc::new(LineLogProcessor)).await.unwrap();

        let result = server.start(Arc::new(LineLogProcessor)).await;
        assert!(matches!(result, Err(ServerError::AlreadyRunning)));

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_after_stop_reports_not_running() {
        let server = TelnetServer::new(test_config()).await.unwrap();
        server.coordinator().request_stop();

        // Repeated attempts keep reporting the same failure; a failed
        // start must not leave the server looking already-started.
        for _ in 0..2 {
            let result = server.start(Arc::new(LineLogProcessor)).await;
            assert!(matches!(result, Err(ServerError::ServerNotRunning)));
        }
    }

    #[tokio::test]
    async fn test_server_double_shutdown() {
        let server = TelnetServer::new(test_config()).await.unwrap();
        server.start(Arc::new(LineLogProcessor)).await.unwrap();

        server.shutdown().await.unwrap();
        assert!(matches!(
            server.shutdown().await,
            Err(ServerError::ServerNotRunning)
        ));
    }

    #[tokio::test]
    async fn test_server_snapshot() {
        let server = TelnetServer::new(test_config()).await.unwrap();
        let snapshot = server.snapshot();

        assert_eq!(snapshot.active_connections, 0);
        assert_eq!(snapshot.total_connections, 0);
    }
}
