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

//! Connection registry
//!
//! The registry tracks every live connection together with its control
//! channel and its worker task handle. Workers are owned, never detached: a
//! connection leaves the map when its worker exits, and shutdown joins every
//! worker before the listening socket is released. An identity is present in
//! the map exactly while its socket may legally be written to.

use crate::{
    ClientConnection, CommandProcessor, ConnectionId, ConnectionInfo, ConnectionState,
    ControlMessage, Result, ServerError, ServerMetrics, WorkerConfig,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Result of a broadcast operation
#[derive(Debug, Clone)]
pub struct BroadcastResult {
    /// Total number of connections attempted
    pub total: usize,
    /// Number of successful deliveries
    pub succeeded: usize,
    /// Number of failed deliveries
    pub failed: usize,
    /// Errors that occurred (ConnectionId and error message)
    pub errors: Vec<(ConnectionId, String)>,
}

impl BroadcastResult {
    fn new() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }

    /// Check if all deliveries succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Registered connection entry
struct RegisteredConnection {
    /// Connection ID
    id: ConnectionId,
    /// The connection itself
    connection: ClientConnection,
    /// Control channel sender
    control_tx: mpsc::Sender<ControlMessage>,
    /// Owned worker task handle, joined on removal
    worker_handle: JoinHandle<()>,
    /// Current worker state (shared atomic)
    state: Arc<AtomicU8>,
}

impl RegisteredConnection {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            state: self.state(),
            peer_addr: self.connection.peer_addr(),
            created_at: self.connection.created_at(),
            lines_sent: self.connection.lines_sent(),
            lines_received: self.connection.lines_received(),
        }
    }
}

/// Thread-safe collection of live connections
pub struct ConnectionRegistry {
    /// Active connections (sharded concurrent map)
    connections: Arc<DashMap<ConnectionId, RegisteredConnection>>,
    /// Next connection ID (monotonically increasing)
    next_id: Arc<AtomicU64>,
    /// Server metrics
    metrics: Arc<ServerMetrics>,
    /// Worker configuration
    worker_config: WorkerConfig,
}

impl ConnectionRegistry {
    /// Create a new registry
    pub fn new(metrics: Arc<ServerMetrics>, worker_config: WorkerConfig) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            metrics,
            worker_config,
        }
    }

    fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register an accepted socket and spawn its worker.
    ///
    /// The worker task is owned by the registry through its join handle. It
    /// starts processing only after the entry is in the map, so a connection
    /// never runs unregistered.
    pub fn add_connection(
        &self,
        socket: TcpStream,
        processor: Arc<dyn CommandProcessor>,
    ) -> Result<ConnectionId> {
        let id = self.next_connection_id();
        let connection = ClientConnection::wrap(socket, id)?;

        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8()));
        let (worker, control_tx) = crate::ConnectionWorker::new(
            id,
            connection.clone(),
            processor,
            self.worker_config.clone(),
            state.clone(),
            self.metrics.clone(),
        );

        // The worker waits for this gate so it cannot finish (and try to
        // deregister) before it has been inserted.
        let (registered_tx, registered_rx) = oneshot::channel::<()>();

        let connections = self.connections.clone();
        let metrics = self.metrics.clone();
        let worker_handle = tokio::spawn(async move {
            let _ = registered_rx.await;
            let start = Instant::now();
            worker.run().await;

            // Deregister before the socket drops
            connections.remove(&id);
            metrics.connection_closed(start.elapsed());
        });

        let registered = RegisteredConnection {
            id,
            connection,
            control_tx,
            worker_handle,
            state,
        };

        self.connections.insert(id, registered);
        self.metrics.connection_opened();
        let _ = registered_tx.send(());

        Ok(id)
    }

    /// Remove a connection: signal close, then join its worker.
    pub async fn remove_connection(&self, id: ConnectionId) -> Result<()> {
        let Some((_, registered)) = self.connections.remove(&id) else {
            return Err(ServerError::ConnectionNotFound(id));
        };
        self.stop_worker(registered, Duration::from_secs(5)).await;
        Ok(())
    }

    /// Signal close and join one worker, aborting if it exceeds the deadline.
    async fn stop_worker(&self, registered: RegisteredConnection, join_timeout: Duration) {
        let _ = registered.control_tx.send(ControlMessage::Close).await;

        let mut handle = registered.worker_handle;
        if timeout(join_timeout, &mut handle).await.is_err() {
            warn!(
                connection_id = %registered.id,
                "worker did not stop within {join_timeout:?}, aborting"
            );
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Get a connection by ID
    pub fn get_connection(&self, id: ConnectionId) -> Option<ClientConnection> {
        self.connections
            .get(&id)
            .map(|entry| entry.connection.clone())
    }

    /// Get connection info
    pub fn get_connection_info(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(&id).map(|entry| entry.info())
    }

    /// Get all connection IDs
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Get the number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Queue a line for a specific connection
    pub async fn send_to(&self, id: ConnectionId, line: &str) -> Result<()> {
        let control_tx = self
            .connections
            .get(&id)
            .map(|entry| entry.control_tx.clone())
            .ok_or(ServerError::ConnectionNotFound(id))?;
        control_tx
            .send(ControlMessage::SendLine(line.to_string()))
            .await
            .map_err(|_| ServerError::ConnectionClosed)
    }

    /// Broadcast a line to every registered connection.
    ///
    /// Takes a snapshot of the control senders first and delivers outside any
    /// map locks, so a slow peer never blocks registry mutation. Each handle
    /// registered for the duration of the call gets the line at most once; a
    /// handle removed mid-call may see a late delivery whose failure is only
    /// counted.
    pub async fn broadcast(&self, line: &str) -> BroadcastResult {
        let mut result = BroadcastResult::new();

        let targets: Vec<(ConnectionId, mpsc::Sender<ControlMessage>)> = self
            .connections
            .iter()
            .map(|entry| (*entry.key(), entry.control_tx.clone()))
            .collect();
        result.total = targets.len();

        let sends = targets.into_iter().map(|(id, tx)| {
            let line = line.to_string();
            async move {
                match tx.send(ControlMessage::Broadcast(line)).await {
                    Ok(()) => (id, Ok(())),
                    Err(e) => (id, Err(e.to_string())),
                }
            }
        });

        for (id, res) in futures_util::future::join_all(sends).await {
            match res {
                Ok(()) => result.succeeded += 1,
                Err(e) => {
                    result.failed += 1;
                    result.errors.push((id, e));
                }
            }
        }

        self.metrics.broadcast_sent();
        result
    }

    /// Shut down every connection: signal close, join every worker, then
    /// clear the map.
    ///
    /// When this returns, no worker task is reading or writing any socket.
    pub async fn shutdown(&self, join_timeout: Duration) {
        let ids = self.connection_ids();
        debug!(connections = ids.len(), "stopping all connection workers");

        for id in ids {
            if let Some((_, registered)) = self.connections.remove(&id) {
                self.stop_worker(registered, join_timeout).await;
            }
        }

        self.connections.clear();
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &self.connection_count())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
