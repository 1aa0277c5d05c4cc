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

//! Connection worker running the per-connection read loop
//!
//! Each accepted connection gets exactly one worker task. The worker owns the
//! read side of the connection's lifecycle and distinguishes the outcomes the
//! original engine conflated: a read timeout keeps the loop alive, an orderly
//! peer close or hard socket error ends it, and a close request through the
//! control channel ends it cooperatively.

use crate::{
    ClientConnection, CommandProcessor, ConnectionId, ConnectionState, Result, ServerError,
    ServerMetrics,
};
use metrics::gauge;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Control messages for the worker
#[derive(Debug)]
pub enum ControlMessage {
    /// Gracefully close the connection
    Close,
    /// Send a line to this connection
    SendLine(String),
    /// Broadcast line (delivered to all connections; failures are ignored)
    Broadcast(String),
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Max time one read attempt may wait before the loop re-checks control
    pub read_timeout: Duration,
    /// Max time for send operations
    pub write_timeout: Duration,
    /// Control channel buffer size
    pub control_buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            control_buffer_size: 64,
        }
    }
}

/// Worker that manages a single connection's lifecycle
pub struct ConnectionWorker {
    /// Connection ID
    id: ConnectionId,
    /// The connection being managed
    connection: ClientConnection,
    /// Command processor
    processor: Arc<dyn CommandProcessor>,
    /// Configuration
    config: WorkerConfig,
    /// Current state (shared with the registry, lock-free)
    state: Arc<AtomicU8>,
    /// Control message receiver
    control_rx: mpsc::Receiver<ControlMessage>,
    /// Shared traffic counters
    metrics: Arc<ServerMetrics>,
}

impl ConnectionWorker {
    /// Create a new connection worker
    pub fn new(
        id: ConnectionId,
        connection: ClientConnection,
        processor: Arc<dyn CommandProcessor>,
        config: WorkerConfig,
        state: Arc<AtomicU8>,
        metrics: Arc<ServerMetrics>,
    ) -> (Self, mpsc::Sender<ControlMessage>) {
        let (control_tx, control_rx) = mpsc::channel(config.control_buffer_size);

        let worker = Self {
            id,
            connection,
            processor,
            config,
            state,
            control_rx,
            metrics,
        };

        (worker, control_tx)
    }

    /// Get the current state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, new_state: ConnectionState) {
        self.state.store(new_state.as_u8(), Ordering::Release);
    }

    /// Run the worker until the connection closes.
    ///
    /// This is the task body the registry spawns and owns. It never panics
    /// out: read errors are logged and end the loop, then cleanup runs.
    pub async fn run(mut self) {
        self.set_state(ConnectionState::Active);

        self.processor
            .on_connect(self.id, self.connection.peer_addr())
            .await;

        if let Err(e) = self.read_loop().await {
            match &e {
                ServerError::Codec(_) => self.metrics.decode_error(),
                ServerError::Timeout => self.metrics.timeout_error(),
                _ => self.metrics.connection_error(),
            }
            warn!(connection_id = %self.id, error = %e, "connection failed");
        }

        self.cleanup().await;
    }

    /// Main read loop
    async fn read_loop(&mut self) -> Result<()> {
        loop {
            select! {
                result = timeout(self.config.read_timeout, self.connection.next_line()) => {
                    match result {
                        Ok(Ok(Some(line))) => {
                            self.metrics.line_received();
                            self.dispatch_line(line).await?;
                        }
                        Ok(Ok(None)) => {
                            // Orderly close by the peer
                            debug!(connection_id = %self.id, "peer disconnected");
                            return Ok(());
                        }
                        Ok(Err(e)) => {
                            // Hard socket error
                            return Err(e);
                        }
                        Err(_) => {
                            // Read timeout: not a disconnect, keep waiting
                            trace!(connection_id = %self.id, "read timed out, retrying");
                        }
                    }
                }

                msg = self.control_rx.recv() => {
                    match msg {
                        Some(ControlMessage::Close) | None => {
                            debug!(connection_id = %self.id, "close requested");
                            return Ok(());
                        }
                        Some(ControlMessage::SendLine(line)) => {
                            match timeout(
                                self.config.write_timeout,
                                self.connection.send_line(&line),
                            ).await {
                                Ok(result) => result?,
                                Err(_) => return Err(ServerError::Timeout),
                            }
                            self.metrics.line_sent();
                        }
                        Some(ControlMessage::Broadcast(line)) => {
                            // Best effort: a failed broadcast write does not
                            // end the connection
                            match timeout(
                                self.config.write_timeout,
                                self.connection.send_line(&line),
                            ).await {
                                Ok(Ok(())) => self.metrics.line_sent(),
                                Ok(Err(e)) => {
                                    debug!(
                                        connection_id = %self.id,
                                        error = %e,
                                        "broadcast delivery failed"
                                    );
                                }
                                Err(_) => {
                                    debug!(
                                        connection_id = %self.id,
                                        "broadcast delivery timed out"
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Forward one decoded line to the processor and write its responses
    /// back, in order.
    async fn dispatch_line(&self, line: String) -> Result<()> {
        let responses = self.processor.on_line(self.id, &line).await;
        for response in responses {
            match timeout(
                self.config.write_timeout,
                self.connection.send_line(&response),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => return Err(ServerError::Timeout),
            }
            self.metrics.line_sent();
        }
        Ok(())
    }

    /// Cleanup resources
    async fn cleanup(&mut self) {
        self.set_state(ConnectionState::Closing);

        self.processor.on_disconnect(self.id).await;

        // Let the peer observe EOF instead of waiting for a reset
        if let Err(e) = self.connection.close().await {
            trace!(connection_id = %self.id, error = %e, "close after teardown failed");
        }

        // Drain any remaining control messages
        while self.control_rx.try_recv().is_ok() {}

        // Cleanup runs once per worker, whatever ended the read loop
        gauge!("gomokud.connections.active").decrement(1.0);

        self.set_state(ConnectionState::Closed);
    }
}

impl std::fmt::Debug for ConnectionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWorker")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    struct TestProcessor {
        connected: AtomicBool,
        disconnected: AtomicBool,
        line_count: AtomicUsize,
        echo: bool,
    }

    impl TestProcessor {
        fn new(echo: bool) -> Self {
            Self {
                connected: AtomicBool::new(false),
                disconnected: AtomicBool::new(false),
                line_count: AtomicUsize::new(0),
                echo,
            }
        }
    }

    #[async_trait]
    impl CommandProcessor for TestProcessor {
        async fn on_connect(&self, _id: ConnectionId, _peer_addr: SocketAddr) {
            self.connected.store(true, Ordering::SeqCst);
        }

        async fn on_line(&self, _id: ConnectionId, line: &str) -> Vec<String> {
            self.line_count.fetch_add(1, Ordering::SeqCst);
            if self.echo {
                vec![format!("echo: {line}")]
            } else {
                Vec::new()
            }
        }

        async fn on_disconnect(&self, _id: ConnectionId) {
            self.disconnected.store(true, Ordering::SeqCst);
        }
    }

    async fn create_test_connection() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

        let (server, _) = listener.accept().await.unwrap();
        let client = client_task.await.unwrap();

        (server, client)
    }

    fn spawn_worker(
        server: TcpStream,
        processor: Arc<TestProcessor>,
    ) -> (
        tokio::task::JoinHandle<()>,
        mpsc::Sender<ControlMessage>,
        Arc<AtomicU8>,
    ) {
        let id = ConnectionId::new(1);
        let connection = ClientConnection::wrap(server, id).unwrap();
        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8()));

        let (worker, control_tx) = ConnectionWorker::new(
            id,
            connection,
            processor,
            WorkerConfig::default(),
            state.clone(),
            Arc::new(ServerMetrics::new()),
        );

        let handle = tokio::spawn(worker.run());
        (handle, control_tx, state)
    }

    #[tokio::test]
    async fn test_worker_lifecycle() {
        let (server, client) = create_test_connection().await;
        let processor = Arc::new(TestProcessor::new(false));
        let (handle, control_tx, state) = spawn_worker(server, processor.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(processor.connected.load(Ordering::SeqCst));
        assert_eq!(
            ConnectionState::from_u8(state.load(Ordering::Acquire)),
            ConnectionState::Active
        );

        control_tx.send(ControlMessage::Close).await.unwrap();
        handle.await.unwrap();

        assert!(processor.disconnected.load(Ordering::SeqCst));
        assert_eq!(
            ConnectionState::from_u8(state.load(Ordering::Acquire)),
            ConnectionState::Closed
        );

        drop(client);
    }

    #[tokio::test]
    async fn test_worker_dispatches_lines_and_responses() {
        let (server, mut client) = create_test_connection().await;
        let processor = Arc::new(TestProcessor::new(true));
        let (handle, control_tx, _state) = spawn_worker(server, processor.clone());

        client.write_all(b"PLAY 3 4\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"echo: PLAY 3 4\r\n");
        assert_eq!(processor.line_count.load(Ordering::SeqCst), 1);

        control_tx.send(ControlMessage::Close).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_exits_on_peer_close() {
        let (server, client) = create_test_connection().await;
        let processor = Arc::new(TestProcessor::new(false));
        let (handle, _control_tx, state) = spawn_worker(server, processor.clone());

        drop(client);
        handle.await.unwrap();

        // Full cleanup runs on this exit path too
        assert!(processor.disconnected.load(Ordering::SeqCst));
        assert_eq!(
            ConnectionState::from_u8(state.load(Ordering::Acquire)),
            ConnectionState::Closed
        );
    }

    #[tokio::test]
    async fn test_worker_sends_control_line() {
        let (server, mut client) = create_test_connection().await;
        let processor = Arc::new(TestProcessor::new(false));
        let (handle, control_tx, _state) = spawn_worker(server, processor);

        control_tx
            .send(ControlMessage::SendLine("hello there".to_string()))
            .await
            .unwrap();

        let mut buf = [0u8; 32];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello there\r\n");

        control_tx.send(ControlMessage::Close).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_survives_read_timeout() {
        let (server, client) = create_test_connection().await;
        let id = ConnectionId::new(1);
        let connection = ClientConnection::wrap(server, id).unwrap();
        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8()));
        let config = WorkerConfig {
            read_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let processor = Arc::new(TestProcessor::new(false));
        let (worker, control_tx) = ConnectionWorker::new(
            id,
            connection,
            processor,
            config,
            state.clone(),
            Arc::new(ServerMetrics::new()),
        );
        let handle = tokio::spawn(worker.run());

        // Several read timeouts pass without the worker exiting.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            ConnectionState::from_u8(state.load(Ordering::Acquire)),
            ConnectionState::Active
        );

        control_tx.send(ControlMessage::Close).await.unwrap();
        handle.await.unwrap();
        drop(client);
    }
}
