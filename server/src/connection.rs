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

//! Per-connection socket ownership and line I/O

use crate::{ConnectionId, Result, ServerError};
use futures_util::{SinkExt, StreamExt};
use gomokud_linecodec::{CodecError, LineCodec};
use metrics::{counter, gauge};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, trace, warn};

/// One accepted client socket, framed as CRLF lines.
///
/// The connection owns its socket exclusively: every read or write goes
/// through [`next_line`](Self::next_line) and [`send_line`](Self::send_line).
/// The handle clones cheaply; the framed stream sits behind a mutex so a
/// worker read and a broadcast write never interleave mid-frame.
#[derive(Clone)]
pub struct ClientConnection {
    // Core I/O
    framed: Arc<Mutex<Framed<TcpStream, LineCodec>>>,

    // Metadata (lock-free access)
    id: ConnectionId,
    peer_addr: SocketAddr,
    created_at: Instant,

    // Counters (lock-free)
    lines_sent: Arc<AtomicU64>,
    lines_received: Arc<AtomicU64>,

    // Set after a recoverable decode error: the framed stream reports one
    // end-of-stream before it resumes reading, which must not be taken for
    // a peer disconnect.
    resync_pending: Arc<AtomicBool>,
}

impl ClientConnection {
    /// Wrap an accepted TCP stream
    #[instrument(skip(socket), fields(connection_id = %id))]
    pub fn wrap(socket: TcpStream, id: ConnectionId) -> Result<Self> {
        let peer_addr = socket.peer_addr()?;

        info!(peer_addr = %peer_addr, "new client connection");

        counter!("gomokud.connections.total").increment(1);
        gauge!("gomokud.connections.active").increment(1.0);

        Ok(Self {
            framed: Arc::new(Mutex::new(Framed::new(socket, LineCodec::new()))),
            id,
            peer_addr,
            created_at: Instant::now(),
            lines_sent: Arc::new(AtomicU64::new(0)),
            lines_received: Arc::new(AtomicU64::new(0)),
            resync_pending: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get when the connection was accepted
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Get lines sent
    pub fn lines_sent(&self) -> u64 {
        self.lines_sent.load(Ordering::Relaxed)
    }

    /// Get lines received
    pub fn lines_received(&self) -> u64 {
        self.lines_received.load(Ordering::Relaxed)
    }

    /// Send one line to the peer, appending the CRLF terminator.
    ///
    /// The write is synchronous from the caller's point of view: the line is
    /// flushed before this returns. A failure is reported to the caller but
    /// does not by itself tear the connection down; the read loop's own
    /// result stays authoritative for teardown.
    #[instrument(skip(self, line), fields(connection_id = %self.id))]
    pub async fn send_line(&self, line: &str) -> Result<()> {
        trace!(length = line.len(), "sending line");

        let mut framed = self.framed.lock().await;
        match framed.send(line).await {
            Ok(()) => {
                self.lines_sent.fetch_add(1, Ordering::Relaxed);
                counter!("gomokud.lines.sent").increment(1);
                Ok(())
            }
            Err(e) => {
                counter!("gomokud.errors.send").increment(1);
                warn!(error = %e, "failed to send line");
                Err(e.into())
            }
        }
    }

    /// Receive the next decoded line.
    ///
    /// Returns `Ok(Some(line))` for a complete command line, `Ok(None)` on
    /// orderly peer close, and `Err` on a hard socket error. Decode anomalies
    /// are not errors at this level: an oversized line is logged, skipped,
    /// and reading continues.
    #[instrument(skip(self), fields(connection_id = %self.id))]
    pub async fn next_line(&self) -> Result<Option<String>> {
        loop {
            match self.framed.lock().await.next().await {
                Some(Ok(line)) => {
                    self.lines_received.fetch_add(1, Ordering::Relaxed);
                    counter!("gomokud.lines.received").increment(1);
                    trace!(length = line.len(), "line received");
                    return Ok(Some(line));
                }
                Some(Err(e)) if e.is_recoverable() => {
                    counter!("gomokud.errors.decode").increment(1);
                    warn!(error = %e, "dropping malformed input");
                    self.resync_pending.store(true, Ordering::Relaxed);
                    continue;
                }
                Some(Err(CodecError::Io(e))) => {
                    counter!("gomokud.errors.receive").increment(1);
                    warn!(error = %e, "receive failed");
                    return Err(ServerError::Io(e));
                }
                Some(Err(e)) => {
                    counter!("gomokud.errors.receive").increment(1);
                    warn!(error = %e, "receive failed");
                    return Err(e.into());
                }
                None => {
                    // One end-of-stream after a decode error is a framing
                    // artifact, not a disconnect.
                    if self.resync_pending.swap(false, Ordering::Relaxed) {
                        continue;
                    }
                    debug!("peer closed the connection");
                    return Ok(None);
                }
            }
        }
    }

    /// Flush buffered output and shut down the write half.
    ///
    /// Called during worker teardown so the peer observes EOF promptly.
    pub async fn close(&self) -> Result<()> {
        let mut framed = self.framed.lock().await;
        SinkExt::<&str>::close(&mut *framed).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn create_test_connection() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

        let (server, _) = listener.accept().await.unwrap();
        let client = client_task.await.unwrap();

        (server, client)
    }

    #[tokio::test]
    async fn test_send_line_appends_terminator() {
        let (server, mut client) = create_test_connection().await;
        let conn = ClientConnection::wrap(server, ConnectionId::new(1)).unwrap();

        conn.send_line("Welcome to TelnetServer.").await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"Welcome to TelnetServer.\r\n");
        assert_eq!(conn.lines_sent(), 1);
    }

    #[tokio::test]
    async fn test_next_line_decodes_and_counts() {
        let (server, mut client) = create_test_connection().await;
        let conn = ClientConnection::wrap(server, ConnectionId::new(1)).unwrap();

        client.write_all(b"PLAY 3 4\r\n").await.unwrap();
        assert_eq!(conn.next_line().await.unwrap(), Some("PLAY 3 4".into()));
        assert_eq!(conn.lines_received(), 1);
    }

    #[tokio::test]
    async fn test_next_line_reports_orderly_close() {
        let (server, client) = create_test_connection().await;
        let conn = ClientConnection::wrap(server, ConnectionId::new(1)).unwrap();

        drop(client);
        assert_eq!(conn.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_next_line_skips_oversized_input() {
        let (server, mut client) = create_test_connection().await;
        let conn = ClientConnection::wrap(server, ConnectionId::new(1)).unwrap();

        // Reader runs concurrently so the junk is consumed and discarded
        // before the valid line arrives.
        let reader = tokio::spawn({
            let conn = conn.clone();
            async move { conn.next_line().await }
        });

        // Exceeds the default line length limit with no terminator in sight
        client.write_all(&[b'a'; 1500]).await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        client.write_all(b"ok\r\n").await.unwrap();
        assert_eq!(reader.await.unwrap().unwrap(), Some("ok".into()));
    }

    #[tokio::test]
    async fn test_close_signals_eof_to_peer() {
        let (server, mut client) = create_test_connection().await;
        let conn = ClientConnection::wrap(server, ConnectionId::new(1)).unwrap();

        conn.close().await.unwrap();

        let mut buf = [0u8; 8];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
