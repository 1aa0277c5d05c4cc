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

//! Lock-free server metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
///
/// All counters are atomics and can be updated concurrently without locks.
/// Use [`snapshot`](Self::snapshot) for a point-in-time view.
#[derive(Debug)]
pub struct ServerMetrics {
    // Connection counts
    total_connections: AtomicU64,
    active_connections: AtomicU64,

    // Throughput
    lines_sent: AtomicU64,
    lines_received: AtomicU64,
    broadcasts_sent: AtomicU64,

    // Errors
    connection_errors: AtomicU64,
    timeout_errors: AtomicU64,
    decode_errors: AtomicU64,

    // Timing (stored as nanoseconds)
    total_connection_duration_ns: AtomicU64,

    // Server start time
    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            lines_sent: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            broadcasts_sent: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            timeout_errors: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record a new connection being registered
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection worker exiting
    pub fn connection_closed(&self, duration: Duration) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.total_connection_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Get the current number of active connections
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the total number of connections since server start
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Record a line sent to a peer
    pub fn line_sent(&self) {
        self.lines_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a line received from a peer
    pub fn line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a broadcast call
    pub fn broadcast_sent(&self) {
        self.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection-level error (accept, wrap, admission)
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a timed-out operation
    pub fn timeout_error(&self) {
        self.timeout_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a framing/decode anomaly
    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_connections.load(Ordering::Relaxed);
        let total_duration_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        let closed = total.saturating_sub(self.active_connections.load(Ordering::Relaxed));

        MetricsSnapshot {
            total_connections: total,
            active_connections: self.active_connections.load(Ordering::Relaxed),
            lines_sent: self.lines_sent.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            broadcasts_sent: self.broadcasts_sent.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            timeout_errors: self.timeout_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            average_connection_duration: if closed == 0 {
                Duration::ZERO
            } else {
                Duration::from_nanos(total_duration_ns / closed)
            },
            uptime: self.started_at.elapsed(),
        }
    }
}

/// Point-in-time view of the server metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Connections since server start
    pub total_connections: u64,
    /// Currently registered connections
    pub active_connections: u64,
    /// Lines sent to peers
    pub lines_sent: u64,
    /// Lines received from peers
    pub lines_received: u64,
    /// Broadcast calls made
    pub broadcasts_sent: u64,
    /// Connection-level errors
    pub connection_errors: u64,
    /// Timed-out operations
    pub timeout_errors: u64,
    /// Framing/decode anomalies
    pub decode_errors: u64,
    /// Mean lifetime of closed connections
    pub average_connection_duration: Duration,
    /// Time since the metrics instance was created
    pub uptime: Duration,
}
