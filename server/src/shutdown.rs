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

//! Shutdown coordination
//!
//! One coordinator per server instance sequences teardown:
//! `Running → Stopping → Stopped`, with `Stopped` terminal. Requesting a stop
//! is idempotent and safe from a signal context: handlers only flip the flag
//! and never touch server state directly. The transition to `Stopped` happens
//! only after the accept loop has exited and every worker has been joined.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lifecycle state of the server process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    /// Accepting connections and serving clients
    Running = 0,
    /// Stop requested; teardown in progress
    Stopping = 1,
    /// Teardown complete (terminal)
    Stopped = 2,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Coordinates the stop sequence between the accept loop, the registry and
/// whoever requested the stop.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: AtomicU8,
    token: CancellationToken,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    /// Create a coordinator in the `Running` state
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
            token: CancellationToken::new(),
        }
    }

    /// Get the current state
    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if the server is still running
    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Request the stop sequence.
    ///
    /// Performs the `Running → Stopping` transition exactly once and wakes
    /// everything waiting on [`cancelled`](Self::cancelled). Returns `true`
    /// if this call made the transition, `false` if a stop was already
    /// requested or completed.
    pub fn request_stop(&self) -> bool {
        let transitioned = self
            .state
            .compare_exchange(
                ShutdownState::Running as u8,
                ShutdownState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if transitioned {
            debug!("shutdown requested");
            self.token.cancel();
        }
        transitioned
    }

    /// Mark teardown complete (`Stopping → Stopped`).
    ///
    /// Called only after the accept loop has exited and all workers have
    /// been joined.
    pub fn mark_stopped(&self) {
        let _ = self.state.compare_exchange(
            ShutdownState::Stopping as u8,
            ShutdownState::Stopped as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Wait until a stop has been requested.
    ///
    /// Cancel-safe; completes immediately if the stop already happened.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}
