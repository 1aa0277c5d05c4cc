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

//! Command processor trait, the seam between the connection engine and the
//! game/session layer

use crate::ConnectionId;
use async_trait::async_trait;
use std::net::SocketAddr;
use tracing::info;

/// Consumer of decoded command lines.
///
/// The connection engine decodes lines and hands them here together with the
/// connection identity; whatever this returns is written back to that
/// connection synchronously, in order. All game, account and mailbox
/// semantics live behind this trait.
///
/// # Example
///
/// ```no_run
/// use gomokud_server::{CommandProcessor, ConnectionId};
/// use async_trait::async_trait;
///
/// struct Echo;
///
/// #[async_trait]
/// impl CommandProcessor for Echo {
///     async fn on_line(&self, _id: ConnectionId, line: &str) -> Vec<String> {
///         vec![line.to_string()]
///     }
/// }
/// ```
#[async_trait]
pub trait CommandProcessor: Send + Sync + 'static {
    /// Called once the connection is registered, before any lines arrive
    async fn on_connect(&self, _id: ConnectionId, _peer_addr: SocketAddr) {}

    /// Called for every decoded command line; returns the response lines
    async fn on_line(&self, _id: ConnectionId, _line: &str) -> Vec<String> {
        Vec::new()
    }

    /// Called after the connection has left the registry
    async fn on_disconnect(&self, _id: ConnectionId) {}
}

/// Processor stub that logs raw commands and answers nothing.
///
/// Stands in until the game command layer is implemented.
#[derive(Debug, Default)]
pub struct LineLogProcessor;

#[async_trait]
impl CommandProcessor for LineLogProcessor {
    async fn on_line(&self, id: ConnectionId, line: &str) -> Vec<String> {
        info!(connection_id = %id, command = %line, "raw command");
        Vec::new()
    }
}
