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

//! Multi-client, line-oriented telnet front end for a turn-based board-game
//! service.
//!
//! Clients connect over TCP, receive a greeting, and submit CRLF-terminated
//! command lines; the server can push unsolicited broadcast lines to every
//! connected client. This crate is the connection lifecycle and concurrency
//! engine: the accept loop, per-connection workers, the shared registry of
//! live connections, and coordinated startup/shutdown. Command semantics
//! live behind the [`CommandProcessor`] trait; user accounts and offline
//! messages live in the lock-guarded [`UserStore`] and [`MessageStore`],
//! injected by the caller rather than reached through globals.
//!
//! # Architecture
//!
//! ```text
//! TelnetServer (accept loop)
//!     ↓
//! ConnectionRegistry (broadcast, shutdown join)
//!     ↓
//! ConnectionWorker → ClientConnection → LineCodec
//! ```
//!
//! Every worker task is owned by the registry and joined during shutdown, so
//! once [`TelnetServer::shutdown`] returns, no server task touches a socket.
//!
//! # Example
//!
//! ```no_run
//! use gomokud_server::{CommandProcessor, ConnectionId, ServerConfig, TelnetServer};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl CommandProcessor for Echo {
//!     async fn on_line(&self, _id: ConnectionId, line: &str) -> Vec<String> {
//!         vec![line.to_string()]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = TelnetServer::new(ServerConfig::default()).await?;
//!     server.start(Arc::new(Echo)).await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod error;
mod metrics;
mod processor;
mod registry;
mod server;
mod shutdown;
mod store;
mod types;
mod worker;

pub use config::ServerConfig;
pub use connection::ClientConnection;
pub use error::{Result, ServerError};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use processor::{CommandProcessor, LineLogProcessor};
pub use registry::{BroadcastResult, ConnectionRegistry};
pub use server::TelnetServer;
pub use shutdown::{ShutdownCoordinator, ShutdownState};
pub use store::{Message, MessageStore, User, UserStore};
pub use types::{ConnectionId, ConnectionInfo, ConnectionState, ServerSnapshot};
pub use worker::{ConnectionWorker, ControlMessage, WorkerConfig};
