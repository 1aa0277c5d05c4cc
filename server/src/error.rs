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

//! Error types for the connection engine

use crate::types::ConnectionId;
use thiserror::Error;

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    /// I/O error from the underlying TCP stream or listener
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error from the line codec
    #[error("Codec error: {0}")]
    Codec(#[from] gomokud_linecodec::CodecError),

    /// Connection with the given ID was not found in the registry
    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// Connection has been closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Server is not running
    #[error("Server not running")]
    ServerNotRunning,

    /// Server is already running
    #[error("Server already running")]
    AlreadyRunning,

    /// Maximum number of connections reached
    #[error("Maximum connections ({0}) reached")]
    MaxConnectionsReached(usize),
}

impl ServerError {
    /// Check if the error is local to one connection
    ///
    /// Connection-scoped errors tear down a single handle; everything else
    /// concerns the server as a whole.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ServerError::ConnectionNotFound(_)
                | ServerError::ConnectionClosed
                | ServerError::Io(_)
                | ServerError::Codec(_)
        )
    }
}
