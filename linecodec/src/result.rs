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

//! Error types and result aliases for codec operations

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while framing or deframing lines
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred on the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The buffered input exceeded the configured line length limit
    ///
    /// The offending buffer has been discarded; decoding resumes with the
    /// next input. The caller decides whether to drop the connection.
    #[error("line exceeds {limit} bytes ({length} buffered)")]
    LineTooLong {
        /// Number of bytes buffered when the limit was hit
        length: usize,
        /// Configured limit
        limit: usize,
    },
}

impl CodecError {
    /// Check whether decoding can continue on the same stream after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CodecError::LineTooLong { .. })
    }
}
