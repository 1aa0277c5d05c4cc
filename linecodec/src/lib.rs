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

//! Line framing for the gomokud wire protocol.
//!
//! The protocol is plain text: commands and responses are terminated by CRLF,
//! and anything outside the printable ASCII range is stripped before a line is
//! interpreted. [`LineCodec`] implements this as a [`tokio_util::codec`]
//! decoder/encoder pair so it can be used with `Framed` over a TCP stream.
//!
//! Partial input is carried across reads: bytes after the first terminator in
//! a chunk stay buffered and complete on a later read, so no input is lost to
//! chunk boundaries.

mod codec;
mod result;

pub use codec::{DEFAULT_MAX_LINE_LENGTH, LineCodec};
pub use result::{CodecError, CodecResult};
