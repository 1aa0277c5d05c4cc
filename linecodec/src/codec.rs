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

use crate::{CodecError, CodecResult};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Default cap on the number of sanitized bytes buffered for one line.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// The two-byte line terminator used on the wire.
const TERMINATOR: &[u8] = b"\r\n";

/// Codec for CRLF-terminated, printable-ASCII command lines.
///
/// Decoding keeps only printable ASCII (`0x20..=0x7E`) plus CR and LF from the
/// input, accumulating the sanitized bytes in an internal buffer until a CRLF
/// terminator is seen. Bytes past the first terminator stay buffered for the
/// next call, so lines that arrive split across reads (or several per read)
/// are framed correctly.
///
/// Lines longer than the configured limit are rejected with a
/// [`CodecError::LineTooLong`] whether or not their terminator has arrived;
/// the offending bytes are discarded and decoding resumes with the next
/// input.
///
/// Encoding appends CRLF to outgoing lines that do not already end with it.
///
/// # Example
/// ```
/// use bytes::BytesMut;
/// use gomokud_linecodec::LineCodec;
/// use tokio_util::codec::Decoder;
///
/// let mut codec = LineCodec::new();
/// let mut buf = BytesMut::from(&b"PLAY 3 4\r\n"[..]);
/// assert_eq!(codec.decode(&mut buf).unwrap(), Some("PLAY 3 4".to_string()));
/// ```
#[derive(Debug)]
pub struct LineCodec {
    /// Sanitized bytes carried across decode calls
    buffer: BytesMut,
    /// Cap on `buffer` growth while waiting for a terminator
    max_line_length: usize,
}

impl LineCodec {
    /// Create a codec with the default line length limit.
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom line length limit.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_line_length,
        }
    }

    /// Get the configured line length limit.
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Number of sanitized bytes currently waiting for a terminator.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Move printable ASCII and CR/LF bytes from `src` into the line buffer.
    fn sanitize_from(&mut self, src: &mut BytesMut) {
        if src.is_empty() {
            return;
        }
        self.buffer.reserve(src.len());
        for &byte in src.iter() {
            if (0x20..=0x7E).contains(&byte) || byte == b'\r' || byte == b'\n' {
                self.buffer.put_u8(byte);
            }
        }
        src.clear();
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> CodecResult<Option<String>> {
        self.sanitize_from(src);

        if let Some(pos) = self
            .buffer
            .windows(TERMINATOR.len())
            .position(|window| window == TERMINATOR)
        {
            if pos > self.max_line_length {
                self.buffer.advance(pos + TERMINATOR.len());
                return Err(CodecError::LineTooLong {
                    length: pos,
                    limit: self.max_line_length,
                });
            }
            let line = self.buffer.split_to(pos);
            self.buffer.advance(TERMINATOR.len());
            // Only printable ASCII remains after sanitizing, so this cannot
            // produce replacement characters.
            let line = String::from_utf8_lossy(&line).into_owned();
            trace!(length = line.len(), "decoded line");
            return Ok(Some(line));
        }

        if self.buffer.len() > self.max_line_length {
            let length = self.buffer.len();
            self.buffer.clear();
            return Err(CodecError::LineTooLong {
                length,
                limit: self.max_line_length,
            });
        }

        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> CodecResult<Option<String>> {
        // An unterminated trailing fragment at EOF is not a line.
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None => {
                if !self.buffer.is_empty() {
                    trace!(
                        discarded = self.buffer.len(),
                        "discarding unterminated input at EOF"
                    );
                    self.buffer.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<&str> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> CodecResult<()> {
        dst.reserve(item.len() + TERMINATOR.len());
        dst.put_slice(item.as_bytes());
        if !item.ends_with("\r\n") {
            dst.put_slice(TERMINATOR);
        }
        Ok(())
    }
}

impl Encoder<String> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> CodecResult<()> {
        Encoder::<&str>::encode(self, item.as_str(), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut LineCodec, input: &[u8]) -> Vec<String> {
        let mut buf = BytesMut::from(input);
        let mut lines = Vec::new();
        while let Some(line) = codec.decode(&mut buf).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_decode_single_line() {
        let mut codec = LineCodec::new();
        let lines = decode_all(&mut codec, b"PLAY 3 4\r\n");
        assert_eq!(lines, vec!["PLAY 3 4".to_string()]);
    }

    #[test]
    fn test_decode_keeps_bytes_after_terminator() {
        // Surplus bytes are not lost; they complete on a later chunk.
        let mut codec = LineCodec::new();
        let lines = decode_all(&mut codec, b"PLAY 3 4\r\nextra");
        assert_eq!(lines, vec!["PLAY 3 4".to_string()]);
        assert_eq!(codec.buffered_len(), 5);

        let lines = decode_all(&mut codec, b" bytes\r\n");
        assert_eq!(lines, vec!["extra bytes".to_string()]);
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_decode_partial_line_carries_over() {
        let mut codec = LineCodec::new();
        assert!(decode_all(&mut codec, b"PLA").is_empty());
        assert!(decode_all(&mut codec, b"Y 3 4\r").is_empty());
        let lines = decode_all(&mut codec, b"\n");
        assert_eq!(lines, vec!["PLAY 3 4".to_string()]);
    }

    #[test]
    fn test_decode_strips_nonprintable_bytes() {
        let mut codec = LineCodec::new();
        // Telnet IAC sequences, NULs and a high-bit byte mixed into the line.
        let lines = decode_all(&mut codec, b"\xff\xfb\x01he\x00llo\x07\x80\r\n");
        assert_eq!(lines, vec!["hello".to_string()]);
    }

    #[test]
    fn test_decode_multiple_lines_in_one_chunk() {
        let mut codec = LineCodec::new();
        let lines = decode_all(&mut codec, b"one\r\ntwo\r\nthree\r\n");
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_decode_empty_line() {
        let mut codec = LineCodec::new();
        let lines = decode_all(&mut codec, b"\r\n");
        assert_eq!(lines, vec![String::new()]);
    }

    #[test]
    fn test_decode_bare_cr_or_lf_is_not_a_terminator() {
        let mut codec = LineCodec::new();
        assert!(decode_all(&mut codec, b"half\rline\n").is_empty());
        // A later CRLF terminates the whole sanitized run.
        let lines = decode_all(&mut codec, b"\r\n");
        assert_eq!(lines, vec!["half\rline\n".to_string()]);
    }

    #[test]
    fn test_decode_line_too_long() {
        let mut codec = LineCodec::with_max_line_length(8);
        let mut buf = BytesMut::from(&b"0123456789abcdef"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::LineTooLong { limit: 8, .. }));
        // The buffer was discarded; decoding resumes cleanly.
        let lines = decode_all(&mut codec, b"ok\r\n");
        assert_eq!(lines, vec!["ok".to_string()]);
    }

    #[test]
    fn test_decode_rejects_oversized_terminated_line() {
        let mut codec = LineCodec::with_max_line_length(8);
        let mut buf = BytesMut::from(&b"0123456789abcdef\r\nok\r\n"[..]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::LineTooLong { length: 16, .. }));

        // The oversized line and its terminator are gone; the next one decodes.
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("ok".to_string()));
    }

    #[test]
    fn test_decode_eof_discards_unterminated_fragment() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"no terminator"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_encode_appends_terminator() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("Welcome to TelnetServer.", &mut buf).unwrap();
        assert_eq!(&buf[..], b"Welcome to TelnetServer.\r\n");
    }

    #[test]
    fn test_encode_does_not_double_terminator() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("already terminated\r\n", &mut buf).unwrap();
        assert_eq!(&buf[..], b"already terminated\r\n");
    }
}
