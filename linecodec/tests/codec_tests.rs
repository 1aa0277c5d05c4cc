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

//! Framed stream tests for the line codec

use futures_util::{SinkExt, StreamExt};
use gomokud_linecodec::{CodecError, LineCodec};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{Framed, FramedRead};

#[tokio::test]
async fn test_framed_reads_lines_across_chunk_boundaries() {
    let (mut client, server) = tokio::io::duplex(64);
    let mut framed = FramedRead::new(server, LineCodec::new());

    client.write_all(b"PLAY 3").await.unwrap();
    client.write_all(b" 4\r\nQUI").await.unwrap();
    client.write_all(b"T\r\n").await.unwrap();
    drop(client);

    assert_eq!(framed.next().await.unwrap().unwrap(), "PLAY 3 4");
    assert_eq!(framed.next().await.unwrap().unwrap(), "QUIT");
    assert!(framed.next().await.is_none());
}

#[tokio::test]
async fn test_framed_strips_control_bytes() {
    let (mut client, server) = tokio::io::duplex(64);
    let mut framed = FramedRead::new(server, LineCodec::new());

    // A telnet negotiation burst followed by a command.
    client
        .write_all(b"\xff\xfd\x18\xff\xfb\x1fLOGIN alice\r\n")
        .await
        .unwrap();
    drop(client);

    assert_eq!(framed.next().await.unwrap().unwrap(), "LOGIN alice");
}

#[tokio::test]
async fn test_framed_write_then_read_roundtrip() {
    let (client, server) = tokio::io::duplex(64);
    let mut writer = Framed::new(client, LineCodec::new());
    let mut reader = FramedRead::new(server, LineCodec::new());

    writer.send("New client joined.").await.unwrap();
    assert_eq!(reader.next().await.unwrap().unwrap(), "New client joined.");
}

#[tokio::test]
async fn test_framed_surfaces_oversized_line() {
    let (mut client, server) = tokio::io::duplex(1024);
    let mut framed = FramedRead::new(server, LineCodec::with_max_line_length(16));

    client.write_all(&[b'a'; 64]).await.unwrap();
    let err = framed.next().await.unwrap().unwrap_err();
    assert!(matches!(err, CodecError::LineTooLong { .. }));

    client.write_all(b"next\r\n").await.unwrap();
    drop(client);

    // FramedRead yields one end-of-stream after a decode error, then
    // resumes with the discarded buffer gone.
    assert!(framed.next().await.is_none());
    assert_eq!(framed.next().await.unwrap().unwrap(), "next");
}
