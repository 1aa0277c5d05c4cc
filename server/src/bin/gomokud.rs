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

//! Gomoku service daemon
//!
//! Binds the default address, serves until SIGINT or SIGTERM, then shuts
//! down gracefully. Log verbosity follows `RUST_LOG`.

use gomokud_server::{
    LineLogProcessor, MessageStore, ServerConfig, TelnetServer, UserStore,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let users = Arc::new(UserStore::new());
    let messages = Arc::new(MessageStore::new());
    users.load();
    messages.load();

    let config = ServerConfig::default();
    info!("gomokud starting on {}", config.bind_address);

    let server = TelnetServer::new(config).await?;
    server.start(Arc::new(LineLogProcessor)).await?;

    wait_for_signal().await;

    info!("signal received, stopping");
    if let Err(e) = server.shutdown().await {
        error!(error = %e, "shutdown failed");
    }

    let snapshot = server.metrics().snapshot();
    info!(
        total_connections = snapshot.total_connections,
        lines_received = snapshot.lines_received,
        "gomokud stopped"
    );

    Ok(())
}

/// Block until SIGINT or SIGTERM
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
