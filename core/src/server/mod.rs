/*
 * mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Staffetta, a local application server.
 *
 * Staffetta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Staffetta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Staffetta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Server supervisor: lifespan startup, rendezvous bind, accept loop,
//! graceful shutdown and cleanup.
//!
//! One event-loop thread drives all I/O; synchronous applications run on the
//! bounded worker pool. The launcher constructs the `AppHandle` (interface
//! selection happens there) and calls `Server::run`.

pub mod connection;
pub mod event;
pub mod lifespan;
pub mod listener;
pub mod sync;
pub mod websocket;
pub mod workers;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::app::{AppHandle, SharedState};
use crate::error::ServerError;
use crate::protocol::http::h1::DEFAULT_MAX_HEADER_BYTES;
use crate::server::lifespan::Lifespan;
use crate::server::workers::WorkerPool;

/// Startup contract consumed from the launcher.
pub struct ServerConfig {
    /// Rendezvous path: a filesystem socket, or the port file on platforms
    /// without filesystem sockets.
    pub socket_path: PathBuf,
    /// Run the lifespan channel (event-driven applications only).
    pub lifespan: bool,
    /// Worker pool size override; defaults to min(128, cpus*8 + 16).
    pub pool_size: Option<usize>,
    /// Request-header cap override.
    pub max_header_bytes: usize,
}

impl ServerConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            lifespan: false,
            pool_size: None,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }

    pub fn with_lifespan(mut self, enabled: bool) -> Self {
        self.lifespan = enabled;
        self
    }
}

pub struct Server {
    app: AppHandle,
    config: ServerConfig,
}

impl Server {
    pub fn new(app: AppHandle, config: ServerConfig) -> Self {
        Self { app, config }
    }

    /// Run until a terminate/interrupt signal, then shut down gracefully.
    /// A lifespan startup failure returns before the listener is ever bound;
    /// the launcher exits non-zero on any Err.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(listener::shutdown_signal()).await
    }

    /// Run until `shutdown` resolves. Split out of `run` so tests and
    /// embedders can supply their own shutdown condition.
    pub async fn run_until(
        self,
        shutdown: impl std::future::Future<Output = ()>,
    ) -> Result<(), ServerError> {
        let state = SharedState::new();

        let lifespan = match (&self.app, self.config.lifespan) {
            (AppHandle::Event(app), true) => Some(Lifespan::start(app, &state).await?),
            _ => None,
        };

        let bound = listener::bind(&self.config.socket_path)?;
        eprintln!("[server] listening at {}", self.config.socket_path.display());

        let pool = Arc::new(WorkerPool::new(
            self.config.pool_size.unwrap_or_else(WorkerPool::default_size),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Each connection task holds a clone; recv() resolves to None once
        // the last one finishes.
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

        let mut shutdown = std::pin::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = bound.accept() => match accepted {
                    Ok(stream) => {
                        let app = self.app.clone();
                        let pool = Arc::clone(&pool);
                        let state = state.clone();
                        let shutdown_rx = shutdown_rx.clone();
                        let done_tx = done_tx.clone();
                        let max_header_bytes = self.config.max_header_bytes;
                        tokio::spawn(async move {
                            connection::serve_connection(
                                stream,
                                app,
                                pool,
                                state,
                                max_header_bytes,
                                shutdown_rx,
                            )
                            .await;
                            drop(done_tx);
                        });
                    }
                    Err(e) => eprintln!("[server] accept error: {}", e),
                },
                _ = &mut shutdown => break,
            }
        }

        // Stop accepting, close idle keep-alive connections, wait for
        // in-flight work.
        drop(bound);
        let _ = shutdown_tx.send(true);
        drop(done_tx);
        let _ = done_rx.recv().await;

        if let Some(lifespan) = lifespan {
            lifespan.shutdown().await;
        }
        use std::io::Write;
        let _ = std::io::stderr().flush();
        listener::cleanup(&self.config.socket_path);
        Ok(())
    }
}
