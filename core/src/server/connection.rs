/*
 * connection.rs
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

//! Per-connection loop: read a request, classify, dispatch, honor keep-alive.
//! All connection-level I/O errors stop here.

use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::app::{AppHandle, SharedState};
use crate::protocol::http::h1::read_request;
use crate::protocol::websocket::is_upgrade_request;
use crate::server::event::handle_http_event;
use crate::server::sync::handle_sync;
use crate::server::websocket::handle_websocket;
use crate::server::workers::WorkerPool;

/// Serve one accepted connection until it closes. Requests are served
/// strictly sequentially; a WebSocket upgrade leaves the loop for good.
/// `shutdown` closes the connection between requests during graceful
/// shutdown (in-flight requests still complete).
pub async fn serve_connection<S>(
    mut stream: S,
    app: AppHandle,
    pool: Arc<WorkerPool>,
    state: SharedState,
    max_header_bytes: usize,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(8192);
    loop {
        let req = tokio::select! {
            read = read_request(&mut stream, &mut buf, max_header_bytes) => match read {
                Ok(Some(req)) => req,
                // Clean EOF, malformed request, or transport error: close
                // silently either way.
                Ok(None) | Err(_) => return,
            },
            _ = wait_shutdown(&mut shutdown) => return,
        };

        let close_requested = req.connection_contains("close");

        match &app {
            AppHandle::Sync(sync_app) => {
                if handle_sync(Arc::clone(sync_app), &pool, &req, &mut stream)
                    .await
                    .is_err()
                {
                    return;
                }
            }
            AppHandle::Event(event_app) => {
                // Only the event-driven contract has a websocket shape; a
                // sync app sees upgrade requests as plain HTTP.
                if is_upgrade_request(&req) {
                    let _ = handle_websocket(Arc::clone(event_app), req, &state, stream).await;
                    return;
                }
                match handle_http_event(Arc::clone(event_app), &req, &state, &mut stream).await {
                    Ok(true) => {}
                    Ok(false) | Err(_) => return,
                }
            }
        }

        if close_requested {
            return;
        }
    }
}

/// Resolve once graceful shutdown is signalled. A dropped sender is not a
/// shutdown; the connection then runs until the peer closes it.
async fn wait_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
