/*
 * events.rs
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

//! Typed events exchanged with event-driven applications, and the channel
//! halves handed to them as the receive/send callables.

use tokio::sync::mpsc;

use crate::error::AppError;

/// A WebSocket message payload: text or binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Events delivered to the application via `AppReceive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveEvent {
    /// The request body, fully buffered. `more_body` is always false.
    HttpRequest { body: Vec<u8>, more_body: bool },
    /// Delivered once the response completes or the connection is lost.
    HttpDisconnect,
    WebSocketConnect,
    WebSocketReceive(WsMessage),
    /// Close code from the peer's close frame; 1005 when the frame carried no
    /// code, 1006 when the socket died without one.
    WebSocketDisconnect { code: u16 },
    LifespanStartup,
    LifespanShutdown,
}

/// Events the application emits via `AppSend`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendEvent {
    HttpResponseStart {
        status: u16,
        headers: Vec<(Vec<u8>, Vec<u8>)>,
    },
    HttpResponseBody {
        body: Vec<u8>,
        more_body: bool,
    },
    WebSocketAccept {
        subprotocol: Option<String>,
        headers: Vec<(Vec<u8>, Vec<u8>)>,
    },
    WebSocketSend(WsMessage),
    WebSocketClose {
        code: u16,
        reason: String,
    },
    LifespanStartupComplete,
    LifespanStartupFailed {
        message: String,
    },
    LifespanShutdownComplete,
    LifespanShutdownFailed {
        message: String,
    },
}

/// The application's receive callable: a bounded in-memory queue fed by the
/// handler that owns the connection.
pub struct AppReceive {
    rx: mpsc::Receiver<ReceiveEvent>,
}

impl AppReceive {
    pub(crate) fn new(rx: mpsc::Receiver<ReceiveEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event. Errs when the handler has torn the
    /// connection down.
    pub async fn next(&mut self) -> Result<ReceiveEvent, AppError> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| AppError::new("connection closed"))
    }
}

/// The application's send callable. Sends complete only once the handler has
/// accepted the event, which is what back-pressures the application.
#[derive(Clone)]
pub struct AppSend {
    tx: mpsc::Sender<SendEvent>,
}

impl AppSend {
    pub(crate) fn new(tx: mpsc::Sender<SendEvent>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, event: SendEvent) -> Result<(), AppError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| AppError::new("connection closed"))
    }
}

/// Build a linked pair of channels for one application invocation.
/// `queue_depth` bounds the receive queue; sends are processed one at a time.
pub(crate) fn channel_pair(
    queue_depth: usize,
) -> (
    mpsc::Sender<ReceiveEvent>,
    AppReceive,
    AppSend,
    mpsc::Receiver<SendEvent>,
) {
    let (recv_tx, recv_rx) = mpsc::channel(queue_depth);
    let (send_tx, send_rx) = mpsc::channel(1);
    (recv_tx, AppReceive::new(recv_rx), AppSend::new(send_tx), send_rx)
}
