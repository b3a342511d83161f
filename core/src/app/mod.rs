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

//! Application contracts.
//!
//! Two shapes, differing in synchrony, not just signature:
//! - `SyncApp`: called with an environment mapping and a response-start
//!   callback, returns a stream of body chunks. Runs on the worker pool.
//! - `EventApp`: called with a scope and the receive/send callables,
//!   exchanging typed events. Runs cooperatively on the event loop.
//!
//! `AppHandle` is the tagged variant the connection loop dispatches on; the
//! interface selector at startup decides which side is constructed. Closures
//! of the right shape implement both traits, so tests and small launchers
//! need no named types.

pub mod environ;
pub mod events;
pub mod scope;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::AppError;

pub use environ::{build_environ, format_host, parse_host, Environ, ErrorSink};
pub use events::{AppReceive, AppSend, ReceiveEvent, SendEvent, WsMessage};
pub use scope::{Scope, ScopeKind, SharedState, StateMap};

/// Body chunks returned by a synchronous application. Iterated to completion
/// by the dispatcher, then `close` is invoked (best-effort cleanup hook).
pub trait BodyStream {
    fn next_chunk(&mut self) -> Option<Vec<u8>>;
    fn close(&mut self) {}
}

impl BodyStream for std::vec::IntoIter<Vec<u8>> {
    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.next()
    }
}

/// A fixed list of chunks as a body.
pub fn body_chunks(chunks: Vec<Vec<u8>>) -> Box<dyn BodyStream> {
    Box::new(chunks.into_iter())
}

/// Response-initiation callback for the synchronous contract. The first call
/// records status and headers; later calls overwrite only when carrying error
/// info and nothing has been emitted yet (in this model the whole response is
/// buffered, so that is until the dispatcher writes it).
pub struct StartResponse {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    begun: bool,
}

impl StartResponse {
    pub(crate) fn new() -> Self {
        Self {
            status: None,
            headers: Vec::new(),
            begun: false,
        }
    }

    /// `status` is the full status string, e.g. "200 OK". Only the code is
    /// used on the wire; the reason phrase comes from the status-line cache.
    pub fn start(&mut self, status: &str, headers: Vec<(String, String)>) {
        if self.status.is_some() {
            return;
        }
        self.record(status, headers);
    }

    /// Error-info variant: replaces an already-recorded response as long as
    /// no bytes have been emitted.
    pub fn start_with_error(
        &mut self,
        status: &str,
        headers: Vec<(String, String)>,
        _error: &AppError,
    ) {
        if self.begun {
            return;
        }
        self.status = None;
        self.record(status, headers);
    }

    fn record(&mut self, status: &str, headers: Vec<(String, String)>) {
        if let Some(code) = status
            .split_whitespace()
            .next()
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.status = Some(code);
            self.headers = headers;
        }
    }

    pub(crate) fn take(self) -> Option<(u16, Vec<(String, String)>)> {
        self.status.map(|code| (code, self.headers))
    }
}

/// The synchronous application contract.
pub trait SyncApp: Send + Sync {
    fn call(
        &self,
        environ: &mut Environ,
        start: &mut StartResponse,
    ) -> Result<Box<dyn BodyStream>, AppError>;
}

impl<F> SyncApp for F
where
    F: Fn(&mut Environ, &mut StartResponse) -> Result<Box<dyn BodyStream>, AppError>
        + Send
        + Sync,
{
    fn call(
        &self,
        environ: &mut Environ,
        start: &mut StartResponse,
    ) -> Result<Box<dyn BodyStream>, AppError> {
        self(environ, start)
    }
}

/// The event-driven application contract.
pub trait EventApp: Send + Sync {
    fn call(
        &self,
        scope: Scope,
        receive: AppReceive,
        send: AppSend,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;
}

impl<F, Fut> EventApp for F
where
    F: Fn(Scope, AppReceive, AppSend) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), AppError>> + Send + 'static,
{
    fn call(
        &self,
        scope: Scope,
        receive: AppReceive,
        send: AppSend,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>> {
        Box::pin(self(scope, receive, send))
    }
}

/// The application object handed to the server at startup.
#[derive(Clone)]
pub enum AppHandle {
    Sync(Arc<dyn SyncApp>),
    Event(Arc<dyn EventApp>),
}
