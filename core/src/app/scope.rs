/*
 * scope.rs
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

//! Per-invocation scope for the event-driven contract, and the shared
//! lifespan state map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::app::environ::parse_host;
use crate::protocol::http::ParsedRequest;

/// Contract version tags presented to every event-driven application.
pub const PROTOCOL_VERSION: &str = "3.0";
pub const PROTOCOL_SPEC_VERSION: &str = "2.3";

pub type StateMap = HashMap<String, Value>;

/// State contributed by the application during lifespan startup. The lifespan
/// scope holds the live map (aliased); request scopes hold a snapshot copy,
/// so per-request mutation never leaks across requests.
#[derive(Clone, Default)]
pub struct SharedState(Arc<Mutex<StateMap>>);

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep copy of the current map under a fresh handle.
    pub fn snapshot(&self) -> SharedState {
        let map = self.0.lock().unwrap().clone();
        SharedState(Arc::new(Mutex::new(map)))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.0.lock().unwrap().insert(key.into(), value);
    }

    /// Run a closure against the map (for multi-key reads or removal).
    pub fn with<R>(&self, f: impl FnOnce(&mut StateMap) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Http,
    WebSocket,
    Lifespan,
}

/// Immutable per-invocation metadata for the event-driven contract.
pub struct Scope {
    pub kind: ScopeKind,
    pub version: &'static str,
    pub spec_version: &'static str,
    /// Numeric portion of the client's advertised version, e.g. "1.1".
    /// Responses always say HTTP/1.1 regardless.
    pub http_version: String,
    pub method: String,
    /// "http", "ws", or "" for lifespan.
    pub scheme: &'static str,
    /// Percent-decoded path.
    pub path: String,
    /// Path as received, percent-encoded, without the query string.
    pub raw_path: Vec<u8>,
    pub query_string: Vec<u8>,
    pub root_path: String,
    /// Raw (lowercased-name, value) pairs.
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    pub server: (String, u16),
    /// The server trusts its upstream proxy for real client information.
    pub client: (String, u16),
    /// Requested subprotocols (WebSocket scopes only).
    pub subprotocols: Vec<String>,
    pub state: SharedState,
}

impl Scope {
    /// Scope for one HTTP or WebSocket request. `state` must already be the
    /// per-request snapshot.
    pub(crate) fn for_request(kind: ScopeKind, req: &ParsedRequest, state: SharedState) -> Self {
        let http_version = req
            .version
            .strip_prefix("HTTP/")
            .unwrap_or(&req.version)
            .to_string();
        let server = parse_host(req.header_str("host").unwrap_or("localhost"), 80);
        let subprotocols = if kind == ScopeKind::WebSocket {
            crate::protocol::websocket::requested_subprotocols(req)
        } else {
            Vec::new()
        };
        Scope {
            kind,
            version: PROTOCOL_VERSION,
            spec_version: PROTOCOL_SPEC_VERSION,
            http_version,
            method: req.method.clone(),
            scheme: if kind == ScopeKind::WebSocket { "ws" } else { "http" },
            path: req.path.clone(),
            raw_path: req.raw_path.clone(),
            query_string: req.query.clone(),
            root_path: String::new(),
            headers: req.headers.clone(),
            server,
            client: ("127.0.0.1".to_string(), 0),
            subprotocols,
            state,
        }
    }

    /// The one-shot lifespan scope. `state` is the live map, aliased so the
    /// application can populate it.
    pub(crate) fn lifespan(state: SharedState) -> Self {
        Scope {
            kind: ScopeKind::Lifespan,
            version: PROTOCOL_VERSION,
            spec_version: PROTOCOL_SPEC_VERSION,
            http_version: String::new(),
            method: String::new(),
            scheme: "",
            path: String::new(),
            raw_path: Vec::new(),
            query_string: Vec::new(),
            root_path: String::new(),
            headers: Vec::new(),
            server: (String::new(), 0),
            client: (String::new(), 0),
            subprotocols: Vec::new(),
            state,
        }
    }
}
