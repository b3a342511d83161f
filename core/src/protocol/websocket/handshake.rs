/*
 * handshake.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Staffetta, a local application server.
 *
 * This file is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This file is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this file.  If not, see <http://www.gnu.org/licenses/>.
 */

//! WebSocket opening handshake (RFC 6455 §4): classify upgrade requests,
//! derive Sec-WebSocket-Accept, build the 101 response.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::protocol::http::{status_line, ParsedRequest};

/// Magic string for Sec-WebSocket-Accept (RFC 6455 §4.2.2).
const WS_ACCEPT_MAGIC: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute Sec-WebSocket-Accept from the client's base64-encoded key.
/// Per RFC 6455 §4.2.2: SHA-1(key_base64 + MAGIC_GUID), then base64-encode.
pub fn compute_accept_key(key_base64: &[u8]) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(key_base64);
    hasher.update(WS_ACCEPT_MAGIC);
    let digest = hasher.finalize();
    BASE64.encode(digest.as_slice())
}

/// True when the request asks for a WebSocket upgrade: GET method, an
/// `Upgrade: websocket` header, and a `Connection` header containing the
/// token `upgrade` (all case-insensitive).
pub fn is_upgrade_request(req: &ParsedRequest) -> bool {
    if !req.method.eq_ignore_ascii_case("GET") {
        return false;
    }
    let upgrade = match req.header_str("upgrade") {
        Some(v) => v.trim().eq_ignore_ascii_case("websocket"),
        None => false,
    };
    upgrade && req.connection_contains("upgrade")
}

/// Subprotocols requested via Sec-WebSocket-Protocol (comma-separated).
pub fn requested_subprotocols(req: &ParsedRequest) -> Vec<String> {
    match req.header_str("sec-websocket-protocol") {
        Some(v) => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => Vec::new(),
    }
}

/// Build the complete `101 Switching Protocols` response. `client_key` is the
/// raw Sec-WebSocket-Key header value; `extra_headers` are written verbatim.
pub fn build_accept_response(
    client_key: &[u8],
    subprotocol: Option<&str>,
    extra_headers: &[(Vec<u8>, Vec<u8>)],
) -> Vec<u8> {
    let mut resp = Vec::with_capacity(192);
    resp.extend_from_slice(&status_line(101));
    resp.extend_from_slice(b"Upgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: ");
    resp.extend_from_slice(compute_accept_key(client_key).as_bytes());
    resp.extend_from_slice(b"\r\n");
    if let Some(proto) = subprotocol {
        resp.extend_from_slice(b"Sec-WebSocket-Protocol: ");
        resp.extend_from_slice(proto.as_bytes());
        resp.extend_from_slice(b"\r\n");
    }
    for (name, value) in extra_headers {
        resp.extend_from_slice(name);
        resp.extend_from_slice(b": ");
        resp.extend_from_slice(value);
        resp.extend_from_slice(b"\r\n");
    }
    resp.extend_from_slice(b"\r\n");
    resp
}
