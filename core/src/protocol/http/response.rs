/*
 * response.rs
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

//! HTTP/1.1 response framing: status-line cache, head serialization, chunk encoding.

use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Process-wide cache of pre-encoded status lines `HTTP/1.1 <code> <reason>\r\n`.
/// Lazy, read-mostly; bounded by the status-code space.
static STATUS_LINES: OnceLock<Mutex<HashMap<u16, Bytes>>> = OnceLock::new();

const STATUS_CACHE_CAP: usize = 1000;

/// Pre-encoded status line for a code. Responses always advertise HTTP/1.1.
pub fn status_line(code: u16) -> Bytes {
    let cache = STATUS_LINES.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = cache.lock().unwrap();
    if let Some(line) = map.get(&code) {
        return line.clone();
    }
    let line = Bytes::from(format!("HTTP/1.1 {} {}\r\n", code, reason_phrase(code)));
    if map.len() < STATUS_CACHE_CAP {
        map.insert(code, line.clone());
    }
    line
}

/// IANA reason phrase for a status code.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        102 => "Processing",
        103 => "Early Hints",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        207 => "Multi-Status",
        208 => "Already Reported",
        226 => "IM Used",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Content Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "I'm a Teapot",
        421 => "Misdirected Request",
        422 => "Unprocessable Content",
        423 => "Locked",
        424 => "Failed Dependency",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        510 => "Not Extended",
        511 => "Network Authentication Required",
        _ => "Unknown",
    }
}

/// Framing the server adds when the application supplied neither
/// Content-Length nor Transfer-Encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// Add Content-Length (body length known up front).
    ContentLength(u64),
    /// Add Transfer-Encoding: chunked; body fragments are chunk-wrapped.
    Chunked,
    /// Application supplied its own framing headers; write them verbatim.
    AsProvided,
}

/// Serialize status line and headers, terminated by the empty line. Header
/// names and values are written verbatim.
pub fn encode_head(code: u16, headers: &[(Vec<u8>, Vec<u8>)], framing: BodyFraming, out: &mut BytesMut) {
    out.extend_from_slice(&status_line(code));
    for (name, value) in headers {
        out.extend_from_slice(name);
        out.extend_from_slice(b": ");
        out.extend_from_slice(value);
        out.extend_from_slice(b"\r\n");
    }
    match framing {
        BodyFraming::ContentLength(len) => {
            out.extend_from_slice(format!("Content-Length: {}\r\n", len).as_bytes());
        }
        BodyFraming::Chunked => {
            out.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
        }
        BodyFraming::AsProvided => {}
    }
    out.extend_from_slice(b"\r\n");
}

/// Chunk-wrap one body fragment: `<hex-len>\r\n<bytes>\r\n`. Empty fragments
/// are skipped (a zero-size chunk would terminate the stream).
pub fn encode_chunk(data: &[u8], out: &mut BytesMut) {
    if data.is_empty() {
        return;
    }
    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Terminating zero chunk.
pub const CHUNK_TERMINATOR: &[u8] = b"0\r\n\r\n";

/// True when the header list carries the given lowercase name.
pub fn has_header(headers: &[(Vec<u8>, Vec<u8>)], lower_name: &[u8]) -> bool {
    headers
        .iter()
        .any(|(k, _)| k.eq_ignore_ascii_case(lower_name))
}

/// A complete plain-text response (for 500 / 403 surfaces).
pub fn simple_response(code: u16, body: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(128 + body.len());
    let headers = [(b"Content-Type".to_vec(), b"text/plain".to_vec())];
    encode_head(code, &headers, BodyFraming::ContentLength(body.len() as u64), &mut out);
    out.extend_from_slice(body);
    out
}
