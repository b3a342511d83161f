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

//! Server-side HTTP/1.1: request parsing and response framing.
//!
//! - Requests: state-machine push parser fed from the connection's read
//!   buffer; bodies are fully buffered (Content-Length or chunked).
//! - Responses: status lines come from a process-wide cache; framing is
//!   chosen by the dispatcher (always Content-Length for the sync contract,
//!   Content-Length or chunked for the event-driven contract).
//! - Buffers: `bytes` crate (BytesMut for the parse buffer and head assembly).

mod request;
mod response;

pub mod h1;

pub use request::ParsedRequest;
pub use response::{
    encode_chunk, encode_head, has_header, reason_phrase, simple_response, status_line,
    BodyFraming, CHUNK_TERMINATOR,
};
