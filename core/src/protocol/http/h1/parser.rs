/*
 * parser.rs
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

//! HTTP/1.1 request push parser: request line, headers, body (Content-Length or chunked).

use bytes::Buf;
use bytes::BytesMut;
use std::io;

/// Callback for HTTP/1.1 request events. The reader implements this and
/// collects a complete request.
pub trait H1RequestHandler {
    fn request_line(&mut self, method: &str, target: &[u8], version: &str);
    /// Header name is lowercased and stripped; value is stripped.
    fn header(&mut self, name: &[u8], value: &[u8]);
    fn body_chunk(&mut self, data: &[u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    RequestLine,
    Headers,
    /// Headers done; the reader must inspect them and call set_body_mode().
    HeadersComplete,
    Body,
    ChunkSize,
    ChunkData,
    ChunkTrailer,
    /// One full request consumed; leftover bytes in the buffer belong to the
    /// next request on the connection.
    Complete,
}

/// Push parser for one HTTP/1.1 request. Feed bytes via `receive`; the handler
/// is invoked as complete tokens are parsed.
pub struct RequestParser {
    state: ParseState,
    /// Content-Length when known (-1 for chunked).
    content_length: i64,
    bytes_received: i64,
    /// Current chunk size (for chunked encoding).
    chunk_remaining: i64,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::RequestLine,
            content_length: -1,
            bytes_received: 0,
            chunk_remaining: 0,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ParseState::RequestLine;
        self.content_length = -1;
        self.bytes_received = 0;
        self.chunk_remaining = 0;
    }

    /// Find CRLF in the readable part of buf; return number of bytes to the start of CRLF, or None if not found.
    fn find_crlf(buf: &[u8]) -> Option<usize> {
        let mut i = 0;
        while i + 1 < buf.len() {
            if buf[i] == b'\r' && buf[i + 1] == b'\n' {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// Consume and parse as much as possible from buf. Handler is called for
    /// each complete token. Partial data remains in buf.
    pub fn receive<H: H1RequestHandler>(
        &mut self,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> Result<(), io::Error> {
        while !buf.is_empty() {
            match self.state {
                ParseState::RequestLine => {
                    let line_end = match Self::find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    let line = buf.split_to(line_end + 2); // include CRLF
                    // METHOD SP request-target SP HTTP-version, single spaces
                    let mut parts = line[..line_end].split(|&b| b == b' ');
                    let method = parts.next().unwrap_or(&[]);
                    let target = parts.next().unwrap_or(&[]);
                    let version = parts.next().unwrap_or(&[]);
                    if method.is_empty()
                        || target.is_empty()
                        || version.is_empty()
                        || parts.next().is_some()
                    {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "malformed request line",
                        ));
                    }
                    let method = std::str::from_utf8(method).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "invalid method")
                    })?;
                    let version = std::str::from_utf8(version).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "invalid version")
                    })?;
                    handler.request_line(method, target, version);
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let line_end = match Self::find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    if line_end == 0 {
                        buf.advance(2);
                        self.state = ParseState::HeadersComplete;
                        return Ok(()); // reader will set_body_mode and call receive again
                    }
                    let line = buf.split_to(line_end + 2);
                    // Lines without a colon are silently dropped
                    if let Some(colon) = line[..line_end].iter().position(|&b| b == b':') {
                        let name: Vec<u8> = trim_ascii(&line[..colon])
                            .iter()
                            .map(|b| b.to_ascii_lowercase())
                            .collect();
                        let value = trim_ascii(&line[colon + 1..line_end]);
                        handler.header(&name, value);
                    }
                }
                ParseState::Body => {
                    let remaining = (self.content_length - self.bytes_received) as usize;
                    let to_read = remaining.min(buf.len());
                    if to_read > 0 {
                        let chunk = buf.split_to(to_read);
                        handler.body_chunk(&chunk);
                        self.bytes_received += to_read as i64;
                    }
                    if self.bytes_received >= self.content_length {
                        self.state = ParseState::Complete;
                        return Ok(());
                    }
                }
                ParseState::ChunkSize => {
                    let line_end = match Self::find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    let line = buf.split_to(line_end + 2);
                    let line_str = std::str::from_utf8(&line[..line_end]).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "invalid chunk size")
                    })?;
                    // Chunk extensions after ';' are discarded
                    let hex_part = line_str.split(';').next().unwrap_or(line_str).trim();
                    self.chunk_remaining = i64::from_str_radix(hex_part, 16).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "invalid chunk size")
                    })?;
                    if self.chunk_remaining < 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "invalid chunk size",
                        ));
                    }
                    if self.chunk_remaining == 0 {
                        self.state = ParseState::ChunkTrailer;
                    } else {
                        self.state = ParseState::ChunkData;
                    }
                }
                ParseState::ChunkData => {
                    let to_read = (self.chunk_remaining as usize).min(buf.len());
                    if to_read > 0 {
                        let chunk = buf.split_to(to_read);
                        handler.body_chunk(&chunk);
                        self.chunk_remaining -= to_read as i64;
                    }
                    if self.chunk_remaining == 0 {
                        // Need to consume trailing CRLF
                        if buf.len() >= 2 {
                            buf.advance(2);
                            self.state = ParseState::ChunkSize;
                        } else {
                            return Ok(());
                        }
                    } else {
                        return Ok(());
                    }
                }
                ParseState::ChunkTrailer => {
                    let line_end = match Self::find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    if line_end == 0 {
                        buf.advance(2);
                        self.state = ParseState::Complete;
                        return Ok(());
                    }
                    // Trailer headers are discarded
                    buf.advance(line_end + 2);
                }
                ParseState::HeadersComplete => {
                    // Waiting for the reader to call set_body_mode()
                    return Ok(());
                }
                ParseState::Complete => return Ok(()),
            }
        }
        Ok(())
    }

    /// Called by the reader after headers are received (state HeadersComplete).
    pub fn set_body_mode(&mut self, content_length: Option<u64>, chunked: bool) {
        if self.state != ParseState::HeadersComplete {
            return;
        }
        if chunked {
            self.content_length = -1;
            self.state = ParseState::ChunkSize;
        } else {
            let cl = content_length.unwrap_or(0);
            self.content_length = cl as i64;
            self.bytes_received = 0;
            if cl == 0 {
                self.state = ParseState::Complete;
            } else {
                self.state = ParseState::Body;
            }
        }
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip ASCII whitespace from both ends.
fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}
