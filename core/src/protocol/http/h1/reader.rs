/*
 * reader.rs
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

//! Drives the request parser from an async stream and collects a ParsedRequest.

use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::protocol::http::h1::{H1RequestHandler, ParseState, RequestParser};
use crate::protocol::http::ParsedRequest;

/// Headers larger than this abort the request (no response; the connection is
/// closed). Generous: the upstream proxy is trusted.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 1024 * 1024;

/// Accumulates parser callbacks into a ParsedRequest.
struct Collector {
    method: String,
    target: Vec<u8>,
    version: String,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
    body: Vec<u8>,
}

impl Collector {
    fn new() -> Self {
        Self {
            method: String::new(),
            target: Vec::new(),
            version: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn content_length(&self) -> Option<u64> {
        self.headers
            .iter()
            .find(|(k, _)| k == b"content-length")
            .and_then(|(_, v)| std::str::from_utf8(v).ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    fn is_chunked(&self) -> bool {
        self.headers.iter().any(|(k, v)| {
            k == b"transfer-encoding"
                && String::from_utf8_lossy(v)
                    .to_ascii_lowercase()
                    .contains("chunked")
        })
    }
}

impl H1RequestHandler for Collector {
    fn request_line(&mut self, method: &str, target: &[u8], version: &str) {
        self.method = method.to_string();
        self.target = target.to_vec();
        self.version = version.to_string();
    }

    fn header(&mut self, name: &[u8], value: &[u8]) {
        self.headers.push((name.to_vec(), value.to_vec()));
    }

    fn body_chunk(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }
}

/// Read one request from the stream. `buf` persists across calls on a
/// keep-alive connection and may already hold bytes of this request.
///
/// Returns Ok(None) on clean EOF before any data and on a malformed request
/// (both close the connection silently); Err only for transport failures.
pub async fn read_request<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    max_header_bytes: usize,
) -> io::Result<Option<ParsedRequest>>
where
    S: AsyncRead + Unpin,
{
    let mut parser = RequestParser::new();
    let mut collector = Collector::new();
    let mut header_bytes = buf.len();

    loop {
        if parser.receive(buf, &mut collector).is_err() {
            return Ok(None);
        }
        match parser.state() {
            ParseState::HeadersComplete => {
                parser.set_body_mode(collector.content_length(), collector.is_chunked());
                continue;
            }
            ParseState::Complete => break,
            ParseState::RequestLine | ParseState::Headers
                if header_bytes > max_header_bytes =>
            {
                return Ok(None);
            }
            _ => {}
        }

        let mut tmp = [0u8; 8192];
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            // Clean EOF before any data means the peer is done with the
            // connection; EOF mid-request is a truncated request. Neither
            // gets a response.
            return Ok(None);
        }
        if matches!(parser.state(), ParseState::RequestLine | ParseState::Headers) {
            header_bytes += n;
        }
        buf.extend_from_slice(&tmp[..n]);
    }

    let (raw_path, path, query) = ParsedRequest::split_target(&collector.target);
    Ok(Some(ParsedRequest {
        method: collector.method,
        raw_path,
        path,
        query,
        version: collector.version,
        headers: collector.headers,
        body: collector.body,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_two_pipelined_requests() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        tokio::io::AsyncWriteExt::write_all(
            &mut client,
            b"GET /one HTTP/1.1\r\nHost: x\r\n\r\nGET /two HTTP/1.1\r\nHost: x\r\n\r\n",
        )
        .await
        .unwrap();
        drop(client);

        let mut buf = BytesMut::new();
        let one = read_request(&mut server, &mut buf, DEFAULT_MAX_HEADER_BYTES)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(one.path, "/one");
        let two = read_request(&mut server, &mut buf, DEFAULT_MAX_HEADER_BYTES)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(two.path, "/two");
        // Third read: clean EOF
        let none = read_request(&mut server, &mut buf, DEFAULT_MAX_HEADER_BYTES)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn chunked_request_body_is_decoded() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        tokio::io::AsyncWriteExt::write_all(
            &mut client,
            b"POST / HTTP/1.1\r\nHost:x\r\nTransfer-Encoding:chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )
        .await
        .unwrap();
        drop(client);

        let mut buf = BytesMut::new();
        let req = read_request(&mut server, &mut buf, DEFAULT_MAX_HEADER_BYTES)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.body, b"hello world");
        assert_eq!(req.body.len(), 11);
    }

    #[tokio::test]
    async fn oversized_headers_return_no_request() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let big = vec![b'a'; 2048];
        let mut req = b"GET / HTTP/1.1\r\n".to_vec();
        req.extend_from_slice(b"X-Big: ");
        req.extend_from_slice(&big);
        tokio::io::AsyncWriteExt::write_all(&mut client, &req)
            .await
            .unwrap();
        drop(client);

        let mut buf = BytesMut::new();
        let out = read_request(&mut server, &mut buf, 1024).await.unwrap();
        assert!(out.is_none());
    }
}
