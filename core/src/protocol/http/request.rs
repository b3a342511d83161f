/*
 * request.rs
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

//! Parsed HTTP request: method, raw and decoded path, query, headers, buffered body.

use percent_encoding::percent_decode;

/// One fully read request. Header names are stored lowercased; original casing
/// is not preserved. Discarded after the response is written.
#[derive(Debug)]
pub struct ParsedRequest {
    pub method: String,
    /// Request path as received, percent-encoded, without the query string.
    pub raw_path: Vec<u8>,
    /// Percent-decoded path (UTF-8, lossy on invalid sequences).
    pub path: String,
    /// Query string bytes, without the leading '?'.
    pub query: Vec<u8>,
    /// The client's advertised version, e.g. "HTTP/1.1". Responses always say
    /// HTTP/1.1 regardless.
    pub version: String,
    /// Ordered (lowercased-name, value) pairs.
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    /// Split a request target into raw path and query, and percent-decode the
    /// path.
    pub(crate) fn split_target(target: &[u8]) -> (Vec<u8>, String, Vec<u8>) {
        let (raw_path, query) = match target.iter().position(|&b| b == b'?') {
            Some(q) => (&target[..q], &target[q + 1..]),
            None => (target, &[][..]),
        };
        let path = percent_decode(raw_path).decode_utf8_lossy().into_owned();
        (raw_path.to_vec(), path, query.to_vec())
    }

    /// Last value for a header. `name` must be lowercase.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k == name.as_bytes())
            .map(|(_, v)| v.as_slice())
    }

    /// Last value for a header as UTF-8, if valid. `name` must be lowercase.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// True when the Connection header contains the given token
    /// (case-insensitive, comma-separated list).
    pub fn connection_contains(&self, token: &str) -> bool {
        match self.header_str("connection") {
            Some(v) => v
                .split(',')
                .any(|t| t.trim().eq_ignore_ascii_case(token)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_target_decodes_path() {
        let (raw, path, query) = ParsedRequest::split_target(b"/a%20b/c?x=1&y=2");
        assert_eq!(raw, b"/a%20b/c");
        assert_eq!(path, "/a b/c");
        assert_eq!(query, b"x=1&y=2");
    }

    #[test]
    fn split_target_without_query() {
        let (raw, path, query) = ParsedRequest::split_target(b"/plain");
        assert_eq!(raw, b"/plain");
        assert_eq!(path, "/plain");
        assert!(query.is_empty());
    }

    #[test]
    fn header_lookup_takes_last_value() {
        let req = ParsedRequest {
            method: "GET".into(),
            raw_path: b"/".to_vec(),
            path: "/".into(),
            query: Vec::new(),
            version: "HTTP/1.1".into(),
            headers: vec![
                (b"x-dup".to_vec(), b"first".to_vec()),
                (b"x-dup".to_vec(), b"second".to_vec()),
            ],
            body: Vec::new(),
        };
        assert_eq!(req.header("x-dup"), Some(&b"second"[..]));
    }

    #[test]
    fn connection_token_match_is_case_insensitive() {
        let req = ParsedRequest {
            method: "GET".into(),
            raw_path: b"/".to_vec(),
            path: "/".into(),
            query: Vec::new(),
            version: "HTTP/1.1".into(),
            headers: vec![(b"connection".to_vec(), b"keep-alive, Upgrade".to_vec())],
            body: Vec::new(),
        };
        assert!(req.connection_contains("upgrade"));
        assert!(!req.connection_contains("close"));
    }
}
