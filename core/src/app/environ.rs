/*
 * environ.rs
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

//! Environment mapping for the synchronous contract, built deterministically
//! from a parsed request.

use std::collections::HashMap;
use std::io::{self, Cursor, Write};

use crate::protocol::http::ParsedRequest;

/// Diagnostic sink handed to applications: line-buffered stderr.
pub struct ErrorSink;

impl Write for ErrorSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// String-keyed request environment for the synchronous contract, plus a
/// seekable body reader and the diagnostic sink.
pub struct Environ {
    vars: HashMap<String, String>,
    /// The request body, fully buffered and rewindable.
    pub input: Cursor<Vec<u8>>,
    pub errors: ErrorSink,
}

impl Environ {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }
}

/// Parse a Host header value into (host, port). Handles bracketed IPv6
/// literals (`[::1]:8080`), `host:port`, and bare host with the given default
/// port. Brackets are stripped from the stored host.
pub fn parse_host(value: &str, default_port: u16) -> (String, u16) {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let host = rest[..end].to_string();
            let port = rest[end + 1..]
                .strip_prefix(':')
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(default_port);
            return (host, port);
        }
    }
    if let Some((host, port)) = value.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            return (host.to_string(), port);
        }
    }
    (value.to_string(), default_port)
}

/// Inverse of `parse_host`: IPv6 hosts are re-bracketed.
pub fn format_host(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Build the environment mapping. Header translation:
/// - names become `HTTP_<UPPER_SNAKE>`;
/// - `Content-Type` / `Content-Length` are unprefixed and leave the `HTTP_`
///   namespace;
/// - a `Proxy` request header is dropped (httpoxy);
/// - duplicate values join with ", ", cookies with "; ".
pub fn build_environ(req: &ParsedRequest) -> Environ {
    let mut vars = HashMap::new();
    vars.insert("REQUEST_METHOD".to_string(), req.method.clone());
    vars.insert("SCRIPT_NAME".to_string(), String::new());
    vars.insert("PATH_INFO".to_string(), req.path.clone());
    vars.insert(
        "QUERY_STRING".to_string(),
        String::from_utf8_lossy(&req.query).into_owned(),
    );
    vars.insert("SERVER_PROTOCOL".to_string(), req.version.clone());
    vars.insert("REMOTE_ADDR".to_string(), "127.0.0.1".to_string());
    vars.insert("URL_SCHEME".to_string(), "http".to_string());

    let (server_name, server_port) = parse_host(req.header_str("host").unwrap_or("localhost"), 80);
    vars.insert("SERVER_NAME".to_string(), server_name);
    vars.insert("SERVER_PORT".to_string(), server_port.to_string());

    for (name, value) in &req.headers {
        if name == b"proxy" {
            continue;
        }
        let value = String::from_utf8_lossy(value);
        if name == b"content-type" {
            vars.insert("CONTENT_TYPE".to_string(), value.into_owned());
            continue;
        }
        if name == b"content-length" {
            vars.insert("CONTENT_LENGTH".to_string(), value.into_owned());
            continue;
        }
        let mut key = String::with_capacity(5 + name.len());
        key.push_str("HTTP_");
        for &b in name.iter() {
            key.push(if b == b'-' {
                '_'
            } else {
                b.to_ascii_uppercase() as char
            });
        }
        let separator = if name == b"cookie" { "; " } else { ", " };
        match vars.get_mut(&key) {
            Some(existing) => {
                existing.push_str(separator);
                existing.push_str(&value);
            }
            None => {
                vars.insert(key, value.into_owned());
            }
        }
    }

    Environ {
        vars,
        input: Cursor::new(req.body.clone()),
        errors: ErrorSink,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(headers: Vec<(Vec<u8>, Vec<u8>)>) -> ParsedRequest {
        ParsedRequest {
            method: "POST".into(),
            raw_path: b"/a%20b".to_vec(),
            path: "/a b".into(),
            query: b"k=v".to_vec(),
            version: "HTTP/1.1".into(),
            headers,
            body: b"hello".to_vec(),
        }
    }

    #[test]
    fn required_keys_present() {
        let env = build_environ(&request_with(vec![(
            b"host".to_vec(),
            b"example.com:8080".to_vec(),
        )]));
        assert_eq!(env.get("REQUEST_METHOD"), Some("POST"));
        assert_eq!(env.get("SCRIPT_NAME"), Some(""));
        assert_eq!(env.get("PATH_INFO"), Some("/a b"));
        assert_eq!(env.get("QUERY_STRING"), Some("k=v"));
        assert_eq!(env.get("SERVER_NAME"), Some("example.com"));
        assert_eq!(env.get("SERVER_PORT"), Some("8080"));
        assert_eq!(env.get("SERVER_PROTOCOL"), Some("HTTP/1.1"));
        assert_eq!(env.get("REMOTE_ADDR"), Some("127.0.0.1"));
        assert_eq!(env.get("URL_SCHEME"), Some("http"));
        assert_eq!(env.input.get_ref(), b"hello");
    }

    #[test]
    fn host_defaults_to_localhost_80() {
        let env = build_environ(&request_with(Vec::new()));
        assert_eq!(env.get("SERVER_NAME"), Some("localhost"));
        assert_eq!(env.get("SERVER_PORT"), Some("80"));
    }

    #[test]
    fn content_headers_unprefixed() {
        let env = build_environ(&request_with(vec![
            (b"content-type".to_vec(), b"text/plain".to_vec()),
            (b"content-length".to_vec(), b"5".to_vec()),
        ]));
        assert_eq!(env.get("CONTENT_TYPE"), Some("text/plain"));
        assert_eq!(env.get("CONTENT_LENGTH"), Some("5"));
        assert_eq!(env.get("HTTP_CONTENT_TYPE"), None);
        assert_eq!(env.get("HTTP_CONTENT_LENGTH"), None);
    }

    #[test]
    fn duplicate_headers_join_comma_cookies_semicolon() {
        let env = build_environ(&request_with(vec![
            (b"x".to_vec(), b"a".to_vec()),
            (b"x".to_vec(), b"b".to_vec()),
            (b"cookie".to_vec(), b"a=1".to_vec()),
            (b"cookie".to_vec(), b"b=2".to_vec()),
        ]));
        assert_eq!(env.get("HTTP_X"), Some("a, b"));
        assert_eq!(env.get("HTTP_COOKIE"), Some("a=1; b=2"));
    }

    #[test]
    fn proxy_header_is_dropped() {
        let env = build_environ(&request_with(vec![(
            b"proxy".to_vec(),
            b"evil".to_vec(),
        )]));
        assert_eq!(env.get("HTTP_PROXY"), None);
    }

    #[test]
    fn dashes_become_underscores() {
        let env = build_environ(&request_with(vec![(
            b"x-forwarded-for".to_vec(),
            b"10.0.0.1".to_vec(),
        )]));
        assert_eq!(env.get("HTTP_X_FORWARDED_FOR"), Some("10.0.0.1"));
    }

    #[test]
    fn host_parse_unparse_roundtrip() {
        for input in ["example.com", "example.com:8080", "[::1]", "[::1]:443"] {
            let (host, port) = parse_host(input, 80);
            let formatted = format_host(&host, port);
            assert_eq!(parse_host(&formatted, 80), (host, port), "input {}", input);
        }
    }

    #[test]
    fn ipv6_host_parsing() {
        assert_eq!(parse_host("[::1]:443", 80), ("::1".to_string(), 443));
        assert_eq!(parse_host("[::1]", 80), ("::1".to_string(), 80));
        assert_eq!(parse_host("plain", 80), ("plain".to_string(), 80));
        assert_eq!(parse_host("plain:99", 80), ("plain".to_string(), 99));
    }
}
