/*
 * event.rs
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

//! Event-driven HTTP handler: drives one request/response exchange with an
//! event application, choosing Content-Length or chunked framing from the
//! first body event.

use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::app::events::channel_pair;
use crate::app::{EventApp, ReceiveEvent, Scope, ScopeKind, SendEvent, SharedState};
use crate::protocol::http::{
    encode_chunk, encode_head, has_header, simple_response, BodyFraming, ParsedRequest,
    CHUNK_TERMINATOR,
};

/// Write buffer high-water mark: body writes beyond this suspend the handler
/// until the buffer drains.
const WRITE_HIGH_WATER: usize = 64 * 1024;

/// Response progress for one exchange.
enum RespState {
    /// Nothing received from the app yet.
    WaitStart,
    /// Status and headers buffered; framing is decided by the first body event.
    WaitBody {
        status: u16,
        headers: Vec<(Vec<u8>, Vec<u8>)>,
    },
    /// Head written; further fragments stream out (chunk-wrapped if chunked).
    Streaming { chunked: bool },
    Done,
}

/// Serve one HTTP request with an event-driven application.
///
/// Returns Ok(true) when the response completed and the connection may be
/// reused; Ok(false) when the connection must close (protocol error or
/// mid-response failure).
pub async fn handle_http_event<W>(
    app: Arc<dyn EventApp>,
    req: &ParsedRequest,
    state: &SharedState,
    stream: &mut W,
) -> std::io::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    let scope = Scope::for_request(ScopeKind::Http, req, state.snapshot());
    let (recv_tx, receive, send, mut send_rx) = channel_pair(2);
    let _ = recv_tx.try_send(ReceiveEvent::HttpRequest {
        body: req.body.clone(),
        more_body: false,
    });

    let mut app_fut = app.call(scope, receive, send);
    let mut writer = BufWriter::with_capacity(WRITE_HIGH_WATER, stream);
    let mut resp = RespState::WaitStart;

    let app_result = loop {
        tokio::select! {
            ev = send_rx.recv() => match ev {
                Some(ev) => {
                    if !apply_send_event(ev, &mut resp, &mut writer, &recv_tx).await? {
                        // Protocol error: tear the exchange down.
                        if matches!(resp, RespState::WaitStart | RespState::WaitBody { .. }) {
                            writer.write_all(&simple_response(500, b"Internal Server Error")).await?;
                            writer.flush().await?;
                        }
                        return Ok(false);
                    }
                }
                None => {
                    // Application dropped its send handle; wait for it to return.
                    break (&mut app_fut).await;
                }
            },
            result = &mut app_fut => break result,
        }
    };

    // The send channel may still hold an event the app queued before returning.
    while let Ok(ev) = send_rx.try_recv() {
        if !apply_send_event(ev, &mut resp, &mut writer, &recv_tx).await? {
            if matches!(resp, RespState::WaitStart | RespState::WaitBody { .. }) {
                writer.write_all(&simple_response(500, b"Internal Server Error")).await?;
                writer.flush().await?;
            }
            return Ok(false);
        }
    }

    match app_result {
        Ok(()) => match resp {
            RespState::Done => {
                writer.flush().await?;
                Ok(true)
            }
            RespState::Streaming { chunked } => {
                // Application returned mid-body without a final event.
                if chunked {
                    writer.write_all(CHUNK_TERMINATOR).await?;
                }
                writer.flush().await?;
                Ok(false)
            }
            _ => {
                // Returned without producing a response.
                eprintln!("[event] application returned without a response");
                writer.write_all(&simple_response(500, b"Internal Server Error")).await?;
                writer.flush().await?;
                Ok(true)
            }
        },
        Err(e) => {
            eprintln!("[event] application error: {}", e);
            match resp {
                RespState::WaitStart | RespState::WaitBody { .. } => {
                    // Nothing on the wire yet: a clean 500 is still possible.
                    writer.write_all(&simple_response(500, b"Internal Server Error")).await?;
                    writer.flush().await?;
                    Ok(true)
                }
                RespState::Streaming { chunked } => {
                    // The status is already on the wire; terminate the stream
                    // and force the connection closed.
                    if chunked {
                        writer.write_all(CHUNK_TERMINATOR).await?;
                    }
                    writer.flush().await?;
                    Ok(false)
                }
                RespState::Done => {
                    writer.flush().await?;
                    Ok(false)
                }
            }
        }
    }
}

/// Apply one application send event to the response state machine. Returns
/// Ok(false) on a contract violation.
async fn apply_send_event<W>(
    ev: SendEvent,
    resp: &mut RespState,
    writer: &mut BufWriter<&mut W>,
    recv_tx: &tokio::sync::mpsc::Sender<ReceiveEvent>,
) -> std::io::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    match ev {
        SendEvent::HttpResponseStart { status, headers } => {
            if !matches!(resp, RespState::WaitStart) {
                eprintln!("[event] unexpected http.response.start");
                return Ok(false);
            }
            *resp = RespState::WaitBody { status, headers };
            Ok(true)
        }
        SendEvent::HttpResponseBody { body, more_body } => match resp {
            RespState::WaitBody { status, headers } => {
                let status = *status;
                let headers = std::mem::take(headers);
                let own_framing = has_header(&headers, b"content-length")
                    || has_header(&headers, b"transfer-encoding");
                let framing = if own_framing {
                    BodyFraming::AsProvided
                } else if more_body {
                    BodyFraming::Chunked
                } else {
                    BodyFraming::ContentLength(body.len() as u64)
                };
                let chunked = framing == BodyFraming::Chunked;
                let mut out = BytesMut::with_capacity(256 + body.len());
                encode_head(status, &headers, framing, &mut out);
                if chunked {
                    encode_chunk(&body, &mut out);
                } else {
                    out.extend_from_slice(&body);
                }
                writer.write_all(&out).await?;
                if more_body {
                    *resp = RespState::Streaming { chunked };
                } else {
                    finish(resp, recv_tx);
                }
                Ok(true)
            }
            RespState::Streaming { chunked } => {
                let chunked = *chunked;
                if chunked {
                    let mut out = BytesMut::with_capacity(16 + body.len());
                    encode_chunk(&body, &mut out);
                    if !more_body {
                        out.extend_from_slice(CHUNK_TERMINATOR);
                    }
                    writer.write_all(&out).await?;
                } else {
                    writer.write_all(&body).await?;
                }
                if !more_body {
                    finish(resp, recv_tx);
                }
                Ok(true)
            }
            RespState::WaitStart => {
                eprintln!("[event] http.response.body before http.response.start");
                Ok(false)
            }
            RespState::Done => Ok(true), // stray trailing event, ignored
        },
        other => {
            eprintln!("[event] unexpected event in http exchange: {:?}", other);
            Ok(false)
        }
    }
}

/// Mark the response complete and unblock the application's disconnect
/// receive.
fn finish(resp: &mut RespState, recv_tx: &tokio::sync::mpsc::Sender<ReceiveEvent>) {
    *resp = RespState::Done;
    let _ = recv_tx.try_send(ReceiveEvent::HttpDisconnect);
}
