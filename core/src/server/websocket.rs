/*
 * websocket.rs
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

//! WebSocket handler: handshake, then a frame-reader task bridged to the
//! application's receive queue while send events are written out as frames.

use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::app::events::channel_pair;
use crate::app::{EventApp, ReceiveEvent, Scope, ScopeKind, SendEvent, SharedState, WsMessage};
use crate::protocol::http::simple_response;
use crate::protocol::websocket::frame::{
    encode_frame, FrameHandler, FrameParser, OP_BINARY, OP_CLOSE, OP_CONTINUATION, OP_PING,
    OP_PONG, OP_TEXT,
};
use crate::protocol::websocket::handshake::build_accept_response;
use crate::protocol::http::ParsedRequest;

/// Depth of the reader→app receive queue.
const RECEIVE_QUEUE_DEPTH: usize = 32;

/// Events from the frame-reader task.
enum Inbound {
    Message(WsMessage),
    Ping(Vec<u8>),
    /// Peer sent a close frame (code from its payload, if any).
    Close(Option<u16>),
    /// Socket died without a close frame.
    Gone,
}

/// Serve a WebSocket upgrade request. Consumes the stream; the connection
/// never returns to the request loop.
pub async fn handle_websocket<S>(
    app: Arc<dyn EventApp>,
    req: ParsedRequest,
    state: &SharedState,
    mut stream: S,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let client_key = req
        .header("sec-websocket-key")
        .map(|v| v.to_vec())
        .unwrap_or_default();
    let scope = Scope::for_request(ScopeKind::WebSocket, &req, state.snapshot());
    let (recv_tx, receive, send, mut send_rx) = channel_pair(RECEIVE_QUEUE_DEPTH);
    let _ = recv_tx.try_send(ReceiveEvent::WebSocketConnect);

    // The app runs as its own task so frame delivery can back-pressure
    // against it without stalling its execution.
    let mut app_task = tokio::spawn(app.call(scope, receive, send));

    // Before accept: the app must either accept or close.
    loop {
        tokio::select! {
            ev = send_rx.recv() => match ev {
                Some(SendEvent::WebSocketAccept { subprotocol, headers }) => {
                    let resp = build_accept_response(&client_key, subprotocol.as_deref(), &headers);
                    stream.write_all(&resp).await?;
                    stream.flush().await?;
                    break;
                }
                Some(SendEvent::WebSocketClose { .. }) => {
                    // Rejected before the handshake: plain HTTP refusal.
                    stream.write_all(&simple_response(403, b"403 Forbidden")).await?;
                    stream.flush().await?;
                    drop(recv_tx);
                    drop(send_rx);
                    let _ = app_task.await;
                    return Ok(());
                }
                Some(other) => {
                    eprintln!("[websocket] unexpected event before accept: {:?}", other);
                    stream.write_all(&simple_response(500, b"Internal Server Error")).await?;
                    stream.flush().await?;
                    app_task.abort();
                    let _ = app_task.await;
                    return Ok(());
                }
                None => {
                    let result = (&mut app_task).await;
                    report_app_result(result);
                    stream.write_all(&simple_response(500, b"Internal Server Error")).await?;
                    stream.flush().await?;
                    return Ok(());
                }
            },
            result = &mut app_task => {
                // App finished without accepting.
                report_app_result(result);
                stream.write_all(&simple_response(500, b"Internal Server Error")).await?;
                stream.flush().await?;
                return Ok(());
            }
        }
    }

    // Accepted: split the stream and start the frame reader.
    let (read_half, mut write_half) = tokio::io::split(stream);
    let (frame_tx, mut frame_rx) = mpsc::channel::<Inbound>(RECEIVE_QUEUE_DEPTH);
    let reader = tokio::spawn(read_loop(read_half, frame_tx));
    let mut reader_alive = true;
    let mut send_open = true;
    let mut app_done = false;

    loop {
        tokio::select! {
            ev = send_rx.recv(), if send_open => match ev {
                Some(SendEvent::WebSocketSend(message)) => {
                    let mut out = BytesMut::new();
                    match &message {
                        WsMessage::Text(text) => encode_frame(OP_TEXT, true, text.as_bytes(), &mut out),
                        WsMessage::Binary(data) => encode_frame(OP_BINARY, true, data, &mut out),
                    }
                    // One write per send call: frames appear atomically.
                    write_half.write_all(&out).await?;
                    write_half.flush().await?;
                }
                Some(SendEvent::WebSocketClose { code, reason }) => {
                    let mut payload = Vec::with_capacity(2 + reason.len());
                    payload.extend_from_slice(&code.to_be_bytes());
                    payload.extend_from_slice(reason.as_bytes());
                    payload.truncate(125); // control frame limit
                    let mut out = BytesMut::new();
                    encode_frame(OP_CLOSE, true, &payload, &mut out);
                    write_half.write_all(&out).await?;
                    write_half.flush().await?;
                    break;
                }
                Some(other) => {
                    eprintln!("[websocket] unexpected event after accept: {:?}", other);
                    break;
                }
                None => {
                    // App dropped its send handle; keep serving reads until
                    // the app itself returns.
                    send_open = false;
                }
            },
            inbound = frame_rx.recv(), if reader_alive => match inbound {
                Some(Inbound::Message(message)) => {
                    // Bounded queue: blocks here (not the app) when the app
                    // is slow to receive.
                    if recv_tx.send(ReceiveEvent::WebSocketReceive(message)).await.is_err() {
                        // App no longer receiving; wait for it to return.
                    }
                }
                Some(Inbound::Ping(payload)) => {
                    let mut out = BytesMut::new();
                    encode_frame(OP_PONG, true, &payload, &mut out);
                    write_half.write_all(&out).await?;
                    write_half.flush().await?;
                }
                Some(Inbound::Close(code)) => {
                    let _ = recv_tx.try_send(ReceiveEvent::WebSocketDisconnect {
                        code: code.unwrap_or(1005),
                    });
                }
                Some(Inbound::Gone) | None => {
                    let _ = recv_tx.try_send(ReceiveEvent::WebSocketDisconnect { code: 1006 });
                    reader_alive = false;
                }
            },
            result = &mut app_task => {
                report_app_result(result);
                app_done = true;
                break;
            }
        }
    }

    // Cancel the reader and wait for it before tearing the socket down.
    reader.abort();
    let _ = reader.await;
    if !app_done {
        app_task.abort();
        let _ = app_task.await;
    }
    Ok(())
}

fn report_app_result(result: Result<Result<(), crate::error::AppError>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => eprintln!("[websocket] application error: {}", e),
        Err(e) if e.is_cancelled() => {}
        Err(e) => eprintln!("[websocket] application task failed: {}", e),
    }
}

/// Read frames, reassemble fragmented messages, and forward inbound events.
/// Ends after a close frame, EOF, or any read/parse error.
async fn read_loop<R>(mut read_half: R, frame_tx: mpsc::Sender<Inbound>)
where
    R: AsyncRead + Unpin,
{
    struct Collect(Vec<(u8, bool, Vec<u8>)>);
    impl FrameHandler for Collect {
        fn frame(&mut self, opcode: u8, fin: bool, data: &[u8]) {
            self.0.push((opcode, fin, data.to_vec()));
        }
    }

    let mut parser = FrameParser::new();
    let mut buf = BytesMut::with_capacity(8192);
    let mut frames = Collect(Vec::new());
    // Fragmented message being reassembled: first opcode + accumulated payload
    let mut fragment: Option<(u8, Vec<u8>)> = None;

    loop {
        let mut tmp = [0u8; 8192];
        let n = match read_half.read(&mut tmp).await {
            Ok(0) | Err(_) => {
                let _ = frame_tx.send(Inbound::Gone).await;
                return;
            }
            Ok(n) => n,
        };
        buf.extend_from_slice(&tmp[..n]);
        if parser.receive(&mut buf, &mut frames).is_err() {
            let _ = frame_tx.send(Inbound::Gone).await;
            return;
        }
        for (opcode, fin, data) in frames.0.drain(..) {
            match opcode {
                OP_TEXT | OP_BINARY => {
                    if fin {
                        let _ = frame_tx.send(Inbound::Message(message(opcode, data))).await;
                    } else {
                        fragment = Some((opcode, data));
                    }
                }
                OP_CONTINUATION => {
                    if let Some((first, mut payload)) = fragment.take() {
                        payload.extend_from_slice(&data);
                        if fin {
                            let _ = frame_tx.send(Inbound::Message(message(first, payload))).await;
                        } else {
                            fragment = Some((first, payload));
                        }
                    }
                }
                OP_CLOSE => {
                    let code = if data.len() >= 2 {
                        Some(u16::from_be_bytes([data[0], data[1]]))
                    } else {
                        None
                    };
                    let _ = frame_tx.send(Inbound::Close(code)).await;
                    return;
                }
                OP_PING => {
                    let _ = frame_tx.send(Inbound::Ping(data)).await;
                }
                OP_PONG => {}
                _ => {}
            }
        }
    }
}

fn message(opcode: u8, data: Vec<u8>) -> WsMessage {
    if opcode == OP_TEXT {
        WsMessage::Text(String::from_utf8_lossy(&data).into_owned())
    } else {
        WsMessage::Binary(data)
    }
}
