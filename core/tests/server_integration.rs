/*
 * server_integration.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * End-to-end tests for the application server core: HTTP keep-alive,
 * chunked bodies, WebSocket upgrades, and the lifespan channel, driven over
 * in-memory duplex streams and a real filesystem socket.
 */

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;

use staffetta_core::app::{
    body_chunks, AppHandle, AppReceive, AppSend, Environ, EventApp, ReceiveEvent, Scope,
    ScopeKind, SendEvent, SharedState, StartResponse, SyncApp,
};
use staffetta_core::server::connection::serve_connection;
use staffetta_core::server::workers::WorkerPool;
use staffetta_core::{Server, ServerConfig};

const MAX_HEADERS: usize = 1024 * 1024;

fn spawn_connection(app: AppHandle) -> (DuplexStream, tokio::task::JoinHandle<()>) {
    let (client, server) = tokio::io::duplex(1 << 18);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let _keep = shutdown_tx; // connection outlives the test's writes
        serve_connection(
            server,
            app,
            Arc::new(WorkerPool::new(2)),
            SharedState::new(),
            MAX_HEADERS,
            shutdown_rx,
        )
        .await;
    });
    (client, task)
}

/// Read one HTTP response (head + Content-Length body) off the stream.
async fn read_response(stream: &mut (impl AsyncReadExt + Unpin)) -> (String, Vec<u8>) {
    let mut bytes = Vec::new();
    let header_end = loop {
        let mut byte = [0u8; 1];
        assert!(stream.read_exact(&mut byte).await.is_ok(), "eof in headers");
        bytes.push(byte[0]);
        if bytes.ends_with(b"\r\n\r\n") {
            break bytes.len();
        }
    };
    let head = String::from_utf8(bytes[..header_end].to_vec()).unwrap();
    let content_length = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    stream.read_exact(&mut body).await.unwrap();
    (head, body)
}

fn hello_sync_app() -> AppHandle {
    let app: Arc<dyn SyncApp> = Arc::new(|_env: &mut Environ, start: &mut StartResponse| {
        start.start("200 OK", vec![("Content-Type".into(), "text/plain".into())]);
        Ok(body_chunks(vec![b"ok".to_vec()]))
    });
    AppHandle::Sync(app)
}

fn echo_sync_app() -> AppHandle {
    let app: Arc<dyn SyncApp> = Arc::new(|env: &mut Environ, start: &mut StartResponse| {
        start.start("200 OK", Vec::new());
        Ok(body_chunks(vec![env.input.get_ref().clone()]))
    });
    AppHandle::Sync(app)
}

#[tokio::test]
async fn s1_sync_get_keep_alive() {
    let (mut client, _task) = spawn_connection(hello_sync_app());

    client
        .write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();
    let (head, body) = read_response(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Length: 2\r\n"));
    assert_eq!(body, b"ok");

    // The connection stayed open: a second request is served.
    client
        .write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();
    let (head2, body2) = read_response(&mut client).await;
    assert!(head2.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body2, b"ok");
}

#[tokio::test]
async fn s2_sync_post_content_length() {
    let (mut client, _task) = spawn_connection(echo_sync_app());

    client
        .write_all(b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello")
        .await
        .unwrap();
    let (head, body) = read_response(&mut client).await;
    assert!(head.contains("Content-Length: 5\r\n"));
    assert_eq!(body, b"hello");
}

#[tokio::test]
async fn s3_chunked_request_body() {
    let (mut client, _task) = spawn_connection(echo_sync_app());

    client
        .write_all(
            b"POST / HTTP/1.1\r\nHost:x\r\nTransfer-Encoding:chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )
        .await
        .unwrap();
    let (head, body) = read_response(&mut client).await;
    assert!(head.contains("Content-Length: 11\r\n"));
    assert_eq!(body, b"hello world");
}

#[tokio::test]
async fn s4_event_chunked_response() {
    let app: Arc<dyn EventApp> =
        Arc::new(|_scope: Scope, _receive: AppReceive, send: AppSend| async move {
            send.send(SendEvent::HttpResponseStart {
                status: 200,
                headers: Vec::new(),
            })
            .await?;
            for chunk in [b"chunk1".to_vec(), b"chunk2".to_vec()] {
                send.send(SendEvent::HttpResponseBody {
                    body: chunk,
                    more_body: true,
                })
                .await?;
            }
            send.send(SendEvent::HttpResponseBody {
                body: Vec::new(),
                more_body: false,
            })
            .await?;
            Ok(())
        });
    let (mut client, _task) = spawn_connection(AppHandle::Event(app));

    client
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut bytes = Vec::new();
    client.read_to_end(&mut bytes).await.unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text
        .to_ascii_lowercase()
        .contains("transfer-encoding: chunked\r\n"));
    let body_at = text.find("\r\n\r\n").unwrap() + 4;
    assert_eq!(&text[body_at..], "6\r\nchunk1\r\n6\r\nchunk2\r\n0\r\n\r\n");
}

/// App for S5/S6 and the echo session: accepts unless the path is /deny,
/// echoes messages back, closes on disconnect.
fn websocket_app() -> Arc<dyn EventApp> {
    Arc::new(|scope: Scope, mut receive: AppReceive, send: AppSend| async move {
        assert_eq!(receive.next().await?, ReceiveEvent::WebSocketConnect);
        if scope.path == "/deny" {
            send.send(SendEvent::WebSocketClose {
                code: 1000,
                reason: String::new(),
            })
            .await?;
            return Ok(());
        }
        send.send(SendEvent::WebSocketAccept {
            subprotocol: None,
            headers: Vec::new(),
        })
        .await?;
        loop {
            match receive.next().await? {
                ReceiveEvent::WebSocketReceive(message) => {
                    send.send(SendEvent::WebSocketSend(message)).await?;
                }
                ReceiveEvent::WebSocketDisconnect { .. } => return Ok(()),
                _ => return Ok(()),
            }
        }
    })
}

fn upgrade_request(path: &str) -> Vec<u8> {
    format!(
        "GET {} HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
        path
    )
    .into_bytes()
}

/// Client-side frame: masked, fin=1.
fn masked_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let key = [0x11u8, 0x22, 0x33, 0x44];
    let mut out = Vec::new();
    out.push(0x80 | opcode);
    let len = payload.len();
    if len < 126 {
        out.push(0x80 | len as u8);
    } else if len < 65536 {
        out.push(0x80 | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0x80 | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(&key);
    out.extend(payload.iter().enumerate().map(|(i, &b)| b ^ key[i % 4]));
    out
}

/// Read the 101 head (terminated by the blank line).
async fn read_upgrade_head(stream: &mut (impl AsyncReadExt + Unpin)) -> String {
    let mut bytes = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).await.unwrap();
        bytes.push(byte[0]);
        if bytes.ends_with(b"\r\n\r\n") {
            return String::from_utf8(bytes).unwrap();
        }
    }
}

#[tokio::test]
async fn s5_websocket_accept_echo_close() {
    let (mut client, _task) = spawn_connection(AppHandle::Event(websocket_app()));

    client.write_all(&upgrade_request("/chat")).await.unwrap();
    let head = read_upgrade_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(head.contains("Upgrade: websocket\r\n"));
    assert!(head.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));

    // Echo: text in, identical unmasked text frame out.
    client
        .write_all(&masked_frame(0x1, b"hello websocket"))
        .await
        .unwrap();
    let mut header = [0u8; 2];
    client.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0x81); // fin + text
    assert_eq!(header[1], 15); // unmasked, 15 bytes
    let mut payload = [0u8; 15];
    client.read_exact(&mut payload).await.unwrap();
    assert_eq!(&payload, b"hello websocket");

    // Peer close is answered by teardown after the app returns.
    client
        .write_all(&masked_frame(0x8, &1000u16.to_be_bytes()))
        .await
        .unwrap();
    let mut rest = Vec::new();
    let _ = client.read_to_end(&mut rest).await;
}

#[tokio::test]
async fn s5_ping_answered_with_pong() {
    let (mut client, _task) = spawn_connection(AppHandle::Event(websocket_app()));

    client.write_all(&upgrade_request("/chat")).await.unwrap();
    let _ = read_upgrade_head(&mut client).await;

    client.write_all(&masked_frame(0x9, b"tick")).await.unwrap();
    let mut header = [0u8; 2];
    client.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0x8A); // fin + pong
    assert_eq!(header[1], 4);
    let mut payload = [0u8; 4];
    client.read_exact(&mut payload).await.unwrap();
    assert_eq!(&payload, b"tick");
}

#[tokio::test]
async fn s6_websocket_reject_before_accept() {
    let (mut client, _task) = spawn_connection(AppHandle::Event(websocket_app()));

    client.write_all(&upgrade_request("/deny")).await.unwrap();
    let mut bytes = Vec::new();
    client.read_to_end(&mut bytes).await.unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with("HTTP/1.1 403 Forbidden\r\n"));
    assert!(text.ends_with("403 Forbidden"));
}

/// One application serving both the lifespan channel and requests; requests
/// report the state contributed during startup.
fn lifespan_aware_app(fail_startup: bool) -> Arc<dyn EventApp> {
    Arc::new(move |scope: Scope, mut receive: AppReceive, send: AppSend| async move {
        match scope.kind {
            ScopeKind::Lifespan => {
                assert_eq!(receive.next().await?, ReceiveEvent::LifespanStartup);
                if fail_startup {
                    send.send(SendEvent::LifespanStartupFailed {
                        message: "refusing to start".into(),
                    })
                    .await?;
                    return Ok(());
                }
                scope
                    .state
                    .insert("greeting", serde_json::Value::String("hi".into()));
                send.send(SendEvent::LifespanStartupComplete).await?;
                loop {
                    match receive.next().await? {
                        ReceiveEvent::LifespanShutdown => {
                            send.send(SendEvent::LifespanShutdownComplete).await?;
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
            _ => {
                let greeting = match scope.state.get("greeting") {
                    Some(serde_json::Value::String(s)) => s,
                    _ => "missing".into(),
                };
                send.send(SendEvent::HttpResponseStart {
                    status: 200,
                    headers: Vec::new(),
                })
                .await?;
                send.send(SendEvent::HttpResponseBody {
                    body: greeting.into_bytes(),
                    more_body: false,
                })
                .await?;
                Ok(())
            }
        }
    })
}

fn temp_socket_path(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("staffetta-it-{}-{}.sock", tag, std::process::id()))
}

#[tokio::test]
async fn s7_lifespan_failure_exits_without_binding() {
    let path = temp_socket_path("s7");
    let config = ServerConfig::new(&path).with_lifespan(true);
    let server = Server::new(AppHandle::Event(lifespan_aware_app(true)), config);
    let result = server.run_until(std::future::pending()).await;
    assert!(result.is_err());
    assert!(!path.exists(), "no listener may be bound after startup failure");
}

#[cfg(unix)]
#[tokio::test]
async fn unix_socket_end_to_end_with_graceful_shutdown() {
    let path = temp_socket_path("e2e");
    let config = ServerConfig::new(&path).with_lifespan(true);
    let server = Server::new(AppHandle::Event(lifespan_aware_app(false)), config);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(async move {
        server
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await
    });

    // Wait for the socket to appear.
    for _ in 0..100 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let mut client = tokio::net::UnixStream::connect(&path).await.unwrap();
    client
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut bytes = Vec::new();
    client.read_to_end(&mut bytes).await.unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    // Body carries the state populated during lifespan startup.
    assert!(text.ends_with("hi"));

    stop_tx.send(()).unwrap();
    server_task.await.unwrap().unwrap();
    assert!(!path.exists(), "socket file removed on shutdown");
}

#[tokio::test]
async fn responses_match_requests_one_to_one() {
    let (mut client, _task) = spawn_connection(hello_sync_app());

    let n = 5;
    for _ in 0..n {
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
    }
    for _ in 0..n {
        let (head, body) = read_response(&mut client).await;
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(body, b"ok");
    }
}

#[tokio::test]
async fn duplicate_headers_reach_sync_environ_joined() {
    let app: Arc<dyn SyncApp> = Arc::new(|env: &mut Environ, start: &mut StartResponse| {
        let x = env.get("HTTP_X").unwrap_or("").to_string();
        let cookie = env.get("HTTP_COOKIE").unwrap_or("").to_string();
        let proxy = env.get("HTTP_PROXY").unwrap_or("absent").to_string();
        start.start("200 OK", Vec::new());
        Ok(body_chunks(vec![format!("{}|{}|{}", x, cookie, proxy).into_bytes()]))
    });
    let (mut client, _task) = spawn_connection(AppHandle::Sync(app));

    client
        .write_all(
            b"GET / HTTP/1.1\r\nHost: x\r\nX: a\r\nX: b\r\nCookie: a=1\r\nCookie: b=2\r\nProxy: evil\r\n\r\n",
        )
        .await
        .unwrap();
    let (_head, body) = read_response(&mut client).await;
    assert_eq!(body, b"a, b|a=1; b=2|absent");
}

#[tokio::test]
async fn websocket_fragmented_message_reassembled() {
    let (mut client, _task) = spawn_connection(AppHandle::Event(websocket_app()));

    client.write_all(&upgrade_request("/chat")).await.unwrap();
    let _ = read_upgrade_head(&mut client).await;

    // Text split into one initial frame (fin=0) and one continuation (fin=1).
    let key = [9u8, 8, 7, 6];
    let mut first = vec![0x01, 0x80 | 3];
    first.extend_from_slice(&key);
    first.extend(b"fra".iter().enumerate().map(|(i, &b)| b ^ key[i % 4]));
    let mut second = vec![0x80, 0x80 | 5];
    second.extend_from_slice(&key);
    second.extend(b"gment".iter().enumerate().map(|(i, &b)| b ^ key[i % 4]));
    client.write_all(&first).await.unwrap();
    client.write_all(&second).await.unwrap();

    let mut header = [0u8; 2];
    client.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0x81);
    assert_eq!(header[1], 8);
    let mut payload = [0u8; 8];
    client.read_exact(&mut payload).await.unwrap();
    assert_eq!(&payload, b"fragment");
}
