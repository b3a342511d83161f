/*
 * event_items.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Event-driven application with a lifespan-populated greeting and a small
 * in-memory item store under /item/<id> (GET, POST, DELETE):
 *
 *   cargo run --example event_items -- /tmp/staffetta-items.sock
 *   curl --unix-socket /tmp/staffetta-items.sock -X POST -d '{"n":1}' http://localhost/item/a
 *   curl --unix-socket /tmp/staffetta-items.sock http://localhost/item/a
 */

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use staffetta_core::app::{
    AppReceive, AppSend, EventApp, ReceiveEvent, Scope, ScopeKind, SendEvent,
};
use staffetta_core::error::AppError;
use staffetta_core::{AppHandle, Server, ServerConfig};

struct ItemsApp {
    db: Arc<Mutex<HashMap<String, serde_json::Value>>>,
}

impl ItemsApp {
    fn new() -> Self {
        Self {
            db: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl EventApp for ItemsApp {
    fn call(
        &self,
        scope: Scope,
        mut receive: AppReceive,
        send: AppSend,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>> {
        let db = Arc::clone(&self.db);
        Box::pin(async move {
            if scope.kind == ScopeKind::Lifespan {
                loop {
                    match receive.next().await? {
                        ReceiveEvent::LifespanStartup => {
                            scope.state.insert(
                                "motd",
                                serde_json::Value::String("item store ready".into()),
                            );
                            send.send(SendEvent::LifespanStartupComplete).await?;
                        }
                        ReceiveEvent::LifespanShutdown => {
                            send.send(SendEvent::LifespanShutdownComplete).await?;
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }

            let mut body = Vec::new();
            if let ReceiveEvent::HttpRequest { body: b, .. } = receive.next().await? {
                body = b;
            }

            let (status, payload) = match scope.path.strip_prefix("/item/") {
                Some(id) => match scope.method.as_str() {
                    "GET" => match db.lock().unwrap().get(id) {
                        Some(value) => (200, value.to_string().into_bytes()),
                        None => (200, b"null".to_vec()),
                    },
                    "POST" => match serde_json::from_slice(&body) {
                        Ok(value) => {
                            db.lock().unwrap().insert(id.to_string(), value);
                            (200, b"Stored".to_vec())
                        }
                        Err(_) => (400, b"Bad Request".to_vec()),
                    },
                    "DELETE" => {
                        db.lock().unwrap().remove(id);
                        (200, b"Deleted".to_vec())
                    }
                    _ => (405, b"Method Not Allowed".to_vec()),
                },
                None if scope.path == "/" => {
                    let motd = scope
                        .state
                        .get("motd")
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default();
                    (200, motd.into_bytes())
                }
                None => (404, b"Not Found".to_vec()),
            };

            send.send(SendEvent::HttpResponseStart {
                status,
                headers: vec![(b"Content-Type".to_vec(), b"text/plain".to_vec())],
            })
            .await?;
            send.send(SendEvent::HttpResponseBody {
                body: payload,
                more_body: false,
            })
            .await?;
            Ok(())
        })
    }
}

#[tokio::main]
async fn main() {
    let socket_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/tmp/staffetta-items.sock".to_string());

    let app: Arc<dyn EventApp> = Arc::new(ItemsApp::new());
    let config = ServerConfig::new(socket_path).with_lifespan(true);
    let server = Server::new(AppHandle::Event(app), config);
    if let Err(e) = server.run().await {
        eprintln!("[event_items] {}", e);
        std::process::exit(1);
    }
}
