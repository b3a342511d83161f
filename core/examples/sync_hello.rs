/*
 * sync_hello.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Minimal synchronous application served over a filesystem socket:
 *
 *   cargo run --example sync_hello -- /tmp/staffetta-hello.sock
 *   curl --unix-socket /tmp/staffetta-hello.sock http://localhost/
 */

use std::sync::Arc;

use staffetta_core::app::{body_chunks, Environ, StartResponse, SyncApp};
use staffetta_core::{AppHandle, Server, ServerConfig};

#[tokio::main]
async fn main() {
    let socket_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/tmp/staffetta-hello.sock".to_string());

    let app: Arc<dyn SyncApp> = Arc::new(|env: &mut Environ, start: &mut StartResponse| {
        let who = env.get("QUERY_STRING").filter(|q| !q.is_empty()).unwrap_or("world");
        start.start(
            "200 OK",
            vec![("Content-Type".into(), "text/plain".into())],
        );
        Ok(body_chunks(vec![format!("Hello {}\n", who).into_bytes()]))
    });

    let server = Server::new(AppHandle::Sync(app), ServerConfig::new(socket_path));
    if let Err(e) = server.run().await {
        eprintln!("[sync_hello] {}", e);
        std::process::exit(1);
    }
}
