/*
 * sync.rs
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

//! Dispatcher for the synchronous contract: run the application on the worker
//! pool, collect the buffered response, frame and write it.

use bytes::BytesMut;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;

use crate::app::{build_environ, Environ, StartResponse, SyncApp};
use crate::error::AppError;
use crate::protocol::http::{
    encode_head, has_header, simple_response, BodyFraming, ParsedRequest,
};
use crate::server::workers::WorkerPool;

/// A collected application response: status, verbatim headers, buffered body.
struct SyncOutcome {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

/// Invoke the application on a worker and iterate its body to completion.
fn run_app(app: &dyn SyncApp, environ: &mut Environ) -> Result<SyncOutcome, AppError> {
    let mut start = StartResponse::new();
    let mut body_stream = app.call(environ, &mut start)?;
    let mut body = Vec::new();
    while let Some(chunk) = body_stream.next_chunk() {
        body.extend_from_slice(&chunk);
    }
    body_stream.close();
    match start.take() {
        Some((status, headers)) => Ok(SyncOutcome {
            status,
            headers,
            body,
        }),
        None => Err(AppError::new(
            "application returned without starting a response",
        )),
    }
}

/// Serve one request with a synchronous application. The response always
/// carries Content-Length (the body is fully buffered) unless the
/// application supplied its own framing headers.
pub async fn handle_sync<W>(
    app: Arc<dyn SyncApp>,
    pool: &WorkerPool,
    req: &ParsedRequest,
    stream: &mut W,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut environ = build_environ(req);
    let (tx, rx) = oneshot::channel();
    pool.submit(Box::new(move || {
        let result = run_app(app.as_ref(), &mut environ);
        let _ = tx.send(result);
    }));

    let outcome = match rx.await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            eprintln!("[sync] application error: {}", e);
            stream.write_all(&simple_response(500, b"Internal Server Error")).await?;
            stream.flush().await?;
            return Ok(());
        }
        Err(_) => {
            eprintln!("[sync] worker dropped before responding");
            stream.write_all(&simple_response(500, b"Internal Server Error")).await?;
            stream.flush().await?;
            return Ok(());
        }
    };

    let headers: Vec<(Vec<u8>, Vec<u8>)> = outcome
        .headers
        .iter()
        .map(|(k, v)| (k.clone().into_bytes(), v.clone().into_bytes()))
        .collect();
    let framing = if has_header(&headers, b"content-length")
        || has_header(&headers, b"transfer-encoding")
    {
        BodyFraming::AsProvided
    } else {
        BodyFraming::ContentLength(outcome.body.len() as u64)
    };

    let mut out = BytesMut::with_capacity(256 + outcome.body.len());
    encode_head(outcome.status, &headers, framing, &mut out);
    out.extend_from_slice(&outcome.body);
    stream.write_all(&out).await?;
    stream.flush().await?;
    Ok(())
}
