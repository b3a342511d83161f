/*
 * listener.rs
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

//! Rendezvous socket: a filesystem stream socket where the platform has them,
//! otherwise loopback TCP with the chosen port written to the configured path.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

#[cfg(not(unix))]
use tokio::net::TcpListener;

/// One accepted local stream: filesystem socket or loopback TCP.
pub enum LocalStream {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for LocalStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            #[cfg(unix)]
            LocalStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
            LocalStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for LocalStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            #[cfg(unix)]
            LocalStream::Unix(s) => Pin::new(s).poll_write(cx, buf),
            LocalStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            #[cfg(unix)]
            LocalStream::Unix(s) => Pin::new(s).poll_flush(cx),
            LocalStream::Tcp(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            #[cfg(unix)]
            LocalStream::Unix(s) => Pin::new(s).poll_shutdown(cx),
            LocalStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// The bound rendezvous listener.
pub enum LocalListener {
    #[cfg(unix)]
    Unix(UnixListener),
    #[cfg(not(unix))]
    Tcp(TcpListener),
}

impl LocalListener {
    pub async fn accept(&self) -> io::Result<LocalStream> {
        match self {
            #[cfg(unix)]
            LocalListener::Unix(l) => {
                let (stream, _) = l.accept().await?;
                Ok(LocalStream::Unix(stream))
            }
            #[cfg(not(unix))]
            LocalListener::Tcp(l) => {
                let (stream, _) = l.accept().await?;
                Ok(LocalStream::Tcp(stream))
            }
        }
    }
}

/// Bind the rendezvous socket at `path`, unlinking any stale filesystem entry
/// first. On platforms without filesystem sockets, binds loopback TCP on an
/// ephemeral port and writes the chosen port as decimal ASCII into `path`.
#[cfg(unix)]
pub fn bind(path: &Path) -> io::Result<LocalListener> {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    Ok(LocalListener::Unix(UnixListener::bind(path)?))
}

#[cfg(not(unix))]
pub fn bind(path: &Path) -> io::Result<LocalListener> {
    let std_listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    std_listener.set_nonblocking(true)?;
    let listener = TcpListener::from_std(std_listener)?;
    let port = listener.local_addr()?.port();
    std::fs::write(path, port.to_string())?;
    Ok(LocalListener::Tcp(listener))
}

/// Remove the rendezvous file (socket or port file) on shutdown.
pub fn cleanup(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            eprintln!("[server] could not remove {}: {}", path.display(), e);
        }
    }
}

/// Resolve when a graceful-shutdown signal arrives (SIGTERM/SIGINT where
/// available, else ctrl-c).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("[server] cannot install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
                return;
            }
        };
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("[server] cannot install SIGINT handler: {}", e);
                std::future::pending::<()>().await;
                return;
            }
        };
        tokio::select! {
            _ = terminate.recv() => {}
            _ = interrupt.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
