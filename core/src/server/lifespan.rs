/*
 * lifespan.rs
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

//! Lifespan channel: one invocation per process for startup/shutdown
//! signalling and for populating the shared state map.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::app::events::channel_pair;
use crate::app::{EventApp, ReceiveEvent, Scope, SendEvent, SharedState};
use crate::error::{AppError, ServerError};

/// Wall-clock bound on the application's shutdown handling.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// A started lifespan invocation. The application task stays alive for the
/// whole process, awaiting the shutdown event.
pub struct Lifespan {
    recv_tx: mpsc::Sender<ReceiveEvent>,
    send_rx: mpsc::Receiver<SendEvent>,
    task: JoinHandle<Result<(), AppError>>,
}

impl Lifespan {
    /// Run the startup half of the protocol. The state map is passed to the
    /// application aliased (not copied) so it can be populated.
    ///
    /// Errs on `lifespan.startup.failed`, on an application error, and on the
    /// application returning before completing startup — the caller must then
    /// exit non-zero without binding the listener.
    pub async fn start(app: &Arc<dyn EventApp>, state: &SharedState) -> Result<Lifespan, ServerError> {
        let scope = Scope::lifespan(state.clone());
        let (recv_tx, receive, send, send_rx) = channel_pair(4);
        let task = tokio::spawn(app.call(scope, receive, send));
        let mut lifespan = Lifespan {
            recv_tx,
            send_rx,
            task,
        };
        let _ = lifespan.recv_tx.try_send(ReceiveEvent::LifespanStartup);

        loop {
            tokio::select! {
                ev = lifespan.send_rx.recv() => match ev {
                    Some(SendEvent::LifespanStartupComplete) => return Ok(lifespan),
                    Some(SendEvent::LifespanStartupFailed { message }) => {
                        eprintln!("[lifespan] startup failed: {}", message);
                        return Err(ServerError::Startup(message));
                    }
                    Some(other) => {
                        eprintln!("[lifespan] unexpected event during startup: {:?}", other);
                    }
                    None => {
                        // All send handles dropped without a startup event.
                        let result = (&mut lifespan.task).await;
                        return Err(startup_failure(result));
                    }
                },
                result = &mut lifespan.task => {
                    return Err(startup_failure(result));
                }
            }
        }
    }

    /// Run the shutdown half, bounded by `SHUTDOWN_TIMEOUT`. On timeout the
    /// application task is cancelled and a warning logged.
    pub async fn shutdown(mut self) {
        let _ = self.recv_tx.try_send(ReceiveEvent::LifespanShutdown);
        let waited = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
            loop {
                tokio::select! {
                    ev = self.send_rx.recv() => match ev {
                        Some(SendEvent::LifespanShutdownComplete) => return true,
                        Some(SendEvent::LifespanShutdownFailed { message }) => {
                            eprintln!("[lifespan] shutdown failed: {}", message);
                            return true;
                        }
                        Some(other) => {
                            eprintln!("[lifespan] unexpected event during shutdown: {:?}", other);
                        }
                        None => return false,
                    },
                    result = &mut self.task => {
                        if let Ok(Err(e)) = result {
                            eprintln!("[lifespan] application error during shutdown: {}", e);
                        }
                        return true;
                    }
                }
            }
        })
        .await;
        match waited {
            Ok(_) => {}
            Err(_) => {
                eprintln!(
                    "[lifespan] shutdown timed out after {}s; cancelling",
                    SHUTDOWN_TIMEOUT.as_secs()
                );
                self.task.abort();
                let _ = self.task.await;
            }
        }
    }
}

/// Map an application-task outcome during startup onto the startup-failed
/// surface (unhandled application errors carry an empty message).
fn startup_failure(result: Result<Result<(), AppError>, tokio::task::JoinError>) -> ServerError {
    match result {
        Ok(Ok(())) => {
            eprintln!("[lifespan] application exited before completing startup");
            ServerError::Startup(String::new())
        }
        Ok(Err(e)) => {
            eprintln!("[lifespan] application error during startup: {}", e);
            ServerError::Startup(String::new())
        }
        Err(e) => {
            eprintln!("[lifespan] application task failed during startup: {}", e);
            ServerError::Startup(String::new())
        }
    }
}
