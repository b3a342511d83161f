/*
 * lib.rs
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

//! Staffetta core: a single-process application server behind a front-end
//! reverse proxy.
//!
//! The proxy spawns this server as a subprocess and reaches it over a local
//! stream socket (filesystem socket where available, else loopback TCP with
//! a port rendezvous file). The server speaks clear HTTP/1.1 with keep-alive,
//! chunked transfer encoding, and RFC 6455 WebSocket upgrades, and dispatches
//! every request to a user-supplied application object:
//!
//! - [`app::SyncApp`]: environment mapping + response-start callback,
//!   returning body chunks; runs on a bounded worker thread pool.
//! - [`app::EventApp`]: scope + receive/send callables exchanging typed
//!   events; runs cooperatively on the event loop, including full-duplex
//!   WebSocket sessions and the one-shot lifespan channel.
//!
//! TLS, routing, and everything beyond stderr diagnostics belong to the
//! front-end proxy.

pub mod app;
pub mod error;
pub mod protocol;
pub mod server;

pub use app::AppHandle;
pub use error::{AppError, ServerError};
pub use server::{Server, ServerConfig};
