/*
 * error.rs
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

//! Server and application errors.

use std::fmt;
use std::io;

/// Errors from the supervisor and listener. Connection-level I/O errors never
/// surface here; they are absorbed at the connection loop.
#[derive(Debug)]
pub enum ServerError {
    /// Listener could not bind or the rendezvous file could not be written.
    Io(io::Error),
    /// Application reported (or caused) a lifespan startup failure. The
    /// process should exit non-zero without ever binding the listener.
    Startup(String),
    /// Generic error message.
    Message(String),
}

impl ServerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Io(e) => write!(f, "{}", e),
            ServerError::Startup(m) => {
                if m.is_empty() {
                    write!(f, "application startup failed")
                } else {
                    write!(f, "application startup failed: {}", m)
                }
            }
            ServerError::Message(m) => write!(f, "{}", m),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Error raised by an application callable. The dispatcher that invoked the
/// application owns the surface: sync and pre-response event errors become a
/// 500, mid-response errors terminate the stream.
#[derive(Debug)]
pub enum AppError {
    /// Generic error message.
    Message(String),
}

impl AppError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Message(m) => write!(f, "{}", m),
        }
    }
}

impl std::error::Error for AppError {}
