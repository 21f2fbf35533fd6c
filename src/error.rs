/*
 * error.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Canter, an HTTP/1.x protocol library.
 *
 * Canter is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Canter is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Canter.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Operation status for socket, parser, and engine calls. Success is the empty
//! status; failures carry a human-readable message with `timeout` as the one
//! distinguished value.

use std::fmt;
use std::io;

/// Errors from transport, parser, formatter, server, or client operations.
#[derive(Debug)]
pub enum Error {
    /// The deadline fired before the operation completed.
    Timeout,
    /// Socket-level failure.
    Io(io::Error),
    /// TLS-level failure (handshake, record layer, certificate).
    Tls(rustls::Error),
    /// Protocol or usage failure with a human-readable message.
    Message(String),
    /// Logical precondition violation: a bug in the caller, not a runtime
    /// condition. Never swallowed by recovery paths.
    State(String),
}

impl Error {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// True for [`Error::State`], the category that indicates caller bugs.
    pub fn is_state(&self) -> bool {
        matches!(self, Error::State(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout => write!(f, "timeout"),
            Error::Io(e) => write!(f, "{}", e),
            Error::Tls(e) => write!(f, "{}", e),
            Error::Message(m) => write!(f, "{}", m),
            Error::State(m) => write!(f, "{}", m),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Tls(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        // Deadline expiry on a blocking socket surfaces as WouldBlock or
        // TimedOut depending on platform; both mean the timer fired.
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout,
            _ => Error::Io(e),
        }
    }
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Error::Tls(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_displays_sentinel() {
        assert_eq!(Error::Timeout.to_string(), "timeout");
        assert!(Error::Timeout.is_timeout());
    }

    #[test]
    fn would_block_maps_to_timeout() {
        let e: Error = io::Error::new(io::ErrorKind::WouldBlock, "").into();
        assert!(e.is_timeout());
        let e: Error = io::Error::new(io::ErrorKind::TimedOut, "").into();
        assert!(e.is_timeout());
        let e: Error = io::Error::new(io::ErrorKind::ConnectionReset, "").into();
        assert!(!e.is_timeout());
    }
}
