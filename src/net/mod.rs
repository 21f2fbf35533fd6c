/*
 * mod.rs
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

//! Transport layer: endpoint resolution, the deadline-bounded stream over
//! plain TCP or TLS, and TLS configuration.

pub mod stream;
pub mod tls;

pub use stream::{NetStream, TlsRole};
pub use tls::{TlsContext, VerifyMode};

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Resolve host and service to a list of endpoints. The service is either a
/// decimal port or a scheme name with a well-known default.
pub fn resolve(host: &str, service: &str) -> Result<Vec<SocketAddr>> {
    let port = match service.parse::<u16>() {
        Ok(p) => p,
        Err(_) => match service {
            "http" | "ws" => 80,
            "https" | "wss" => 443,
            _ => return Err(Error::new(format!("unknown service {}", service))),
        },
    };
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(Error::Io)?
        .collect();
    if addrs.is_empty() {
        return Err(Error::new(format!("no addresses for {}", host)));
    }
    Ok(addrs)
}

/// Per-call deadline. Armed at the start of each public I/O operation; the
/// remaining duration is applied to every syscall the operation makes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    end: Option<Instant>,
}

impl Deadline {
    pub fn start(timeout: Option<Duration>) -> Self {
        Self {
            end: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Remaining time, or `Err(Timeout)` once expired. `Ok(None)` means no
    /// deadline is configured and the call may block indefinitely.
    pub fn remaining(&self) -> Result<Option<Duration>> {
        match self.end {
            None => Ok(None),
            Some(end) => {
                let now = Instant::now();
                if now >= end {
                    Err(Error::Timeout)
                } else {
                    Ok(Some(end - now))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_by_port_and_scheme() {
        let by_port = resolve("127.0.0.1", "8080").unwrap();
        assert_eq!(by_port[0].port(), 8080);
        let by_scheme = resolve("127.0.0.1", "http").unwrap();
        assert_eq!(by_scheme[0].port(), 80);
        assert!(resolve("127.0.0.1", "gopher").is_err());
    }

    #[test]
    fn deadline_expires() {
        let d = Deadline::start(Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(d.remaining(), Err(Error::Timeout)));
        let unlimited = Deadline::start(None);
        assert!(matches!(unlimited.remaining(), Ok(None)));
    }
}
