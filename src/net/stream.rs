/*
 * stream.rs
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

//! Deadline-bounded byte stream over plain TCP or TLS. Every public I/O call
//! is bounded by the configured timeout; expiry surfaces `Error::Timeout` and
//! latches, short-circuiting further calls until the timeout is reset.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use rustls::{ClientConnection, ServerConnection, StreamOwned};

use crate::error::{Error, Result};
use crate::net::tls::TlsContext;
use crate::net::Deadline;

/// Which side of the TLS handshake this stream plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsRole {
    Client,
    Server,
}

enum Inner {
    Plain(TcpStream),
    TlsClient(Box<StreamOwned<ClientConnection, TcpStream>>),
    TlsServer(Box<StreamOwned<ServerConnection, TcpStream>>),
    Closed,
}

/// One endpoint of a TCP (optionally TLS) connection with timeout semantics.
pub struct NetStream {
    inner: Inner,
    timeout: Option<Duration>,
    timed_out: bool,
}

impl NetStream {
    /// Try each endpoint in order until one connects or the deadline fires.
    pub fn connect(endpoints: &[SocketAddr], timeout: Option<Duration>) -> Result<Self> {
        let deadline = Deadline::start(timeout);
        let mut last_err: Option<Error> = None;
        for addr in endpoints {
            let attempt = match deadline.remaining()? {
                Some(remaining) => TcpStream::connect_timeout(addr, remaining),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(sock) => {
                    sock.set_nodelay(true).ok();
                    let mut stream = Self {
                        inner: Inner::Plain(sock),
                        timeout,
                        timed_out: false,
                    };
                    stream.apply_timeout()?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e.into()),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::new("no endpoints to connect to")))
    }

    /// Wrap a socket produced by a listener's accept.
    pub fn from_accepted(sock: TcpStream) -> Self {
        sock.set_nodelay(true).ok();
        Self {
            inner: Inner::Plain(sock),
            timeout: None,
            timed_out: false,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = Some(timeout);
        self.timed_out = false;
        self.apply_timeout()
    }

    pub fn clear_timeout(&mut self) -> Result<()> {
        self.timeout = None;
        self.timed_out = false;
        self.apply_timeout()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// True once a deadline has fired; stays set until the timeout is reset.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.inner, Inner::Closed)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.tcp().and_then(|t| t.local_addr().ok())
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.tcp().and_then(|t| t.peer_addr().ok())
    }

    fn tcp(&self) -> Option<&TcpStream> {
        match &self.inner {
            Inner::Plain(t) => Some(t),
            Inner::TlsClient(s) => Some(s.get_ref()),
            Inner::TlsServer(s) => Some(s.get_ref()),
            Inner::Closed => None,
        }
    }

    fn apply_timeout(&self) -> Result<()> {
        if let Some(tcp) = self.tcp() {
            tcp.set_read_timeout(self.timeout).map_err(Error::Io)?;
            tcp.set_write_timeout(self.timeout).map_err(Error::Io)?;
        }
        Ok(())
    }

    /// Re-arm socket timeouts from the remaining slice of the current call's
    /// deadline. Called between syscalls of a multi-step operation.
    fn apply_remaining(&self, deadline: &Deadline) -> Result<()> {
        let remaining = deadline.remaining()?;
        if let Some(tcp) = self.tcp() {
            tcp.set_read_timeout(remaining).map_err(Error::Io)?;
            tcp.set_write_timeout(remaining).map_err(Error::Io)?;
        }
        Ok(())
    }

    fn check_usable(&self) -> Result<()> {
        if self.timed_out {
            return Err(Error::Timeout);
        }
        if !self.is_open() {
            return Err(Error::new("stream is closed"));
        }
        Ok(())
    }

    fn latch_timeout(&mut self, e: Error) -> Error {
        if e.is_timeout() {
            self.timed_out = true;
        }
        e
    }

    /// Read whatever is available, up to `buf.len()` bytes. Returns 0 on a
    /// clean peer close.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_usable()?;
        let deadline = Deadline::start(self.timeout);
        self.apply_remaining(&deadline)
            .map_err(|e| self.latch_timeout(e))?;
        let result = match &mut self.inner {
            Inner::Plain(t) => t.read(buf),
            Inner::TlsClient(s) => match s.read(buf) {
                // rustls surfaces a close without close_notify as an error;
                // treat it as EOF like a plain TCP close.
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
                other => other,
            },
            Inner::TlsServer(s) => match s.read(buf) {
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
                other => other,
            },
            Inner::Closed => unreachable!(),
        };
        result.map_err(|e| self.latch_timeout(e.into()))
    }

    /// Write the whole buffer or fail. Bounded by one deadline for the call.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.check_usable()?;
        let deadline = Deadline::start(self.timeout);
        let mut written = 0;
        while written < buf.len() {
            self.apply_remaining(&deadline)
                .map_err(|e| self.latch_timeout(e))?;
            let n = match &mut self.inner {
                Inner::Plain(t) => t.write(&buf[written..]),
                Inner::TlsClient(s) => s.write(&buf[written..]),
                Inner::TlsServer(s) => s.write(&buf[written..]),
                Inner::Closed => unreachable!(),
            }
            .map_err(|e| self.latch_timeout(e.into()))?;
            if n == 0 {
                return Err(Error::new("connection closed during write"));
            }
            written += n;
        }
        Ok(written)
    }

    /// Run the TLS handshake in the given role, under the current deadline.
    /// The stream must still be plain TCP.
    pub fn handshake(
        &mut self,
        role: TlsRole,
        context: &TlsContext,
        server_name: Option<&str>,
    ) -> Result<()> {
        self.check_usable()?;
        let tcp = match std::mem::replace(&mut self.inner, Inner::Closed) {
            Inner::Plain(t) => t,
            other => {
                self.inner = other;
                return Err(Error::state("handshake on a non-plain stream"));
            }
        };
        let deadline = Deadline::start(self.timeout);
        let outcome = match role {
            TlsRole::Client => {
                let name = server_name.unwrap_or_default().to_string();
                let server_name = rustls::pki_types::ServerName::try_from(name)
                    .map_err(|_| Error::new("invalid server name"))?;
                ClientConnection::new(context.client_config()?, server_name)
                    .map_err(Error::Tls)
                    .and_then(|conn| {
                        let mut stream = StreamOwned::new(conn, tcp);
                        while stream.conn.is_handshaking() {
                            let remaining = deadline.remaining()?;
                            stream.sock.set_read_timeout(remaining).map_err(Error::Io)?;
                            stream.sock.set_write_timeout(remaining).map_err(Error::Io)?;
                            stream.conn.complete_io(&mut stream.sock).map_err(Error::from)?;
                        }
                        Ok(Inner::TlsClient(Box::new(stream)))
                    })
            }
            TlsRole::Server => ServerConnection::new(context.server_config()?)
                .map_err(Error::Tls)
                .and_then(|conn| {
                    let mut stream = StreamOwned::new(conn, tcp);
                    while stream.conn.is_handshaking() {
                        let remaining = deadline.remaining()?;
                        stream.sock.set_read_timeout(remaining).map_err(Error::Io)?;
                        stream.sock.set_write_timeout(remaining).map_err(Error::Io)?;
                        stream.conn.complete_io(&mut stream.sock).map_err(Error::from)?;
                    }
                    Ok(Inner::TlsServer(Box::new(stream)))
                }),
        };
        match outcome {
            Ok(inner) => {
                self.inner = inner;
                self.apply_timeout()
            }
            Err(e) => Err(self.latch_timeout(e)),
        }
    }

    /// Peer certificate common name, when the stream is TLS and the peer
    /// presented a certificate.
    pub fn peer_common_name(&self) -> Option<String> {
        let certs = match &self.inner {
            Inner::TlsClient(s) => s.conn.peer_certificates(),
            Inner::TlsServer(s) => s.conn.peer_certificates(),
            _ => None,
        }?;
        crate::net::tls::common_name(certs.first()?.as_ref())
    }

    /// Close the stream. Graceful close flushes buffered TLS data and sends
    /// close_notify best-effort; abrupt close drops the socket. Idempotent.
    pub fn close(&mut self, graceful: bool) {
        match std::mem::replace(&mut self.inner, Inner::Closed) {
            Inner::Plain(t) => {
                if graceful {
                    t.shutdown(Shutdown::Both).ok();
                }
            }
            Inner::TlsClient(mut s) => {
                if graceful {
                    s.conn.send_close_notify();
                    s.flush().ok();
                    s.sock.shutdown(Shutdown::Both).ok();
                }
            }
            Inner::TlsServer(mut s) => {
                if graceful {
                    s.conn.send_close_notify();
                    s.flush().ok();
                    s.sock.shutdown(Shutdown::Both).ok();
                }
            }
            Inner::Closed => {}
        }
    }
}

impl Drop for NetStream {
    fn drop(&mut self) {
        self.close(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn connect_read_write_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            sock.read_exact(&mut buf).unwrap();
            sock.write_all(&buf).unwrap();
        });

        let mut stream =
            NetStream::connect(&[addr], Some(Duration::from_secs(5))).unwrap();
        assert!(stream.is_open());
        assert!(stream.peer_addr().is_some());
        stream.write(b"hello").unwrap();
        let mut buf = [0u8; 5];
        let mut got = 0;
        while got < 5 {
            got += stream.read_some(&mut buf[got..]).unwrap();
        }
        assert_eq!(&buf, b"hello");
        server.join().unwrap();
    }

    #[test]
    fn read_timeout_latches() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept but never write, so the client read must time out.
        let server = thread::spawn(move || {
            let (_sock, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(300));
        });

        let mut stream =
            NetStream::connect(&[addr], Some(Duration::from_millis(50))).unwrap();
        let mut buf = [0u8; 8];
        let err = stream.read_some(&mut buf).unwrap_err();
        assert!(err.is_timeout());
        assert!(stream.timed_out());
        // Short-circuits until the timeout is reset.
        let err = stream.read_some(&mut buf).unwrap_err();
        assert!(err.is_timeout());
        stream.set_timeout(Duration::from_millis(50)).unwrap();
        assert!(!stream.timed_out());
        server.join().unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let _ = listener.accept();
        });
        let mut stream = NetStream::connect(&[addr], None).unwrap();
        stream.close(true);
        assert!(!stream.is_open());
        stream.close(false);
        assert!(!stream.is_open());
        let mut buf = [0u8; 1];
        assert!(stream.read_some(&mut buf).is_err());
        server.join().unwrap();
    }
}
