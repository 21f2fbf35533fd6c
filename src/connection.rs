/*
 * connection.rs
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

//! Connection: a reference-counted handle over one deadline stream plus its
//! input and output buffers. The request parsed from it and the response
//! written back share the same handle; the last holder dropped closes the
//! socket. Parser and formatter take a short-lived exclusive borrow per call,
//! so one of each runs at a time.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::buffer::{InputBuffer, OutputBuffer};
use crate::error::Result;
use crate::h1;
use crate::net::{NetStream, TlsContext, TlsRole};
use crate::request::Request;
use crate::response::Response;

pub(crate) struct Io {
    pub stream: NetStream,
    pub input: InputBuffer,
    pub output: OutputBuffer,
}

#[derive(Clone)]
pub struct Connection {
    inner: Arc<Mutex<Io>>,
}

impl Connection {
    pub fn new(stream: NetStream) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Io {
                stream,
                input: InputBuffer::new(),
                output: OutputBuffer::new(),
            })),
        }
    }

    /// Two handles to the same underlying channel?
    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Exclusive access to the stream and buffers for one parser/formatter
    /// step. Do not call re-entrantly from within `f`.
    pub(crate) fn with_io<R>(
        &self,
        f: impl FnOnce(&mut NetStream, &mut InputBuffer, &mut OutputBuffer) -> R,
    ) -> R {
        let mut io = self.inner.lock().unwrap();
        let Io {
            stream,
            input,
            output,
        } = &mut *io;
        f(stream, input, output)
    }

    /// Parse one request from the stream into `req`. Returns the suggested
    /// HTTP status (200, 100, 400, 411, 413, 417). The body stays attached to
    /// this connection for lazy reads.
    pub fn read_request(&self, req: &mut Request, opts: &h1::ParseOptions) -> Result<u16> {
        h1::parser::read_request(self, req, opts)
    }

    /// Parse one response from the stream into `resp` (client role).
    pub fn read_response(&self, resp: &mut Response, opts: &h1::ParseOptions) -> Result<u16> {
        h1::parser::read_response(self, resp, opts)
    }

    /// Attach this connection to the response, format it, and flush the
    /// output buffer as one write.
    pub fn send_response(&self, resp: &mut Response) -> Result<()> {
        resp.attach(self.clone());
        h1::formatter::write_response(self, resp)
    }

    /// Format and flush a request (client role).
    pub fn send_request(&self, req: &mut Request) -> Result<()> {
        h1::formatter::write_request(self, req)
    }

    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.inner.lock().unwrap().stream.peer_addr()
    }

    pub fn local_address(&self) -> Option<SocketAddr> {
        self.inner.lock().unwrap().stream.local_addr()
    }

    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.inner.lock().unwrap().stream.set_timeout(timeout)
    }

    pub fn clear_timeout(&self) -> Result<()> {
        self.inner.lock().unwrap().stream.clear_timeout()
    }

    pub fn timed_out(&self) -> bool {
        self.inner.lock().unwrap().stream.timed_out()
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().unwrap().stream.is_open()
    }

    /// Run the TLS handshake on the underlying stream.
    pub fn handshake(
        &self,
        role: TlsRole,
        context: &TlsContext,
        server_name: Option<&str>,
    ) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .stream
            .handshake(role, context, server_name)
    }

    pub fn peer_common_name(&self) -> Option<String> {
        self.inner.lock().unwrap().stream.peer_common_name()
    }

    /// Error recorded by the input buffer (e.g. unexpected data after the
    /// declared content length).
    pub fn input_error(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .input
            .error()
            .map(|s| s.to_string())
    }

    /// Close the channel. Graceful close flushes pending output first.
    /// Idempotent and safe after errors.
    pub fn close(&self, graceful: bool) {
        let mut io = self.inner.lock().unwrap();
        if graceful {
            let Io { stream, output, .. } = &mut *io;
            output.flush(stream).ok();
        }
        io.stream.close(graceful);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection({:?})", self.remote_address())
    }
}
