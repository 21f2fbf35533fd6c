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

//! Server engine: an accept loop that hands each connection to the handler,
//! either inline or through the worker pool. Per connection: apply timeout,
//! optional TLS accept, parse, invoke the handler with the suggested status,
//! send, close. Handler panics become 500 responses; transport errors go to
//! the error hook.

pub mod pool;

use std::net::{SocketAddr, TcpListener};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::accesslog::{self, COMMON_LOG_FORMAT};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::h1::parser::{STATUS_CONTINUE, STATUS_OK};
use crate::h1::ParseOptions;
use crate::net::{NetStream, TlsContext, TlsRole};
use crate::request::Request;
use crate::response::Response;
use crate::server::pool::WorkerPool;

/// Application entry point: fill in and send the response. The suggested
/// status computed by the parser is preinstalled on the response.
pub trait Handler: Send + Sync + 'static {
    fn respond(&self, request: &mut Request, response: &mut Response) -> Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&mut Request, &mut Response) -> Result<()> + Send + Sync + 'static,
{
    fn respond(&self, request: &mut Request, response: &mut Response) -> Result<()> {
        self(request, response)
    }
}

type ErrorHook = dyn Fn(&Connection, &Error) + Send + Sync;
type AcceptHook = dyn Fn(&Connection) -> Result<()> + Send + Sync;

struct Config {
    listen_address: SocketAddr,
    timeout: Option<Duration>,
    max_request_size: Option<u64>,
    max_response_size: Option<u64>,
    pool_size: usize,
    parse_folded_headers: bool,
    tls: Option<TlsContext>,
    access_log: Option<String>,
}

struct Inner {
    config: Mutex<Config>,
    handler: Box<dyn Handler>,
    running: AtomicBool,
    error_hook: Mutex<Option<Box<ErrorHook>>>,
    accept_hook: Mutex<Option<Box<AcceptHook>>>,
    pool: Mutex<Option<Arc<WorkerPool<Connection>>>>,
}

/// HTTP server bound to one listen address. `run()` accepts on the caller's
/// thread, `start()` on a background thread; `stop()` ends the loop and lets
/// in-flight connections finish.
pub struct Server {
    inner: Arc<Inner>,
    accept_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Server {
    pub fn new(listen_address: SocketAddr, handler: impl Handler) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: Mutex::new(Config {
                    listen_address,
                    timeout: None,
                    max_request_size: None,
                    max_response_size: None,
                    pool_size: 1,
                    parse_folded_headers: false,
                    tls: None,
                    access_log: None,
                }),
                handler: Box::new(handler),
                running: AtomicBool::new(false),
                error_hook: Mutex::new(None),
                accept_hook: Mutex::new(None),
                pool: Mutex::new(None),
            }),
            accept_thread: Mutex::new(None),
        }
    }

    pub fn running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Change the listen address; only legal before the server starts.
    pub fn set_listen_address(&self, address: SocketAddr) -> Result<()> {
        if self.running() {
            return Err(Error::state("listen address cannot change while running"));
        }
        self.inner.config.lock().unwrap().listen_address = address;
        Ok(())
    }

    pub fn listen_address(&self) -> SocketAddr {
        self.inner.config.lock().unwrap().listen_address
    }

    /// Per-I/O-call deadline applied to every connection.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.inner.config.lock().unwrap().timeout = timeout;
    }

    pub fn set_max_request_size(&self, bytes: Option<u64>) {
        self.inner.config.lock().unwrap().max_request_size = bytes;
    }

    pub fn set_max_response_size(&self, bytes: Option<u64>) {
        self.inner.config.lock().unwrap().max_response_size = bytes;
    }

    /// Accept obsolete folded header lines instead of rejecting them.
    pub fn set_parse_folded_headers(&self, enabled: bool) {
        self.inner.config.lock().unwrap().parse_folded_headers = enabled;
    }

    /// Number of pool workers; 1 keeps dispatch synchronous. Only legal
    /// before the server starts.
    pub fn set_pool_size(&self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(Error::state("pool size must be at least 1"));
        }
        if self.running() {
            return Err(Error::state("pool size cannot change while running"));
        }
        self.inner.config.lock().unwrap().pool_size = size;
        Ok(())
    }

    /// Serve TLS using the given context (built from certificate and key
    /// files). Incoming connections are handshaken before parsing.
    pub fn set_tls(&self, context: TlsContext) {
        self.inner.config.lock().unwrap().tls = Some(context);
    }

    /// Emit an access log line per response, in Apache format. `None` uses
    /// the common log format.
    pub fn set_access_log(&self, format: Option<&str>) {
        self.inner.config.lock().unwrap().access_log =
            Some(format.unwrap_or(COMMON_LOG_FORMAT).to_string());
    }

    /// Hook for transport and handler-send failures outside `respond`.
    pub fn set_error_hook(&self, hook: impl Fn(&Connection, &Error) + Send + Sync + 'static) {
        *self.inner.error_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Hook run on each accepted connection before parsing (after the TLS
    /// handshake when one is configured). An error drops the connection via
    /// the error hook.
    pub fn set_accept_hook(
        &self,
        hook: impl Fn(&Connection) -> Result<()> + Send + Sync + 'static,
    ) {
        *self.inner.accept_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Change the worker count of a running pooled server. Pauses the pool,
    /// joins every worker, resumes with the new size.
    pub fn resize_pool(&self, size: usize) -> Result<()> {
        let pool = self.inner.pool.lock().unwrap().clone();
        match pool {
            Some(pool) => pool.resize(size),
            None => self.set_pool_size(size),
        }
    }

    /// Accept connections on the caller's thread until `stop()`.
    pub fn run(&self) -> Result<()> {
        let listener = self.bind()?;
        accept_loop(self.inner.clone(), listener);
        Ok(())
    }

    /// Accept connections on a background thread. Returns once listening.
    pub fn start(&self) -> Result<()> {
        let listener = self.bind()?;
        let inner = self.inner.clone();
        let handle = thread::spawn(move || accept_loop(inner, listener));
        *self.accept_thread.lock().unwrap() = Some(handle);
        Ok(())
    }

    fn bind(&self) -> Result<TcpListener> {
        if self.running() {
            return Err(Error::state("server is already running"));
        }
        let (address, pool_size) = {
            let config = self.inner.config.lock().unwrap();
            (config.listen_address, config.pool_size)
        };
        let listener = TcpListener::bind(address).map_err(Error::Io)?;
        listener.set_nonblocking(true).map_err(Error::Io)?;
        // callers binding port 0 discover the real port via listen_address()
        if let Ok(bound) = listener.local_addr() {
            self.inner.config.lock().unwrap().listen_address = bound;
        }
        if pool_size > 1 {
            let inner = Arc::downgrade(&self.inner);
            let pool = WorkerPool::new(pool_size, move |index, conn: Connection| {
                if let Some(inner) = inner.upgrade() {
                    process_connection(&inner, index, conn);
                }
            })?;
            *self.inner.pool.lock().unwrap() = Some(Arc::new(pool));
        }
        self.inner.running.store(true, Ordering::SeqCst);
        info!(address = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "listening");
        Ok(listener)
    }

    /// The port actually bound (useful with port 0).
    pub fn bound_address(&self) -> SocketAddr {
        self.listen_address()
    }

    /// Stop accepting, let workers finish their connections, join the accept
    /// thread.
    pub fn stop(&self) -> Result<()> {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.lock().unwrap().take() {
            handle.join().ok();
        }
        let pool = self.inner.pool.lock().unwrap().take();
        if let Some(pool) = pool {
            pool.wait()?;
        }
        Ok(())
    }

    /// Block until every queued connection has been processed.
    pub fn wait(&self) -> Result<()> {
        let pool = self.inner.pool.lock().unwrap().clone();
        match pool {
            Some(pool) => pool.wait(),
            None => Ok(()),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop().ok();
    }
}

fn accept_loop(inner: Arc<Inner>, listener: TcpListener) {
    while inner.running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((sock, peer)) => {
                debug!(peer = %peer, "accepted");
                if sock.set_nonblocking(false).is_err() {
                    continue;
                }
                let conn = Connection::new(NetStream::from_accepted(sock));
                on_connection(&inner, conn);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                error!(error = %e, "accept failed");
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

/// Dispatch policy: enqueue on the pool when one is configured, otherwise
/// process synchronously on the accept thread.
fn on_connection(inner: &Arc<Inner>, conn: Connection) {
    let pool = inner.pool.lock().unwrap().clone();
    match pool {
        Some(pool) => pool.enqueue(conn),
        None => process_connection(inner, 0, conn),
    }
}

fn report_error(inner: &Inner, conn: &Connection, err: &Error) {
    match &*inner.error_hook.lock().unwrap() {
        Some(hook) => hook(conn, err),
        None => error!(error = %err, peer = ?conn.remote_address(), "connection error"),
    }
}

fn process_connection(inner: &Arc<Inner>, worker_index: usize, conn: Connection) {
    let (timeout, max_request_size, max_response_size, parse_folded_headers, tls, access_log) = {
        let config = inner.config.lock().unwrap();
        (
            config.timeout,
            config.max_request_size,
            config.max_response_size,
            config.parse_folded_headers,
            config.tls.clone(),
            config.access_log.clone(),
        )
    };

    if let Some(timeout) = timeout {
        if let Err(e) = conn.set_timeout(timeout) {
            report_error(inner, &conn, &e);
            conn.close(false);
            return;
        }
    }

    // accept step: TLS handshake when the server is configured for it
    if let Some(tls) = &tls {
        if let Err(e) = conn.handshake(TlsRole::Server, tls, None) {
            report_error(inner, &conn, &e);
            conn.close(false);
            return;
        }
    }
    if let Some(hook) = &*inner.accept_hook.lock().unwrap() {
        if let Err(e) = hook(&conn) {
            report_error(inner, &conn, &e);
            conn.close(false);
            return;
        }
    }

    let opts = ParseOptions {
        max_size: max_request_size,
        parse_folded_headers,
        preserve_cookie_headers: false,
    };
    let mut request = Request::new();
    let mut suggested = match conn.read_request(&mut request, &opts) {
        Ok(status) => status,
        Err(e) => {
            report_error(inner, &conn, &e);
            conn.close(false);
            return;
        }
    };

    // interim response; the body then reads normally from the stream
    if suggested == STATUS_CONTINUE {
        let interim = format!("{} 100 Continue\r\n\r\n", request.protocol);
        let sent = conn.with_io(|stream, _, output| {
            output.write_str(&interim);
            output.flush(stream)
        });
        match sent {
            Ok(()) => suggested = STATUS_OK,
            Err(e) => {
                report_error(inner, &conn, &e);
                conn.close(false);
                return;
            }
        }
    }

    let mut response = Response::with_status(suggested);
    response.attach(conn.clone());
    // one exchange per connection
    response.headers.set("Connection", "close");

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        inner.handler.respond(&mut request, &mut response)
    }));

    let result = match outcome {
        Ok(Ok(())) => {
            if response.sent() {
                Ok(())
            } else if max_response_size
                .zip(response.body.size())
                .map(|(max, size)| size > max)
                .unwrap_or(false)
            {
                debug!("response exceeds maximum size");
                send_internal_error(&conn, &request)
            } else {
                response.clean_body(Some(&request.method));
                response.send()
            }
        }
        Ok(Err(e)) => {
            debug!(error = %e, "handler failed");
            send_internal_error(&conn, &request)
        }
        Err(_) => {
            error!("handler panicked");
            send_internal_error(&conn, &request)
        }
    };

    match result {
        Ok(()) => {
            if let Some(format) = &access_log {
                info!(target: "canter::access", "{}", accesslog::log_response(
                    &request,
                    &response,
                    format,
                    worker_index,
                ));
            }
        }
        Err(e) => report_error(inner, &conn, &e),
    }

    conn.close(true);
}

/// Fresh 500 on the same connection, replacing whatever the handler built.
fn send_internal_error(conn: &Connection, request: &Request) -> Result<()> {
    let mut response = Response::with_status(500);
    response.attach(conn.clone());
    response.headers.set("Connection", "close");
    response.clean_body(Some(&request.method));
    response.send()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_zero_is_rejected() {
        let server = Server::new(
            "127.0.0.1:0".parse().unwrap(),
            |_: &mut Request, _: &mut Response| -> crate::error::Result<()> { Ok(()) },
        );
        assert!(server.set_pool_size(0).unwrap_err().is_state());
        server.set_pool_size(4).unwrap();
    }

    #[test]
    fn listen_address_fixed_while_running() {
        let server = Server::new(
            "127.0.0.1:0".parse().unwrap(),
            |_: &mut Request, _: &mut Response| -> crate::error::Result<()> { Ok(()) },
        );
        server.start().unwrap();
        let err = server
            .set_listen_address("127.0.0.1:0".parse().unwrap())
            .unwrap_err();
        assert!(err.is_state());
        server.stop().unwrap();
        assert!(!server.running());
        server
            .set_listen_address("127.0.0.1:0".parse().unwrap())
            .unwrap();
    }
}
