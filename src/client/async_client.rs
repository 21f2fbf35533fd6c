/*
 * async_client.rs
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

//! Asynchronous client: one pump thread cycles over the in-flight items,
//! advancing each by a bounded step. Response bytes are fed to a push parser
//! as they arrive, so a slow peer never monopolizes the pump. Callbacks run
//! on the pump thread.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::body::Body;
use crate::client::Client;
use crate::connection::Connection;
use crate::cookies::SetCookie;
use crate::error::{Error, Result};
use crate::h1::parser::parse_header_value;
use crate::mime::MimeType;
use crate::protocol::Protocol;
use crate::request::Request;
use crate::response::{Response, Status};

/// How long one pump step may block on a socket.
const PUMP_SLICE: Duration = Duration::from_millis(20);
/// Pump sleep when no item made progress.
const IDLE_SLEEP: Duration = Duration::from_millis(5);

pub type ResponseCallback = Box<dyn FnOnce(Response) + Send + 'static>;
pub type ConnectCallback = Box<dyn FnOnce(&Connection) + Send + 'static>;
pub type ErrorCallback = Box<dyn FnOnce(Error) + Send + 'static>;

enum ItemState {
    Queued,
    Receiving {
        conn: Connection,
        parser: StreamingParser,
    },
}

struct QueryItem {
    request: Request,
    state: ItemState,
    started: Instant,
    on_response: Option<ResponseCallback>,
    on_connect: Option<ConnectCallback>,
    on_error: Option<ErrorCallback>,
}

/// Client with a worker thread pumping a per-connection event loop.
pub struct AsyncClient {
    client: Client,
    items: Arc<Mutex<Vec<QueryItem>>>,
    in_flight: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    pump: Mutex<Option<thread::JoinHandle<()>>>,
}

impl AsyncClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            items: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            stop: Arc::new(AtomicBool::new(false)),
            pump: Mutex::new(None),
        }
    }

    /// Queue a request. `on_response` or `on_error` fires exactly once, on
    /// the pump thread; `on_connect` fires after the transport is up.
    pub fn async_query(
        &self,
        request: Request,
        on_response: impl FnOnce(Response) + Send + 'static,
        on_connect: Option<ConnectCallback>,
        on_error: impl FnOnce(Error) + Send + 'static,
    ) {
        {
            let mut items = self.items.lock().unwrap();
            items.push(QueryItem {
                request,
                state: ItemState::Queued,
                started: Instant::now(),
                on_response: Some(Box::new(on_response)),
                on_connect,
                on_error: Some(Box::new(on_error)),
            });
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.ensure_pump();
    }

    /// Number of requests whose callback has not fired yet.
    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn ensure_pump(&self) {
        let mut pump = self.pump.lock().unwrap();
        let stale = pump.as_ref().map(|h| h.is_finished()).unwrap_or(true);
        if !stale {
            return;
        }
        if let Some(old) = pump.take() {
            old.join().ok();
        }
        let items = self.items.clone();
        let in_flight = self.in_flight.clone();
        let stop = self.stop.clone();
        let client = self.client.clone();
        *pump = Some(thread::spawn(move || {
            pump_loop(client, items, in_flight, stop)
        }));
    }

    /// Stop the pump after its current step and join it. Unfinished items are
    /// failed with their error callback.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.pump.lock().unwrap().take() {
            handle.join().ok();
        }
        let drained: Vec<QueryItem> = self.items.lock().unwrap().drain(..).collect();
        for mut item in drained {
            if let Some(on_error) = item.on_error.take() {
                on_error(Error::new("client stopped"));
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        self.stop.store(false, Ordering::SeqCst);
    }
}

impl Drop for AsyncClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pump_loop(
    mut client: Client,
    items: Arc<Mutex<Vec<QueryItem>>>,
    in_flight: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        // snapshot the live items so new queries can queue while we work
        let mut batch: Vec<QueryItem> = {
            let mut items = items.lock().unwrap();
            if items.is_empty() {
                drop(items);
                thread::sleep(IDLE_SLEEP);
                continue;
            }
            items.drain(..).collect()
        };
        let mut advanced = false;
        let mut survivors = Vec::with_capacity(batch.len());
        for mut item in batch.drain(..) {
            match process_async(&mut client, &mut item) {
                StepOutcome::Finished => {
                    advanced = true;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                StepOutcome::Progress => {
                    advanced = true;
                    survivors.push(item);
                }
                StepOutcome::Idle => survivors.push(item),
            }
        }
        {
            let mut items = items.lock().unwrap();
            // keep arrival order: surviving items go back in front of any
            // queries queued during this pass
            survivors.extend(items.drain(..));
            *items = survivors;
        }
        if !advanced {
            thread::sleep(IDLE_SLEEP);
        }
    }
}

enum StepOutcome {
    /// Callback delivered; drop the item.
    Finished,
    /// State changed or bytes moved.
    Progress,
    /// Nothing to do this round.
    Idle,
}

/// Drive one bounded step of one item.
fn process_async(client: &mut Client, item: &mut QueryItem) -> StepOutcome {
    if let Some(timeout) = client.timeout() {
        if item.started.elapsed() > timeout {
            if let Some(on_error) = item.on_error.take() {
                on_error(Error::Timeout);
            }
            return StepOutcome::Finished;
        }
    }
    match &mut item.state {
        ItemState::Queued => {
            let outcome = start_item(client, item);
            match outcome {
                Ok(state) => {
                    item.state = state;
                    StepOutcome::Progress
                }
                Err(e) => {
                    debug!(error = %e, "async connect failed");
                    if let Some(on_error) = item.on_error.take() {
                        on_error(e);
                    }
                    StepOutcome::Finished
                }
            }
        }
        ItemState::Receiving { conn, parser } => {
            let mut tmp = [0u8; 4096];
            let read = conn.with_io(|stream, _, _| {
                // re-arming the slice also clears a latched timeout flag
                stream.set_timeout(PUMP_SLICE)?;
                stream.read_some(&mut tmp)
            });
            let complete = match read {
                Err(e) if e.is_timeout() => return StepOutcome::Idle,
                Err(e) => Err(e),
                Ok(0) => match parser.finish_eof() {
                    Ok(true) => Ok(true),
                    Ok(false) => Err(Error::new("connection closed before response end")),
                    Err(e) => Err(e),
                },
                Ok(n) => parser.feed(&tmp[..n]),
            };
            match complete {
                Ok(false) => StepOutcome::Progress,
                Ok(true) => {
                    let mut response = parser.take_response();
                    response.attach(conn.clone());
                    conn.close(true);
                    if let Some(on_response) = item.on_response.take() {
                        on_response(response);
                    }
                    StepOutcome::Finished
                }
                Err(e) => {
                    if let Some(on_error) = item.on_error.take() {
                        on_error(e);
                    }
                    StepOutcome::Finished
                }
            }
        }
    }
}

/// Connect, run the connect hook, send the request; the response is then
/// read incrementally.
fn start_item(client: &mut Client, item: &mut QueryItem) -> Result<ItemState> {
    if item.request.user_agent.is_none() {
        item.request.user_agent = Some(client.user_agent().to_string());
    }
    if item.request.body.is_empty() && !item.request.post.is_empty() {
        item.request.format_post()?;
    }
    let conn = client.connect(&item.request.uri)?;
    if let Some(on_connect) = item.on_connect.take() {
        on_connect(&conn);
    }
    conn.send_request(&mut item.request)?;
    let parser = StreamingParser::new(client.parse_options().max_size);
    Ok(ItemState::Receiving { conn, parser })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushState {
    StatusLine,
    Headers,
    Body,
    ChunkSize,
    ChunkData,
    ChunkSep,
    Trailer,
    Complete,
}

/// Push parser for a response: feed bytes as they arrive; tokens are taken
/// as they complete and partial data stays buffered.
struct StreamingParser {
    state: PushState,
    buf: BytesMut,
    response: Response,
    body: Vec<u8>,
    content_length: Option<u64>,
    received: u64,
    chunk_remaining: u64,
    max_size: Option<u64>,
    total_fed: u64,
}

impl StreamingParser {
    fn new(max_size: Option<u64>) -> Self {
        Self {
            state: PushState::StatusLine,
            buf: BytesMut::with_capacity(4096),
            response: Response::new(),
            body: Vec::new(),
            content_length: None,
            received: 0,
            chunk_remaining: 0,
            max_size,
            total_fed: 0,
        }
    }

    /// Take the next full line out of the buffer, CRLF or LF stripped.
    fn take_line(&mut self) -> Result<Option<String>> {
        let pos = match self.buf.iter().position(|&b| b == b'\n') {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let mut line = self.buf.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        let text = std::str::from_utf8(&line)
            .map_err(|_| Error::new("invalid bytes in line"))?
            .to_string();
        Ok(Some(text))
    }

    /// Consume as much as possible; returns true once the response is
    /// complete.
    fn feed(&mut self, data: &[u8]) -> Result<bool> {
        self.total_fed += data.len() as u64;
        if let Some(max) = self.max_size {
            if self.total_fed > max {
                return Err(Error::new("response exceeds maximum size"));
            }
        }
        self.buf.extend_from_slice(data);
        loop {
            match self.state {
                PushState::StatusLine => {
                    let line = match self.take_line()? {
                        Some(line) => line,
                        None => return Ok(false),
                    };
                    let mut words = line.splitn(3, ' ');
                    let proto = words.next().unwrap_or("");
                    let protocol = Protocol::parse(proto)
                        .filter(|p| p.name == "HTTP")
                        .ok_or_else(|| Error::new("malformed status line"))?;
                    let code: u16 = words
                        .next()
                        .and_then(|c| c.parse().ok())
                        .ok_or_else(|| Error::new("malformed status code"))?;
                    let message = words.next().unwrap_or("").to_string();
                    self.response.protocol = protocol;
                    self.response.status = Status::with_message(code, message);
                    self.state = PushState::Headers;
                }
                PushState::Headers => {
                    let line = match self.take_line()? {
                        Some(line) => line,
                        None => return Ok(false),
                    };
                    if line.is_empty() {
                        self.enter_body();
                        continue;
                    }
                    let colon = line
                        .find(':')
                        .ok_or_else(|| Error::new("malformed response header"))?;
                    let name = line[..colon].trim().to_string();
                    let value = parse_header_value(line[colon + 1..].trim());
                    if name.eq_ignore_ascii_case("Set-Cookie") {
                        if let Some(cookie) = SetCookie::parse(&value) {
                            self.response.cookies.push(cookie);
                        }
                    }
                    self.response.headers.add(name, value);
                }
                PushState::Body => match self.content_length {
                    Some(length) => {
                        let remaining = (length - self.received) as usize;
                        let take = remaining.min(self.buf.len());
                        if take > 0 {
                            let chunk = self.buf.split_to(take);
                            self.body.extend_from_slice(&chunk);
                            self.received += take as u64;
                        }
                        if self.received >= length {
                            self.state = PushState::Complete;
                            continue;
                        }
                        return Ok(false);
                    }
                    None => {
                        // read to close: keep consuming until EOF
                        if !self.buf.is_empty() {
                            let n = self.buf.len();
                            let chunk = self.buf.split_to(n);
                            self.body.extend_from_slice(&chunk);
                        }
                        return Ok(false);
                    }
                },
                PushState::ChunkSize => {
                    let line = match self.take_line()? {
                        Some(line) => line,
                        None => return Ok(false),
                    };
                    let hex = line.split(';').next().unwrap_or("").trim();
                    self.chunk_remaining = u64::from_str_radix(hex, 16)
                        .map_err(|_| Error::new("malformed chunk size"))?;
                    self.state = if self.chunk_remaining == 0 {
                        PushState::Trailer
                    } else {
                        PushState::ChunkData
                    };
                }
                PushState::ChunkData => {
                    let take = (self.chunk_remaining as usize).min(self.buf.len());
                    if take > 0 {
                        let chunk = self.buf.split_to(take);
                        self.body.extend_from_slice(&chunk);
                        self.chunk_remaining -= take as u64;
                    }
                    if self.chunk_remaining == 0 {
                        self.state = PushState::ChunkSep;
                        continue;
                    }
                    return Ok(false);
                }
                PushState::ChunkSep => {
                    if self.buf.len() < 2 {
                        return Ok(false);
                    }
                    if !self.buf.starts_with(b"\r\n") {
                        return Err(Error::new("missing chunk terminator"));
                    }
                    self.buf.advance(2);
                    self.state = PushState::ChunkSize;
                }
                PushState::Trailer => {
                    let line = match self.take_line()? {
                        Some(line) => line,
                        None => return Ok(false),
                    };
                    if line.is_empty() {
                        self.state = PushState::Complete;
                    }
                }
                PushState::Complete => return Ok(true),
            }
        }
    }

    /// Decide body framing once the header block closes.
    fn enter_body(&mut self) {
        let chunked = self
            .response
            .headers
            .get("Transfer-Encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);
        if chunked {
            self.state = PushState::ChunkSize;
            return;
        }
        let length = self
            .response
            .headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        if self.response.status.is_bodyless() {
            self.state = PushState::Complete;
            return;
        }
        match length {
            Some(0) => self.state = PushState::Complete,
            Some(n) => {
                self.content_length = Some(n);
                self.state = PushState::Body;
            }
            None => {
                self.content_length = None;
                self.state = PushState::Body;
            }
        }
    }

    /// EOF from the peer: completes a read-to-close body, truncates others.
    fn finish_eof(&mut self) -> Result<bool> {
        match self.state {
            PushState::Complete => Ok(true),
            PushState::Body if self.content_length.is_none() => {
                self.state = PushState::Complete;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn take_response(&mut self) -> Response {
        let mut response = std::mem::take(&mut self.response);
        let mime = response
            .headers
            .get("Content-Type")
            .and_then(MimeType::parse)
            .unwrap_or_else(MimeType::octet_stream);
        response.body = Body::from_bytes(mime, std::mem::take(&mut self.body));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sized_response_in_fragments() {
        let mut p = StreamingParser::new(None);
        assert!(!p.feed(b"HTTP/1.1 200 O").unwrap());
        assert!(!p.feed(b"K\r\nContent-Len").unwrap());
        assert!(!p.feed(b"gth: 5\r\n\r\nhel").unwrap());
        assert!(p.feed(b"lo").unwrap());
        let r = p.take_response();
        assert_eq!(r.status.code, 200);
        assert_eq!(r.status.message, "OK");
        assert_eq!(r.body.bytes(), Some(&b"hello"[..]));
    }

    #[test]
    fn parses_chunked_response() {
        let mut p = StreamingParser::new(None);
        let wire = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
            3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n";
        assert!(p.feed(wire).unwrap());
        let r = p.take_response();
        assert_eq!(r.body.bytes(), Some(&b"abcde"[..]));
    }

    #[test]
    fn malformed_chunk_terminator_is_rejected() {
        let mut p = StreamingParser::new(None);
        let wire = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
            3\r\nabcXX0\r\n\r\n";
        let err = p.feed(wire).unwrap_err();
        assert_eq!(err.to_string(), "missing chunk terminator");
    }

    #[test]
    fn read_to_close_completes_on_eof() {
        let mut p = StreamingParser::new(None);
        assert!(!p.feed(b"HTTP/1.1 200 OK\r\n\r\npartial").unwrap());
        assert!(p.finish_eof().unwrap());
        let r = p.take_response();
        assert_eq!(r.body.bytes(), Some(&b"partial"[..]));
    }

    #[test]
    fn eof_mid_sized_body_is_incomplete() {
        let mut p = StreamingParser::new(None);
        assert!(!p.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc").unwrap());
        assert!(!p.finish_eof().unwrap());
    }

    #[test]
    fn bodyless_status_completes_at_headers() {
        let mut p = StreamingParser::new(None);
        assert!(p.feed(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap());
        let r = p.take_response();
        assert_eq!(r.status.code, 204);
        assert!(r.body.is_empty());
    }

    #[test]
    fn set_cookie_collected() {
        let mut p = StreamingParser::new(None);
        let wire = b"HTTP/1.1 200 OK\r\nSet-Cookie: a=1; Path=/\r\nSet-Cookie: b=2\r\nContent-Length: 0\r\n\r\n";
        assert!(p.feed(wire).unwrap());
        let r = p.take_response();
        assert_eq!(r.cookies.len(), 2);
        assert_eq!(r.cookies[0].name, "a");
        assert_eq!(r.cookies[1].name, "b");
    }

    #[test]
    fn max_size_enforced() {
        let mut p = StreamingParser::new(Some(16));
        let err = p
            .feed(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n")
            .unwrap_err();
        assert!(err.to_string().contains("maximum size"));
    }
}
