/*
 * body.rs
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

//! Message body: empty, a writable buffer with a fixed media type, or a lazy
//! reader over the connection the message arrived on. Reading consumes: after
//! `read_all` a reader body yields nothing further and flags the condition.

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::mime::MimeType;

/// Wire framing of an incoming body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Exactly this many bytes.
    Length(u64),
    /// Read until the peer closes.
    UntilClose,
    /// `size CRLF data CRLF` chunks, zero-size chunk then trailers.
    Chunked,
}

enum State {
    Empty,
    Buffer {
        mime: MimeType,
        data: Vec<u8>,
    },
    Reader {
        conn: Connection,
        framing: Framing,
        total_expected: Option<u64>,
        read_so_far: u64,
        consumed: bool,
        error: Option<String>,
    },
}

pub struct Body {
    state: State,
}

impl Body {
    pub fn empty() -> Self {
        Self { state: State::Empty }
    }

    /// Writable output buffer with a fixed media type.
    pub fn buffer(mime: MimeType) -> Self {
        Self {
            state: State::Buffer {
                mime,
                data: Vec::new(),
            },
        }
    }

    pub fn from_bytes(mime: MimeType, data: impl Into<Vec<u8>>) -> Self {
        Self {
            state: State::Buffer {
                mime,
                data: data.into(),
            },
        }
    }

    pub fn from_text(mime: MimeType, text: impl AsRef<str>) -> Self {
        Self::from_bytes(mime, text.as_ref().as_bytes().to_vec())
    }

    /// Input view attached to the connection the message arrived on.
    pub(crate) fn reader(conn: Connection, framing: Framing) -> Self {
        let total_expected = match framing {
            Framing::Length(n) => Some(n),
            _ => None,
        };
        Self {
            state: State::Reader {
                conn,
                framing,
                total_expected,
                read_so_far: 0,
                consumed: false,
                error: None,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.state {
            State::Empty => true,
            State::Buffer { data, .. } => data.is_empty(),
            State::Reader { .. } => false,
        }
    }

    /// True for a reader body that has not been consumed yet.
    pub fn is_pending(&self) -> bool {
        matches!(
            self.state,
            State::Reader {
                consumed: false,
                ..
            }
        )
    }

    /// Known size: buffer length, or the declared length of a reader body.
    pub fn size(&self) -> Option<u64> {
        match &self.state {
            State::Empty => Some(0),
            State::Buffer { data, .. } => Some(data.len() as u64),
            State::Reader { total_expected, .. } => *total_expected,
        }
    }

    pub fn mime(&self) -> Option<&MimeType> {
        match &self.state {
            State::Buffer { mime, .. } => Some(mime),
            _ => None,
        }
    }

    /// Error recorded on the read side (over-long data, early close, repeat
    /// consumption).
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            State::Reader { error, .. } => error.as_deref(),
            _ => None,
        }
    }

    /// Bytes delivered so far from a reader body.
    pub fn read_so_far(&self) -> u64 {
        match &self.state {
            State::Reader { read_so_far, .. } => *read_so_far,
            _ => 0,
        }
    }

    /// Append to a buffer body. Empty bodies cannot be written; create the
    /// body with [`Body::buffer`] first.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.state {
            State::Buffer { data: buf, .. } => {
                buf.extend_from_slice(data);
                Ok(())
            }
            _ => Err(Error::state("body is not writable")),
        }
    }

    pub fn write_str(&mut self, text: &str) -> Result<()> {
        self.write(text.as_bytes())
    }

    /// Buffered content, for the formatter. None for reader bodies.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.state {
            State::Empty => Some(&[]),
            State::Buffer { data, .. } => Some(data),
            State::Reader { .. } => None,
        }
    }

    /// Discard content; used for bodyless responses (HEAD, 1xx, 204, 304).
    pub fn clear(&mut self) {
        self.state = State::Empty;
    }

    /// Read the whole remaining body. Consuming: a second call on a reader
    /// body returns empty and sets the error flag.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        match &mut self.state {
            State::Empty => Ok(Vec::new()),
            State::Buffer { data, .. } => Ok(data.clone()),
            State::Reader {
                conn,
                framing,
                read_so_far,
                consumed,
                error,
                ..
            } => {
                if *consumed {
                    *error = Some("body already consumed".to_string());
                    return Ok(Vec::new());
                }
                *consumed = true;
                let result = match framing {
                    Framing::Length(n) => read_length(conn, *n, read_so_far),
                    Framing::UntilClose => read_until_close(conn, read_so_far),
                    Framing::Chunked => read_chunked(conn, read_so_far),
                };
                match result {
                    Ok(data) => {
                        if let Some(msg) = conn.input_error() {
                            *error = Some(msg);
                        }
                        Ok(data)
                    }
                    Err(e) => {
                        *error = Some(e.to_string());
                        Err(e)
                    }
                }
            }
        }
    }

    /// Read up to `max` bytes of a reader body; `Ok(empty)` at end.
    pub fn read_some(&mut self, max: usize) -> Result<Vec<u8>> {
        match &mut self.state {
            State::Empty | State::Buffer { .. } => Err(Error::state(
                "read_some applies to a connection-backed body",
            )),
            State::Reader {
                conn,
                framing,
                read_so_far,
                consumed,
                error,
                ..
            } => {
                if *consumed {
                    *error = Some("body already consumed".to_string());
                    return Ok(Vec::new());
                }
                match framing {
                    Framing::Length(n) => {
                        let remaining = n.saturating_sub(*read_so_far);
                        if remaining == 0 {
                            *consumed = true;
                            return Ok(Vec::new());
                        }
                        let take = (remaining as usize).min(max);
                        let data = conn.with_io(|stream, input, _| {
                            input.read_available(stream, take)
                        })?;
                        if data.is_empty() {
                            *consumed = true;
                            return Err(Error::new("connection closed before body end"));
                        }
                        *read_so_far += data.len() as u64;
                        if *read_so_far == *n {
                            *consumed = true;
                        }
                        Ok(data.to_vec())
                    }
                    Framing::UntilClose => {
                        let data = conn
                            .with_io(|stream, input, _| input.read_available(stream, max))?;
                        if data.is_empty() {
                            *consumed = true;
                        }
                        *read_so_far += data.len() as u64;
                        Ok(data.to_vec())
                    }
                    Framing::Chunked => {
                        // Chunk framing does not split cleanly; deliver whole.
                        let data = read_chunked(conn, read_so_far)?;
                        *consumed = true;
                        Ok(data)
                    }
                }
            }
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            State::Empty => write!(f, "Body::Empty"),
            State::Buffer { mime, data } => {
                write!(f, "Body::Buffer({}, {} bytes)", mime, data.len())
            }
            State::Reader {
                framing,
                read_so_far,
                consumed,
                ..
            } => write!(
                f,
                "Body::Reader({:?}, {} read, consumed={})",
                framing, read_so_far, consumed
            ),
        }
    }
}

fn read_length(conn: &Connection, n: u64, read_so_far: &mut u64) -> Result<Vec<u8>> {
    let remaining = n.saturating_sub(*read_so_far);
    let data = conn.with_io(|stream, input, _| {
        let data = input.read_exact(stream, remaining as usize)?;
        Ok::<_, Error>(data)
    })?;
    *read_so_far += data.len() as u64;
    Ok(data.to_vec())
}

fn read_until_close(conn: &Connection, read_so_far: &mut u64) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let data = conn.with_io(|stream, input, _| input.read_available(stream, 4096))?;
        if data.is_empty() {
            break;
        }
        *read_so_far += data.len() as u64;
        out.extend_from_slice(&data);
    }
    Ok(out)
}

/// Decode `size CRLF data CRLF` chunks. Trailer headers after the last chunk
/// are consumed and discarded.
fn read_chunked(conn: &Connection, read_so_far: &mut u64) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    conn.with_io(|stream, input, _| {
        loop {
            let line = input
                .read_line(stream)?
                .ok_or_else(|| Error::new("connection closed inside chunked body"))?;
            let size_text = line.split(';').next().unwrap_or("").trim();
            let size = u64::from_str_radix(size_text, 16)
                .map_err(|_| Error::new("malformed chunk size"))?;
            if size == 0 {
                break;
            }
            let data = input.read_exact(stream, size as usize)?;
            out.extend_from_slice(&data);
            let sep = input.read_line(stream)?;
            if sep.as_deref() != Some("") {
                return Err(Error::new("missing chunk terminator"));
            }
        }
        // trailers until the empty line
        loop {
            match input.read_line(stream)? {
                None => return Err(Error::new("connection closed inside trailers")),
                Some(line) if line.is_empty() => break,
                Some(_) => {}
            }
        }
        Ok(())
    })?;
    *read_so_far += out.len() as u64;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_body_accumulates() {
        let mut b = Body::buffer(MimeType::text_plain());
        b.write_str("hello ").unwrap();
        b.write(b"world").unwrap();
        assert_eq!(b.bytes(), Some(&b"hello world"[..]));
        assert_eq!(b.size(), Some(11));
        assert_eq!(b.mime().unwrap().subtype, "plain");
    }

    #[test]
    fn empty_body_is_not_writable() {
        let mut b = Body::empty();
        assert!(b.write(b"x").unwrap_err().is_state());
        assert_eq!(b.size(), Some(0));
        assert!(b.is_empty());
    }

    #[test]
    fn clear_discards_content() {
        let mut b = Body::from_text(MimeType::text_plain(), "data");
        b.clear();
        assert!(b.is_empty());
        assert_eq!(b.size(), Some(0));
    }

    #[test]
    fn buffer_read_all_is_repeatable() {
        let mut b = Body::from_text(MimeType::text_plain(), "abc");
        assert_eq!(b.read_all().unwrap(), b"abc");
        assert_eq!(b.read_all().unwrap(), b"abc");
        assert!(b.error().is_none());
    }
}
