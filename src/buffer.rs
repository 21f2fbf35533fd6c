/*
 * buffer.rs
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

//! Read-side buffer with the "expected input" hint the parser sets after the
//! header block, and the write-side buffer that flushes a whole message in
//! one socket write.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::net::NetStream;

const REFILL_CHUNK: usize = 1024;

/// How much more the buffer may pull from the socket for the current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedInput {
    /// Nothing more; the message is fully delivered.
    Drained,
    /// Exactly this many bytes remain on the wire.
    Exactly(u64),
    /// Read until EOF (streaming or chunked framing).
    Unlimited,
}

/// Buffered byte source over the socket. The parser consumes lines and byte
/// runs; refills happen in chunks of 1024, clamped to the expected count.
pub struct InputBuffer {
    buf: BytesMut,
    expected: ExpectedInput,
    total_read: u64,
    total_expected: u64,
    error: Option<String>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(REFILL_CHUNK),
            expected: ExpectedInput::Unlimited,
            total_read: 0,
            total_expected: 0,
            error: None,
        }
    }

    /// Cumulative bytes pulled from the socket.
    pub fn total_read_size(&self) -> u64 {
        self.total_read
    }

    /// Bytes consumed by the parser plus the declared remainder, fixed at the
    /// time the expectation was set.
    pub fn total_expected_size(&self) -> u64 {
        self.total_expected
    }

    pub fn expected(&self) -> ExpectedInput {
        self.expected
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Declare that exactly `n` more message bytes follow the bytes consumed
    /// so far. Bytes already buffered count against `n`; a surplus marks the
    /// stream as carrying unexpected data.
    pub fn expect(&mut self, n: u64) {
        let consumed = self.total_read - self.buf.len() as u64;
        self.total_expected = consumed + n;
        let buffered = self.buf.len() as u64;
        if buffered > n {
            self.error = Some("unexpected data in the stream".to_string());
            self.expected = ExpectedInput::Drained;
        } else if buffered == n {
            self.expected = ExpectedInput::Drained;
        } else {
            self.expected = ExpectedInput::Exactly(n - buffered);
        }
    }

    pub fn expect_unlimited(&mut self) {
        self.expected = ExpectedInput::Unlimited;
    }

    /// Reset for a new message on the same stream.
    pub fn reset(&mut self) {
        self.expected = ExpectedInput::Unlimited;
        self.error = None;
    }

    /// Pull one chunk from the socket. Returns the byte count; 0 means EOF or
    /// a drained expectation.
    fn fill(&mut self, stream: &mut NetStream) -> Result<usize> {
        let chunk = match self.expected {
            ExpectedInput::Drained => return Ok(0),
            ExpectedInput::Unlimited => REFILL_CHUNK,
            ExpectedInput::Exactly(n) => (n as usize).min(REFILL_CHUNK),
        };
        let mut tmp = [0u8; REFILL_CHUNK];
        let n = stream.read_some(&mut tmp[..chunk])?;
        if n == 0 {
            return Ok(0);
        }
        self.buf.extend_from_slice(&tmp[..n]);
        self.total_read += n as u64;
        if let ExpectedInput::Exactly(remaining) = self.expected {
            // read_some is clamped to the expectation, so n <= remaining
            let left = remaining - n as u64;
            self.expected = if left == 0 {
                ExpectedInput::Drained
            } else {
                ExpectedInput::Exactly(left)
            };
        }
        Ok(n)
    }

    /// Read one line terminated by LF (CRLF stripped). `Ok(None)` means EOF
    /// before any byte of a new line; EOF mid-line is an error.
    pub fn read_line(&mut self, stream: &mut NetStream) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line = self.buf.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                let text = std::str::from_utf8(&line)
                    .map_err(|_| Error::new("invalid bytes in line"))?
                    .to_string();
                return Ok(Some(text));
            }
            let n = self.fill(stream)?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(Error::new("connection closed inside a line"));
            }
        }
    }

    /// Consume up to `max` buffered bytes, refilling once if empty. Returns
    /// an empty slice at EOF / drained expectation.
    pub fn read_available(&mut self, stream: &mut NetStream, max: usize) -> Result<Bytes> {
        if self.buf.is_empty() {
            self.fill(stream)?;
        }
        let take = self.buf.len().min(max);
        Ok(self.buf.split_to(take).freeze())
    }

    /// Consume exactly `n` bytes, refilling as needed.
    pub fn read_exact(&mut self, stream: &mut NetStream, n: usize) -> Result<Bytes> {
        while self.buf.len() < n {
            let got = self.fill(stream)?;
            if got == 0 {
                return Err(Error::new("connection closed before expected bytes"));
            }
        }
        Ok(self.buf.split_to(n).freeze())
    }

    /// Consume `n` buffered bytes without refilling.
    pub fn skip_buffered(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.advance(n);
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Write-side accumulator: the formatter stages a whole message here and the
/// connection flushes it with a single socket write.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    buf: Vec<u8>,
    total_written: u64,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(REFILL_CHUNK),
            total_written: 0,
        }
    }

    pub fn write(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn write_str(&mut self, data: &str) {
        self.buf.extend_from_slice(data.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Cumulative bytes flushed to the socket.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn flush(&mut self, stream: &mut NetStream) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        stream.write(&self.buf)?;
        self.total_written += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }
}
