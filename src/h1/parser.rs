/*
 * parser.rs
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

//! Message parser. Reads the start line and header block eagerly, decides
//! body framing, and leaves the body attached to the stream for lazy reads.
//! Framing violations come back as suggested HTTP statuses (400, 411, 413,
//! 417), I/O failures as errors.

use crate::body::{Body, Framing};
use crate::buffer::InputBuffer;
use crate::connection::Connection;
use crate::cookies::{Cookies, SetCookie};
use crate::error::{Error, Result};
use crate::h1::ParseOptions;
use crate::headers::Headers;
use crate::mime::is_token;
use crate::net::NetStream;
use crate::protocol::Protocol;
use crate::request::Request;
use crate::response::{Response, Status};

/// Suggested statuses the parser can produce besides 200.
pub const STATUS_OK: u16 = 200;
pub const STATUS_CONTINUE: u16 = 100;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_LENGTH_REQUIRED: u16 = 411;
pub const STATUS_PAYLOAD_TOO_LARGE: u16 = 413;
pub const STATUS_EXPECTATION_FAILED: u16 = 417;

/// Outcome of the header block scan.
enum HeaderBlock {
    Complete(Headers),
    Malformed,
    TooLarge,
}

/// Read `name: value` lines until the empty line. Handles folding, quoted
/// string values, and the size cap.
fn read_header_block(
    stream: &mut NetStream,
    input: &mut InputBuffer,
    opts: &ParseOptions,
) -> Result<HeaderBlock> {
    let mut headers = Headers::new();
    loop {
        let line = match input.read_line(stream)? {
            Some(line) => line,
            None => return Ok(HeaderBlock::Malformed),
        };
        if let Some(max) = opts.max_size {
            if input.total_read_size() > max {
                return Ok(HeaderBlock::TooLarge);
            }
        }
        if line.is_empty() {
            return Ok(HeaderBlock::Complete(headers));
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            // obsolete folding
            if !opts.parse_folded_headers || !headers.append_to_last(line.trim_start()) {
                return Ok(HeaderBlock::Malformed);
            }
            continue;
        }
        let colon = match line.find(':') {
            Some(c) if c > 0 => c,
            _ => return Ok(HeaderBlock::Malformed),
        };
        let name = line[..colon].trim();
        if !is_token(name) {
            return Ok(HeaderBlock::Malformed);
        }
        let value = parse_header_value(line[colon + 1..].trim());
        headers.add(name.to_string(), value);
    }
}

/// A value beginning with `"` is a quoted string with backslash escapes up to
/// the matching quote; anything else is taken verbatim.
pub(crate) fn parse_header_value(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if bytes.first() != Some(&b'"') {
        return raw.to_string();
    }
    let mut out = String::new();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => {
                out.push(bytes[i + 1] as char);
                i += 2;
            }
            b'"' => break,
            c => {
                out.push(c as char);
                i += 1;
            }
        }
    }
    out
}

fn is_chunked(headers: &Headers) -> bool {
    headers
        .get("Transfer-Encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
}

fn content_length(headers: &Headers) -> Option<std::result::Result<u64, ()>> {
    headers
        .get("Content-Length")
        .map(|v| v.trim().parse::<u64>().map_err(|_| ()))
}

/// Parse one request. Returns the suggested status; the request body stays
/// lazy on the connection.
pub fn read_request(conn: &Connection, req: &mut Request, opts: &ParseOptions) -> Result<u16> {
    req.attach(conn.clone());
    let conn_for_body = conn.clone();
    conn.with_io(move |stream, input, _| {
        input.reset();
        input.expect_unlimited();

        let line = input
            .read_line(stream)?
            .ok_or_else(|| Error::new("connection closed before request"))?;
        let mut words = line.split(' ');
        let (method, target, proto) = match (words.next(), words.next(), words.next(), words.next())
        {
            (Some(m), Some(t), Some(p), None) if !m.is_empty() && !t.is_empty() => (m, t, p),
            _ => return Ok(STATUS_BAD_REQUEST),
        };
        if !is_token(method) {
            return Ok(STATUS_BAD_REQUEST);
        }
        let uri = match crate::uri::Uri::parse(target) {
            Some(u) => u,
            None => return Ok(STATUS_BAD_REQUEST),
        };
        let protocol = match Protocol::parse(proto) {
            Some(p) if p.name == "HTTP" => p,
            _ => return Ok(STATUS_BAD_REQUEST),
        };

        let headers = match read_header_block(stream, input, opts)? {
            HeaderBlock::Complete(h) => h,
            HeaderBlock::Malformed => return Ok(STATUS_BAD_REQUEST),
            HeaderBlock::TooLarge => return Ok(STATUS_PAYLOAD_TOO_LARGE),
        };

        req.method = method.to_string();
        req.uri = uri;
        req.protocol = protocol;
        req.headers = headers;
        if !opts.preserve_cookie_headers {
            for value in req.headers.get_all("Cookie") {
                for (name, v) in Cookies::parse(value).iter() {
                    req.cookies.add(name, v);
                }
            }
            req.headers.remove("Cookie");
        }
        req.user_agent = req.headers.get("User-Agent").map(str::to_string);
        req.parse_auth();

        let http11 = req.protocol.at_least(1, 1);
        let expect = req.headers.get("Expect").map(str::to_string);
        let expects_continue = expect
            .as_deref()
            .map(|v| v.eq_ignore_ascii_case("100-continue"))
            .unwrap_or(false);

        if is_chunked(&req.headers) {
            input.expect_unlimited();
            req.body = Body::reader(conn_for_body, Framing::Chunked);
            if http11 && expects_continue {
                return Ok(STATUS_CONTINUE);
            }
            return Ok(STATUS_OK);
        }

        match content_length(&req.headers) {
            Some(Ok(length)) => {
                if let Some(max) = opts.max_size {
                    let consumed = input.total_read_size() - input.buffered() as u64;
                    if consumed + length > max {
                        return Ok(STATUS_PAYLOAD_TOO_LARGE);
                    }
                }
                input.expect(length);
                if input.error().is_some() {
                    // bytes past the declared length already arrived
                    return Ok(STATUS_BAD_REQUEST);
                }
                req.body = if length == 0 {
                    Body::empty()
                } else {
                    Body::reader(conn_for_body, Framing::Length(length))
                };
                if http11 && expects_continue {
                    return Ok(STATUS_CONTINUE);
                }
                Ok(STATUS_OK)
            }
            Some(Err(())) => Ok(STATUS_BAD_REQUEST),
            None => {
                if http11 && expect.is_some() {
                    return Ok(STATUS_EXPECTATION_FAILED);
                }
                if input.buffered() == 0 {
                    input.expect(0);
                    req.body = Body::empty();
                    Ok(STATUS_OK)
                } else {
                    // body bytes present but no framing declared
                    Ok(STATUS_LENGTH_REQUIRED)
                }
            }
        }
    })
}

/// Parse one response (client role). Returns the status code from the wire.
pub fn read_response(conn: &Connection, resp: &mut Response, opts: &ParseOptions) -> Result<u16> {
    resp.attach(conn.clone());
    let conn_for_body = conn.clone();
    conn.with_io(move |stream, input, _| {
        input.reset();
        input.expect_unlimited();

        let line = input
            .read_line(stream)?
            .ok_or_else(|| Error::new("connection closed before response"))?;
        // HTTP/1.1 200 OK — the reason phrase may contain spaces or be absent
        let mut words = line.splitn(3, ' ');
        let (proto, code) = match (words.next(), words.next()) {
            (Some(p), Some(c)) => (p, c),
            _ => return Err(Error::new("malformed status line")),
        };
        let protocol = Protocol::parse(proto)
            .filter(|p| p.name == "HTTP")
            .ok_or_else(|| Error::new("malformed status line"))?;
        let code: u16 = code
            .parse()
            .map_err(|_| Error::new("malformed status code"))?;
        let message = words.next().unwrap_or("").to_string();

        let headers = match read_header_block(stream, input, opts)? {
            HeaderBlock::Complete(h) => h,
            HeaderBlock::Malformed => return Err(Error::new("malformed response headers")),
            HeaderBlock::TooLarge => return Err(Error::new("response exceeds maximum size")),
        };

        resp.protocol = protocol;
        resp.status = Status::with_message(code, message);
        resp.headers = headers;
        for value in resp.headers.get_all("Set-Cookie") {
            if let Some(cookie) = SetCookie::parse(value) {
                resp.cookies.push(cookie);
            }
        }

        let status = Status::new(code);
        if is_chunked(&resp.headers) {
            input.expect_unlimited();
            resp.body = Body::reader(conn_for_body, Framing::Chunked);
            return Ok(code);
        }
        match content_length(&resp.headers) {
            Some(Ok(length)) => {
                if let Some(max) = opts.max_size {
                    let consumed = input.total_read_size() - input.buffered() as u64;
                    if consumed + length > max {
                        return Err(Error::new("response exceeds maximum size"));
                    }
                }
                input.expect(length);
                resp.body = if length == 0 {
                    Body::empty()
                } else {
                    Body::reader(conn_for_body, Framing::Length(length))
                };
                Ok(code)
            }
            Some(Err(())) => Err(Error::new("malformed content length")),
            None => {
                if status.is_bodyless() {
                    input.expect(0);
                    resp.body = Body::empty();
                } else {
                    // no framing: the body runs to connection close
                    input.expect_unlimited();
                    resp.body = Body::reader(conn_for_body, Framing::UntilClose);
                }
                Ok(code)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_value_quoted_string() {
        assert_eq!(parse_header_value("plain value"), "plain value");
        assert_eq!(parse_header_value("\"quoted \\\"x\\\"\""), "quoted \"x\"");
        assert_eq!(parse_header_value("\"unterminated"), "unterminated");
    }

    #[test]
    fn chunked_detection() {
        let mut h = Headers::new();
        h.add("Transfer-Encoding", "Chunked");
        assert!(is_chunked(&h));
        let mut h = Headers::new();
        h.add("Transfer-Encoding", "gzip, chunked");
        assert!(is_chunked(&h));
        assert!(!is_chunked(&Headers::new()));
    }

    #[test]
    fn content_length_parse() {
        let mut h = Headers::new();
        h.add("Content-Length", " 42 ");
        assert_eq!(content_length(&h), Some(Ok(42)));
        let mut h = Headers::new();
        h.add("Content-Length", "nope");
        assert_eq!(content_length(&h), Some(Err(())));
        assert_eq!(content_length(&Headers::new()), None);
    }
}
