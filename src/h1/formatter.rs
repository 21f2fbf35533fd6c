/*
 * formatter.rs
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

//! Message formatter. Emits the start line, headers in insertion order (one
//! Set-Cookie per cookie), CRLF, then the body under the chosen framing:
//! Content-Length when the size is known, chunked for unknown sizes on
//! HTTP/1.1+, `Connection: close` and write-to-exhaustion otherwise.

use chrono::Utc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::body::Body;
use crate::connection::Connection;
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

const STREAM_CHUNK: usize = 4096;

enum BodyPlan {
    /// Emit Content-Length and the bytes as-is.
    Sized(Vec<u8>),
    /// Emit Transfer-Encoding: chunked and frame the bytes.
    Chunked(Vec<u8>),
    /// Emit Connection: close and the raw bytes (HTTP/1.0 unknown length).
    UntilClose(Vec<u8>),
}

/// Decide framing from what is known about the body before it is drained,
/// then collect the bytes. Reader bodies are drained up front so the message
/// still flushes as one socket write.
fn plan_body(body: &mut Body, http11: bool) -> Result<BodyPlan> {
    let known_size = body.size().is_some();
    let data = body.read_all()?;
    if known_size {
        Ok(BodyPlan::Sized(data))
    } else if http11 {
        Ok(BodyPlan::Chunked(data))
    } else {
        Ok(BodyPlan::UntilClose(data))
    }
}

fn imf_fixdate_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn write_chunked(out: &mut Vec<u8>, data: &[u8]) {
    for chunk in data.chunks(STREAM_CHUNK) {
        out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
}

/// Serialize `resp` onto the connection and flush it as one write.
pub fn write_response(conn: &Connection, resp: &mut Response) -> Result<()> {
    // bodyless statuses never carry content, whatever the handler stuffed in
    resp.clean_body(None);

    let http11 = resp.protocol.at_least(1, 1);
    let content_type = resp.body.mime().map(|m| m.to_string());
    let plan = plan_body(&mut resp.body, http11)?;

    if !resp.headers.contains("Date") {
        resp.headers.add("Date", imf_fixdate_now());
    }
    if let Some(ct) = content_type {
        if !resp.headers.contains("Content-Type") {
            resp.headers.add("Content-Type", ct);
        }
    }
    match &plan {
        BodyPlan::Sized(data) => {
            resp.headers.set("Content-Length", data.len().to_string());
            resp.headers.remove("Transfer-Encoding");
        }
        BodyPlan::Chunked(_) => {
            resp.headers.set("Transfer-Encoding", "chunked");
            resp.headers.remove("Content-Length");
        }
        BodyPlan::UntilClose(_) => {
            resp.headers.set("Connection", "close");
            resp.headers.remove("Content-Length");
        }
    }

    let mut message = Vec::with_capacity(512);
    message.extend_from_slice(
        format!(
            "{} {} {}\r\n",
            resp.protocol, resp.status.code, resp.status.message
        )
        .as_bytes(),
    );
    for (name, value) in &resp.headers {
        message.extend_from_slice(name.as_bytes());
        message.extend_from_slice(b": ");
        message.extend_from_slice(value.as_bytes());
        message.extend_from_slice(b"\r\n");
    }
    for cookie in &resp.cookies {
        message.extend_from_slice(b"Set-Cookie: ");
        message.extend_from_slice(cookie.to_string().as_bytes());
        message.extend_from_slice(b"\r\n");
    }
    message.extend_from_slice(b"\r\n");
    match &plan {
        BodyPlan::Sized(data) | BodyPlan::UntilClose(data) => {
            message.extend_from_slice(data);
        }
        BodyPlan::Chunked(data) => write_chunked(&mut message, data),
    }

    conn.with_io(|stream, _, output| {
        output.write(&message);
        output.flush(stream)
    })?;
    resp.mark_sent();
    Ok(())
}

/// Serialize `req` onto the connection (client role) and flush.
pub fn write_request(conn: &Connection, req: &mut Request) -> Result<()> {
    let http11 = req.protocol.at_least(1, 1);
    let content_type = req.body.mime().map(|m| m.to_string());
    let has_body = !req.body.is_empty() || req.body.is_pending();
    let plan = if has_body {
        Some(plan_body(&mut req.body, http11)?)
    } else {
        None
    };

    if !req.headers.contains("Host") {
        if let Some(authority) = &req.uri.authority {
            let mut host = if authority.host_is_ipv6() {
                format!("[{}]", authority.host)
            } else {
                authority.host.clone()
            };
            if let Some(port) = authority.port {
                host.push_str(&format!(":{}", port));
            }
            req.headers.add("Host", host);
        }
    }
    if let Some(agent) = &req.user_agent {
        if !req.headers.contains("User-Agent") {
            req.headers.add("User-Agent", agent.clone());
        }
    }
    if let Some(auth) = &req.auth {
        if !req.headers.contains("Authorization") && auth.scheme.eq_ignore_ascii_case("basic") {
            let token = BASE64.encode(format!("{}:{}", auth.user, auth.password));
            req.headers.add("Authorization", format!("Basic {}", token));
        }
    }
    if let Some(ct) = content_type {
        if !req.headers.contains("Content-Type") {
            req.headers.add("Content-Type", ct);
        }
    }
    match &plan {
        Some(BodyPlan::Sized(data)) => {
            req.headers.set("Content-Length", data.len().to_string());
            req.headers.remove("Transfer-Encoding");
        }
        Some(BodyPlan::Chunked(_)) => {
            req.headers.set("Transfer-Encoding", "chunked");
            req.headers.remove("Content-Length");
        }
        Some(BodyPlan::UntilClose(_)) => {
            req.headers.set("Connection", "close");
        }
        None => {}
    }
    if !req.cookies.is_empty() && !req.headers.contains("Cookie") {
        req.headers.add("Cookie", req.cookies.to_string());
    }

    let mut message = Vec::with_capacity(512);
    message.extend_from_slice(
        format!(
            "{} {} {}\r\n",
            req.method,
            req.uri.request_target(),
            req.protocol
        )
        .as_bytes(),
    );
    for (name, value) in &req.headers {
        message.extend_from_slice(name.as_bytes());
        message.extend_from_slice(b": ");
        message.extend_from_slice(value.as_bytes());
        message.extend_from_slice(b"\r\n");
    }
    message.extend_from_slice(b"\r\n");
    match &plan {
        Some(BodyPlan::Sized(data)) | Some(BodyPlan::UntilClose(data)) => {
            message.extend_from_slice(data);
        }
        Some(BodyPlan::Chunked(data)) => write_chunked(&mut message, data),
        None => {}
    }

    conn.with_io(|stream, _, output| {
        output.write(&message);
        output.flush(stream)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunked_framing_shape() {
        let mut out = Vec::new();
        write_chunked(&mut out, b"abc");
        assert_eq!(out, b"3\r\nabc\r\n0\r\n\r\n");
        let mut out = Vec::new();
        write_chunked(&mut out, b"");
        assert_eq!(out, b"0\r\n\r\n");
    }

    #[test]
    fn date_header_shape() {
        let d = imf_fixdate_now();
        assert!(d.ends_with(" GMT"));
        assert_eq!(d.matches(':').count(), 2);
    }
}
