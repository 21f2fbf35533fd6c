/*
 * response.rs
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

//! HTTP response: status, headers, cookies, body, and the connection it will
//! be written back on.

use crate::body::Body;
use crate::connection::Connection;
use crate::cookies::SetCookie;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::protocol::Protocol;

/// Standard reason phrase for a status code; empty for unknown codes.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        421 => "Misdirected Request",
        422 => "Unprocessable Entity",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        511 => "Network Authentication Required",
        _ => "",
    }
}

/// Status line payload: numeric code plus reason phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub message: String,
}

impl Status {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            message: reason_phrase(code).to_string(),
        }
    }

    pub fn with_message(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// Statuses the protocol forbids a body for: 1xx, 204, 304.
    pub fn is_bodyless(&self) -> bool {
        (100..200).contains(&self.code) || self.code == 204 || self.code == 304
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new(200)
    }
}

#[derive(Debug, Default)]
pub struct Response {
    pub status: Status,
    pub protocol: Protocol,
    pub headers: Headers,
    pub cookies: Vec<SetCookie>,
    pub body: Body,
    connection: Option<Connection>,
    sent: bool,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(code: u16) -> Self {
        Self {
            status: Status::new(code),
            ..Self::default()
        }
    }

    pub fn set_status(&mut self, code: u16) {
        self.status = Status::new(code);
    }

    pub fn add_cookie(&mut self, cookie: SetCookie) {
        self.cookies.push(cookie);
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub(crate) fn attach(&mut self, conn: Connection) {
        self.connection = Some(conn);
    }

    /// Move the connection out, e.g. for detached streaming.
    pub fn take_connection(&mut self) -> Option<Connection> {
        self.connection.take()
    }

    pub fn sent(&self) -> bool {
        self.sent
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sent = true;
    }

    /// Discard the body when the exchange must not carry one: HEAD requests
    /// and the bodyless status codes.
    pub fn clean_body(&mut self, request_method: Option<&str>) {
        let head = request_method
            .map(|m| m.eq_ignore_ascii_case("HEAD"))
            .unwrap_or(false);
        if head || self.status.is_bodyless() {
            self.body.clear();
        }
    }

    /// Format this response onto its connection and flush. Requires a
    /// connection (the server attaches one before invoking the handler).
    pub fn send(&mut self) -> Result<()> {
        if self.sent {
            return Err(Error::state("response already sent"));
        }
        let conn = self
            .connection
            .clone()
            .ok_or_else(|| Error::state("response has no connection"))?;
        conn.send_response(self)
    }

    /// True when this exchange closes the connection afterwards.
    pub fn closes_connection(&self) -> bool {
        self.headers
            .get("Connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::MimeType;

    #[test]
    fn reason_lookup() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(411), "Length Required");
        assert_eq!(reason_phrase(417), "Expectation Failed");
        assert_eq!(reason_phrase(599), "");
    }

    #[test]
    fn status_classes() {
        assert!(Status::new(204).is_bodyless());
        assert!(Status::new(100).is_bodyless());
        assert!(Status::new(304).is_bodyless());
        assert!(!Status::new(200).is_bodyless());
        assert!(Status::new(302).is_redirect());
        assert!(Status::new(201).is_success());
    }

    #[test]
    fn clean_body_for_head_and_bodyless() {
        let mut r = Response::with_status(200);
        r.body = Body::from_text(MimeType::text_plain(), "data");
        r.clean_body(Some("HEAD"));
        assert!(r.body.is_empty());

        let mut r = Response::with_status(304);
        r.body = Body::from_text(MimeType::text_plain(), "data");
        r.clean_body(Some("GET"));
        assert!(r.body.is_empty());

        let mut r = Response::with_status(200);
        r.body = Body::from_text(MimeType::text_plain(), "data");
        r.clean_body(Some("GET"));
        assert!(!r.body.is_empty());
    }

    #[test]
    fn send_without_connection_is_a_state_error() {
        let mut r = Response::new();
        assert!(r.send().unwrap_err().is_state());
    }
}
