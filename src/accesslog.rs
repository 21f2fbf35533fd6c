/*
 * accesslog.rs
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

//! Apache-style access log line formatting. Honored placeholders: `%h` `%l`
//! `%u` `%t` `%r` `%s` `%b`, `%{Name}i` request header lookup, and `%P` for
//! the worker index. Unknown placeholders pass through verbatim.

use chrono::Local;

use crate::request::Request;
use crate::response::Response;

/// `%h %l %u %t "%r" %s %b "%{Referer}i" "%{User-Agent}i"`
pub const COMBINED_LOG_FORMAT: &str =
    "%h %l %u %t \"%r\" %s %b \"%{Referer}i\" \"%{User-Agent}i\"";

/// `%h %l %u %t "%r" %s %b`
pub const COMMON_LOG_FORMAT: &str = "%h %l %u %t \"%r\" %s %b";

fn dash_if_empty(value: String) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value
    }
}

/// Format one log line for a completed exchange.
pub fn log_response(
    request: &Request,
    response: &Response,
    format: &str,
    worker_index: usize,
) -> String {
    let mut out = String::with_capacity(format.len() + 64);
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if closed && chars.peek() == Some(&'i') {
                    chars.next();
                    out.push_str(&dash_if_empty(
                        request.headers.get(&name).unwrap_or("").to_string(),
                    ));
                } else {
                    // not a header lookup; emit what was consumed verbatim
                    out.push_str("%{");
                    out.push_str(&name);
                    if closed {
                        out.push('}');
                    }
                }
            }
            Some('h') => {
                chars.next();
                let host = request
                    .connection()
                    .and_then(|c| c.remote_address())
                    .map(|a| a.ip().to_string())
                    .unwrap_or_default();
                out.push_str(&dash_if_empty(host));
            }
            Some('l') => {
                chars.next();
                out.push('-');
            }
            Some('u') => {
                chars.next();
                let user = request
                    .auth
                    .as_ref()
                    .map(|a| a.user.clone())
                    .unwrap_or_default();
                out.push_str(&dash_if_empty(user));
            }
            Some('t') => {
                chars.next();
                out.push_str(&Local::now().format("[%d/%b/%Y:%H:%M:%S %z]").to_string());
            }
            Some('r') => {
                chars.next();
                out.push_str(&format!(
                    "{} {} {}",
                    request.method,
                    request.uri.request_target(),
                    request.protocol
                ));
            }
            Some('s') => {
                chars.next();
                out.push_str(&response.status.code.to_string());
            }
            Some('b') => {
                chars.next();
                let bytes = response
                    .headers
                    .get("Content-Length")
                    .and_then(|v| v.parse::<u64>().ok())
                    .or_else(|| response.body.size())
                    .unwrap_or(0);
                if bytes == 0 {
                    out.push('-');
                } else {
                    out.push_str(&bytes.to_string());
                }
            }
            Some('P') => {
                chars.next();
                out.push_str(&worker_index.to_string());
            }
            Some(other) => {
                // unknown placeholder: emitted verbatim
                chars.next();
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::Uri;

    fn sample() -> (Request, Response) {
        let mut request = Request::with_uri("GET", Uri::parse("/ping?x=1").unwrap());
        request.headers.add("User-Agent", "test-agent");
        request.headers.add("Referer", "http://example.com/");
        let mut response = Response::with_status(200);
        response.headers.add("Content-Length", "42");
        (request, response)
    }

    #[test]
    fn request_line_status_and_size() {
        let (request, response) = sample();
        let line = log_response(&request, &response, "\"%r\" %s %b", 3);
        assert_eq!(line, "\"GET /ping?x=1 HTTP/1.1\" 200 42");
    }

    #[test]
    fn header_lookup_and_worker() {
        let (request, response) = sample();
        let line = log_response(&request, &response, "%{User-Agent}i %{Missing}i %P", 7);
        assert_eq!(line, "test-agent - 7");
    }

    #[test]
    fn unknown_placeholder_passes_through() {
        let (request, response) = sample();
        let line = log_response(&request, &response, "%q %l", 0);
        assert_eq!(line, "%q -");
    }

    #[test]
    fn zero_size_is_dash() {
        let (request, mut response) = sample();
        response.headers.set("Content-Length", "0");
        let line = log_response(&request, &response, "%b", 0);
        assert_eq!(line, "-");
    }

    #[test]
    fn combined_format_shape() {
        let (request, response) = sample();
        let line = log_response(&request, &response, COMBINED_LOG_FORMAT, 0);
        assert!(line.contains("\"GET /ping?x=1 HTTP/1.1\" 200 42"));
        assert!(line.contains("\"http://example.com/\""));
        assert!(line.contains("\"test-agent\""));
        assert!(line.starts_with("- - -")); // no connection, no auth user
    }
}
