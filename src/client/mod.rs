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

//! Blocking HTTP client: resolve, connect (TLS for https), format the
//! request, parse the response. Follows redirects up to the configured
//! limit; the response past the limit is surfaced verbatim.

pub mod async_client;

pub use async_client::AsyncClient;

use std::time::Duration;

use tracing::debug;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::h1::ParseOptions;
use crate::net::{self, NetStream, TlsContext, TlsRole, VerifyMode};
use crate::net::tls::TlsOptions;
use crate::request::Request;
use crate::response::Response;

/// Library-qualified default User-Agent.
pub const DEFAULT_USER_AGENT: &str = concat!("canter/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct Client {
    timeout: Option<Duration>,
    max_response_size: Option<u64>,
    max_redirects: u32,
    user_agent: String,
    verify: VerifyMode,
    tls: Option<TlsContext>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self {
            timeout: None,
            max_response_size: None,
            max_redirects: 0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            verify: VerifyMode::Strict,
            tls: None,
        }
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn set_max_response_size(&mut self, bytes: Option<u64>) {
        self.max_response_size = bytes;
    }

    /// How many 3xx responses to follow. Zero surfaces redirects directly.
    pub fn set_max_redirects(&mut self, count: u32) {
        self.max_redirects = count;
    }

    pub fn set_user_agent(&mut self, agent: impl Into<String>) {
        self.user_agent = agent.into();
    }

    pub fn set_verify_mode(&mut self, verify: VerifyMode) {
        self.verify = verify;
        self.tls = None;
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub(crate) fn parse_options(&self) -> ParseOptions {
        ParseOptions::with_max_size(self.max_response_size)
    }

    fn tls_context(&mut self) -> Result<TlsContext> {
        match &self.tls {
            Some(context) => Ok(context.clone()),
            None => {
                let options = TlsOptions {
                    verify: self.verify,
                    ..TlsOptions::default()
                };
                let context = options.client_context()?;
                self.tls = Some(context.clone());
                Ok(context)
            }
        }
    }

    /// Resolve the URI's authority and connect, performing the TLS handshake
    /// for https schemes.
    pub fn connect(&mut self, uri: &crate::uri::Uri) -> Result<Connection> {
        let host = uri
            .host()
            .ok_or_else(|| Error::new("request URI has no host"))?
            .to_string();
        let service = match uri.authority.as_ref().and_then(|a| a.port) {
            Some(port) => port.to_string(),
            None => {
                if uri.scheme.is_empty() {
                    return Err(Error::new("request URI has no scheme"));
                }
                uri.scheme.clone()
            }
        };
        let endpoints = net::resolve(&host, &service)?;
        let stream = NetStream::connect(&endpoints, self.timeout)?;
        let conn = Connection::new(stream);
        self.on_connect(uri, &conn)?;
        Ok(conn)
    }

    /// Post-connect step: TLS handshake for https URIs.
    fn on_connect(&mut self, uri: &crate::uri::Uri, conn: &Connection) -> Result<()> {
        if uri.is_secure() {
            let context = self.tls_context()?;
            conn.handshake(TlsRole::Client, &context, uri.host())?;
        }
        Ok(())
    }

    /// Issue the request and return the parsed response. POST data is
    /// formatted into the body implicitly when the body is empty; redirects
    /// are followed while the budget lasts.
    pub fn query(&mut self, request: &mut Request) -> Result<Response> {
        if request.user_agent.is_none() {
            request.user_agent = Some(self.user_agent.clone());
        }
        if request.body.is_empty() && !request.post.is_empty() {
            request.format_post()?;
        }
        let opts = self.parse_options();
        let mut redirects_left = self.max_redirects;
        loop {
            let conn = self.connect(&request.uri)?;
            conn.send_request(request)?;
            let mut response = Response::new();
            conn.read_response(&mut response, &opts)?;

            if response.status.is_redirect() && redirects_left > 0 {
                if let Some(location) = response.headers.get("Location") {
                    let next = request
                        .uri
                        .resolve(location)
                        .ok_or_else(|| Error::new("unparseable redirect location"))?;
                    debug!(location = %next, "following redirect");
                    redirects_left -= 1;
                    // drain and drop this exchange before reconnecting
                    response.body.read_all().ok();
                    conn.close(true);
                    request.uri = next;
                    request.headers.remove("Host");
                    continue;
                }
            }
            return Ok(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::Uri;

    #[test]
    fn default_user_agent_is_library_qualified() {
        assert!(DEFAULT_USER_AGENT.starts_with("canter/"));
        let client = Client::new();
        assert_eq!(client.user_agent(), DEFAULT_USER_AGENT);
    }

    #[test]
    fn connect_requires_host_and_service() {
        let mut client = Client::new();
        let no_host = Uri::parse("/origin/only").unwrap();
        assert!(client.connect(&no_host).is_err());
    }
}
