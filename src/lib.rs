/*
 * lib.rs
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

//! Canter: an HTTP/1.x protocol library over blocking sockets.
//!
//! The pieces, bottom up:
//! - deadline transport over TCP or rustls TLS ([`net`]), with the buffered
//!   read/write layer the parser drives ([`buffer`]);
//! - the wire grammars: URIs, headers, cookies, media types, multipart;
//! - the message parser and formatter ([`h1`]), symmetric between roles;
//! - [`Connection`] binding one stream to a request/response exchange;
//! - the [`Server`] accept/dispatch engine with its worker pool, and the
//!   blocking [`Client`] plus the pump-thread [`AsyncClient`].
//!
//! Concurrency is plain OS threads; workers block inside their connection.
//! There is no async runtime.

pub mod accesslog;
pub mod body;
pub mod buffer;
pub mod client;
pub mod connection;
pub mod cookies;
pub mod error;
pub mod h1;
pub mod headers;
pub mod mime;
pub mod multipart;
pub mod net;
pub mod protocol;
pub mod request;
pub mod response;
pub mod server;
pub mod uri;

pub use body::Body;
pub use client::{AsyncClient, Client};
pub use connection::Connection;
pub use cookies::{Cookies, SetCookie};
pub use error::{Error, Result};
pub use headers::Headers;
pub use mime::MimeType;
pub use multipart::Multipart;
pub use net::{TlsContext, VerifyMode};
pub use protocol::Protocol;
pub use request::{Request, RequestFile};
pub use response::{Response, Status};
pub use server::{Handler, Server};
pub use uri::{Authority, Query, Uri, UriPath};
