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

//! HTTP/1.x wire format: the pull parser reading messages off a buffered
//! stream and the formatter writing them back. Server and client use the
//! same pair with the roles reversed.

pub mod formatter;
pub mod parser;

/// Parser behavior switches and limits.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Cap on total message bytes (headers plus declared body). Exceeding it
    /// suggests 413.
    pub max_size: Option<u64>,
    /// Accept obsolete folded header continuation lines. Off: folding is a
    /// syntax error (400).
    pub parse_folded_headers: bool,
    /// Keep the Cookie header in the header map instead of consuming it into
    /// the cookie multimap.
    pub preserve_cookie_headers: bool,
}

impl ParseOptions {
    pub fn with_max_size(max_size: Option<u64>) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }
}
