/*
 * protocol.rs
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

//! Protocol identity: name and version pair, ordered by (major, minor).

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    pub name: String,
    pub major: u32,
    pub minor: u32,
}

impl Protocol {
    pub fn http_1_0() -> Self {
        Self {
            name: "HTTP".to_string(),
            major: 1,
            minor: 0,
        }
    }

    pub fn http_1_1() -> Self {
        Self {
            name: "HTTP".to_string(),
            major: 1,
            minor: 1,
        }
    }

    pub fn new(name: impl Into<String>, major: u32, minor: u32) -> Self {
        Self {
            name: name.into(),
            major,
            minor,
        }
    }

    /// Parse `HTTP/1.1`.
    pub fn parse(input: &str) -> Option<Self> {
        let slash = input.find('/')?;
        let name = &input[..slash];
        let version = &input[slash + 1..];
        let dot = version.find('.')?;
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            major: version[..dot].parse().ok()?,
            minor: version[dot + 1..].parse().ok()?,
        })
    }

    /// True for HTTP/1.1 or later within HTTP/1.x handling.
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::http_1_1()
    }
}

impl PartialOrd for Protocol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some((self.major, self.minor).cmp(&(other.major, other.minor)))
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.name, self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format() {
        let p = Protocol::parse("HTTP/1.1").unwrap();
        assert_eq!(p.name, "HTTP");
        assert_eq!((p.major, p.minor), (1, 1));
        assert_eq!(p.to_string(), "HTTP/1.1");
        assert!(Protocol::parse("HTTP1.1").is_none());
        assert!(Protocol::parse("HTTP/11").is_none());
    }

    #[test]
    fn ordering_by_version() {
        let old = Protocol::parse("HTTP/1.0").unwrap();
        let new = Protocol::parse("HTTP/1.1").unwrap();
        assert!(old < new);
        assert!(new.at_least(1, 1));
        assert!(!old.at_least(1, 1));
    }
}
