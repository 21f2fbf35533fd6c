/*
 * mime.rs
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

//! Media types (RFC 2045): type/subtype plus at most one parameter, which is
//! all HTTP message framing needs (charset, boundary).

use std::fmt;

use crate::headers::{format_parameter_value, parse_parameters};

/// Checks if a character is valid in an RFC 2045 token.
#[inline]
pub fn is_token_char(c: u8) -> bool {
    matches!(c,
        b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z' |
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'{' | b'|' | b'}' | b'~'
    )
}

/// Checks if the string is a valid RFC 2045 token (1+ token chars).
pub fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_token_char)
}

/// Media type: primary type, subtype, optional single parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeType {
    pub type_: String,
    pub subtype: String,
    pub parameter: Option<(String, String)>,
}

pub const TEXT_PLAIN: &str = "text/plain";
pub const TEXT_HTML: &str = "text/html";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
pub const APPLICATION_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

impl MimeType {
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            subtype: subtype.into(),
            parameter: None,
        }
    }

    pub fn with_parameter(
        type_: impl Into<String>,
        subtype: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            subtype: subtype.into(),
            parameter: Some((name.into(), value.into())),
        }
    }

    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    pub fn form_urlencoded() -> Self {
        Self::new("application", "x-www-form-urlencoded")
    }

    pub fn multipart_form_data(boundary: impl Into<String>) -> Self {
        Self::with_parameter("multipart", "form-data", "boundary", boundary)
    }

    /// Wildcard match: `*` on either side of the pattern matches any component.
    /// Comparison is case-insensitive per RFC 2045.
    pub fn matches_type(&self, type_: &str, subtype: &str) -> bool {
        (type_ == "*" || self.type_.eq_ignore_ascii_case(type_))
            && (subtype == "*" || self.subtype.eq_ignore_ascii_case(subtype))
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        match &self.parameter {
            Some((n, v)) if n.eq_ignore_ascii_case(name) => Some(v),
            _ => None,
        }
    }

    /// Parse a Content-Type value: `type/subtype` with optional parameters;
    /// only the first parameter is kept.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let (type_part, params_part) = match value.find(';') {
            Some(i) => {
                let (a, b) = value.split_at(i);
                (a.trim(), b[1..].trim())
            }
            None => (value, ""),
        };
        let slash = type_part.find('/')?;
        let primary = type_part[..slash].trim();
        let sub = type_part[slash + 1..].trim();
        if !is_token(primary) || !is_token(sub) {
            return None;
        }
        let parameter = parse_parameters(params_part, b';')
            .into_iter()
            .next();
        Some(Self {
            type_: primary.to_string(),
            subtype: sub.to_string(),
            parameter,
        })
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        if let Some((name, value)) = &self.parameter {
            write!(f, "; {}={}", name, format_parameter_value(value))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple() {
        let m = MimeType::parse("text/html").unwrap();
        assert_eq!(m.type_, "text");
        assert_eq!(m.subtype, "html");
        assert!(m.parameter.is_none());
    }

    #[test]
    fn parse_with_parameter() {
        let m = MimeType::parse("multipart/form-data; boundary=p0ny").unwrap();
        assert!(m.matches_type("multipart", "form-data"));
        assert_eq!(m.parameter("boundary"), Some("p0ny"));
        assert_eq!(m.parameter("Boundary"), Some("p0ny"));
    }

    #[test]
    fn parse_quoted_parameter() {
        let m = MimeType::parse("multipart/form-data; boundary=\"a b\\\"c\"").unwrap();
        assert_eq!(m.parameter("boundary"), Some("a b\"c"));
    }

    #[test]
    fn wildcard_match() {
        let m = MimeType::new("text", "plain");
        assert!(m.matches_type("*", "*"));
        assert!(m.matches_type("text", "*"));
        assert!(m.matches_type("*", "plain"));
        assert!(m.matches_type("TEXT", "PLAIN"));
        assert!(!m.matches_type("text", "html"));
    }

    #[test]
    fn rejects_non_token() {
        assert!(MimeType::parse("text html").is_none());
        assert!(MimeType::parse("").is_none());
    }

    #[test]
    fn display_quotes_when_needed() {
        let m = MimeType::with_parameter("multipart", "form-data", "boundary", "a b");
        assert_eq!(m.to_string(), "multipart/form-data; boundary=\"a\\ b\"");
        let m = MimeType::with_parameter("text", "plain", "charset", "utf-8");
        assert_eq!(m.to_string(), "text/plain; charset=utf-8");
    }
}
