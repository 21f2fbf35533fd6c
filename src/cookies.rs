/*
 * cookies.rs
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

//! Cookies: the request `Cookie` list grammar and response `Set-Cookie`
//! entries with their standard attributes. Names are case-sensitive, unlike
//! header names.

use std::fmt;

/// Ordered case-sensitive multimap of cookie name → value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies {
    entries: Vec<(String, String)>,
}

impl Cookies {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Parse a request `Cookie` header value: `name=value(; name=value)*`.
    /// Pairs without `=` are skipped.
    pub fn parse(value: &str) -> Self {
        let mut cookies = Cookies::new();
        for pair in value.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            if let Some(eq) = pair.find('=') {
                let name = pair[..eq].trim();
                let val = pair[eq + 1..].trim();
                if !name.is_empty() {
                    cookies.add(name, val);
                }
            }
        }
        cookies
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Cookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

/// One response cookie: formatted as a single `Set-Cookie` header with its
/// attributes in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    attributes: Vec<(String, Option<String>)>,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            attributes: Vec::new(),
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.attributes.push(("Path".to_string(), Some(path.into())));
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.attributes
            .push(("Domain".to_string(), Some(domain.into())));
        self
    }

    pub fn expires(mut self, when: impl Into<String>) -> Self {
        self.attributes
            .push(("Expires".to_string(), Some(when.into())));
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.attributes
            .push(("Max-Age".to_string(), Some(seconds.to_string())));
        self
    }

    pub fn secure(mut self) -> Self {
        self.attributes.push(("Secure".to_string(), None));
        self
    }

    pub fn http_only(mut self) -> Self {
        self.attributes.push(("HttpOnly".to_string(), None));
        self
    }

    pub fn same_site(mut self, mode: impl Into<String>) -> Self {
        self.attributes
            .push(("SameSite".to_string(), Some(mode.into())));
        self
    }

    /// Parse a `Set-Cookie` value back into name, value, attributes.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(';');
        let first = parts.next()?.trim();
        let eq = first.find('=')?;
        let mut cookie = SetCookie::new(first[..eq].trim(), first[eq + 1..].trim());
        for attr in parts {
            let attr = attr.trim();
            if attr.is_empty() {
                continue;
            }
            match attr.find('=') {
                Some(eq) => cookie.attributes.push((
                    attr[..eq].trim().to_string(),
                    Some(attr[eq + 1..].trim().to_string()),
                )),
                None => cookie.attributes.push((attr.to_string(), None)),
            }
        }
        Some(cookie)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        for (name, value) in &self.attributes {
            match value {
                Some(v) => write!(f, "; {}={}", name, v)?,
                None => write!(f, "; {}", name)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cookie_list() {
        let c = Cookies::parse("session=abc123; theme=dark; broken; empty=");
        assert_eq!(c.len(), 3);
        assert_eq!(c.get("session"), Some("abc123"));
        assert_eq!(c.get("theme"), Some("dark"));
        assert_eq!(c.get("empty"), Some(""));
        assert!(!c.contains("broken"));
    }

    #[test]
    fn names_are_case_sensitive() {
        let c = Cookies::parse("Name=1; name=2");
        assert_eq!(c.get("Name"), Some("1"));
        assert_eq!(c.get("name"), Some("2"));
    }

    #[test]
    fn cookie_list_roundtrip() {
        let text = "a=1; b=2; a=3";
        let c = Cookies::parse(text);
        assert_eq!(c.to_string(), text);
    }

    #[test]
    fn set_cookie_attributes_in_order() {
        let c = SetCookie::new("id", "42")
            .path("/")
            .secure()
            .http_only()
            .max_age(3600);
        assert_eq!(c.to_string(), "id=42; Path=/; Secure; HttpOnly; Max-Age=3600");
    }

    #[test]
    fn set_cookie_parse() {
        let c = SetCookie::parse("id=42; Path=/; Secure").unwrap();
        assert_eq!(c.name, "id");
        assert_eq!(c.value, "42");
        assert_eq!(c.attribute("path"), Some("/"));
        assert!(c.has_attribute("secure"));
        assert!(!c.has_attribute("httponly"));
    }
}
