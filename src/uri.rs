/*
 * uri.rs
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

//! URI grammar: `scheme://[user[:password]@]host[:port][/path][?query][#fragment]`.
//! Path segments are stored decoded with `.`/`..` collapsed at construction;
//! the query is an ordered multimap. Both origin form (`/path?query`, as seen
//! in request lines) and absolute form are accepted.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Path segment safe set: encode delimiters and anything that would split the
/// segment or terminate the path.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b'%')
    .add(b' ');

/// Query component set: encode separators so one `&`/`=` pair structure
/// survives the round trip. `+` is encoded because a literal plus would
/// otherwise decode as a space.
const QUERY: &AsciiSet = &CONTROLS
    .add(b'&')
    .add(b'=')
    .add(b'#')
    .add(b'%')
    .add(b'+')
    .add(b' ');

/// Userinfo in authority: encode @ and : so one @ separates userinfo from host.
const USERINFO: &AsciiSet = &CONTROLS
    .add(b'@')
    .add(b':')
    .add(b'%')
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b' ');

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Decode one query token: percent escapes plus `+` as space.
fn decode_query_token(s: &str) -> String {
    let plus_as_space = s.replace('+', " ");
    percent_decode_str(&plus_as_space)
        .decode_utf8_lossy()
        .into_owned()
}

/// Authority component: optional userinfo, host, optional port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authority {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl Authority {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            user: None,
            password: None,
            host: host.into(),
            port: None,
        }
    }

    pub fn with_port(host: impl Into<String>, port: u16) -> Self {
        Self {
            user: None,
            password: None,
            host: host.into(),
            port: Some(port),
        }
    }

    /// True when the host is an IPv6 literal, which must be bracketed in text.
    pub fn host_is_ipv6(&self) -> bool {
        self.host.contains(':')
    }

    /// Parse `[user[:password]@]host[:port]`. The host may be a bracketed
    /// IPv6 literal; `[::]:80` yields host `::`, port 80.
    pub fn parse(input: &str) -> Option<Self> {
        let mut auth = Authority::default();
        let host_part = match input.rfind('@') {
            Some(at) => {
                let userinfo = &input[..at];
                match userinfo.find(':') {
                    Some(colon) => {
                        auth.user = Some(decode(&userinfo[..colon]));
                        auth.password = Some(decode(&userinfo[colon + 1..]));
                    }
                    None => auth.user = Some(decode(userinfo)),
                }
                &input[at + 1..]
            }
            None => input,
        };
        if host_part.is_empty() {
            return None;
        }
        if let Some(rest) = host_part.strip_prefix('[') {
            let close = rest.find(']')?;
            auth.host = rest[..close].to_string();
            let after = &rest[close + 1..];
            if let Some(port) = after.strip_prefix(':') {
                auth.port = Some(port.parse().ok()?);
            } else if !after.is_empty() {
                return None;
            }
        } else {
            match host_part.rfind(':') {
                Some(colon) => {
                    auth.host = host_part[..colon].to_string();
                    auth.port = Some(host_part[colon + 1..].parse().ok()?);
                }
                None => auth.host = host_part.to_string(),
            }
        }
        if auth.host.is_empty() {
            return None;
        }
        Some(auth)
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}", utf8_percent_encode(user, USERINFO))?;
            if let Some(password) = &self.password {
                write!(f, ":{}", utf8_percent_encode(password, USERINFO))?;
            }
            write!(f, "@")?;
        }
        if self.host_is_ipv6() {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

/// Path as an ordered list of decoded segments. `.` and `..` are collapsed
/// when the path is built, so two equal paths always compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriPath {
    segments: Vec<String>,
    absolute: bool,
}

impl UriPath {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
            absolute: true,
        }
    }

    /// Build from text, percent-decoding each segment and collapsing dot
    /// segments: `/a/b/../c` → `/a/c`, `/a/./b` → `/a/b`.
    pub fn parse(input: &str) -> Self {
        let absolute = input.starts_with('/');
        let mut segments: Vec<String> = Vec::new();
        for raw in input.split('/') {
            match raw {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(decode(s)),
            }
        }
        Self { segments, absolute }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        let segment = segment.into();
        match segment.as_str() {
            "" | "." => {}
            ".." => {
                self.segments.pop();
            }
            _ => self.segments.push(segment),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for UriPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "{}", if self.absolute { "/" } else { "" });
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if self.absolute || i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", utf8_percent_encode(segment, PATH_SEGMENT))?;
        }
        Ok(())
    }
}

/// Query string: ordered multimap of decoded name → value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Parse `a=1&b=2`; keys without `=` get an empty value. `+` decodes as
    /// space, as does the urlencoded POST body which shares this grammar.
    pub fn parse(input: &str) -> Self {
        let mut q = Query::new();
        for pair in input.split('&') {
            if pair.is_empty() {
                continue;
            }
            match pair.find('=') {
                Some(eq) => q.add(
                    decode_query_token(&pair[..eq]),
                    decode_query_token(&pair[eq + 1..]),
                ),
                None => q.add(decode_query_token(pair), String::new()),
            }
        }
        q
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.pairs
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, "&")?;
            }
            write!(f, "{}", utf8_percent_encode(name, QUERY))?;
            if !value.is_empty() {
                write!(f, "={}", utf8_percent_encode(value, QUERY))?;
            }
        }
        Ok(())
    }
}

/// Parsed URI. Origin form has no scheme or authority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uri {
    pub scheme: String,
    pub authority: Option<Authority>,
    pub path: UriPath,
    pub query: Query,
    pub fragment: Option<String>,
}

impl Uri {
    /// Parse absolute (`scheme://...`) or origin (`/path?query`) form.
    pub fn parse(input: &str) -> Option<Self> {
        let mut uri = Uri::default();
        let mut rest = input;

        if let Some(scheme_end) = rest.find("://") {
            let scheme = &rest[..scheme_end];
            if scheme.is_empty()
                || !scheme
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
            {
                return None;
            }
            uri.scheme = scheme.to_ascii_lowercase();
            rest = &rest[scheme_end + 3..];
            let authority_end = rest
                .find(|c| matches!(c, '/' | '?' | '#'))
                .unwrap_or(rest.len());
            uri.authority = Some(Authority::parse(&rest[..authority_end])?);
            rest = &rest[authority_end..];
        }

        if let Some(hash) = rest.find('#') {
            uri.fragment = Some(decode(&rest[hash + 1..]));
            rest = &rest[..hash];
        }
        if let Some(question) = rest.find('?') {
            uri.query = Query::parse(&rest[question + 1..]);
            rest = &rest[..question];
        }
        uri.path = if rest.is_empty() && uri.authority.is_some() {
            UriPath::root()
        } else {
            UriPath::parse(rest)
        };
        Some(uri)
    }

    /// Effective port: explicit, or the scheme default (http 80, https 443).
    pub fn port(&self) -> Option<u16> {
        match self.authority.as_ref().and_then(|a| a.port) {
            Some(p) => Some(p),
            None => match self.scheme.as_str() {
                "http" => Some(80),
                "https" => Some(443),
                _ => None,
            },
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.authority.as_ref().map(|a| a.host.as_str())
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// The request-target for the request line: path plus query, no authority.
    pub fn request_target(&self) -> String {
        let mut out = self.path.to_string();
        if out.is_empty() {
            out.push('/');
        }
        if !self.query.is_empty() {
            out.push('?');
            out.push_str(&self.query.to_string());
        }
        out
    }

    /// Resolve a redirect Location against this URI: absolute locations are
    /// parsed as-is, origin-form locations inherit scheme and authority.
    pub fn resolve(&self, location: &str) -> Option<Uri> {
        if location.contains("://") {
            Uri::parse(location)
        } else {
            let mut next = Uri::parse(location)?;
            next.scheme = self.scheme.clone();
            next.authority = self.authority.clone();
            Some(next)
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.scheme.is_empty() {
            write!(f, "{}://", self.scheme)?;
        }
        if let Some(authority) = &self.authority {
            write!(f, "{}", authority)?;
        }
        write!(f, "{}", self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", utf8_percent_encode(fragment, QUERY))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_uri() {
        let u = Uri::parse("http://user:pw@example.com:8080/a/b?x=1&y=2#frag").unwrap();
        assert_eq!(u.scheme, "http");
        let a = u.authority.as_ref().unwrap();
        assert_eq!(a.user.as_deref(), Some("user"));
        assert_eq!(a.password.as_deref(), Some("pw"));
        assert_eq!(a.host, "example.com");
        assert_eq!(a.port, Some(8080));
        assert_eq!(u.path.segments(), &["a".to_string(), "b".to_string()]);
        assert_eq!(u.query.get("x"), Some("1"));
        assert_eq!(u.query.get("y"), Some("2"));
        assert_eq!(u.fragment.as_deref(), Some("frag"));
    }

    #[test]
    fn roundtrip_canonical() {
        for text in [
            "http://example.com/",
            "http://example.com/a/b?x=1",
            "https://user@example.com:444/p",
            "http://example.com/a%20b",
            "/just/a/path?q=1",
        ] {
            let u = Uri::parse(text).unwrap();
            assert_eq!(u.to_string(), text, "roundtrip failed for {}", text);
            assert_eq!(Uri::parse(&u.to_string()).unwrap(), u);
        }
    }

    #[test]
    fn dot_segments_collapse() {
        assert_eq!(UriPath::parse("/a/b/../c").to_string(), "/a/c");
        assert_eq!(UriPath::parse("/a/./b").to_string(), "/a/b");
        assert_eq!(UriPath::parse("/../a").to_string(), "/a");
        assert_eq!(UriPath::parse("/").to_string(), "/");
    }

    #[test]
    fn path_segments_decoded() {
        let p = UriPath::parse("/a%20b/c");
        assert_eq!(p.segments(), &["a b".to_string(), "c".to_string()]);
        assert_eq!(p.to_string(), "/a%20b/c");
    }

    #[test]
    fn ipv6_authority() {
        let a = Authority::parse("[::]:80").unwrap();
        assert_eq!(a.host, "::");
        assert_eq!(a.port, Some(80));
        let b = Authority::with_port("::1", 80);
        assert_eq!(b.to_string(), "[::1]:80");
    }

    #[test]
    fn query_multimap_order() {
        let q = Query::parse("a=1&b=2&a=3&flag");
        let all: Vec<_> = q.get_all("a").collect();
        assert_eq!(all, vec!["1", "3"]);
        assert_eq!(q.get("flag"), Some(""));
        let order: Vec<_> = q.iter().map(|(n, _)| n).collect();
        assert_eq!(order, vec!["a", "b", "a", "flag"]);
    }

    #[test]
    fn query_plus_decodes_as_space() {
        let q = Query::parse("name=two+words");
        assert_eq!(q.get("name"), Some("two words"));
        // and re-encodes as %20, which parses back identically
        let q2 = Query::parse(&q.to_string());
        assert_eq!(q2.get("name"), Some("two words"));
    }

    #[test]
    fn default_ports() {
        assert_eq!(Uri::parse("http://h/").unwrap().port(), Some(80));
        assert_eq!(Uri::parse("https://h/").unwrap().port(), Some(443));
        assert_eq!(Uri::parse("https://h:8443/").unwrap().port(), Some(8443));
    }

    #[test]
    fn resolve_location() {
        let base = Uri::parse("http://example.com/a/b").unwrap();
        let rel = base.resolve("/c?d=1").unwrap();
        assert_eq!(rel.to_string(), "http://example.com/c?d=1");
        let abs = base.resolve("https://other.net/x").unwrap();
        assert_eq!(abs.to_string(), "https://other.net/x");
    }

    #[test]
    fn request_target() {
        let u = Uri::parse("http://example.com").unwrap();
        assert_eq!(u.request_target(), "/");
        let u = Uri::parse("http://example.com/p?a=1").unwrap();
        assert_eq!(u.request_target(), "/p?a=1");
    }
}
