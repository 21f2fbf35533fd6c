/*
 * multipart.rs
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

//! Multipart bodies (RFC 2046 framing, RFC 2388 dispositions): `--B`
//! delimiters, a header block per part, terminator `--B--`. The boundary
//! generator grows the boundary until it appears in no part's content.

use crate::error::{Error, Result};
use crate::headers::Headers;

/// Default boundary, used when no content forces a longer one.
pub const DEFAULT_BOUNDARY: &str = "p0ny";

#[derive(Debug, Clone, Default)]
pub struct MultipartPart {
    pub headers: Headers,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Multipart {
    pub boundary: String,
    pub parts: Vec<MultipartPart>,
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}

impl Multipart {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    /// Pick a boundary that appears in none of the given values. Starts from
    /// the default and, at each occurrence, appends a character chosen to
    /// differ from the byte following the match: `0` against an alphabetic,
    /// `n` against a digit, `y` otherwise.
    pub fn generate_boundary<'a>(values: impl Iterator<Item = &'a [u8]> + Clone) -> String {
        let mut boundary = DEFAULT_BOUNDARY.to_string();
        loop {
            let mut grown = false;
            for value in values.clone() {
                while let Some(at) = find(value, boundary.as_bytes(), 0) {
                    let next = value.get(at + boundary.len()).copied();
                    let append = match next {
                        Some(b) if b.is_ascii_alphabetic() => '0',
                        Some(b) if b.is_ascii_digit() => 'n',
                        _ => 'y',
                    };
                    boundary.push(append);
                    grown = true;
                }
            }
            if !grown {
                return boundary;
            }
        }
    }

    /// Parse a complete multipart body against the given boundary.
    pub fn parse(data: &[u8], boundary: &str) -> Result<Self> {
        let delim = format!("--{}", boundary);
        let delim = delim.as_bytes();
        let mut multipart = Multipart::new(boundary);

        let mut pos = find(data, delim, 0)
            .ok_or_else(|| Error::new("multipart boundary not found"))?
            + delim.len();
        loop {
            if data[pos..].starts_with(b"--") {
                break; // terminator
            }
            // move past the CRLF that ends the delimiter line
            if data[pos..].starts_with(b"\r\n") {
                pos += 2;
            } else if data[pos..].starts_with(b"\n") {
                pos += 1;
            } else {
                return Err(Error::new("malformed multipart delimiter"));
            }
            let (headers, content_start) = parse_part_headers(data, pos)?;
            // content runs to the CRLF preceding the next delimiter
            let mut search = format!("\r\n--{}", multipart.boundary).into_bytes();
            let next = match find(data, &search, content_start) {
                Some(n) => n,
                None => {
                    search = format!("\n--{}", multipart.boundary).into_bytes();
                    find(data, &search, content_start)
                        .ok_or_else(|| Error::new("unterminated multipart part"))?
                }
            };
            multipart.parts.push(MultipartPart {
                headers,
                content: data[content_start..next].to_vec(),
            });
            pos = next + search.len();
        }
        Ok(multipart)
    }

    /// Serialize with CRLF line endings and the `--B--` terminator.
    pub fn format(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(b"--");
            out.extend_from_slice(self.boundary.as_bytes());
            out.extend_from_slice(b"\r\n");
            for (name, value) in &part.headers {
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b": ");
                out.extend_from_slice(value.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&part.content);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"--");
        out.extend_from_slice(self.boundary.as_bytes());
        out.extend_from_slice(b"--\r\n");
        out
    }
}

/// Parse the header block of one part; returns the headers and the offset of
/// the first content byte.
fn parse_part_headers(data: &[u8], mut pos: usize) -> Result<(Headers, usize)> {
    let mut headers = Headers::new();
    loop {
        let line_end = find(data, b"\n", pos)
            .ok_or_else(|| Error::new("unterminated part header block"))?;
        let mut line = &data[pos..line_end];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        pos = line_end + 1;
        if line.is_empty() {
            return Ok((headers, pos));
        }
        let text = std::str::from_utf8(line)
            .map_err(|_| Error::new("invalid bytes in part header"))?;
        match text.find(':') {
            Some(colon) => headers.add(
                text[..colon].trim().to_string(),
                text[colon + 1..].trim().to_string(),
            ),
            None => return Err(Error::new("malformed part header")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_boundary_for_empty_input() {
        let b = Multipart::generate_boundary(std::iter::empty());
        assert_eq!(b, "p0ny");
    }

    #[test]
    fn boundary_avoids_content() {
        let values: Vec<&[u8]> = vec![b"p0ny is here", b"xx p0nyy p0ny9 zz"];
        let b = Multipart::generate_boundary(values.iter().copied());
        for v in &values {
            assert!(find(v, b.as_bytes(), 0).is_none(), "boundary {} in {:?}", b, v);
        }
    }

    #[test]
    fn boundary_append_rule() {
        // "p0ny" followed by an alphabetic grows with '0'
        let values: Vec<&[u8]> = vec![b"p0nyQ"];
        let b = Multipart::generate_boundary(values.iter().copied());
        assert!(b.starts_with("p0ny0"));
        // followed by a digit grows with 'n'
        let values: Vec<&[u8]> = vec![b"p0ny5"];
        let b = Multipart::generate_boundary(values.iter().copied());
        assert!(b.starts_with("p0nyn"));
    }

    #[test]
    fn parse_two_parts() {
        let body = b"--B\r\n\
            Content-Disposition: form-data; name=f\r\n\
            \r\n\
            value1\r\n\
            --B\r\n\
            Content-Disposition: form-data; name=g; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            hi\r\n\
            --B--\r\n";
        let m = Multipart::parse(body, "B").unwrap();
        assert_eq!(m.parts.len(), 2);
        assert_eq!(m.parts[0].content, b"value1");
        assert_eq!(m.parts[1].content, b"hi");
        assert_eq!(
            m.parts[1].headers.get("content-type"),
            Some("text/plain")
        );
    }

    #[test]
    fn format_parse_roundtrip() {
        let mut m = Multipart::new("xYz");
        let mut p = MultipartPart::default();
        p.headers.add("Content-Disposition", "form-data; name=a");
        p.content = b"binary\x00data\r\nwith lines".to_vec();
        m.parts.push(p);
        let bytes = m.format();
        let parsed = Multipart::parse(&bytes, "xYz").unwrap();
        assert_eq!(parsed.parts.len(), 1);
        assert_eq!(parsed.parts[0].content, m.parts[0].content);
        assert_eq!(
            parsed.parts[0].headers.get("content-disposition"),
            Some("form-data; name=a")
        );
    }

    #[test]
    fn preamble_is_skipped() {
        let body = b"ignored preamble\r\n--B\r\nX: y\r\n\r\ndata\r\n--B--\r\n";
        let m = Multipart::parse(body, "B").unwrap();
        assert_eq!(m.parts.len(), 1);
        assert_eq!(m.parts[0].content, b"data");
    }
}
