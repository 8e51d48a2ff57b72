// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use percent_encoding::percent_decode;

use error::HttpError;

/// A parsed request URI.
///
/// `path` and `query` are the raw (still percent-encoded) components;
/// decoding and normalization happen when the request context builds its
/// `path_info`.
#[derive(Debug, Clone, Default)]
pub struct Uri {
    /// The URI exactly as it appeared on the request line.
    pub raw: String,
    /// Path component, percent-encoded.
    pub path: String,
    /// Query string without the leading `?`, empty if absent.
    pub query: String,
    /// Extension of the last path segment, without the dot. Empty if none.
    pub ext: String,
}

impl Uri {
    /// Splits a request-target into path, query and extension.
    pub fn parse(raw: &str) -> Result<Uri, HttpError> {
        if raw.is_empty() {
            return Err(HttpError::Protocol(400, "empty uri"));
        }
        let (path, query) = match raw.find('?') {
            Some(pos) => (&raw[..pos], &raw[pos + 1..]),
            None => (raw, ""),
        };
        Ok(Uri {
            raw: raw.to_owned(),
            path: path.to_owned(),
            query: query.to_owned(),
            ext: extension(path).to_owned(),
        })
    }

    /// Percent-decodes the path and normalizes away `.`/`..` segments and
    /// duplicate separators. Fails with `400` when the encoding is not valid
    /// UTF-8 or when `..` would escape the root.
    pub fn decoded_path(&self) -> Result<String, HttpError> {
        let decoded = percent_decode(self.path.as_bytes())
            .decode_utf8()
            .map_err(|_| HttpError::Protocol(400, "uri is not valid utf-8"))?;
        normalize(&decoded)
    }
}

// Extension of the final segment: the part after the last '.', provided that
// dot comes after the last '/'.
fn extension(path: &str) -> &str {
    let last_seg = match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    };
    match last_seg.rfind('.') {
        Some(pos) if pos + 1 < last_seg.len() => &last_seg[pos + 1..],
        _ => "",
    }
}

// Collapses duplicate slashes and resolves "." and ".." segments. The result
// always starts with '/'; a trailing slash is preserved.
fn normalize(path: &str) -> Result<String, HttpError> {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => (),
            ".." => {
                if segments.pop().is_none() {
                    return Err(HttpError::Protocol(400, "uri escapes the root"));
                }
            }
            other => segments.push(other),
        }
    }

    let mut out = String::with_capacity(path.len());
    for seg in &segments {
        out.push('/');
        out.push_str(seg);
    }
    if out.is_empty() {
        out.push('/');
    } else if path.ends_with('/') {
        out.push('/');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{normalize, Uri};

    #[test]
    fn splits_query_and_ext() {
        let uri = Uri::parse("/a/b.html?x=1&y=2").unwrap();
        assert_eq!(uri.path, "/a/b.html");
        assert_eq!(uri.query, "x=1&y=2");
        assert_eq!(uri.ext, "html");

        let uri = Uri::parse("/a.dir/plain").unwrap();
        assert_eq!(uri.ext, "");
    }

    #[test]
    fn empty_uri_is_rejected() {
        assert!(Uri::parse("").is_err());
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("/a//b").unwrap(), "/a/b");
        assert_eq!(normalize("/a/./b").unwrap(), "/a/b");
        assert_eq!(normalize("/a/b/../c").unwrap(), "/a/c");
        assert_eq!(normalize("/a/b/").unwrap(), "/a/b/");
        assert!(normalize("/../etc/passwd").is_err());
    }

    #[test]
    fn decoding() {
        let uri = Uri::parse("/a%20b/c").unwrap();
        assert_eq!(uri.decoded_path().unwrap(), "/a b/c");

        // Encoded dot segments are resolved after decoding.
        let uri = Uri::parse("/a/%2e%2e/b").unwrap();
        assert_eq!(uri.decoded_path().unwrap(), "/b");
    }
}
