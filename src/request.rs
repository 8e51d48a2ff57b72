// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Per-request receive context.
//!
//! An `Rx` is created when a message's header block is parsed and destroyed
//! when the request completes; a keep-alive connection builds a fresh one for
//! every request it serves.

use std::i64;

use arrayvec::ArrayString;
use atoi::atoi;
use chrono::DateTime;

use auth::{parse_authenticate, AuthChallenge};
use chunk::ChunkState;
use error::HttpError;
use headers::HeaderMap;
use limits::Limits;
use range::{parse_range, Range};
use uri::Uri;

pub const METHOD_DELETE: u32 = 0x1;
pub const METHOD_GET: u32 = 0x2;
pub const METHOD_HEAD: u32 = 0x4;
pub const METHOD_OPTIONS: u32 = 0x8;
pub const METHOD_POST: u32 = 0x10;
pub const METHOD_PUT: u32 = 0x20;
pub const METHOD_TRACE: u32 = 0x40;

/// The body uses chunked transfer encoding.
pub const RX_CHUNKED: u32 = 0x1;
/// A conditional date header was received.
pub const RX_IF_MODIFIED: u32 = 0x2;

/// Maps a method name to its flag bit. Unknown methods are a `400`.
pub fn method_flag(name: &str) -> Option<u32> {
    match name {
        "DELETE" => Some(METHOD_DELETE),
        "GET" => Some(METHOD_GET),
        "HEAD" => Some(METHOD_HEAD),
        "OPTIONS" => Some(METHOD_OPTIONS),
        "POST" => Some(METHOD_POST),
        "PUT" => Some(METHOD_PUT),
        "TRACE" => Some(METHOD_TRACE),
        _ => None,
    }
}

/// Connection-level directives extracted while applying headers.
#[derive(Debug, Default)]
pub struct Directives {
    /// New keep-alive count, if a header changed it: `-1` forces a close
    /// after the current response, `0` disables reuse.
    pub keep_alive: Option<i32>,
    /// The client asked for a `100 Continue` interim response.
    pub expect_continue: bool,
}

/// State of a single received message (a request on the server side, a
/// response on the client side).
pub struct Rx {
    pub method: ArrayString<[u8; 16]>,
    pub method_flags: u32,

    /// Request-target exactly as received.
    pub uri: String,
    pub parsed_uri: Uri,
    /// Decoded, normalized path. Handlers may carve a `script_name` prefix
    /// off this after routing.
    pub path_info: String,
    pub script_name: String,

    pub version: (u8, u8),

    /// Declared body length: `-1` when absent, `i64::MAX` when chunked or
    /// (client side) delimited by connection close.
    pub length: i64,
    /// Bytes of the current framing unit still expected from the peer.
    pub remaining_content: i64,
    /// Body bytes handed to the receive queue so far.
    pub received_content: i64,

    pub flags: u32,
    pub chunk_state: ChunkState,

    pub headers: HeaderMap,
    /// The raw header block, kept for tracing.
    pub header_packet: Vec<u8>,

    pub etags: Vec<String>,
    pub if_match: bool,
    pub if_modified: bool,
    /// Timestamp (seconds since the epoch) of a conditional date header.
    pub since: i64,

    pub ranges: Vec<Range>,

    /// Lowercased `Authorization` scheme and everything after it.
    pub auth_type: Option<String>,
    pub auth_details: Option<String>,
    /// Parsed `WWW-Authenticate` challenge (client side).
    pub challenge: Option<AuthChallenge>,

    /// Response status and reason phrase (client side).
    pub status: u16,
    pub status_message: String,

    pub hostname: Option<String>,
    pub content_type: Option<String>,
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub redirect: Option<String>,
    pub pragma: Option<String>,
    pub accept: Option<String>,
    pub accept_charset: Option<String>,
    pub accept_encoding: Option<String>,

    /// The end-of-body marker has been queued.
    pub eof: bool,
}

impl Rx {
    pub fn new() -> Rx {
        Rx {
            method: ArrayString::new(),
            method_flags: 0,
            uri: String::new(),
            parsed_uri: Uri::default(),
            path_info: String::new(),
            script_name: String::new(),
            version: (1, 1),
            length: -1,
            remaining_content: 0,
            received_content: 0,
            flags: 0,
            chunk_state: ChunkState::Start,
            headers: HeaderMap::new(),
            header_packet: Vec::new(),
            etags: Vec::new(),
            if_match: false,
            if_modified: false,
            since: 0,
            ranges: Vec::new(),
            auth_type: None,
            auth_details: None,
            challenge: None,
            status: 0,
            status_message: String::new(),
            hostname: None,
            content_type: None,
            cookie: None,
            user_agent: None,
            referer: None,
            redirect: None,
            pragma: None,
            accept: None,
            accept_charset: None,
            accept_encoding: None,
            eof: false,
        }
    }

    /// True when the message declared a chunked body.
    #[inline]
    pub fn is_chunked(&self) -> bool {
        self.flags & RX_CHUNKED != 0
    }

    /// Parses and installs the request target: raw form, split form, and the
    /// decoded `path_info` with dot segments and duplicate separators
    /// normalized away. `script_name` is reset; handlers rewrite the split
    /// later if they need one.
    pub fn set_uri(&mut self, raw: &str) -> Result<(), HttpError> {
        let parsed = Uri::parse(raw)?;
        self.path_info = parsed.decoded_path()?;
        self.script_name = String::new();
        self.uri = raw.to_owned();
        self.parsed_uri = parsed;
        Ok(())
    }

    /// Walks the header map once, filling the typed fields and deciding the
    /// body framing. Returns the connection-level directives.
    pub fn apply_headers(
        &mut self,
        limits: &Limits,
        http10: bool,
    ) -> Result<Directives, HttpError> {
        let mut directives = Directives::default();
        let mut content_length: Option<i64> = None;

        for &(ref key, ref value) in self.headers.iter() {
            match &key[..] {
                "accept" => self.accept = Some(value.clone()),
                "accept-charset" => self.accept_charset = Some(value.clone()),
                "accept-encoding" => self.accept_encoding = Some(value.clone()),

                "authorization" => {
                    let mut split = value.splitn(2, ' ');
                    let scheme = split.next().unwrap_or("");
                    self.auth_type = Some(scheme.to_ascii_lowercase());
                    self.auth_details = Some(split.next().unwrap_or("").trim().to_owned());
                }

                "connection" => {
                    for token in value.split(',') {
                        let token = token.trim();
                        if token.eq_ignore_ascii_case("close") {
                            directives.keep_alive = Some(-1);
                        } else if token.eq_ignore_ascii_case("keep-alive")
                            && directives.keep_alive != Some(-1)
                        {
                            directives.keep_alive = Some(limits.keep_alive);
                        }
                    }
                }

                "content-length" => {
                    // Duplicates were folded with a comma; either way a comma
                    // here means conflicting lengths.
                    if value.contains(',') {
                        return Err(HttpError::Protocol(400, "duplicate content-length"));
                    }
                    let len: i64 = match atoi(value.trim().as_bytes()) {
                        Some(len) => len,
                        None => return Err(HttpError::Protocol(400, "bad content-length")),
                    };
                    if len < 0 {
                        return Err(HttpError::Protocol(400, "negative content-length"));
                    }
                    if len as u64 > limits.receive_body_size {
                        return Err(HttpError::Limit(413, "body too large"));
                    }
                    content_length = Some(len);
                }

                "content-type" => self.content_type = Some(value.clone()),
                "cookie" => self.cookie = Some(value.clone()),

                "expect" => {
                    if value.eq_ignore_ascii_case("100-continue") {
                        directives.expect_continue = true;
                    }
                }

                "host" => self.hostname = Some(value.clone()),

                "if-modified-since" | "if-unmodified-since" => {
                    // Some agents append "; length=...", which the date
                    // parser must not see.
                    let date = value.split(';').next().unwrap_or("").trim();
                    if let Ok(parsed) = DateTime::parse_from_rfc2822(date) {
                        self.since = parsed.timestamp();
                        self.if_modified = key == "if-modified-since";
                        self.flags |= RX_IF_MODIFIED;
                    }
                }

                "if-match" | "if-none-match" | "if-range" => {
                    self.if_match = true;
                    for etag in value.split(',') {
                        let etag = etag.trim();
                        let etag = if etag.starts_with("W/") { &etag[2..] } else { etag };
                        let etag = etag.trim_matches('"');
                        if !etag.is_empty() {
                            self.etags.push(etag.to_owned());
                        }
                    }
                }

                "location" => self.redirect = Some(value.clone()),
                "pragma" => self.pragma = Some(value.clone()),

                "range" => {
                    self.ranges = parse_range(value)?;
                }

                "referer" => self.referer = Some(value.clone()),

                "transfer-encoding" => {
                    for token in value.split(',') {
                        if token.trim().eq_ignore_ascii_case("chunked") {
                            self.flags |= RX_CHUNKED;
                        }
                    }
                }

                "user-agent" => self.user_agent = Some(value.clone()),

                "www-authenticate" => {
                    self.challenge = Some(parse_authenticate(value)?);
                }

                _ => (),
            }
        }

        if self.is_chunked() {
            if content_length.is_some() {
                return Err(HttpError::Protocol(
                    400,
                    "content-length with chunked transfer-encoding",
                ));
            }
            self.length = i64::MAX;
            self.remaining_content = 0;
            self.chunk_state = ChunkState::Start;
        } else if let Some(len) = content_length {
            self.length = len;
            self.remaining_content = len;
        }

        // Pre-1.1 peers only get connection reuse when they ask for it.
        if http10 && directives.keep_alive.is_none() {
            directives.keep_alive = Some(0);
        }

        Ok(directives)
    }
}

#[cfg(test)]
mod tests {
    use std::i64;

    use super::Rx;
    use limits::Limits;

    fn apply(pairs: &[(&str, &str)]) -> (Rx, Result<super::Directives, ::error::HttpError>) {
        let mut rx = Rx::new();
        for &(key, value) in pairs {
            rx.headers.insert(key, value).unwrap();
        }
        let result = rx.apply_headers(&Limits::default(), false);
        (rx, result)
    }

    #[test]
    fn content_length_framing() {
        let (rx, result) = apply(&[("Content-Length", "42")]);
        result.unwrap();
        assert_eq!(rx.length, 42);
        assert_eq!(rx.remaining_content, 42);
    }

    #[test]
    fn duplicate_content_length_rejected() {
        let (_, result) = apply(&[("Content-Length", "5"), ("Content-Length", "5")]);
        assert!(result.is_err());
    }

    #[test]
    fn negative_and_garbage_lengths_rejected() {
        assert!(apply(&[("Content-Length", "-1")]).1.is_err());
        assert!(apply(&[("Content-Length", "abc")]).1.is_err());
    }

    #[test]
    fn oversized_length_rejected() {
        let mut rx = Rx::new();
        rx.headers.insert("Content-Length", "10").unwrap();
        let limits = Limits {
            receive_body_size: 5,
            ..Limits::default()
        };
        assert!(rx.apply_headers(&limits, false).is_err());
    }

    #[test]
    fn chunked_framing() {
        let (rx, result) = apply(&[("Transfer-Encoding", "chunked")]);
        result.unwrap();
        assert!(rx.is_chunked());
        assert_eq!(rx.length, i64::MAX);
        assert_eq!(rx.remaining_content, 0);
    }

    #[test]
    fn chunked_with_length_rejected() {
        let (_, result) = apply(&[
            ("Content-Length", "5"),
            ("Transfer-Encoding", "chunked"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn connection_directives() {
        let (_, result) = apply(&[("Connection", "close")]);
        assert_eq!(result.unwrap().keep_alive, Some(-1));

        let (_, result) = apply(&[("Connection", "keep-alive")]);
        assert_eq!(result.unwrap().keep_alive, Some(Limits::default().keep_alive));
    }

    #[test]
    fn http10_defaults_to_no_reuse() {
        let mut rx = Rx::new();
        let directives = rx.apply_headers(&Limits::default(), true).unwrap();
        assert_eq!(directives.keep_alive, Some(0));

        let mut rx = Rx::new();
        rx.headers.insert("Connection", "keep-alive").unwrap();
        let directives = rx.apply_headers(&Limits::default(), true).unwrap();
        assert_eq!(directives.keep_alive, Some(Limits::default().keep_alive));
    }

    #[test]
    fn conditional_headers() {
        let (rx, result) = apply(&[
            ("If-Modified-Since", "Sun, 06 Nov 1994 08:49:37 GMT"),
            ("If-None-Match", "\"abc\", W/\"def\""),
        ]);
        result.unwrap();
        assert!(rx.if_modified);
        assert_eq!(rx.since, 784111777);
        assert!(rx.if_match);
        assert_eq!(rx.etags, ["abc", "def"]);
    }

    #[test]
    fn length_suffix_is_truncated_before_date_parsing() {
        let (rx, result) =
            apply(&[("If-Modified-Since", "Sun, 06 Nov 1994 08:49:37 GMT; length=120")]);
        result.unwrap();
        assert_eq!(rx.since, 784111777);
    }

    #[test]
    fn authorization_is_split() {
        let (rx, result) = apply(&[("Authorization", "Basic QWJj")]);
        result.unwrap();
        assert_eq!(rx.auth_type.as_ref().unwrap(), "basic");
        assert_eq!(rx.auth_details.as_ref().unwrap(), "QWJj");
    }

    #[test]
    fn expect_continue() {
        let (_, result) = apply(&[("Expect", "100-continue")]);
        assert!(result.unwrap().expect_continue);
    }

    #[test]
    fn set_uri_normalizes() {
        let mut rx = Rx::new();
        rx.set_uri("/a//b/../c%20d?q=1").unwrap();
        assert_eq!(rx.path_info, "/a/c d");
        assert_eq!(rx.parsed_uri.query, "q=1");
        assert_eq!(rx.script_name, "");
    }
}
