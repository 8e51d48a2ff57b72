// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use std::sync::Arc;

use itoa;

use pipeline::Handler;

/// Per-request transmit context.
///
/// The outbound pipeline itself lives in handlers; the core only needs
/// enough here to route (the selected handler), to render error responses,
/// and to know whether response bytes have already hit the wire.
pub struct Tx {
    pub status: u16,
    /// Extension copied from the request URI, for handler dispatch by type.
    pub ext: String,
    pub headers: Vec<(String, String)>,
    pub handler: Option<Arc<Handler>>,
    /// Response bytes have been queued; an error can no longer be rendered
    /// as a well-formed response.
    pub started: bool,
    pub finalized: bool,
    /// Declared response length, `-1` while unknown.
    pub length: i64,
}

impl Tx {
    pub fn new() -> Tx {
        Tx {
            status: 200,
            ext: String::new(),
            headers: Vec::new(),
            handler: None,
            started: false,
            finalized: false,
            length: -1,
        }
    }
}

/// Writes a complete minimal error response into `out`.
///
/// `suppress_body` is set for `HEAD` (and friends): status line and headers
/// are emitted, the entity is not.
pub fn render_error(
    out: &mut Vec<u8>,
    http10: bool,
    status: u16,
    detail: &str,
    close: bool,
    suppress_body: bool,
) {
    let phrase = reason_phrase(status);

    let mut body = Vec::new();
    if !suppress_body {
        body.extend_from_slice(b"<html><head><title>");
        let _ = itoa::write(&mut body, status);
        body.push(b' ');
        body.extend_from_slice(phrase.as_bytes());
        body.extend_from_slice(b"</title></head><body><h1>");
        let _ = itoa::write(&mut body, status);
        body.push(b' ');
        body.extend_from_slice(phrase.as_bytes());
        body.extend_from_slice(b"</h1><p>");
        body.extend_from_slice(detail.as_bytes());
        body.extend_from_slice(b"</p></body></html>");
    }

    out.extend_from_slice(if http10 { b"HTTP/1.0 " } else { b"HTTP/1.1 " });
    let _ = itoa::write(&mut *out, status);
    out.push(b' ');
    out.extend_from_slice(phrase.as_bytes());
    out.extend_from_slice(b"\r\nContent-Type: text/html\r\nContent-Length: ");
    let _ = itoa::write(&mut *out, body.len());
    out.extend_from_slice(b"\r\nConnection: ");
    out.extend_from_slice(if close { b"close" } else { b"keep-alive" });
    out.extend_from_slice(b"\r\n\r\n");
    out.extend_from_slice(&body);
}

/// The phrase corresponding to a status code.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request-URI Too Large",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::{reason_phrase, render_error};

    #[test]
    fn phrases() {
        assert_eq!(reason_phrase(404), "Not Found");
        assert_eq!(reason_phrase(999), "Unknown");
    }

    #[test]
    fn error_response_shape() {
        let mut out = Vec::new();
        render_error(&mut out, false, 404, "no such route", true, false);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("no such route"));

        let header_end = text.find("\r\n\r\n").unwrap();
        let body_len = text.len() - (header_end + 4);
        assert!(text.contains(&format!("Content-Length: {}\r\n", body_len)));
    }

    #[test]
    fn suppressed_body_keeps_headers() {
        let mut out = Vec::new();
        render_error(&mut out, true, 413, "too big", true, true);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.0 413 "));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
