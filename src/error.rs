// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use std::io;

quick_error! {
    /// Error raised while processing a connection.
    ///
    /// Protocol, limit, range and auth errors are request-level: the offending
    /// request is aborted with the corresponding status code, but a keep-alive
    /// connection may still serve the next request when the input stream is
    /// still in a parseable position. I/O errors are connection-fatal.
    #[derive(Debug)]
    pub enum HttpError {
        /// Malformed request line, unsupported version or bad header syntax.
        Protocol(status: u16, detail: &'static str) {
            description("protocol error")
            display("protocol error ({}): {}", status, detail)
        }
        /// A configured limit was exceeded.
        Limit(status: u16, detail: &'static str) {
            description("limit exceeded")
            display("limit exceeded ({}): {}", status, detail)
        }
        /// The `Range` header could not be satisfied.
        Range(detail: &'static str) {
            description("bad range")
            display("bad range: {}", detail)
        }
        /// An authentication header is missing required directives.
        Auth(detail: &'static str) {
            description("bad authentication header")
            display("bad authentication header: {}", detail)
        }
        /// The socket closed or failed; the connection cannot be reused.
        Io(err: io::Error) {
            from()
            description("i/o error")
            display("i/o error: {}", err)
            cause(err)
        }
        /// A wait deadline expired before the target state was reached.
        Timeout {
            description("timed out")
            display("timed out")
        }
    }
}

impl HttpError {
    /// The HTTP status code this error renders as.
    pub fn status(&self) -> u16 {
        match *self {
            HttpError::Protocol(status, _) => status,
            HttpError::Limit(status, _) => status,
            HttpError::Range(_) => 416,
            HttpError::Auth(_) => 400,
            HttpError::Io(_) => 500,
            HttpError::Timeout => 408,
        }
    }

    /// True when the connection itself can no longer be trusted and must be
    /// closed once the error response has been flushed.
    pub fn is_fatal(&self) -> bool {
        match *self {
            HttpError::Io(_) => true,
            HttpError::Protocol(..) | HttpError::Limit(..) => true,
            HttpError::Range(_) | HttpError::Auth(_) | HttpError::Timeout => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HttpError;

    #[test]
    fn status_mapping() {
        assert_eq!(HttpError::Protocol(400, "bad method").status(), 400);
        assert_eq!(HttpError::Limit(414, "uri too long").status(), 414);
        assert_eq!(HttpError::Range("overlap").status(), 416);
        assert_eq!(HttpError::Auth("missing realm").status(), 400);
    }

    #[test]
    fn fatality() {
        assert!(HttpError::Protocol(400, "x").is_fatal());
        assert!(!HttpError::Range("x").is_fatal());
        assert!(!HttpError::Auth("x").is_fatal());
    }
}
