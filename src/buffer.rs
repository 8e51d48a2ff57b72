// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Growable byte queue with delimiter scanning.
//!
//! A connection's unparsed input lives here. Bytes arrive in arbitrary
//! slices that may straddle any message boundary; the parser repeatedly
//! scans for a delimiter and consumes from the front once a complete
//! logical unit is available.

/// Ordered byte queue over the connection's unparsed input.
pub struct Buffer {
    data: Vec<u8>,

    // Offset up to which previous delimiter scans already looked. Re-scans
    // after a short read restart just before this point instead of at the
    // beginning of the buffer.
    scanned: usize,
}

impl Buffer {
    pub fn new() -> Buffer {
        Buffer {
            data: Vec::with_capacity(1024),
            scanned: 0,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Buffer {
        Buffer {
            data: bytes,
            scanned: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Appends freshly received bytes at the tail.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Looks for `delim` and returns the offset of its first byte.
    ///
    /// The search resumes just before where the previous failed search
    /// stopped, so feeding a stream one byte at a time stays linear.
    pub fn find(&mut self, delim: &[u8]) -> Option<usize> {
        debug_assert!(!delim.is_empty());
        let off = self.scanned.saturating_sub(delim.len() - 1);
        match self.data[off..].windows(delim.len()).position(|w| w == delim) {
            Some(pos) => Some(off + pos),
            None => {
                self.scanned = self.data.len();
                None
            }
        }
    }

    /// Drops `n` bytes from the front.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.data.len());
        self.data.drain(..n);
        self.scanned = self.scanned.saturating_sub(n);
    }

    /// Removes and returns the first `n` bytes.
    pub fn take(&mut self, n: usize) -> Vec<u8> {
        debug_assert!(n <= self.data.len());
        let out = self.data[..n].to_vec();
        self.consume(n);
        out
    }

    /// Removes and returns the whole content, leaving the buffer empty.
    pub fn take_all(&mut self) -> Vec<u8> {
        self.scanned = 0;
        ::std::mem::replace(&mut self.data, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::Buffer;

    #[test]
    fn find_across_feeds() {
        let mut buf = Buffer::new();
        buf.extend(b"GET / HTTP/1.1\r");
        assert_eq!(buf.find(b"\r\n\r\n"), None);
        buf.extend(b"\n");
        assert_eq!(buf.find(b"\r\n\r\n"), None);
        // The terminator straddles the previous scan position.
        buf.extend(b"\r\n");
        assert_eq!(buf.find(b"\r\n\r\n"), Some(14));
    }

    #[test]
    fn consume_and_take() {
        let mut buf = Buffer::new();
        buf.extend(b"hello world");
        assert_eq!(buf.take(5), b"hello");
        buf.consume(1);
        assert_eq!(buf.as_slice(), b"world");
        assert_eq!(buf.take_all(), b"world");
        assert!(buf.is_empty());
    }

    #[test]
    fn scan_offset_rewinds_on_consume() {
        let mut buf = Buffer::new();
        buf.extend(b"abc");
        assert_eq!(buf.find(b"\r\n"), None);
        buf.consume(3);
        buf.extend(b"x\r\ny");
        assert_eq!(buf.find(b"\r\n"), Some(1));
    }
}
