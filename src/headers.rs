// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use error::HttpError;

/// Order-preserving, case-insensitive header map.
///
/// Keys are lowercased when inserted. A key received twice folds its values
/// into one entry joined with `", "`, which keeps later scans (and the
/// duplicate `Content-Length` check) a single pass.
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> HeaderMap {
        HeaderMap {
            entries: Vec::with_capacity(16),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validates and inserts one header line. The key is lowercased; a
    /// repeated key folds its value onto the existing entry.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<(), HttpError> {
        validate_key(key)?;
        let key = key.to_ascii_lowercase();
        if let Some(&mut (_, ref mut existing)) =
            self.entries.iter_mut().find(|&&mut (ref k, _)| *k == key)
        {
            existing.push_str(", ");
            existing.push_str(value);
            return Ok(());
        }
        self.entries.push((key, value.to_owned()));
        Ok(())
    }

    /// Case-insensitive lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|&&(ref k, _)| k.eq_ignore_ascii_case(key))
            .map(|&(_, ref v)| &v[..])
    }

    /// Iterates entries in arrival order. Keys are already lowercased.
    pub fn iter(&self) -> ::std::slice::Iter<(String, String)> {
        self.entries.iter()
    }
}

// Header keys may not contain separators that would let a header smuggle
// itself into a URI or path position downstream.
fn validate_key(key: &str) -> Result<(), HttpError> {
    if key.is_empty() {
        return Err(HttpError::Protocol(400, "empty header key"));
    }
    for &b in key.as_bytes() {
        match b {
            b'%' | b'<' | b'>' | b'/' | b'\\' => {
                return Err(HttpError::Protocol(400, "bad character in header key"));
            }
            _ => (),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::HeaderMap;

    #[test]
    fn keys_are_lowercased() {
        let mut map = HeaderMap::new();
        map.insert("Content-Type", "text/plain").unwrap();
        assert_eq!(map.get("content-type"), Some("text/plain"));
        assert_eq!(map.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(map.iter().next().unwrap().0, "content-type");
    }

    #[test]
    fn duplicates_fold_with_comma() {
        let mut map = HeaderMap::new();
        map.insert("Accept", "text/html").unwrap();
        map.insert("accept", "text/plain").unwrap();
        assert_eq!(map.get("accept"), Some("text/html, text/plain"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn order_is_preserved() {
        let mut map = HeaderMap::new();
        map.insert("B", "2").unwrap();
        map.insert("A", "1").unwrap();
        let keys: Vec<&str> = map.iter().map(|&(ref k, _)| &k[..]).collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn bad_keys_rejected() {
        let mut map = HeaderMap::new();
        assert!(map.insert("bad/key", "x").is_err());
        assert!(map.insert("bad\\key", "x").is_err());
        assert!(map.insert("bad<key>", "x").is_err());
        assert!(map.insert("bad%key", "x").is_err());
        assert!(map.insert("", "x").is_err());
    }
}
