// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use error::HttpError;

/// One byte interval from a `Range` header.
///
/// `end` is exclusive. A bound of `-1` means "from the end" (`start`) or
/// "to the end" (`end`); the two are never both `-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub end: i64,
    /// `end - start` when both bounds are known, `-1` otherwise.
    pub len: i64,
}

impl Range {
    fn new(start: i64, end: i64) -> Range {
        Range {
            start: start,
            end: end,
            len: if start >= 0 && end >= 0 { end - start } else { -1 },
        }
    }
}

/// Parses a `Range` header value such as `bytes=0-49,200-`.
///
/// `N-M` covers bytes `[N, M]` inclusive and becomes `start = N,
/// end = M + 1`. `N-` runs to the end of the entity; `-N` selects the final
/// `N` bytes and must be the last element. Any syntax or consistency failure
/// maps to `416 Range Not Satisfiable`.
pub fn parse_range(value: &str) -> Result<Vec<Range>, HttpError> {
    let value = value.trim();
    if !value.starts_with("bytes=") {
        return Err(HttpError::Range("unknown range unit"));
    }

    let mut ranges = Vec::new();
    for piece in value["bytes=".len()..].split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            return Err(HttpError::Range("empty range spec"));
        }
        let range = if piece.starts_with('-') {
            // Suffix form: the final N bytes.
            let n = parse_bound(&piece[1..])?;
            Range::new(-1, n)
        } else {
            let dash = match piece.find('-') {
                Some(pos) => pos,
                None => return Err(HttpError::Range("missing dash in range spec")),
            };
            let start = parse_bound(&piece[..dash])?;
            let rest = &piece[dash + 1..];
            if rest.is_empty() {
                Range::new(start, -1)
            } else {
                let last = parse_bound(rest)?;
                Range::new(start, last + 1)
            }
        };
        ranges.push(range);
    }

    validate(&ranges)?;
    Ok(ranges)
}

fn parse_bound(s: &str) -> Result<i64, HttpError> {
    s.trim()
        .parse::<i64>()
        .map_err(|_| HttpError::Range("bad range bound"))
}

fn validate(ranges: &[Range]) -> Result<(), HttpError> {
    if ranges.is_empty() {
        return Err(HttpError::Range("no ranges"));
    }
    for (i, range) in ranges.iter().enumerate() {
        if range.start < 0 && range.end < 0 {
            return Err(HttpError::Range("unbounded range"));
        }
        if range.start >= 0 && range.end >= 0 && range.end <= range.start {
            return Err(HttpError::Range("inverted range"));
        }
        // A suffix range can only be satisfied once everything before it is
        // fixed, so it has to come last.
        if range.start < 0 && i + 1 != ranges.len() {
            return Err(HttpError::Range("suffix range not last"));
        }
        if i + 1 < ranges.len() {
            let next = &ranges[i + 1];
            if range.end < 0 {
                return Err(HttpError::Range("open range before another range"));
            }
            if next.start >= 0 && range.end > next.start {
                return Err(HttpError::Range("overlapping ranges"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{parse_range, Range};

    #[test]
    fn basic_forms() {
        let ranges = parse_range("bytes=0-49,200-").unwrap();
        assert_eq!(
            ranges,
            [
                Range { start: 0, end: 50, len: 50 },
                Range { start: 200, end: -1, len: -1 },
            ]
        );

        let ranges = parse_range("bytes=-500").unwrap();
        assert_eq!(ranges, [Range { start: -1, end: 500, len: -1 }]);
    }

    #[test]
    fn inverted_is_rejected() {
        assert!(parse_range("bytes=50-10").is_err());
        // The upper bound is inclusive: 5-5 is a valid one-byte range.
        assert_eq!(
            parse_range("bytes=5-5").unwrap(),
            [Range { start: 5, end: 6, len: 1 }]
        );
        assert_eq!(
            parse_range("bytes=5-6").unwrap(),
            [Range { start: 5, end: 7, len: 2 }]
        );
    }

    #[test]
    fn ordering_rules() {
        // Suffix range anywhere but last.
        assert!(parse_range("bytes=-100,200-300").is_err());
        // Open range followed by anything.
        assert!(parse_range("bytes=100-,200-300").is_err());
        // Overlap.
        assert!(parse_range("bytes=0-100,50-200").is_err());
        // Touching is fine: end is exclusive.
        assert!(parse_range("bytes=0-49,50-99").is_ok());
    }

    #[test]
    fn syntax_errors() {
        assert!(parse_range("lines=0-10").is_err());
        assert!(parse_range("bytes=").is_err());
        assert!(parse_range("bytes=abc-10").is_err());
        assert!(parse_range("bytes=-").is_err());
    }
}
