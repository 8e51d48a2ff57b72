// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! HTTP authentication header codecs.
//!
//! The server side only needs the `Basic` credential codec; the challenge
//! grammar (`WWW-Authenticate`) is parsed on the client side of a connection
//! and covers both `Basic` and `Digest` directives.

use base64;

use error::HttpError;

/// Formats an `Authorization` header value with basic credentials.
pub fn basic_encode(user: &str, password: &str) -> String {
    let mut creds = String::with_capacity(user.len() + password.len() + 1);
    creds.push_str(user);
    creds.push(':');
    creds.push_str(password);
    format!("basic {}", base64::encode(&creds))
}

/// Decodes an `Authorization: Basic` header value into `(user, password)`.
///
/// The first `:` in the decoded credentials separates the user from the
/// password, so passwords may themselves contain colons.
pub fn basic_decode(value: &str) -> Result<(String, String), HttpError> {
    let mut split = value.splitn(2, ' ');
    let scheme = split.next().unwrap_or("");
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(HttpError::Auth("not a basic credential"));
    }
    let encoded = match split.next() {
        Some(v) => v.trim(),
        None => return Err(HttpError::Auth("missing basic credentials")),
    };

    let decoded = base64::decode(encoded).map_err(|_| HttpError::Auth("bad base64"))?;
    let decoded =
        String::from_utf8(decoded).map_err(|_| HttpError::Auth("credentials not utf-8"))?;

    let colon = match decoded.find(':') {
        Some(pos) => pos,
        None => return Err(HttpError::Auth("missing ':' in credentials")),
    };
    Ok((decoded[..colon].to_owned(), decoded[colon + 1..].to_owned()))
}

/// Directives carried by a `WWW-Authenticate` challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Lowercased scheme token, `"basic"` or `"digest"`.
    pub scheme: String,
    pub algorithm: Option<String>,
    pub domain: Option<String>,
    pub nonce: Option<String>,
    pub opaque: Option<String>,
    pub realm: Option<String>,
    pub qop: Option<String>,
    pub stale: Option<String>,
}

/// Parses a `WWW-Authenticate` header value.
///
/// The scheme is the first whitespace-delimited token; the remainder is a
/// comma-separated list of `key=value` or `key="value"` directives, with
/// backslash escapes honored inside quoted values. Unknown keys are skipped.
pub fn parse_authenticate(value: &str) -> Result<AuthChallenge, HttpError> {
    let value = value.trim();
    let space = value
        .find(|c: char| c.is_whitespace())
        .unwrap_or(value.len());
    let mut challenge = AuthChallenge::default();
    challenge.scheme = value[..space].to_ascii_lowercase();
    if challenge.scheme.is_empty() {
        return Err(HttpError::Auth("missing auth scheme"));
    }

    for (key, val) in DirectiveIter::new(&value[space..]) {
        let slot = match &key.to_ascii_lowercase()[..] {
            "algorithm" => &mut challenge.algorithm,
            "domain" => &mut challenge.domain,
            "nonce" => &mut challenge.nonce,
            "opaque" => &mut challenge.opaque,
            "realm" => &mut challenge.realm,
            "qop" => &mut challenge.qop,
            "stale" => &mut challenge.stale,
            _ => continue,
        };
        *slot = Some(val);
    }

    validate(&challenge)?;
    Ok(challenge)
}

fn validate(challenge: &AuthChallenge) -> Result<(), HttpError> {
    match &challenge.scheme[..] {
        "basic" => {
            if challenge.realm.is_none() {
                return Err(HttpError::Auth("basic challenge without realm"));
            }
        }
        "digest" => {
            if challenge.realm.is_none() || challenge.nonce.is_none() {
                return Err(HttpError::Auth("digest challenge without realm or nonce"));
            }
            // A qop challenge is the full RFC 2617 form; everything must be
            // present or the client cannot compute a response.
            if challenge.qop.is_some()
                && (challenge.domain.is_none()
                    || challenge.opaque.is_none()
                    || challenge.algorithm.is_none()
                    || challenge.stale.is_none())
            {
                return Err(HttpError::Auth("qop digest challenge missing directives"));
            }
        }
        _ => (),
    }
    Ok(())
}

// Scans `key=value` / `key="value"` directives separated by commas.
struct DirectiveIter<'a> {
    rest: &'a str,
}

impl<'a> DirectiveIter<'a> {
    fn new(input: &'a str) -> DirectiveIter<'a> {
        DirectiveIter { rest: input }
    }
}

impl<'a> Iterator for DirectiveIter<'a> {
    type Item = (&'a str, String);

    fn next(&mut self) -> Option<(&'a str, String)> {
        let rest = self
            .rest
            .trim_left_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            self.rest = rest;
            return None;
        }

        let eq = match rest.find('=') {
            Some(pos) => pos,
            None => {
                self.rest = "";
                return None;
            }
        };
        let key = rest[..eq].trim();
        let after = &rest[eq + 1..];

        if after.starts_with('"') {
            // Quoted value: honor backslash escapes, stop at the closing quote.
            let mut value = String::new();
            let mut chars = after[1..].char_indices();
            while let Some((idx, c)) = chars.next() {
                match c {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        self.rest = &after[1 + idx + 1..];
                        return Some((key, value));
                    }
                    other => value.push(other),
                }
            }
            // Unterminated quote: take what we have.
            self.rest = "";
            Some((key, value))
        } else {
            let end = after
                .find(|c: char| c == ',' || c.is_whitespace())
                .unwrap_or(after.len());
            let value = after[..end].to_owned();
            self.rest = &after[end..];
            Some((key, value))
        }
    }
}
