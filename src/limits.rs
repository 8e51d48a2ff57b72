// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use std::time::Duration;

/// Resource limits applied while parsing and serving requests.
///
/// The defaults are conservative; embedders tune individual fields with
/// struct-update syntax:
///
/// ```
/// use auberge::Limits;
///
/// let limits = Limits {
///     receive_body_size: 16 * 1024 * 1024,
///     .. Limits::default()
/// };
/// # let _ = limits;
/// ```
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum size in bytes of a request or response header block,
    /// including the terminating blank line. Exceeding it yields `413`.
    pub header_size: usize,

    /// Maximum number of header lines in one message. Exceeding it
    /// yields `400`.
    pub header_count: usize,

    /// Maximum length in bytes of the request URI. Exceeding it yields `414`.
    pub uri_size: usize,

    /// Maximum declared or decoded body size in bytes. Exceeding it
    /// yields `413`.
    pub receive_body_size: u64,

    /// Preferred size of body packets handed to the pipeline. Larger reads
    /// are split into packets of at most this many bytes.
    pub chunk_size: usize,

    /// Maximum number of body bytes allowed to sit in a connection's receive
    /// queue before ingestion stalls until the handler drains it. Applies to
    /// streamed bodies only; a buffered body queues whole and is bounded by
    /// `receive_body_size`.
    pub rx_queue_max: usize,

    /// Number of requests allowed on one connection before it is closed.
    pub keep_alive: i32,

    /// Maximum number of simultaneously open connections per endpoint.
    pub connection_max: usize,

    /// Maximum number of simultaneously active requests per endpoint.
    pub request_max: usize,

    /// Period of the housekeeping timer. Dispatchers cap their poll timeout
    /// at this period so the timer fires without a dedicated wakeup.
    pub housekeeping_period: Duration,

    /// A connection idle longer than this is torn down by housekeeping.
    pub inactivity_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            header_size: 8 * 1024,
            header_count: 64,
            uri_size: 1024,
            receive_body_size: 4 * 1024 * 1024,
            chunk_size: 8 * 1024,
            rx_queue_max: 64 * 1024,
            keep_alive: 100,
            connection_max: 512,
            request_max: 256,
            housekeeping_period: Duration::from_secs(1),
            inactivity_timeout: Duration::from_secs(60),
        }
    }
}
