// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! An embedded HTTP/1.x server core.
//!
//! This crate contains the request-processing machinery of a small,
//! event-driven HTTP server: the per-connection state machine that takes a
//! request from raw socket bytes through header parsing, body ingestion and
//! handler execution, plus the listener/virtual-host/route layers that decide
//! where each request goes.
//!
//! # Overview
//!
//! - An [`Http`](struct.Http.html) service owns one or more
//!   [`Endpoint`](struct.Endpoint.html)s (bound listeners). Each endpoint
//!   carries an ordered list of [`Host`](struct.Host.html)s; when the endpoint
//!   is in named-virtual-host mode the `Host` header of a request selects
//!   among them.
//! - A [`Host`](struct.Host.html) carries an ordered
//!   [`Route`](struct.Route.html) table. Routes are grouped by their leading
//!   URL segment so that a whole group can be skipped in one hop when that
//!   segment doesn't match.
//! - Every accepted socket becomes a [`Conn`](struct.Conn.html) bound to
//!   exactly one [`Dispatcher`](struct.Dispatcher.html), a single-threaded
//!   cooperative event context. All parsing and handler execution for that
//!   connection happens serially on its dispatcher; nothing ever blocks.
//! - Request handlers implement the [`Handler`](trait.Handler.html) trait:
//!   four hooks (`start`, `process`, `writable`, `finalize`) that consume
//!   body [`Packet`](struct.Packet.html)s from the connection's receive queue
//!   and produce response bytes.
//!
//! The connection state machine is re-entrant and strictly forward-moving:
//! `Begin -> Parsed -> Content -> Running -> Complete`. Pipelined requests on
//! one connection are served in arrival order; after a request completes, any
//! bytes already buffered are parsed as the next request without going back
//! through the event loop.
//!
//! Bodies are framed either by `Content-Length` or by
//! `Transfer-Encoding: chunked`; both are decoded incrementally, so a body
//! split across any number of socket reads produces the same result as a
//! single read.
//!
//! TLS termination is not part of this crate: a connection is built from
//! anything implementing [`Stream`](trait.Stream.html), and a TLS wrapper is
//! just another `Stream` that reports itself as secure.

#[macro_use]
extern crate log;
#[macro_use]
extern crate quick_error;

extern crate arrayvec;
extern crate atoi;
extern crate base64;
extern crate chrono;
extern crate httparse;
extern crate itoa;
extern crate mio;
extern crate num_cpus;
extern crate percent_encoding;

pub use auth::{basic_decode, basic_encode, parse_authenticate, AuthChallenge};
pub use buffer::Buffer;
pub use chunk::ChunkState;
pub use connection::{Conn, ConnKind, ConnState, Stream};
pub use dispatcher::{ConnRegistry, Dispatcher, DispatcherHandle, Posted, WaitResult};
pub use endpoint::Endpoint;
pub use error::HttpError;
pub use headers::HeaderMap;
pub use host::Host;
pub use limits::Limits;
pub use pipeline::{Handler, NotFoundHandler, Packet, ReceiveQueue};
pub use range::Range;
pub use request::{method_flag, Directives, Rx};
pub use request::{METHOD_DELETE, METHOD_GET, METHOD_HEAD, METHOD_OPTIONS};
pub use request::{METHOD_POST, METHOD_PUT, METHOD_TRACE};
pub use request::{RX_CHUNKED, RX_IF_MODIFIED};
pub use route::Route;
pub use service::Http;
pub use transmit::{reason_phrase, Tx};
pub use uri::Uri;

mod auth;
mod buffer;
mod chunk;
mod connection;
mod dispatcher;
mod endpoint;
mod error;
mod headers;
mod host;
mod limits;
mod pipeline;
mod range;
mod request;
mod route;
mod service;
mod transmit;
mod uri;
