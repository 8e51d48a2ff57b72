// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The per-connection state machine.
//!
//! A connection walks every message through five states:
//!
//! ```text
//! Begin -> Parsed -> Content -> Running -> Complete
//! ```
//!
//! The driver loops while a state reports progress and returns to the event
//! loop the moment one cannot; the next readable/writable event re-enters
//! exactly where processing stopped. No state ever blocks, and no partial
//! logical unit (request line, header line, chunk header) is ever consumed.

use std::cmp;
use std::io::{self, ErrorKind, Read, Write};
use std::mem;
use std::net::SocketAddr;
use std::str;
use std::sync::Arc;
use std::time::Instant;
use std::i64;

use arrayvec::ArrayString;
use httparse;
use mio::net::TcpStream;
use mio::{Evented, Poll, PollOpt, Ready, Token};

use buffer::Buffer;
use chunk::{self, ChunkState};
use endpoint::Endpoint;
use error::HttpError;
use host::Host;
use limits::Limits;
use pipeline::{Handler, Packet, ReceiveQueue};
use request::{method_flag, Rx, METHOD_HEAD, METHOD_OPTIONS, METHOD_TRACE};
use route::Route;
use transmit::{render_error, Tx};

/// A non-blocking byte stream a connection can run over.
///
/// TLS wrappers implement this and report `secure() == true`; the core never
/// looks inside.
pub trait Stream: Read + Write + Evented + Send {
    fn secure(&self) -> bool {
        false
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

impl Stream for TcpStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        TcpStream::peer_addr(self).ok()
    }
}

impl Evented for Box<Stream> {
    fn register(
        &self,
        poll: &Poll,
        token: Token,
        interest: Ready,
        opts: PollOpt,
    ) -> io::Result<()> {
        (**self).register(poll, token, interest, opts)
    }

    fn reregister(
        &self,
        poll: &Poll,
        token: Token,
        interest: Ready,
        opts: PollOpt,
    ) -> io::Result<()> {
        (**self).reregister(poll, token, interest, opts)
    }

    fn deregister(&self, poll: &Poll) -> io::Result<()> {
        (**self).deregister(poll)
    }
}

/// Which side of the protocol this connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnKind {
    /// Parses requests, emits responses.
    Server,
    /// Parses responses; request emission is up to the embedder.
    Client,
}

/// Lifecycle state of the message currently on the connection.
///
/// States only ever move forward; a pipelined follow-up request starts over
/// at `Begin` with a fresh receive context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnState {
    /// Waiting for a complete header block.
    Begin,
    /// Header block parsed; pipeline not yet started.
    Parsed,
    /// Ingesting body bytes.
    Content,
    /// Body complete; the handler is producing the response.
    Running,
    /// The message is finished.
    Complete,
}

/// One accepted (or initiated) socket and everything in flight on it.
pub struct Conn {
    pub kind: ConnKind,
    pub state: ConnState,

    stream: Box<Stream>,

    /// Bytes received and not yet parsed. May hold the head of the next
    /// pipelined request while the current one is still being served.
    pub input: Buffer,
    output: Vec<u8>,

    pub rx: Option<Rx>,
    pub tx: Option<Tx>,
    pub receive_queue: ReceiveQueue,

    pub limits: Arc<Limits>,

    /// Requests still permitted on this connection. `0` disables reuse,
    /// `-1` forces a close after the current response.
    pub keep_alive: i32,

    /// The connection itself is unusable (I/O failure or unrecoverable
    /// protocol state); latched until teardown.
    pub conn_error: bool,
    /// The current request failed; cleared when the next request begins.
    pub error: bool,
    /// Tells the pipeline not to flush partial output for this request.
    pub abort_pipeline: bool,

    advancing: bool,
    pub write_complete: bool,
    pub complete: bool,
    pub write_blocked: bool,
    pub http10: bool,

    expect_continue: bool,
    /// Whether the endpoint's active-request counter includes us.
    counted_request: bool,
    /// Deliver body packets to the handler as they arrive instead of
    /// parking them all until the body completes.
    streaming: bool,
    peer_closed: bool,
    closing: bool,

    pub endpoint: Option<Arc<Endpoint>>,
    pub host: Option<Arc<Host>>,
    pub route: Option<Route>,
    /// Fallback handler when no endpoint/route machinery is attached.
    pub default_handler: Option<Arc<Handler>>,

    pub remote_addr: Option<SocketAddr>,
    pub secure: bool,
    pub last_activity: Instant,
}

impl Conn {
    /// Builds a server-side connection over an accepted stream.
    pub fn server(stream: Box<Stream>, limits: Arc<Limits>) -> Conn {
        Conn::new(ConnKind::Server, stream, limits)
    }

    /// Builds a client-side connection; the embedder writes the request and
    /// this machine parses the response.
    pub fn client(stream: Box<Stream>, limits: Arc<Limits>) -> Conn {
        Conn::new(ConnKind::Client, stream, limits)
    }

    fn new(kind: ConnKind, stream: Box<Stream>, limits: Arc<Limits>) -> Conn {
        let secure = stream.secure();
        let remote_addr = stream.peer_addr();
        let keep_alive = limits.keep_alive;
        let queue_max = limits.rx_queue_max;
        Conn {
            kind: kind,
            state: ConnState::Begin,
            stream: stream,
            input: Buffer::new(),
            output: Vec::new(),
            rx: None,
            tx: None,
            receive_queue: ReceiveQueue::new(queue_max),
            limits: limits,
            keep_alive: keep_alive,
            conn_error: false,
            error: false,
            abort_pipeline: false,
            advancing: false,
            write_complete: false,
            complete: false,
            write_blocked: false,
            http10: false,
            expect_continue: false,
            counted_request: false,
            streaming: true,
            peer_closed: false,
            closing: false,
            endpoint: None,
            host: None,
            route: None,
            default_handler: None,
            remote_addr: remote_addr,
            secure: secure,
            last_activity: Instant::now(),
        }
    }

    /// Attaches the endpoint this connection was accepted on.
    pub fn set_endpoint(&mut self, endpoint: Arc<Endpoint>) {
        self.endpoint = Some(endpoint);
    }

    /// Overrides the streaming decision for the current request. Routed
    /// requests pick this up from the host's streaming policy; embedders
    /// driving the machine without the routing layer set it here. Reset to
    /// streamed when the request completes.
    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    /// Appends received bytes without touching the socket. Embedders with
    /// their own transport feed the machine through this and `advance`.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
        self.last_activity = Instant::now();
    }

    /// Removes everything queued for the peer. Counterpart of `feed` for
    /// transports owned by the embedder.
    pub fn take_output(&mut self) -> Vec<u8> {
        mem::replace(&mut self.output, Vec::new())
    }

    #[inline]
    pub fn wants_write(&self) -> bool {
        !self.output.is_empty()
    }

    /// The connection has said everything it ever will and can be dropped.
    pub fn is_finished(&self) -> bool {
        self.closing && self.output.is_empty()
    }

    /// Marks the response as fully produced. Called by handlers.
    pub fn finalize(&mut self) {
        if let Some(ref mut tx) = self.tx {
            tx.length = 0;
        }
        self.write_complete = true;
        self.complete = true;
    }

    /// Queues response bytes. Called by handlers.
    pub fn write(&mut self, bytes: &[u8]) {
        if let Some(ref mut tx) = self.tx {
            tx.started = true;
        }
        self.output.extend_from_slice(bytes);
    }

    /// Fails the current request with an error response.
    ///
    /// The request is aborted and the pipeline told not to flush partial
    /// output, but the connection stays reusable: remaining body bytes are
    /// still consumed so a keep-alive peer can send its next request.
    pub fn error(&mut self, status: u16, detail: &str) {
        self.error_with(status, detail, false);
    }

    fn error_with(&mut self, status: u16, detail: &str, fatal: bool) {
        if fatal {
            self.conn_error = true;
            self.keep_alive = -1;
        }
        if self.error {
            return;
        }
        self.error = true;
        self.abort_pipeline = true;
        debug!("request failed with {}: {}", status, detail);

        let started = self.tx.as_ref().map(|tx| tx.started).unwrap_or(false);
        if self.kind == ConnKind::Server && !started {
            // These methods get status and headers but never an entity.
            let headers_only = METHOD_HEAD | METHOD_OPTIONS | METHOD_TRACE;
            let suppress = self
                .rx
                .as_ref()
                .map(|rx| rx.method_flags & headers_only != 0)
                .unwrap_or(false);
            let close = fatal || self.keep_alive <= 0;
            render_error(&mut self.output, self.http10, status, detail, close, suppress);
            if let Some(ref mut tx) = self.tx {
                tx.status = status;
                tx.started = true;
            }
        }
        self.write_complete = true;

        if fatal {
            // The input stream cannot be trusted any more; drop the body
            // expectations so the machine races to completion.
            if let Some(ref mut rx) = self.rx {
                rx.remaining_content = 0;
                rx.chunk_state = ChunkState::Eof;
            }
            self.input.take_all();
        }
        if self.state == ConnState::Begin {
            // Parsing never produced a request; skip ahead so the driver
            // can finish this message off.
            self.state = ConnState::Parsed;
        }
    }

    fn handle_error(&mut self, err: HttpError) {
        let status = err.status();
        let fatal = err.is_fatal();
        match err {
            HttpError::Protocol(_, detail) | HttpError::Limit(_, detail) => {
                self.error_with(status, detail, fatal)
            }
            HttpError::Range(detail) | HttpError::Auth(detail) => {
                self.error_with(status, detail, fatal)
            }
            HttpError::Io(_) => self.error_with(status, "i/o failure", true),
            HttpError::Timeout => self.error_with(status, "timed out", false),
        }
    }

    fn handler(&self) -> Option<Arc<Handler>> {
        match self.tx {
            Some(ref tx) if tx.handler.is_some() => tx.handler.clone(),
            _ => self.default_handler.clone(),
        }
    }

    // ---- event entry points -------------------------------------------------

    /// Drains the socket into the input buffer, then drives the machine.
    pub fn readable(&mut self) {
        let mut buf = [0u8; 4096];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    self.peer_closed = true;
                    break;
                }
                Ok(n) => {
                    self.input.extend(&buf[..n]);
                    self.last_activity = Instant::now();
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => {
                    debug!("read error: {}", e);
                    self.conn_error = true;
                    self.closing = true;
                    break;
                }
            }
        }

        self.advance();

        if self.peer_closed && !self.closing {
            let idle = self.state == ConnState::Begin && self.rx.is_none();
            if idle && self.input.is_empty() {
                // Clean shutdown between requests.
                self.closing = true;
            } else if self.kind == ConnKind::Server {
                // Mid-request hangup: nothing sensible can be sent.
                self.conn_error = true;
                self.closing = true;
            }
        }
    }

    /// Flushes queued output, then drives the machine.
    pub fn writable(&mut self) {
        self.flush();
        if self.output.is_empty() && !self.write_blocked {
            if self.state == ConnState::Running && !self.complete && !self.error {
                if let Some(handler) = self.handler() {
                    handler.writable(self);
                }
            }
        }
        self.advance();
    }

    /// Writes as much queued output as the socket accepts right now.
    pub fn flush(&mut self) {
        while !self.output.is_empty() {
            match self.stream.write(&self.output) {
                Ok(0) => {
                    self.conn_error = true;
                    self.closing = true;
                    break;
                }
                Ok(n) => {
                    self.output.drain(..n);
                    self.last_activity = Instant::now();
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    self.write_blocked = true;
                    break;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => {
                    debug!("write error: {}", e);
                    self.conn_error = true;
                    self.closing = true;
                    break;
                }
            }
        }
        if self.output.is_empty() {
            self.write_blocked = false;
        }
    }

    // ---- the state machine --------------------------------------------------

    /// Runs the state machine until no state can make further progress.
    ///
    /// Re-entrant: a handler invoked from inside may call back into the
    /// connection without recursing into the driver.
    pub fn advance(&mut self) {
        if self.advancing {
            return;
        }
        self.advancing = true;
        let mut can_proceed = true;
        while can_proceed {
            can_proceed = match self.state {
                ConnState::Begin => self.process_begin(),
                ConnState::Parsed => self.process_parsed(),
                ConnState::Content => self.process_content(),
                ConnState::Running => self.process_running(),
                ConnState::Complete => self.process_completion(),
            };
        }
        self.advancing = false;
    }

    fn process_begin(&mut self) -> bool {
        if self.closing {
            return false;
        }
        match self.parse_incoming() {
            Ok(progressed) => progressed,
            Err(err) => {
                self.handle_error(err);
                true
            }
        }
    }

    /// Parses one complete header block if the terminator has arrived.
    ///
    /// Nothing is consumed until the whole block (and on success, the whole
    /// start line and every header) is known to be parseable; a short read
    /// leaves the buffer untouched.
    fn parse_incoming(&mut self) -> Result<bool, HttpError> {
        // Tolerate stray blank lines between pipelined requests.
        while self.input.as_slice().starts_with(b"\r\n") {
            self.input.consume(2);
        }

        let terminator = match self.input.find(b"\r\n\r\n") {
            Some(pos) => pos,
            None => {
                if self.input.len() > self.limits.header_size {
                    return Err(HttpError::Limit(413, "header block too large"));
                }
                return Ok(false);
            }
        };
        let block_len = terminator + 4;
        if block_len > self.limits.header_size {
            return Err(HttpError::Limit(413, "header block too large"));
        }

        if self.kind == ConnKind::Server {
            if let Some(ref endpoint) = self.endpoint {
                if !endpoint.begin_request() {
                    return Err(HttpError::Limit(503, "server too busy"));
                }
                self.counted_request = true;
            }
        }

        let block = self.input.take(block_len);
        let line_end = block
            .windows(2)
            .position(|w| w == b"\r\n")
            .unwrap_or(block.len());
        let first_line = str::from_utf8(&block[..line_end])
            .map_err(|_| HttpError::Protocol(400, "start line is not utf-8"))?;

        let mut rx = Rx::new();
        let mut tx = Tx::new();
        match self.kind {
            ConnKind::Server => parse_request_line(first_line, &self.limits, &mut rx)?,
            ConnKind::Client => parse_response_line(first_line, &mut rx)?,
        }

        {
            let mut header_slots = vec![httparse::EMPTY_HEADER; self.limits.header_count];
            match httparse::parse_headers(&block[line_end + 2..], &mut header_slots) {
                Ok(httparse::Status::Complete((_, parsed))) => {
                    for header in parsed {
                        let value = str::from_utf8(header.value)
                            .map_err(|_| HttpError::Protocol(400, "header value is not utf-8"))?;
                        rx.headers.insert(header.name, value.trim())?;
                    }
                }
                Ok(httparse::Status::Partial) => {
                    return Err(HttpError::Protocol(400, "truncated header block"));
                }
                Err(httparse::Error::TooManyHeaders) => {
                    return Err(HttpError::Protocol(400, "too many headers"));
                }
                Err(_) => return Err(HttpError::Protocol(400, "bad header syntax")),
            }
        }

        self.http10 = rx.version == (1, 0);
        let directives = rx.apply_headers(&self.limits, self.http10)?;
        if let Some(keep_alive) = directives.keep_alive {
            self.keep_alive = keep_alive;
        }
        self.expect_continue = directives.expect_continue;
        rx.header_packet = block;

        // Tracing waits until the block has validated, so malformed keys
        // never reach the log.
        trace!(
            "header block:\n{}",
            String::from_utf8_lossy(&rx.header_packet)
        );

        match self.kind {
            ConnKind::Server => {
                debug!("{} {} HTTP/{}.{}", rx.method, rx.uri, rx.version.0, rx.version.1);
                tx.ext = rx.parsed_uri.ext.clone();
                self.rx = Some(rx);
                self.tx = Some(tx);
                if !self.route_request() {
                    // An error response is already queued.
                    return Ok(true);
                }
            }
            ConnKind::Client => {
                debug!("response {} {}", rx.status, rx.status_message);
                // Without explicit framing a response body runs to close.
                if !rx.is_chunked() && rx.length == -1 && body_expected(rx.status) {
                    rx.length = i64::MAX;
                    rx.remaining_content = i64::MAX;
                }
                self.rx = Some(rx);
                self.tx = Some(tx);
            }
        }

        self.state = ConnState::Parsed;
        Ok(true)
    }

    /// Locates the host and route for a parsed request. Returns false when
    /// an error was raised instead.
    fn route_request(&mut self) -> bool {
        let endpoint = match self.endpoint {
            Some(ref endpoint) => endpoint.clone(),
            None => return true,
        };

        let hostname = self
            .rx
            .as_ref()
            .and_then(|rx| rx.hostname.clone());
        let host = match endpoint.lookup_host(hostname.as_ref().map(|s| &s[..])) {
            Some(host) => host,
            None => {
                // Keep the first host attached so the error renders with
                // its protocol settings.
                self.host = endpoint.first_host();
                self.error(404, "unknown virtual host");
                return false;
            }
        };

        if host.is_http10() {
            self.http10 = true;
        }

        let (method_flags, path, content_type) = {
            let rx = self.rx.as_ref().unwrap();
            (rx.method_flags, rx.path_info.clone(), rx.content_type.clone())
        };
        self.streaming = host.streaming_for(
            content_type.as_ref().map(|s| &s[..]),
            &path,
        );

        let route = match host.match_route(method_flags, &path) {
            Some(route) => route,
            None => {
                self.host = Some(host);
                self.error(404, "no matching route");
                return false;
            }
        };

        if let Some(ref mut tx) = self.tx {
            tx.handler = Some(route.handler());
        }
        self.host = Some(host);
        self.route = Some(route);
        true
    }

    fn process_parsed(&mut self) -> bool {
        if !self.abort_pipeline {
            if self.expect_continue && self.kind == ConnKind::Server {
                self.output.extend_from_slice(b"HTTP/1.1 100 Continue\r\n\r\n");
                self.expect_continue = false;
            }
            if self.kind == ConnKind::Server && self.handler().is_none() {
                self.error(500, "no handler configured");
            } else if let Some(handler) = self.handler() {
                handler.start(self);
                let no_body = self
                    .rx
                    .as_ref()
                    .map(|rx| !rx.is_chunked() && rx.remaining_content == 0)
                    .unwrap_or(true);
                if no_body && !self.error {
                    handler.writable(self);
                }
            }
        }
        self.state = ConnState::Content;
        true
    }

    fn process_content(&mut self) -> bool {
        if self.rx.is_none() {
            self.state = ConnState::Running;
            return true;
        }

        // Alternate ingestion with delivery until neither moves: a streamed
        // body stalled on the queue cap resumes right here once the handler
        // drains, without waiting for another socket event.
        loop {
            let before_input = self.input.len();
            let before_queued = self.receive_queue.queued();

            match self.analyse_content() {
                Err(err) => {
                    self.handle_error(err);
                    return true;
                }
                Ok(()) => (),
            }

            // Streamed bodies reach the handler as they arrive; buffered
            // ones wait in the queue until the request runs.
            if self.streaming && !self.abort_pipeline && !self.receive_queue.is_empty() {
                if let Some(handler) = self.handler() {
                    handler.process(self);
                }
            }

            if self.input.len() == before_input
                && self.receive_queue.queued() == before_queued
            {
                break;
            }
        }

        let finished = {
            let rx = self.rx.as_ref().unwrap();
            if rx.is_chunked() {
                rx.chunk_state == ChunkState::Eof
            } else if rx.length == i64::MAX {
                // Close-delimited (client side): done when the peer is.
                self.peer_closed && self.input.is_empty()
            } else {
                rx.remaining_content == 0
            }
        };
        if !finished {
            return false;
        }

        {
            let rx = self.rx.as_mut().unwrap();
            rx.remaining_content = 0;
            rx.eof = true;
        }
        if !self.abort_pipeline {
            self.receive_queue.push(Packet::end());
        }
        self.state = ConnState::Running;
        true
    }

    /// Moves body bytes from the input buffer into the receive queue,
    /// decoding chunk framing on the way. Consumes nothing it cannot use.
    fn analyse_content(&mut self) -> Result<(), HttpError> {
        loop {
            // Chunk header phase.
            let needs_header = {
                let rx = self.rx.as_ref().unwrap();
                rx.is_chunked()
                    && rx.chunk_state != ChunkState::Eof
                    && rx.remaining_content == 0
            };
            if needs_header {
                match chunk::parse_chunk_header(self.input.as_slice())? {
                    None => return Ok(()),
                    Some((consumed, 0)) => {
                        self.input.consume(consumed);
                        // The final CRLF is nice to have, not required.
                        if self.input.as_slice().starts_with(b"\r\n") {
                            self.input.consume(2);
                        }
                        let rx = self.rx.as_mut().unwrap();
                        rx.chunk_state = ChunkState::Eof;
                        return Ok(());
                    }
                    Some((consumed, size)) => {
                        {
                            let rx = self.rx.as_ref().unwrap();
                            if rx.received_content as u64 + size > self.limits.receive_body_size {
                                return Err(HttpError::Limit(413, "body too large"));
                            }
                        }
                        self.input.consume(consumed);
                        let rx = self.rx.as_mut().unwrap();
                        rx.remaining_content = size as i64;
                        rx.chunk_state = ChunkState::Data;
                    }
                }
            }

            let (remaining, chunked) = {
                let rx = self.rx.as_ref().unwrap();
                if rx.chunk_state == ChunkState::Eof {
                    return Ok(());
                }
                (rx.remaining_content, rx.is_chunked())
            };

            let available = cmp::min(remaining, self.input.len() as i64) as usize;
            if available == 0 {
                return Ok(());
            }
            let mut take = cmp::min(available, self.limits.chunk_size);

            // Backpressure only applies when the handler is consuming as
            // bytes arrive. A buffered body has no consumer until the
            // request runs, so its queue must be allowed to hold the whole
            // body; `receive_body_size` bounds it instead.
            if self.streaming && !self.abort_pipeline {
                let space = self
                    .limits
                    .rx_queue_max
                    .saturating_sub(self.receive_queue.queued());
                if space == 0 {
                    // Stalled; retried once the handler drains the queue.
                    return Ok(());
                }
                take = cmp::min(take, space);
            }

            // Bytes past `remaining` stay in the input buffer: that is the
            // head of the next pipelined request.
            let data = self.input.take(take);
            {
                let rx = self.rx.as_mut().unwrap();
                rx.remaining_content -= take as i64;
                rx.received_content += take as i64;
                if chunked && rx.remaining_content == 0 {
                    rx.chunk_state = ChunkState::Start;
                }
            }
            if !self.abort_pipeline {
                self.receive_queue.push(Packet::data(data));
            }

            if !chunked && self.rx.as_ref().unwrap().remaining_content == 0 {
                return Ok(());
            }
        }
    }

    fn process_running(&mut self) -> bool {
        match self.kind {
            ConnKind::Server => {
                if !self.error && !self.abort_pipeline {
                    if let Some(handler) = self.handler() {
                        handler.process(self);
                    }
                }
                if self.complete || self.write_complete || self.error {
                    self.state = ConnState::Complete;
                    true
                } else {
                    // The handler isn't done; wake it again once the socket
                    // drains what has been queued so far.
                    false
                }
            }
            ConnKind::Client => {
                if let Some(handler) = self.handler() {
                    handler.process(self);
                }
                self.complete = true;
                self.state = ConnState::Complete;
                true
            }
        }
    }

    /// Tears down the finished request. For servers this returns true when
    /// more input is already buffered, which lets a single event serve an
    /// entire pipeline of requests back to back.
    fn process_completion(&mut self) -> bool {
        if let Some(handler) = self.handler() {
            let finalized = self.tx.as_ref().map(|tx| tx.finalized).unwrap_or(true);
            if !finalized {
                handler.finalize(self);
                if let Some(ref mut tx) = self.tx {
                    tx.finalized = true;
                }
            }
        }

        if self.counted_request {
            if let Some(ref endpoint) = self.endpoint {
                endpoint.end_request();
            }
            self.counted_request = false;
        }

        if self.keep_alive > 0 {
            self.keep_alive -= 1;
        }

        if self.kind == ConnKind::Client {
            // The embedder still wants the parsed response; keep it.
            if self.conn_error || self.keep_alive <= 0 {
                self.closing = true;
            }
            return false;
        }

        self.rx = None;
        self.tx = None;
        self.route = None;
        self.host = None;
        self.receive_queue.clear();
        self.error = false;
        self.abort_pipeline = false;
        self.complete = false;
        self.write_complete = false;
        self.expect_continue = false;
        self.streaming = true;
        self.state = ConnState::Begin;

        if self.conn_error || self.keep_alive <= 0 {
            self.closing = true;
            return false;
        }
        // Anything already buffered is the next request; parsing it now
        // avoids a pointless trip through the event loop.
        !self.input.is_empty()
    }

    // ---- dispatcher plumbing ------------------------------------------------

    pub fn register(&self, poll: &Poll, token: Token) -> io::Result<()> {
        self.stream
            .register(poll, token, Ready::readable(), PollOpt::level())
    }

    pub fn reregister(&self, poll: &Poll, token: Token) -> io::Result<()> {
        let mut interest = Ready::readable();
        if self.wants_write() {
            interest = interest | Ready::writable();
        }
        self.stream
            .reregister(poll, token, interest, PollOpt::level())
    }

    pub fn deregister(&self, poll: &Poll) -> io::Result<()> {
        self.stream.deregister(poll)
    }
}

// Parses "GET /path HTTP/1.1".
fn parse_request_line(line: &str, limits: &Limits, rx: &mut Rx) -> Result<(), HttpError> {
    let mut words = line.split(' ').filter(|w| !w.is_empty());
    let method = words.next().unwrap_or("");
    let uri = words.next().unwrap_or("");
    let version = words.next().unwrap_or("");

    let flag = match method_flag(method) {
        Some(flag) => flag,
        None => return Err(HttpError::Protocol(400, "bad method")),
    };
    rx.method = ArrayString::from(method)
        .map_err(|_| HttpError::Protocol(400, "bad method"))?;
    rx.method_flags = flag;

    if uri.is_empty() {
        return Err(HttpError::Protocol(400, "empty uri"));
    }
    if uri.len() > limits.uri_size {
        return Err(HttpError::Limit(414, "uri too long"));
    }
    rx.version = parse_version(version)?;
    rx.set_uri(uri)?;
    Ok(())
}

// Parses "HTTP/1.1 200 OK".
fn parse_response_line(line: &str, rx: &mut Rx) -> Result<(), HttpError> {
    let mut words = line.splitn(3, ' ');
    let version = words.next().unwrap_or("");
    let status = words.next().unwrap_or("");
    let message = words.next().unwrap_or("");

    rx.version = parse_version(version)?;
    rx.status = status
        .parse()
        .map_err(|_| HttpError::Protocol(400, "bad status code"))?;
    rx.status_message = message.to_owned();
    Ok(())
}

fn parse_version(version: &str) -> Result<(u8, u8), HttpError> {
    match version {
        "HTTP/1.1" => Ok((1, 1)),
        "HTTP/1.0" => Ok((1, 0)),
        _ => Err(HttpError::Protocol(400, "unsupported protocol")),
    }
}

// Whether a response with this status carries a body.
fn body_expected(status: u16) -> bool {
    match status {
        100...199 | 204 | 304 => false,
        _ => true,
    }
}
