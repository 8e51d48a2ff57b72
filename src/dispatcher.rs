// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Cooperative per-connection event contexts.
//!
//! A dispatcher is a single-threaded poll loop. Every connection belongs to
//! exactly one dispatcher; all of its parsing and handler execution runs
//! serially there. Other threads talk to a dispatcher only by posting
//! events through its [`DispatcherHandle`](struct.DispatcherHandle.html),
//! which pairs an mpsc channel with a poll registration so the post doubles
//! as a wakeup.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Events, Poll, PollOpt, Ready, Registration, SetReadiness, Token};

use connection::{Conn, ConnState};
use endpoint::Endpoint;

const INBOX: Token = Token(0);
const FIRST_TOKEN: usize = 1;

static NEXT_DISPATCHER_ID: AtomicUsize = AtomicUsize::new(1);

/// An event posted onto a dispatcher from outside.
pub enum Posted {
    /// Adopt a freshly accepted server connection.
    Accept {
        stream: TcpStream,
        addr: SocketAddr,
        endpoint: Arc<Endpoint>,
    },
    /// Adopt an already-built connection (client side, TLS wrappers, ...).
    Adopt { conn: Box<Conn> },
    /// Tear down one connection.
    CloseConn { token: Token },
    /// Stop the run loop after the current iteration.
    Shutdown,
}

/// Cheap, cloneable address of a dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    id: usize,
    tx: Sender<Posted>,
    ready: SetReadiness,
}

impl DispatcherHandle {
    /// Enqueues an event and wakes the dispatcher. False when it is gone.
    pub fn post(&self, event: Posted) -> bool {
        if self.tx.send(event).is_err() {
            return false;
        }
        let _ = self.ready.set_readiness(Ready::readable());
        true
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }
}

/// Outcome of [`Dispatcher::wait`](struct.Dispatcher.html#method.wait).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The connection reached the requested state.
    Ok,
    /// The deadline expired; the connection is intact.
    Timeout,
    /// The connection died or was torn down.
    Connection,
}

/// Process-wide list of live connections, used to tear down everything an
/// endpoint owns when it shuts down.
pub struct ConnRegistry {
    entries: Mutex<Vec<ConnEntry>>,
}

struct ConnEntry {
    dispatcher: DispatcherHandle,
    token: Token,
    endpoint: Option<Weak<Endpoint>>,
}

impl ConnRegistry {
    pub fn new() -> ConnRegistry {
        ConnRegistry {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn add(&self, dispatcher: DispatcherHandle, token: Token, endpoint: Option<&Arc<Endpoint>>) {
        self.entries.lock().unwrap().push(ConnEntry {
            dispatcher: dispatcher,
            token: token,
            endpoint: endpoint.map(Arc::downgrade),
        });
    }

    fn remove(&self, dispatcher_id: usize, token: Token) {
        self.entries
            .lock()
            .unwrap()
            .retain(|e| !(e.dispatcher.id() == dispatcher_id && e.token == token));
    }

    /// Posts a close for every connection accepted on `endpoint`.
    pub fn close_endpoint_conns(&self, endpoint: &Arc<Endpoint>) {
        let entries = self.entries.lock().unwrap();
        for entry in entries.iter() {
            let matches = entry
                .endpoint
                .as_ref()
                .and_then(|weak| weak.upgrade())
                .map(|ep| Arc::ptr_eq(&ep, endpoint))
                .unwrap_or(false);
            if matches {
                entry
                    .dispatcher
                    .post(Posted::CloseConn { token: entry.token });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// A single-threaded cooperative event loop owning a set of connections
/// and, optionally, some listen sockets.
pub struct Dispatcher {
    id: usize,
    poll: Poll,
    events: Events,
    inbox: Receiver<Posted>,
    // Keeps the inbox readiness registration alive for the poll's lifetime.
    _inbox_registration: Registration,
    handle_tx: Sender<Posted>,
    handle_ready: SetReadiness,

    conns: HashMap<Token, Conn>,
    listeners: HashMap<Token, Arc<Endpoint>>,
    next_token: usize,

    /// Housekeeping period; also the cap on every poll timeout, so the
    /// periodic pass never needs a wakeup of its own.
    period: Duration,
    running: bool,
    /// Transient dispatchers exit once their last connection goes away.
    exit_when_idle: bool,
    saw_conn: bool,

    registry: Option<Arc<ConnRegistry>>,
}

impl Dispatcher {
    pub fn new(period: Duration) -> io::Result<Dispatcher> {
        let poll = Poll::new()?;
        let (registration, ready) = Registration::new2();
        poll.register(&registration, INBOX, Ready::readable(), PollOpt::edge())?;
        let (tx, rx) = channel();
        Ok(Dispatcher {
            id: NEXT_DISPATCHER_ID.fetch_add(1, Ordering::SeqCst),
            poll: poll,
            events: Events::with_capacity(256),
            inbox: rx,
            _inbox_registration: registration,
            handle_tx: tx,
            handle_ready: ready,
            conns: HashMap::new(),
            listeners: HashMap::new(),
            next_token: FIRST_TOKEN,
            period: period,
            running: true,
            exit_when_idle: false,
            saw_conn: false,
            registry: None,
        })
    }

    /// Spawns a dispatcher on its own thread and returns its handle.
    ///
    /// `exit_when_idle` makes it transient: it stops once it has hosted at
    /// least one connection and the last one is gone.
    pub fn spawn(
        period: Duration,
        exit_when_idle: bool,
        registry: Option<Arc<ConnRegistry>>,
    ) -> io::Result<DispatcherHandle> {
        let mut dispatcher = Dispatcher::new(period)?;
        dispatcher.exit_when_idle = exit_when_idle;
        dispatcher.registry = registry;
        let handle = dispatcher.handle();
        thread::spawn(move || dispatcher.run());
        Ok(handle)
    }

    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            id: self.id,
            tx: self.handle_tx.clone(),
            ready: self.handle_ready.clone(),
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn set_registry(&mut self, registry: Arc<ConnRegistry>) {
        self.registry = Some(registry);
    }

    pub fn conn_count(&self) -> usize {
        self.conns.len()
    }

    /// Registers an endpoint's listen socket; accepted connections go to
    /// the endpoint's chosen dispatcher (or here, by default).
    pub fn add_endpoint(&mut self, endpoint: Arc<Endpoint>) -> io::Result<()> {
        let token = self.alloc_token();
        endpoint.register(&self.poll, token)?;
        if endpoint.dispatcher().is_none() {
            endpoint.set_dispatcher(self.handle());
        }
        self.listeners.insert(token, endpoint);
        Ok(())
    }

    pub fn remove_endpoint(&mut self, endpoint: &Arc<Endpoint>) {
        let tokens: Vec<Token> = self
            .listeners
            .iter()
            .filter(|&(_, ep)| Arc::ptr_eq(ep, endpoint))
            .map(|(&token, _)| token)
            .collect();
        for token in tokens {
            let _ = endpoint.deregister(&self.poll);
            self.listeners.remove(&token);
        }
    }

    /// Takes ownership of a connection and registers its socket.
    pub fn adopt(&mut self, conn: Conn) -> io::Result<Token> {
        let token = self.alloc_token();
        conn.register(&self.poll, token)?;
        if let Some(ref registry) = self.registry {
            registry.add(self.handle(), token, conn.endpoint.as_ref());
        }
        self.conns.insert(token, conn);
        self.saw_conn = true;
        Ok(token)
    }

    /// Direct access to a connection this dispatcher owns.
    pub fn conn_mut(&mut self, token: Token) -> Option<&mut Conn> {
        self.conns.get_mut(&token)
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Runs until shut down (or, for transient dispatchers, until idle).
    pub fn run(&mut self) {
        while self.running {
            if let Err(e) = self.run_once(None) {
                error!("dispatcher {} poll failed: {}", self.id, e);
                break;
            }
            if self.exit_when_idle && self.saw_conn && self.conns.is_empty() {
                break;
            }
        }
        debug!("dispatcher {} stopped", self.id);
    }

    /// One poll iteration: waits at most `timeout` (capped at the
    /// housekeeping period), services every ready event, then runs the
    /// housekeeping pass.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let timeout = match timeout {
            Some(t) if t < self.period => t,
            _ => self.period,
        };
        self.poll.poll(&mut self.events, Some(timeout))?;

        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|e| {
                let readiness = e.readiness();
                (e.token(), readiness.is_readable(), readiness.is_writable())
            })
            .collect();

        for (token, readable, writable) in ready {
            if token == INBOX {
                self.drain_inbox();
            } else if self.listeners.contains_key(&token) {
                self.accept_on(token);
            } else {
                self.service_conn(token, readable, writable);
            }
        }

        self.housekeeping();
        Ok(())
    }

    fn drain_inbox(&mut self) {
        loop {
            match self.inbox.try_recv() {
                Ok(Posted::Accept {
                    stream,
                    addr,
                    endpoint,
                }) => {
                    let limits = endpoint.limits();
                    let mut conn = Conn::server(Box::new(stream), limits);
                    conn.remote_addr = Some(addr);
                    conn.set_endpoint(endpoint.clone());
                    debug!("accepted {} on {}:{}", addr, endpoint.ip(), endpoint.port());
                    if self.adopt(conn).is_err() {
                        endpoint.conn_closed();
                    }
                }
                Ok(Posted::Adopt { conn }) => {
                    if self.adopt(*conn).is_err() {
                        debug!("failed to adopt connection");
                    }
                }
                Ok(Posted::CloseConn { token }) => {
                    self.teardown(token);
                }
                Ok(Posted::Shutdown) => {
                    self.running = false;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn accept_on(&mut self, token: Token) {
        let endpoint = match self.listeners.get(&token) {
            Some(endpoint) => endpoint.clone(),
            None => return,
        };
        for (stream, addr) in endpoint.accept_ready() {
            // Pick the target context: a transient one per connection when
            // the endpoint asks for that, otherwise the endpoint's default
            // (which is us, unless configured away).
            let target = if endpoint.new_dispatcher() {
                match Dispatcher::spawn(self.period, true, self.registry.clone()) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!("failed to spawn dispatcher: {}", e);
                        None
                    }
                }
            } else {
                endpoint.dispatcher()
            };

            let event = Posted::Accept {
                stream: stream,
                addr: addr,
                endpoint: endpoint.clone(),
            };
            match target {
                Some(handle) => {
                    handle.post(event);
                }
                None => {
                    // No handle configured: service it locally.
                    let _ = self.handle().post(event);
                }
            }
        }
    }

    fn service_conn(&mut self, token: Token, readable: bool, writable: bool) {
        if let Some(conn) = self.conns.get_mut(&token) {
            if readable {
                conn.readable();
            }
            if writable {
                conn.writable();
            }
            conn.flush();
        }
        self.finish_or_rearm(token);
    }

    fn finish_or_rearm(&mut self, token: Token) {
        let finished = match self.conns.get(&token) {
            Some(conn) => conn.is_finished(),
            None => return,
        };
        if finished {
            self.teardown(token);
        } else if let Some(conn) = self.conns.get(&token) {
            if let Err(e) = conn.reregister(&self.poll, token) {
                debug!("reregister failed: {}", e);
                self.teardown(token);
            }
        }
    }

    fn teardown(&mut self, token: Token) {
        if let Some(conn) = self.conns.remove(&token) {
            let _ = conn.deregister(&self.poll);
            if let Some(ref endpoint) = conn.endpoint {
                endpoint.conn_closed();
            }
            if let Some(ref registry) = self.registry {
                registry.remove(self.id, token);
            }
            debug!("connection closed ({:?})", conn.remote_addr);
        }
    }

    // Tears down connections that have sat idle past their limit.
    fn housekeeping(&mut self) {
        let now = Instant::now();
        let stale: Vec<Token> = self
            .conns
            .iter()
            .filter(|&(_, conn)| {
                now.duration_since(conn.last_activity) > conn.limits.inactivity_timeout
            })
            .map(|(&token, _)| token)
            .collect();
        for token in stale {
            debug!("closing idle connection");
            self.teardown(token);
        }
    }

    /// Services events until the connection reaches `target`, dies, or the
    /// deadline passes. The temporary wait is fully undone on every exit
    /// path; a `Timeout` leaves the connection exactly as it was.
    pub fn wait(&mut self, token: Token, target: ConnState, timeout: Duration) -> WaitResult {
        let deadline = Instant::now() + timeout;
        loop {
            match self.conns.get(&token) {
                None => return WaitResult::Connection,
                Some(conn) => {
                    if conn.state >= target {
                        return WaitResult::Ok;
                    }
                    if conn.conn_error || conn.is_finished() {
                        return WaitResult::Connection;
                    }
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitResult::Timeout;
            }
            if self.run_once(Some(deadline - now)).is_err() {
                return WaitResult::Connection;
            }
        }
    }
}
