// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mio::net::{TcpListener, TcpStream};
use mio::{Poll, PollOpt, Ready, Token};

use dispatcher::DispatcherHandle;
use host::Host;
use limits::Limits;

/// A bound listener and the virtual hosts served on it.
pub struct Endpoint {
    ip: String,
    port: u16,
    hosts: Mutex<Vec<Arc<Host>>>,
    listener: Mutex<Option<TcpListener>>,
    limits: Mutex<Arc<Limits>>,

    /// Select hosts by the request's `Host` header; otherwise the first
    /// host serves everything.
    named_virtual_hosts: AtomicBool,
    /// Give every accepted connection a dispatcher of its own instead of
    /// the endpoint's default.
    new_dispatcher: AtomicBool,
    default_dispatcher: Mutex<Option<DispatcherHandle>>,

    conn_count: AtomicUsize,
    request_count: AtomicUsize,
}

impl Endpoint {
    /// Creates an endpoint for `(address, port)`. An empty address binds
    /// every interface. When `port` is negative, `address` is taken as
    /// `"host:port"` and split at the last colon.
    pub fn new(address: &str, port: i32) -> Endpoint {
        let (ip, port) = if port < 0 {
            match address.rfind(':') {
                Some(pos) => (
                    address[..pos].to_owned(),
                    address[pos + 1..].parse().unwrap_or(0),
                ),
                None => (address.to_owned(), 0),
            }
        } else {
            (address.to_owned(), port as u16)
        };

        Endpoint {
            ip: ip,
            port: port,
            hosts: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
            limits: Mutex::new(Arc::new(Limits::default())),
            named_virtual_hosts: AtomicBool::new(false),
            new_dispatcher: AtomicBool::new(false),
            default_dispatcher: Mutex::new(None),
            conn_count: AtomicUsize::new(0),
            request_count: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_limits(&self, limits: Arc<Limits>) {
        *self.limits.lock().unwrap() = limits;
    }

    pub fn limits(&self) -> Arc<Limits> {
        self.limits.lock().unwrap().clone()
    }

    pub fn set_named_virtual_hosts(&self, enabled: bool) {
        self.named_virtual_hosts.store(enabled, Ordering::SeqCst);
    }

    pub fn named_virtual_hosts(&self) -> bool {
        self.named_virtual_hosts.load(Ordering::SeqCst)
    }

    pub fn set_new_dispatcher(&self, enabled: bool) {
        self.new_dispatcher.store(enabled, Ordering::SeqCst);
    }

    pub fn new_dispatcher(&self) -> bool {
        self.new_dispatcher.load(Ordering::SeqCst)
    }

    pub fn set_dispatcher(&self, handle: DispatcherHandle) {
        *self.default_dispatcher.lock().unwrap() = Some(handle);
    }

    pub fn dispatcher(&self) -> Option<DispatcherHandle> {
        self.default_dispatcher.lock().unwrap().clone()
    }

    /// Appends a host. Host order matters: the first host is the fallback
    /// for requests that name no (or an unknown) virtual host.
    pub fn add_host(&self, host: Arc<Host>) {
        self.hosts.lock().unwrap().push(host);
    }

    pub fn first_host(&self) -> Option<Arc<Host>> {
        self.hosts.lock().unwrap().first().cloned()
    }

    /// Selects the host serving a request with the given `Host` header.
    ///
    /// Without named virtual hosting the first host always wins. With it,
    /// hosts are tried in order: exact (case-insensitive) matches and
    /// wildcard names both count. `None` means no host matched; the caller
    /// renders the error against the first host.
    pub fn lookup_host(&self, header: Option<&str>) -> Option<Arc<Host>> {
        let hosts = self.hosts.lock().unwrap();
        if hosts.is_empty() {
            return None;
        }
        if !self.named_virtual_hosts() {
            return hosts.first().cloned();
        }
        let header = match header {
            Some(h) if !h.is_empty() => h,
            _ => return hosts.first().cloned(),
        };
        hosts.iter().find(|host| host.matches_name(header)).cloned()
    }

    /// Binds the listen socket. An endpoint with no hosts cannot open.
    pub fn open(&self) -> io::Result<SocketAddr> {
        if self.hosts.lock().unwrap().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "endpoint has no hosts",
            ));
        }

        let ip = if self.ip.is_empty() { "0.0.0.0" } else { &self.ip[..] };
        let addr = (ip, self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "unresolvable address"))?;
        let listener = TcpListener::bind(&addr)?;
        let local = listener.local_addr()?;
        info!("listening on {}", local);
        *self.listener.lock().unwrap() = Some(listener);
        Ok(local)
    }

    pub fn is_open(&self) -> bool {
        self.listener.lock().unwrap().is_some()
    }

    /// Drops the listen socket; connections in flight are unaffected.
    pub fn close(&self) {
        *self.listener.lock().unwrap() = None;
    }

    /// Registers the listen socket with a dispatcher's poll.
    pub fn register(&self, poll: &Poll, token: Token) -> io::Result<()> {
        match *self.listener.lock().unwrap() {
            Some(ref listener) => {
                poll.register(listener, token, Ready::readable(), PollOpt::level())
            }
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "not open")),
        }
    }

    pub fn deregister(&self, poll: &Poll) -> io::Result<()> {
        match *self.listener.lock().unwrap() {
            Some(ref listener) => poll.deregister(listener),
            None => Ok(()),
        }
    }

    /// Accepts every connection currently pending on the listen socket.
    /// Sockets over the per-endpoint connection limit are dropped on the
    /// floor.
    pub fn accept_ready(&self) -> Vec<(TcpStream, SocketAddr)> {
        let mut accepted = Vec::new();
        let guard = self.listener.lock().unwrap();
        let listener = match *guard {
            Some(ref listener) => listener,
            None => return accepted,
        };
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if !self.conn_opened() {
                        warn!("connection limit reached, dropping {}", addr);
                        continue;
                    }
                    accepted.push((stream, addr));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
                Err(e) => {
                    warn!("accept failed: {}", e);
                    break;
                }
            }
        }
        accepted
    }

    /// Claims a connection slot; false when the endpoint is full.
    pub fn conn_opened(&self) -> bool {
        let max = self.limits().connection_max;
        let prev = self.conn_count.fetch_add(1, Ordering::SeqCst);
        if prev >= max {
            self.conn_count.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub fn conn_closed(&self) {
        self.conn_count.fetch_sub(1, Ordering::SeqCst);
    }

    /// Claims an active-request slot; false when the endpoint is at its
    /// concurrency cap.
    pub fn begin_request(&self) -> bool {
        let max = self.limits().request_max;
        let prev = self.request_count.fetch_add(1, Ordering::SeqCst);
        if prev >= max {
            self.request_count.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub fn end_request(&self) {
        self.request_count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Endpoint;
    use host::Host;
    use limits::Limits;

    #[test]
    fn address_splitting() {
        let ep = Endpoint::new("127.0.0.1", 8080);
        assert_eq!(ep.ip(), "127.0.0.1");
        assert_eq!(ep.port(), 8080);

        let ep = Endpoint::new("127.0.0.1:9090", -1);
        assert_eq!(ep.ip(), "127.0.0.1");
        assert_eq!(ep.port(), 9090);

        let ep = Endpoint::new("", 80);
        assert_eq!(ep.ip(), "");
        assert_eq!(ep.port(), 80);
    }

    #[test]
    fn host_lookup_without_named_vhosts() {
        let ep = Endpoint::new("", 0);
        ep.add_host(Arc::new(Host::new("first")));
        ep.add_host(Arc::new(Host::new("second")));

        // The header is ignored entirely.
        assert_eq!(ep.lookup_host(Some("second")).unwrap().name(), "first");
        assert_eq!(ep.lookup_host(None).unwrap().name(), "first");
    }

    #[test]
    fn host_lookup_with_wildcards() {
        let ep = Endpoint::new("", 0);
        ep.set_named_virtual_hosts(true);
        ep.add_host(Arc::new(Host::new("*.example.com")));
        ep.add_host(Arc::new(Host::new("*")));

        assert_eq!(
            ep.lookup_host(Some("svc.example.com")).unwrap().name(),
            "*.example.com"
        );
        assert_eq!(ep.lookup_host(Some("other")).unwrap().name(), "*");
        // Absent header falls back to the first host.
        assert_eq!(ep.lookup_host(None).unwrap().name(), "*.example.com");
    }

    #[test]
    fn host_lookup_miss() {
        let ep = Endpoint::new("", 0);
        ep.set_named_virtual_hosts(true);
        ep.add_host(Arc::new(Host::new("only.example.com")));
        assert!(ep.lookup_host(Some("elsewhere.org")).is_none());
        assert_eq!(ep.first_host().unwrap().name(), "only.example.com");
    }

    #[test]
    fn request_counting() {
        let ep = Endpoint::new("", 0);
        ep.set_limits(Arc::new(Limits {
            request_max: 2,
            ..Limits::default()
        }));
        assert!(ep.begin_request());
        assert!(ep.begin_request());
        assert!(!ep.begin_request());
        ep.end_request();
        assert!(ep.begin_request());
    }

    #[test]
    fn open_requires_a_host() {
        let ep = Endpoint::new("127.0.0.1", 0);
        assert!(ep.open().is_err());
        ep.add_host(Arc::new(Host::new("x")));
        let addr = ep.open().unwrap();
        assert!(addr.port() != 0);
        assert!(ep.is_open());
        ep.close();
        assert!(!ep.is_open());
    }
}
