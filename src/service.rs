// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use num_cpus;

use dispatcher::{ConnRegistry, Dispatcher, DispatcherHandle, Posted};
use endpoint::Endpoint;
use host::Host;
use limits::Limits;

/// The top-level service object.
///
/// Owns the endpoint registry, the process-wide connection registry, the
/// default host, and the dispatchers. Tests build isolated instances; there
/// is no process-global state anywhere in the crate.
pub struct Http {
    limits: Arc<Limits>,
    endpoints: Mutex<Vec<Arc<Endpoint>>>,
    default_host: Mutex<Option<Arc<Host>>>,
    registry: Arc<ConnRegistry>,
    /// The dispatcher that owns the listen sockets; it also services
    /// connections unless workers take them.
    service: Dispatcher,
    workers: Vec<DispatcherHandle>,
    next_worker: usize,
}

impl Http {
    pub fn new() -> io::Result<Http> {
        Http::with_limits(Arc::new(Limits::default()))
    }

    pub fn with_limits(limits: Arc<Limits>) -> io::Result<Http> {
        let registry = Arc::new(ConnRegistry::new());
        let mut service = Dispatcher::new(limits.housekeeping_period)?;
        service.set_registry(registry.clone());
        Ok(Http {
            limits: limits,
            endpoints: Mutex::new(Vec::new()),
            default_host: Mutex::new(None),
            registry: registry,
            service: service,
            workers: Vec::new(),
            next_worker: 0,
        })
    }

    pub fn limits(&self) -> Arc<Limits> {
        self.limits.clone()
    }

    /// Installs the host used by endpoints that were given none of their
    /// own.
    pub fn set_default_host(&self, host: Arc<Host>) {
        *self.default_host.lock().unwrap() = Some(host);
    }

    pub fn default_host(&self) -> Option<Arc<Host>> {
        self.default_host.lock().unwrap().clone()
    }

    /// Spawns `count` worker dispatchers (one per CPU when zero). Endpoints
    /// added afterwards are pinned round-robin onto the workers.
    pub fn start_workers(&mut self, count: usize) -> io::Result<()> {
        let count = if count == 0 { num_cpus::get() } else { count };
        for _ in 0..count {
            let handle = Dispatcher::spawn(
                self.limits.housekeeping_period,
                false,
                Some(self.registry.clone()),
            )?;
            self.workers.push(handle);
        }
        Ok(())
    }

    /// Opens an endpoint and starts accepting on it.
    ///
    /// An endpoint without hosts receives the default host first; opening
    /// still fails if neither exists.
    pub fn add_endpoint(&mut self, endpoint: Arc<Endpoint>) -> io::Result<SocketAddr> {
        if endpoint.first_host().is_none() {
            if let Some(host) = self.default_host() {
                endpoint.add_host(host);
            }
        }
        endpoint.set_limits(self.limits.clone());

        if !self.workers.is_empty() {
            let handle = self.workers[self.next_worker % self.workers.len()].clone();
            self.next_worker += 1;
            endpoint.set_dispatcher(handle);
        }

        let addr = endpoint.open()?;
        self.service.add_endpoint(endpoint.clone())?;
        self.endpoints.lock().unwrap().push(endpoint);
        Ok(addr)
    }

    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints.lock().unwrap().clone()
    }

    /// Number of connections alive across all dispatchers.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// The dispatcher owning the listen sockets. Embedders that drive the
    /// loop themselves call `run_once` on this.
    pub fn service_dispatcher(&mut self) -> &mut Dispatcher {
        &mut self.service
    }

    /// One iteration of the service loop.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.service.run_once(timeout)
    }

    /// Runs the service loop until shut down.
    pub fn run(&mut self) {
        self.service.run()
    }

    /// Stops accepting on an endpoint and tears down every connection that
    /// came in through it.
    pub fn shutdown_endpoint(&mut self, endpoint: &Arc<Endpoint>) {
        endpoint.close();
        self.service.remove_endpoint(endpoint);
        self.registry.close_endpoint_conns(endpoint);
        self.endpoints
            .lock()
            .unwrap()
            .retain(|ep| !Arc::ptr_eq(ep, endpoint));
    }

    /// Full shutdown: every endpoint, every worker.
    pub fn shutdown(&mut self) {
        let endpoints = self.endpoints();
        for endpoint in &endpoints {
            self.shutdown_endpoint(endpoint);
        }
        for worker in &self.workers {
            worker.post(Posted::Shutdown);
        }
        self.workers.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::io::{ErrorKind, Read, Write};
    use std::net;
    use std::sync::Arc;
    use std::time::Duration;

    use super::Http;
    use connection::Conn;
    use endpoint::Endpoint;
    use host::Host;
    use pipeline::Handler;
    use route::Route;

    struct Hello;

    impl Handler for Hello {
        fn process(&self, conn: &mut Conn) {
            while let Some(packet) = conn.receive_queue.pop() {
                if packet.end {
                    conn.write(
                        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
                          Content-Length: 5\r\n\r\nhello",
                    );
                    conn.finalize();
                }
            }
        }
    }

    #[test]
    fn serves_a_request_over_a_socket() {
        let mut http = Http::new().unwrap();

        let host = Arc::new(Host::new("*"));
        host.add_route(Route::new("default", "", Hello));

        let endpoint = Arc::new(Endpoint::new("127.0.0.1", 0));
        endpoint.add_host(host);
        let addr = http.add_endpoint(endpoint.clone()).unwrap();

        let mut client = net::TcpStream::connect(addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
            .unwrap();

        let mut response = Vec::new();
        let mut buf = [0u8; 1024];
        for _ in 0..500 {
            http.run_once(Some(Duration::from_millis(5))).unwrap();
            match client.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&buf[..n]),
                Err(ref e)
                    if e.kind() == ErrorKind::WouldBlock
                        || e.kind() == ErrorKind::TimedOut => (),
                Err(e) => panic!("read failed: {}", e),
            }
            if response.ends_with(b"hello") {
                break;
            }
        }

        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "got: {}", text);
        assert!(text.ends_with("hello"), "got: {}", text);

        http.shutdown();
    }

    #[test]
    fn endpoint_without_hosts_uses_the_default_host() {
        let mut http = Http::new().unwrap();
        let host = Arc::new(Host::new("fallback"));
        host.add_route(Route::new("default", "", Hello));
        http.set_default_host(host);

        let endpoint = Arc::new(Endpoint::new("127.0.0.1", 0));
        http.add_endpoint(endpoint.clone()).unwrap();
        assert_eq!(endpoint.first_host().unwrap().name(), "fallback");
        http.shutdown();
    }
}
