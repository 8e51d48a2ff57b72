// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! End-to-end checks of the connection machine through the public API,
//! using an in-memory stream instead of a socket.

extern crate auberge;
extern crate mio;

use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use auberge::{Conn, Handler, Limits, Stream};
use mio::{Evented, Poll, PollOpt, Ready, Token};

struct MemoryStream;

impl Read for MemoryStream {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(ErrorKind::WouldBlock, "drained"))
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Evented for MemoryStream {
    fn register(
        &self,
        _poll: &Poll,
        _token: Token,
        _interest: Ready,
        _opts: PollOpt,
    ) -> io::Result<()> {
        Ok(())
    }

    fn reregister(
        &self,
        _poll: &Poll,
        _token: Token,
        _interest: Ready,
        _opts: PollOpt,
    ) -> io::Result<()> {
        Ok(())
    }

    fn deregister(&self, _poll: &Poll) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for MemoryStream {}

// Echoes each request body back with a 200.
struct Echo {
    bodies: Arc<Mutex<Vec<Vec<u8>>>>,
    current: Mutex<Vec<u8>>,
    served: Arc<AtomicUsize>,
}

impl Echo {
    fn new(bodies: Arc<Mutex<Vec<Vec<u8>>>>, served: Arc<AtomicUsize>) -> Echo {
        Echo {
            bodies: bodies,
            current: Mutex::new(Vec::new()),
            served: served,
        }
    }
}

impl Handler for Echo {
    fn process(&self, conn: &mut Conn) {
        while let Some(packet) = conn.receive_queue.pop() {
            if packet.end {
                let body = ::std::mem::replace(&mut *self.current.lock().unwrap(), Vec::new());
                let mut response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n",
                    body.len()
                )
                .into_bytes();
                response.extend_from_slice(&body);
                conn.write(&response);
                conn.finalize();

                self.bodies.lock().unwrap().push(body);
                self.served.fetch_add(1, Ordering::SeqCst);
            } else {
                self.current
                    .lock()
                    .unwrap()
                    .extend_from_slice(&packet.content);
            }
        }
    }
}

fn echo_conn() -> (Conn, Arc<Mutex<Vec<Vec<u8>>>>, Arc<AtomicUsize>) {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let served = Arc::new(AtomicUsize::new(0));
    let mut conn = Conn::server(Box::new(MemoryStream), Arc::new(Limits::default()));
    conn.default_handler = Some(Arc::new(Echo::new(bodies.clone(), served.clone())));
    (conn, bodies, served)
}

#[test]
fn three_pipelined_requests_one_event() {
    let (mut conn, bodies, served) = echo_conn();

    let mut wire = Vec::new();
    wire.extend_from_slice(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    wire.extend_from_slice(b"POST /a HTTP/1.1\r\nHost: x\r\nContent-Length: 3\r\n\r\nabc");
    wire.extend_from_slice(
        b"POST /b HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
          4\r\nwxyz\r\n0\r\n\r\n",
    );

    conn.feed(&wire);
    conn.advance();

    assert_eq!(served.load(Ordering::SeqCst), 3);
    assert!(conn.input.is_empty());

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 3);
    assert_eq!(bodies[0], b"");
    assert_eq!(bodies[1], b"abc");
    assert_eq!(bodies[2], b"wxyz");

    // Responses come back in arrival order.
    let output = conn.take_output();
    let text = String::from_utf8(output).unwrap();
    let first = text.find("abc").unwrap();
    let second = text.find("wxyz").unwrap();
    assert!(first < second);
}

#[test]
fn split_feeds_equal_single_feed() {
    let wire: &[u8] = b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 8\r\n\r\nabcdefgh";

    for split in 1..wire.len() {
        let (mut conn, bodies, served) = echo_conn();
        conn.feed(&wire[..split]);
        conn.advance();
        conn.feed(&wire[split..]);
        conn.advance();

        assert_eq!(served.load(Ordering::SeqCst), 1, "split at {}", split);
        assert_eq!(&bodies.lock().unwrap()[0][..], b"abcdefgh");
    }
}

#[test]
fn keep_alive_counts_down() {
    let limits = Limits {
        keep_alive: 2,
        ..Limits::default()
    };
    let mut conn = Conn::server(Box::new(MemoryStream), Arc::new(limits));
    let served = Arc::new(AtomicUsize::new(0));
    conn.default_handler = Some(Arc::new(Echo::new(
        Arc::new(Mutex::new(Vec::new())),
        served.clone(),
    )));

    conn.feed(b"GET / HTTP/1.1\r\nHost: x\r\n\r\nGET / HTTP/1.1\r\nHost: x\r\n\r\n");
    conn.advance();

    // Both served, and the connection closes when the count runs out.
    assert_eq!(served.load(Ordering::SeqCst), 2);
    assert_eq!(conn.keep_alive, 0);
    conn.take_output();
    assert!(conn.is_finished());
}
