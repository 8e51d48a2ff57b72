// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use std::sync::{Arc, Mutex};

use route::{find_route, insert_route, Route};

/// A virtual host: a named, ordered collection of routes.
///
/// Host names are either literal (`"example.com"`, `"127.0.0.1:8080"`) or
/// wildcards: `"*"` matches every request, `"*.example.com"` matches any
/// `Host` header containing `.example.com`.
pub struct Host {
    name: String,
    /// Protocol used for responses, `"HTTP/1.0"` or `"HTTP/1.1"`.
    protocol: String,
    /// Shared snapshot of the route table; mutation replaces the snapshot,
    /// so in-flight lookups keep the table they started with.
    routes: Mutex<Arc<Vec<Route>>>,
    streaming: Mutex<Vec<StreamingPolicy>>,
    parent: Option<Arc<Host>>,
}

/// Whether request bodies of one MIME type (under one URI prefix) stream to
/// handlers packet by packet or buffer up until the body completes.
#[derive(Debug, Clone)]
struct StreamingPolicy {
    mime: String,
    uri_prefix: String,
    enabled: bool,
}

impl Host {
    pub fn new(name: &str) -> Host {
        Host {
            name: name.to_owned(),
            protocol: "HTTP/1.1".to_owned(),
            routes: Mutex::new(Arc::new(Vec::new())),
            // Form and upload bodies are parsed whole; everything else
            // streams.
            streaming: Mutex::new(vec![
                StreamingPolicy {
                    mime: "application/x-www-form-urlencoded".to_owned(),
                    uri_prefix: String::new(),
                    enabled: false,
                },
                StreamingPolicy {
                    mime: "multipart/form-data".to_owned(),
                    uri_prefix: String::new(),
                    enabled: false,
                },
            ]),
            parent: None,
        }
    }

    /// Builds a host that starts out sharing `parent`'s route table. The
    /// shared snapshot is copied the first time either side mutates, so the
    /// two diverge from there.
    pub fn cloned(parent: &Arc<Host>, name: &str) -> Host {
        Host {
            name: name.to_owned(),
            protocol: parent.protocol.clone(),
            routes: Mutex::new(parent.routes.lock().unwrap().clone()),
            streaming: Mutex::new(parent.streaming.lock().unwrap().clone()),
            parent: Some(parent.clone()),
        }
    }

    pub fn with_protocol(mut self, protocol: &str) -> Host {
        self.protocol = protocol.to_owned();
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[inline]
    pub fn is_http10(&self) -> bool {
        self.protocol == "HTTP/1.0"
    }

    pub fn parent(&self) -> Option<&Arc<Host>> {
        self.parent.as_ref()
    }

    /// True when this host serves requests carrying `header` as their
    /// `Host` value.
    pub fn matches_name(&self, header: &str) -> bool {
        if self.name == "*" {
            return true;
        }
        if self.name.starts_with("*.") {
            let suffix = self.name[1..].to_ascii_lowercase();
            return header.to_ascii_lowercase().contains(&suffix);
        }
        self.name.eq_ignore_ascii_case(header)
    }

    /// Adds a route, preserving the table ordering invariants. Returns the
    /// index it landed at.
    pub fn add_route(&self, route: Route) -> usize {
        let mut guard = self.routes.lock().unwrap();
        let mut table = (**guard).clone();
        let idx = insert_route(&mut table, route);
        *guard = Arc::new(table);
        idx
    }

    /// The terminal catch-all route, when one has been added.
    pub fn default_route(&self) -> Option<Route> {
        let guard = self.routes.lock().unwrap();
        match guard.last() {
            Some(last) if last.pattern().is_empty() => Some(last.clone()),
            _ => None,
        }
    }

    /// Snapshot of the current route table.
    pub fn routes(&self) -> Arc<Vec<Route>> {
        self.routes.lock().unwrap().clone()
    }

    /// Finds the first route accepting the request.
    pub fn match_route(&self, method_flags: u32, path: &str) -> Option<Route> {
        let routes = self.routes();
        find_route(&routes, method_flags, path).cloned()
    }

    /// Records whether bodies of `mime` (optionally only under
    /// `uri_prefix`) stream to handlers or buffer whole.
    pub fn set_streaming(&self, mime: &str, uri_prefix: &str, enabled: bool) {
        let mut guard = self.streaming.lock().unwrap();
        guard.push(StreamingPolicy {
            mime: mime.to_owned(),
            uri_prefix: uri_prefix.to_owned(),
            enabled: enabled,
        });
    }

    /// Looks up the streaming decision for a request. Parameters after a
    /// `;` in the received content type are ignored.
    pub fn streaming_for(&self, content_type: Option<&str>, uri: &str) -> bool {
        let mime = content_type
            .unwrap_or("")
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        let guard = self.streaming.lock().unwrap();
        // Later entries override earlier ones.
        for policy in guard.iter().rev() {
            if mime.starts_with(&policy.mime) && uri.starts_with(&policy.uri_prefix) {
                return policy.enabled;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Host;
    use pipeline::Handler;
    use request::METHOD_GET;
    use route::Route;

    struct Nop;
    impl Handler for Nop {}

    #[test]
    fn name_matching() {
        let host = Host::new("Example.COM");
        assert!(host.matches_name("example.com"));
        assert!(!host.matches_name("other.com"));

        let wild = Host::new("*");
        assert!(wild.matches_name("anything"));

        let suffix = Host::new("*.example.com");
        assert!(suffix.matches_name("svc.example.com"));
        assert!(suffix.matches_name("a.b.EXAMPLE.com"));
        assert!(!suffix.matches_name("example.org"));
    }

    #[test]
    fn streaming_policy() {
        let host = Host::new("x");
        assert!(host.streaming_for(Some("application/octet-stream"), "/up"));
        assert!(!host.streaming_for(
            Some("application/x-www-form-urlencoded"),
            "/form"
        ));
        // Parameters are stripped before comparing.
        assert!(!host.streaming_for(
            Some("multipart/form-data; boundary=xyz"),
            "/up"
        ));

        host.set_streaming("application/json", "/bulk", false);
        assert!(!host.streaming_for(Some("application/json"), "/bulk/load"));
        assert!(host.streaming_for(Some("application/json"), "/api"));
    }

    #[test]
    fn routes_copy_on_write() {
        let parent = Arc::new(Host::new("parent"));
        parent.add_route(Route::new("a", "/a", Nop));

        let child = Host::cloned(&parent, "child");
        assert!(child.match_route(METHOD_GET, "/a").is_some());

        child.add_route(Route::new("b", "/b", Nop));
        assert!(child.match_route(METHOD_GET, "/b").is_some());
        // The parent's table is untouched by the child's mutation.
        assert!(parent.match_route(METHOD_GET, "/b").is_none());
        assert_eq!(parent.routes().len(), 1);
    }

    #[test]
    fn default_route() {
        let host = Host::new("x");
        assert!(host.default_route().is_none());
        host.add_route(Route::new("default", "", Nop));
        host.add_route(Route::new("a", "/a", Nop));
        assert_eq!(host.default_route().unwrap().name(), "default");
        assert!(host.match_route(METHOD_GET, "/nothing").is_some());
    }
}
