// Copyright (c) 2026 The auberge developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Ordered route tables with leading-segment group skipping.
//!
//! Routes whose patterns share the same leading URL segment form a
//! contiguous group; each entry records the index of the first route past
//! its group, so a lookup that fails on the segment hops over the whole
//! group in one step instead of testing every member.

use std::sync::Arc;

use pipeline::Handler;

/// One entry in a host's route table.
#[derive(Clone)]
pub struct Route {
    name: String,
    pattern: String,
    compiled: Vec<Segment>,
    /// Leading literal segment of the pattern, empty when the pattern
    /// starts with a variable (or is the catch-all).
    start_segment: String,
    /// Pattern only constrains a prefix of the request path.
    prefix: bool,
    /// Bitmask of acceptable methods.
    methods: u32,
    handler: Arc<Handler>,
    /// Opaque handler parameter (a directory, an upstream, ...).
    target: String,
    /// Index of the first route whose `start_segment` differs, or one past
    /// the end of the table.
    next_group: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

impl Route {
    /// Builds a route accepting every method.
    ///
    /// Pattern grammar: `/literal/{variable}/...`. A trailing slash makes
    /// the pattern a prefix match; the empty pattern matches everything and
    /// marks the host's terminal default route.
    pub fn new<H>(name: &str, pattern: &str, handler: H) -> Route
    where
        H: Handler + 'static,
    {
        Route::with_handler(name, pattern, Arc::new(handler))
    }

    pub fn with_handler(name: &str, pattern: &str, handler: Arc<Handler>) -> Route {
        let compiled = compile(pattern);
        let start_segment = match compiled.first() {
            Some(&Segment::Literal(ref lit)) => lit.clone(),
            _ => String::new(),
        };
        Route {
            name: name.to_owned(),
            pattern: pattern.to_owned(),
            compiled: compiled,
            start_segment: start_segment,
            prefix: pattern.len() > 1 && pattern.ends_with('/'),
            methods: !0,
            handler: handler,
            target: String::new(),
            next_group: 0,
        }
    }

    /// Restricts the route to the given method mask.
    pub fn with_methods(mut self, methods: u32) -> Route {
        self.methods = methods;
        self
    }

    pub fn with_target(mut self, target: &str) -> Route {
        self.target = target.to_owned();
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[inline]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[inline]
    pub fn start_segment(&self) -> &str {
        &self.start_segment
    }

    #[inline]
    pub fn next_group(&self) -> usize {
        self.next_group
    }

    pub fn handler(&self) -> Arc<Handler> {
        self.handler.clone()
    }

    /// Whether this route accepts the request.
    pub fn matches(&self, method_flags: u32, path: &str) -> bool {
        if self.methods & method_flags == 0 {
            return false;
        }
        if self.pattern.is_empty() {
            return true;
        }

        let mut segments = path.split('/').filter(|s| !s.is_empty());
        for compiled in &self.compiled {
            let segment = match segments.next() {
                Some(segment) => segment,
                None => return false,
            };
            match *compiled {
                Segment::Literal(ref lit) => {
                    if lit != segment {
                        return false;
                    }
                }
                Segment::Variable(_) => (),
            }
        }
        self.prefix || segments.next().is_none()
    }
}

fn compile(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|seg| {
            if seg.starts_with('{') && seg.ends_with('}') {
                Segment::Variable(seg[1..seg.len() - 1].to_owned())
            } else {
                Segment::Literal(seg.to_owned())
            }
        })
        .collect()
}

/// Inserts a route, keeping the terminal default route last and every
/// `next_group` link pointing at the first index with a different leading
/// segment.
///
/// Non-default routes land just before the default entry (or at the end when
/// there is none); the contiguous run of same-segment predecessors is then
/// extended over the newcomer, and the group immediately before that run is
/// re-pointed at it.
pub fn insert_route(routes: &mut Vec<Route>, route: Route) -> usize {
    let idx = if routes
        .last()
        .map(|last| last.pattern.is_empty())
        .unwrap_or(false) && !route.pattern.is_empty()
    {
        routes.len() - 1
    } else {
        routes.len()
    };
    routes.insert(idx, route);

    // Links that pointed at or past the insertion point shifted with it.
    for j in idx + 1..routes.len() {
        if routes[j].next_group >= idx {
            routes[j].next_group += 1;
        }
    }

    let segment = routes[idx].start_segment.clone();
    let mut group_end = idx + 1;
    while group_end < routes.len() && routes[group_end].start_segment == segment {
        group_end += 1;
    }
    routes[idx].next_group = group_end;

    // Same-segment predecessors now skip together with the new route.
    let mut first = idx;
    while first > 0 && routes[first - 1].start_segment == segment {
        first -= 1;
        routes[first].next_group = group_end;
    }
    // The differing group just before ends at the new route.
    if first > 0 {
        let prev_segment = routes[first - 1].start_segment.clone();
        let mut q = first;
        while q > 0 && routes[q - 1].start_segment == prev_segment {
            q -= 1;
            routes[q].next_group = first;
        }
    }

    idx
}

/// Finds the first route accepting the request, hopping over groups whose
/// leading segment cannot match.
pub fn find_route<'a>(
    routes: &'a [Route],
    method_flags: u32,
    path: &str,
) -> Option<&'a Route> {
    let first = path.split('/').find(|s| !s.is_empty()).unwrap_or("");
    let mut i = 0;
    while i < routes.len() {
        let route = &routes[i];
        if !route.start_segment.is_empty() && route.start_segment != first {
            debug_assert!(route.next_group > i);
            i = route.next_group;
            continue;
        }
        if route.matches(method_flags, path) {
            return Some(route);
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{find_route, insert_route, Route};
    use pipeline::Handler;
    use request::{METHOD_GET, METHOD_POST};

    struct Nop;
    impl Handler for Nop {}

    fn route(name: &str, pattern: &str) -> Route {
        Route::new(name, pattern, Nop)
    }

    // Every entry must point at the first index whose segment differs, or
    // one past the end.
    fn check_links(routes: &[Route]) {
        for (i, r) in routes.iter().enumerate() {
            let mut expected = i + 1;
            while expected < routes.len()
                && routes[expected].start_segment() == r.start_segment()
            {
                expected += 1;
            }
            assert_eq!(r.next_group(), expected, "route {} ({})", i, r.name());
        }
    }

    #[test]
    fn pattern_matching() {
        let r = route("user", "/api/users/{id}");
        assert!(r.matches(METHOD_GET, "/api/users/42"));
        assert!(!r.matches(METHOD_GET, "/api/users"));
        assert!(!r.matches(METHOD_GET, "/api/users/42/extra"));
        assert!(!r.matches(METHOD_GET, "/api/groups/42"));

        let prefix = route("static", "/static/");
        assert!(prefix.matches(METHOD_GET, "/static/css/site.css"));
        assert!(!prefix.matches(METHOD_GET, "/other"));

        let root = route("root", "/");
        assert!(root.matches(METHOD_GET, "/"));
        assert!(!root.matches(METHOD_GET, "/a"));
    }

    #[test]
    fn method_mask() {
        let r = route("upload", "/upload").with_methods(METHOD_POST);
        assert!(r.matches(METHOD_POST, "/upload"));
        assert!(!r.matches(METHOD_GET, "/upload"));
    }

    #[test]
    fn default_route_stays_last() {
        let mut routes = Vec::new();
        insert_route(&mut routes, route("default", ""));
        insert_route(&mut routes, route("a1", "/a/one"));
        insert_route(&mut routes, route("b1", "/b/one"));
        insert_route(&mut routes, route("a2", "/a/two"));

        let names: Vec<&str> = routes.iter().map(|r| r.name()).collect();
        assert_eq!(names, ["a1", "b1", "a2", "default"]);
        check_links(&routes);
    }

    #[test]
    fn group_links_after_each_insert() {
        let mut routes = Vec::new();
        insert_route(&mut routes, route("a1", "/a/one"));
        check_links(&routes);
        insert_route(&mut routes, route("a2", "/a/two"));
        check_links(&routes);
        insert_route(&mut routes, route("b1", "/b/one"));
        check_links(&routes);
        insert_route(&mut routes, route("b2", "/b/two"));
        check_links(&routes);
        insert_route(&mut routes, route("default", ""));
        check_links(&routes);
        insert_route(&mut routes, route("b3", "/b/three"));
        check_links(&routes);
        insert_route(&mut routes, route("c1", "/c/one"));
        check_links(&routes);
    }

    #[test]
    fn lookup_skips_groups() {
        let mut routes = Vec::new();
        insert_route(&mut routes, route("a1", "/a/one"));
        insert_route(&mut routes, route("a2", "/a/two"));
        insert_route(&mut routes, route("b1", "/b/one"));
        insert_route(&mut routes, route("default", ""));

        assert_eq!(find_route(&routes, METHOD_GET, "/b/one").unwrap().name(), "b1");
        assert_eq!(find_route(&routes, METHOD_GET, "/a/two").unwrap().name(), "a2");
        // Nothing literal matches: the catch-all takes it.
        assert_eq!(
            find_route(&routes, METHOD_GET, "/zzz").unwrap().name(),
            "default"
        );
    }

    #[test]
    fn lookup_without_default_can_miss() {
        let mut routes = Vec::new();
        insert_route(&mut routes, route("a1", "/a/one"));
        assert!(find_route(&routes, METHOD_GET, "/b").is_none());
    }
}
