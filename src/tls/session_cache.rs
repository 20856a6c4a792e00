//! TLS session-ticket LRU cache (spec §4.F).
//!
//! Uses an intrusive LRU built on `slab::Slab` plus explicit head/tail
//! indices instead of a pointer-linked list — the same "arena + indices"
//! trick the original `holytls` `src/holytls/tls/session_cache.cc` uses to
//! avoid per-entry heap churn, and the same shape this crate reuses for the
//! Alt-Svc cache (spec §4.F/§4.K). `parking_lot::Mutex` guards the whole
//! structure since a session cache is shared across every reactor shard.

use std::collections::HashMap;

use parking_lot::Mutex;
use slab::Slab;

/// An opaque, resumable TLS session ticket.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    pub data: Vec<u8>,
    pub supports_early_data: bool,
}

struct Entry {
    key: String,
    ticket: SessionTicket,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Inner {
    slab: Slab<Entry>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
}

impl Inner {
    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let e = &self.slab[idx];
            (e.prev, e.next)
        };
        match prev {
            Some(p) => self.slab[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slab[n].prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let e = &mut self.slab[idx];
            e.prev = None;
            e.next = old_head;
        }
        if let Some(h) = old_head {
            self.slab[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }

    fn evict_tail(&mut self) {
        if let Some(tail) = self.tail {
            self.detach(tail);
            let entry = self.slab.remove(tail);
            self.index.remove(&entry.key);
        }
    }
}

/// A key-addressed, capacity-bounded LRU cache of TLS session tickets,
/// keyed by `origin` (e.g. `"example.com:443"`).
pub struct SessionCache {
    inner: Mutex<Inner>,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slab: Slab::with_capacity(capacity),
                index: HashMap::with_capacity(capacity),
                head: None,
                tail: None,
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn store(&self, origin: &str, ticket: SessionTicket) {
        let mut inner = self.inner.lock();
        if let Some(&idx) = inner.index.get(origin) {
            inner.slab[idx].ticket = ticket;
            inner.touch(idx);
            return;
        }
        if inner.index.len() >= inner.capacity {
            inner.evict_tail();
        }
        let idx = inner.slab.insert(Entry { key: origin.to_string(), ticket, prev: None, next: None });
        inner.index.insert(origin.to_string(), idx);
        inner.push_front(idx);
    }

    pub fn lookup(&self, origin: &str) -> Option<SessionTicket> {
        let mut inner = self.inner.lock();
        let idx = *inner.index.get(origin)?;
        inner.touch(idx);
        Some(inner.slab[idx].ticket.clone())
    }

    pub fn remove(&self, origin: &str) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.index.remove(origin) {
            inner.detach(idx);
            inner.slab.remove(idx);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(tag: u8) -> SessionTicket {
        SessionTicket { data: vec![tag; 4], supports_early_data: false }
    }

    #[test]
    fn store_then_lookup_round_trips() {
        let cache = SessionCache::new(4);
        cache.store("a.example:443", ticket(1));
        let found = cache.lookup("a.example:443").expect("present");
        assert_eq!(found.data, vec![1, 1, 1, 1]);
    }

    #[test]
    fn lookup_miss_returns_none() {
        let cache = SessionCache::new(4);
        assert!(cache.lookup("missing.example:443").is_none());
    }

    #[test]
    fn capacity_overflow_evicts_least_recently_used() {
        let cache = SessionCache::new(2);
        cache.store("a:443", ticket(1));
        cache.store("b:443", ticket(2));
        cache.store("c:443", ticket(3));
        assert!(cache.lookup("a:443").is_none());
        assert!(cache.lookup("b:443").is_some());
        assert!(cache.lookup("c:443").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn lookup_refreshes_recency() {
        let cache = SessionCache::new(2);
        cache.store("a:443", ticket(1));
        cache.store("b:443", ticket(2));
        cache.lookup("a:443");
        cache.store("c:443", ticket(3));
        assert!(cache.lookup("b:443").is_none());
        assert!(cache.lookup("a:443").is_some());
    }

    #[test]
    fn remove_clears_entry() {
        let cache = SessionCache::new(4);
        cache.store("a:443", ticket(1));
        cache.remove("a:443");
        assert!(cache.lookup("a:443").is_none());
        assert!(cache.is_empty());
    }
}
