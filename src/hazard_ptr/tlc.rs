use std::cell::RefCell;

use super::{domain::Domain, record::Record};

/// Capacity of a thread's Hazard-Record cache (`K` in the design).
const CAPACITY: usize = 8;

/// A per-thread, fixed-capacity stack of available Records for one Domain.
///
/// This is purely a local optimization: correctness never depends on the
/// Tlc, only on the Domain's own free stack and allocation path. Keyed by the
/// Domain's address, because a single thread may interact with more than one
/// Domain (e.g. in tests that construct private Domains).
struct Tlc {
    domain: *const Domain,
    records: [*mut Record; CAPACITY],
    len: usize,
}

impl Tlc {
    fn new(domain: *const Domain) -> Self {
        Self {
            domain,
            records: [std::ptr::null_mut(); CAPACITY],
            len: 0,
        }
    }

    fn pop(&mut self) -> Option<*mut Record> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.records[self.len])
    }

    fn push(&mut self, record: *mut Record) -> Result<(), ()> {
        if self.len == CAPACITY {
            return Err(());
        }
        self.records[self.len] = record;
        self.len += 1;
        Ok(())
    }
}

/// Flushes every entry's Records back to their owning Domain's free stack.
///
/// # Safety
/// Every Domain referenced by a `Tlc` in `entries` must still be alive. This
/// holds for the process-wide default Domain (never dropped) and for any
/// user-constructed Domain, which callers are required to leak (§9 "Global
/// mutable state") precisely so that any thread that ever touched it can
/// safely flush into it at exit.
unsafe fn flush_all(entries: &mut Vec<Tlc>) {
    for tlc in entries.iter_mut() {
        let domain = unsafe { &*tlc.domain };
        while let Some(record) = tlc.pop() {
            domain.push_avail(record);
        }
    }
}

/// Holds every Domain-cache this thread has touched. On thread exit, Rust
/// runs this type's `Drop` impl as the destructor for the `thread_local!`
/// below - this is the "thread-exit hook" the design calls for, implemented
/// with a native language feature instead of a registered platform callback.
struct Caches(RefCell<Vec<Tlc>>);

impl Drop for Caches {
    fn drop(&mut self) {
        let mut entries = self.0.borrow_mut();
        // Safety: see `flush_all`.
        unsafe { flush_all(&mut entries) };
    }
}

thread_local! {
    static CACHES: Caches = Caches(RefCell::new(Vec::new()));
}

fn find_or_insert(caches: &mut Vec<Tlc>, domain: *const Domain) -> usize {
    match caches.iter().position(|c| c.domain == domain) {
        Some(idx) => idx,
        None => {
            caches.push(Tlc::new(domain));
            caches.len() - 1
        }
    }
}

/// Attempts to pop a cached Record for `domain` from this thread's cache.
pub(crate) fn acquire(domain: &Domain) -> Option<*mut Record> {
    let key = domain as *const Domain;
    CACHES.with(|caches| {
        let mut caches = caches.0.borrow_mut();
        let idx = find_or_insert(&mut caches, key);
        caches[idx].pop()
    })
}

/// Attempts to push `record` into this thread's cache for `domain`. Returns
/// `Err(record)` on overflow, handing the Record back to the caller so it can
/// fall through to the Domain's free stack.
pub(crate) fn release(domain: &Domain, record: *mut Record) -> Result<(), *mut Record> {
    let key = domain as *const Domain;
    CACHES.with(|caches| {
        let mut caches = caches.0.borrow_mut();
        let idx = find_or_insert(&mut caches, key);
        caches[idx].push(record).map_err(|_| record)
    })
}

/// Flushes every Record currently cached for `domain` on this thread back
/// onto the Domain's free stack. Exposed for tests that need a deterministic
/// Domain state without waiting for thread exit.
pub(crate) fn flush(domain: &Domain) {
    let key = domain as *const Domain;
    CACHES.with(|caches| {
        let mut caches = caches.0.borrow_mut();
        if let Some(idx) = caches.iter().position(|c| c.domain == key) {
            let tlc = &mut caches[idx];
            while let Some(record) = tlc.pop() {
                domain.push_avail(record);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_empty_is_none() {
        let domain = Domain::new();
        assert!(acquire(&domain).is_none());
    }

    #[test]
    fn push_then_pop_roundtrips() {
        let domain = Domain::new();
        let record = Box::into_raw(Record::boxed_empty(&domain as *const Domain));

        assert!(release(&domain, record).is_ok());
        assert_eq!(Some(record), acquire(&domain));

        drop(unsafe { Box::from_raw(record) });
    }

    #[test]
    fn overflow_falls_through() {
        let domain = Domain::new();
        let records: Vec<_> = (0..CAPACITY)
            .map(|_| Box::into_raw(Record::boxed_empty(&domain as *const Domain)))
            .collect();
        for r in &records {
            assert!(release(&domain, *r).is_ok());
        }

        let overflow = Box::into_raw(Record::boxed_empty(&domain as *const Domain));
        assert_eq!(Err(overflow), release(&domain, overflow));

        flush(&domain);
        for r in records {
            drop(unsafe { Box::from_raw(r) });
        }
        drop(unsafe { Box::from_raw(overflow) });
    }
}
