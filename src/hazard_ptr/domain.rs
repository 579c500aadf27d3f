use std::{cell::UnsafeCell, collections::HashSet};

use crate::sync::atomic;

use super::{descriptor::Retired, record::Record, tlc};

/// Number of independent Retired-Object stacks a Domain shards its retirement
/// traffic across (`S` in the design). Reduces contention between threads
/// retiring unrelated objects at the same time.
const SHARD_COUNT: usize = 8;
/// Floor for the dynamic reclamation threshold (`T_base`).
const T_BASE: usize = 1000;
/// Multiplier applied to the live Record count for the dynamic threshold (`M`).
const THRESHOLD_MULTIPLIER: usize = 2;

/// One of a Domain's independent Retired-Object stacks. A plain Treiber
/// stack: push via CAS, pop-all via a single exchange.
struct Shard {
    head: atomic::AtomicPtr<Retired>,
}

impl Shard {
    const fn new() -> Self {
        Self {
            head: atomic::AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    /// Pushes a single, already-linked object onto the stack.
    fn push(&self, obj: *mut Retired) {
        loop {
            let head = self.head.load(atomic::Ordering::Relaxed);
            unsafe { (*obj).next.store(head, atomic::Ordering::Relaxed) };
            if self
                .head
                .compare_exchange_weak(
                    head,
                    obj,
                    atomic::Ordering::Release,
                    atomic::Ordering::Relaxed,
                )
                .is_ok()
            {
                return;
            }
        }
    }

    /// Pushes an already-linked batch (`head ..= tail`, `tail.next == null`)
    /// onto the stack in a single CAS.
    fn push_batch(&self, head: *mut Retired, tail: *mut Retired) {
        loop {
            let cur = self.head.load(atomic::Ordering::Relaxed);
            unsafe { (*tail).next.store(cur, atomic::Ordering::Relaxed) };
            if self
                .head
                .compare_exchange_weak(
                    cur,
                    head,
                    atomic::Ordering::Release,
                    atomic::Ordering::Relaxed,
                )
                .is_ok()
            {
                return;
            }
        }
    }

    /// Atomically detaches the entire stack, returning its former head.
    fn take_all(&self) -> *mut Retired {
        self.head
            .swap(std::ptr::null_mut(), atomic::Ordering::Acquire)
    }

    fn is_empty(&self) -> bool {
        self.head.load(atomic::Ordering::Relaxed).is_null()
    }
}

/// A Hazard-Pointer reclamation Domain.
///
/// A Domain owns the process-wide (or, for a privately constructed Domain,
/// subsystem-wide) bookkeeping needed to safely reclaim objects that are
/// concurrently read through [`Holder`](super::Holder)s: the list of every
/// Hazard-Record ever allocated, a free stack of unused Records, `S` sharded
/// stacks of objects awaiting reclamation, and the mutual-exclusion flag that
/// keeps reclamation passes from running concurrently with each other.
///
/// Domains are meant to be long-lived. The default, process-wide Domain
/// (obtained through the free functions re-exported at the crate root of
/// this module) is never dropped. A privately constructed Domain must be
/// leaked (e.g. via `Box::leak`) before any thread acquires a Holder against
/// it, because a thread's cache flushes into the Domain it was built against
/// when that thread exits.
pub struct Domain {
    all_records: atomic::AtomicPtr<Record>,
    avail_records: atomic::AtomicPtr<Record>,
    record_count: atomic::AtomicUsize,
    shards: [Shard; SHARD_COUNT],
    retired_count: atomic::AtomicIsize,
    reclaiming: atomic::AtomicBool,
    scan_set: UnsafeCell<Option<HashSet<usize>>>,
}

// Safety:
// `scan_set` is the only field without its own internal synchronization, and
// it is only ever touched from inside `do_reclamation` while `reclaiming` is
// held, which gives the active reclaimer exclusive access to it.
unsafe impl Sync for Domain {}

impl Domain {
    /// Creates a new, empty Domain with no Records and nothing retired.
    pub const fn new() -> Self {
        Self {
            all_records: atomic::AtomicPtr::new(std::ptr::null_mut()),
            avail_records: atomic::AtomicPtr::new(std::ptr::null_mut()),
            record_count: atomic::AtomicUsize::new(0),
            shards: [
                Shard::new(),
                Shard::new(),
                Shard::new(),
                Shard::new(),
                Shard::new(),
                Shard::new(),
                Shard::new(),
                Shard::new(),
            ],
            retired_count: atomic::AtomicIsize::new(0),
            reclaiming: atomic::AtomicBool::new(false),
            scan_set: UnsafeCell::new(None),
        }
    }

    fn threshold(&self) -> usize {
        let records = self.record_count.load(atomic::Ordering::Relaxed);
        T_BASE.max(records * THRESHOLD_MULTIPLIER)
    }

    /// Prepends a newly allocated Record onto the append-only list of every
    /// Record this Domain has ever handed out.
    fn publish_record(&self, record: *mut Record) {
        loop {
            let head = self.all_records.load(atomic::Ordering::Relaxed);
            unsafe { (*record).all_next.store(head, atomic::Ordering::Relaxed) };
            if self
                .all_records
                .compare_exchange_weak(
                    head,
                    record,
                    atomic::Ordering::Release,
                    atomic::Ordering::Relaxed,
                )
                .is_ok()
            {
                return;
            }
        }
    }

    /// Pops a Record off the Domain-wide free stack, if any is available.
    fn pop_avail(&self) -> Option<*mut Record> {
        loop {
            let head = self.avail_records.load(atomic::Ordering::Acquire);
            if head.is_null() {
                return None;
            }
            let next = unsafe { (*head).avail_next.load(atomic::Ordering::Relaxed) };
            if self
                .avail_records
                .compare_exchange_weak(
                    head,
                    next,
                    atomic::Ordering::Acquire,
                    atomic::Ordering::Relaxed,
                )
                .is_ok()
            {
                return Some(head);
            }
        }
    }

    /// Pushes a single Record back onto the Domain-wide free stack. Used both
    /// by [`Holder`](super::Holder)'s release path and by a thread's Tlc
    /// flushing at exit.
    pub(crate) fn push_avail(&self, record: *mut Record) {
        debug_assert!(
            unsafe { (*record).domain } == self as *const Domain,
            "record returned to a Domain other than the one that allocated it"
        );
        unsafe { (*record).reset() };
        loop {
            let head = self.avail_records.load(atomic::Ordering::Relaxed);
            unsafe { (*record).avail_next.store(head, atomic::Ordering::Relaxed) };
            if self
                .avail_records
                .compare_exchange_weak(
                    head,
                    record,
                    atomic::Ordering::Release,
                    atomic::Ordering::Relaxed,
                )
                .is_ok()
            {
                return;
            }
        }
    }

    /// Obtains one Record for exclusive use: from this thread's cache if
    /// possible, else the Domain's free stack, else a freshly allocated one.
    pub(crate) fn acquire_record(&self) -> *const Record {
        if let Some(record) = tlc::acquire(self) {
            return record;
        }
        if let Some(record) = self.pop_avail() {
            return record;
        }

        let record = Box::into_raw(Record::boxed_empty(self as *const Domain));
        self.record_count.fetch_add(1, atomic::Ordering::Relaxed);
        self.publish_record(record);
        record
    }

    /// Returns a Record to this Domain: to this thread's cache if it has
    /// room, else the Domain's free stack.
    pub(crate) fn release_record(&self, record: *const Record) {
        let record = record as *mut Record;
        unsafe { (*record).reset() };
        if let Err(record) = tlc::release(self, record) {
            self.push_avail(record);
        }
    }

    /// Hands `obj` over to the Domain for deferred reclamation.
    ///
    /// # Safety
    /// `obj` must point at a live object embedding a `Retired` header at
    /// offset 0, and the caller must have exclusive, unshared access to it
    /// (i.e. it has just been logically unlinked from whatever structure it
    /// was part of). `reclaim` must be a function that correctly deallocates
    /// the concrete type `obj` actually points at.
    pub unsafe fn retire(&self, obj: *mut Retired, reclaim: unsafe fn(*mut Retired)) {
        unsafe { (*obj).set_reclaim(reclaim) };

        // The retirer-side half of the asymmetric fence pair (§4.1/§4.3):
        // orders the unlink this object's removal depended on before the
        // push below becomes visible to a reclaimer's scan.
        atomic::fence(atomic::Ordering::SeqCst);

        let shard = shard_index(obj as usize);
        self.shards[shard].push(obj);

        self.retired_count.fetch_add(1, atomic::Ordering::AcqRel);

        let claimed = self.check_threshold();
        if claimed > 0 {
            self.do_reclamation(claimed);
        }
    }

    /// CASes `retired_count` to zero if it has reached the dynamic
    /// threshold, returning the claimed count (zero if nothing was claimed).
    fn check_threshold(&self) -> isize {
        let threshold = self.threshold() as isize;
        let observed = self.retired_count.load(atomic::Ordering::Acquire);
        if observed < threshold {
            return 0;
        }
        match self.retired_count.compare_exchange(
            observed,
            0,
            atomic::Ordering::AcqRel,
            atomic::Ordering::Relaxed,
        ) {
            Ok(claimed) => claimed,
            Err(_) => 0,
        }
    }

    /// Runs (at most) one reclamation pass, scanning every live Hazard
    /// Record and freeing whatever retired objects none of them protect.
    fn do_reclamation(&self, claimed_count: isize) {
        if self
            .reclaiming
            .compare_exchange(
                false,
                true,
                atomic::Ordering::Acquire,
                atomic::Ordering::Relaxed,
            )
            .is_err()
        {
            // Someone else is already reclaiming; hand our claim back so it
            // isn't lost.
            self.retired_count
                .fetch_add(claimed_count, atomic::Ordering::AcqRel);
            return;
        }

        unsafe {
            let scan_set = &mut *self.scan_set.get();
            if scan_set.is_none() {
                *scan_set = Some(HashSet::new());
            }
        }

        let mut claimed = claimed_count;
        loop {
            let batches: Vec<*mut Retired> = self.shards.iter().map(Shard::take_all).collect();
            let any_extracted = batches.iter().any(|b| !b.is_null());

            let mut r = claimed;
            if any_extracted {
                atomic::fence(atomic::Ordering::SeqCst);

                let scan_set = unsafe { (&mut *self.scan_set.get()).as_mut().unwrap() };
                scan_set.clear();
                let mut rec_ptr = self.all_records.load(atomic::Ordering::Acquire);
                while !rec_ptr.is_null() {
                    let rec = unsafe { &*rec_ptr };
                    let protected = rec.ptr.load(atomic::Ordering::Acquire);
                    if !protected.is_null() {
                        scan_set.insert(protected as usize);
                    }
                    rec_ptr = rec.all_next.load(atomic::Ordering::Acquire);
                }

                let mut survivor_head: *mut Retired = std::ptr::null_mut();
                let mut survivor_tail: *mut Retired = std::ptr::null_mut();

                for batch in batches {
                    let mut cur = batch;
                    while !cur.is_null() {
                        let next = unsafe { (*cur).next.load(atomic::Ordering::Relaxed) };

                        if scan_set.contains(&(cur as usize)) {
                            unsafe { (*cur).next.store(survivor_head, atomic::Ordering::Relaxed) };
                            survivor_head = cur;
                            if survivor_tail.is_null() {
                                survivor_tail = cur;
                            }
                        } else {
                            unsafe { Retired::reclaim(cur) };
                            r -= 1;
                        }

                        cur = next;
                    }
                }

                if !survivor_head.is_null() {
                    self.shards[0].push_batch(survivor_head, survivor_tail);
                }
            }

            self.retired_count.fetch_add(r, atomic::Ordering::AcqRel);

            let next_claimed = self.check_threshold();
            let shards_empty = self.shards.iter().all(Shard::is_empty);
            if next_claimed == 0 && shards_empty {
                break;
            }
            claimed = next_claimed;
        }

        self.reclaiming.store(false, atomic::Ordering::Release);
    }

    /// Forces a reclamation sweep regardless of the dynamic threshold. Used
    /// at shutdown and by tests that want every retired object flushed.
    ///
    /// Tolerates a reclaimer that is already running: in that case this call
    /// degenerates into handing its claim to that reclaimer, matching
    /// `do_reclamation`'s own handling of a lost test-and-set.
    pub fn cleanup(&self) {
        let claimed = self.retired_count.swap(0, atomic::Ordering::AcqRel);
        self.do_reclamation(claimed);
    }

    /// Flushes this thread's cached Records for this Domain back onto its
    /// free stack. Normal shutdown relies on the native `thread_local!`
    /// destructor instead (§9 "Thread-local storage and thread-exit hooks"),
    /// but a long-running worker that knows it is about to exit (without the
    /// process exiting) can call this to make its cached Records available
    /// to other threads immediately rather than waiting on its own exit.
    pub fn flush_current_thread(&self) {
        tlc::flush(self);
    }

    #[cfg(test)]
    pub(crate) fn retired_count(&self) -> isize {
        self.retired_count.load(atomic::Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn record_count(&self) -> usize {
        self.record_count.load(atomic::Ordering::SeqCst)
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

fn shard_index(addr: usize) -> usize {
    (addr >> 4) % SHARD_COUNT
}

/// The default, process-wide Domain. Never dropped.
pub(crate) static GLOBAL: Domain = Domain::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_monotonic_in_record_count() {
        let domain = Domain::new();
        let first = domain.threshold();
        domain.record_count.fetch_add(10_000, atomic::Ordering::SeqCst);
        let second = domain.threshold();
        assert!(second >= first);
    }

    #[test]
    fn acquire_then_release_reuses_record() {
        let domain = Domain::new();
        let record = domain.acquire_record();
        domain.release_record(record);
        let again = domain.acquire_record();
        assert_eq!(record, again);
        domain.release_record(again);
        tlc::flush(&domain);
    }

    #[test]
    fn retire_without_protection_reclaims_eventually() {
        let domain = Domain::new();

        #[repr(C)]
        struct Payload {
            header: Retired,
            dropped: std::sync::Arc<atomic::AtomicUsize>,
        }
        unsafe fn reclaim_payload(header: *mut Retired) {
            let payload = header as *mut Payload;
            let boxed = unsafe { Box::from_raw(payload) };
            boxed.dropped.fetch_add(1, atomic::Ordering::SeqCst);
        }

        let dropped = std::sync::Arc::new(atomic::AtomicUsize::new(0));
        let boxed = Box::new(Payload {
            header: Retired::new(),
            dropped: dropped.clone(),
        });
        let ptr = Box::into_raw(boxed);

        unsafe { domain.retire(ptr as *mut Retired, reclaim_payload) };
        domain.cleanup();

        assert_eq!(1, dropped.load(atomic::Ordering::SeqCst));
        assert_eq!(0, domain.retired_count());

        tlc::flush(&domain);
    }

    /// Spec §8 scenario E6: retire 5000 objects from one thread with no live
    /// protections; every reclaim callback must fire by the time `cleanup`
    /// returns, and `retired_count` must settle back to zero. Uses a private
    /// Domain (rather than the process-wide default) so the count is exact
    /// and not perturbed by any other test retiring concurrently.
    #[test]
    fn e6_retire_5000_with_no_live_protections_reclaims_all() {
        let domain = Domain::new();

        #[repr(C)]
        struct Payload {
            header: Retired,
            dropped: std::sync::Arc<atomic::AtomicUsize>,
        }
        unsafe fn reclaim_payload(header: *mut Retired) {
            let payload = header as *mut Payload;
            let boxed = unsafe { Box::from_raw(payload) };
            boxed.dropped.fetch_add(1, atomic::Ordering::SeqCst);
        }

        const COUNT: usize = 5000;
        let dropped = std::sync::Arc::new(atomic::AtomicUsize::new(0));

        for _ in 0..COUNT {
            let boxed = Box::new(Payload {
                header: Retired::new(),
                dropped: dropped.clone(),
            });
            let ptr = Box::into_raw(boxed);
            unsafe { domain.retire(ptr as *mut Retired, reclaim_payload) };
        }
        domain.cleanup();

        assert_eq!(COUNT, dropped.load(atomic::Ordering::SeqCst));
        assert_eq!(0, domain.retired_count());

        tlc::flush(&domain);
    }
}
