//! This contains the unbounded, fetch-and-add based MPMC Queue proposed in
//! [the Paper](https://arxiv.org/pdf/2201.02179.pdf), reclaiming retired
//! Nodes through [`crate::hazard_ptr`].
//!
//! # Example
//! ```rust
//! # use faaqueue::queues::mpmc::unbounded::Queue;
//! let queue = Queue::create(1).unwrap();
//!
//! queue.enqueue(13, 0).unwrap();
//! assert_eq!(Ok(13), queue.dequeue(0));
//!
//! queue.destroy();
//! ```

use crossbeam_utils::CachePadded;

use crate::{
    hazard_ptr::{self, Holder},
    queues::{CreateError, DequeueError, EnqueueError},
    sync::atomic,
};

mod node;
use node::{Node, BUFFER_SIZE};

/// An unbounded, Multi-Producer-Multi-Consumer FIFO Queue.
///
/// Every operation takes a caller-supplied thread id `tid`, used to index
/// into this Queue's fixed-size table of Hazard-Pointer [`Holder`]s. Using
/// the same `tid` from two threads at the same time is a logic error (see
/// [`Queue::enqueue`]/[`Queue::dequeue`]).
pub struct Queue<T> {
    head: CachePadded<atomic::AtomicPtr<Node<T>>>,
    tail: CachePadded<atomic::AtomicPtr<Node<T>>>,
    holders: Box<[Holder<'static>]>,
    taken_sentinel: *mut T,
}

// Safety:
// Every `*mut` field is either reached only through its owning Node's
// atomics (which are themselves Send+Sync) or, for `taken_sentinel`, never
// dereferenced at all - it exists purely as a unique address to distinguish
// "already consumed" from "not yet published" in a slot exchange.
unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Queue<{}>", std::any::type_name::<T>())
    }
}

impl<T> Queue<T> {
    /// Creates a new, empty Queue with a Hazard-Pointer Holder pre-acquired
    /// for each of `max_threads` thread ids (`0..max_threads`).
    pub fn create(max_threads: usize) -> Result<Self, CreateError> {
        if max_threads == 0 {
            return Err(CreateError::ZeroThreads);
        }

        let sentinel_node = Node::create(None);

        let holders = (0..max_threads)
            .map(|_| Holder::new(hazard_ptr::global()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let taken_sentinel = Box::into_raw(Box::new(0u8)) as *mut T;

        Ok(Self {
            head: CachePadded::new(atomic::AtomicPtr::new(sentinel_node)),
            tail: CachePadded::new(atomic::AtomicPtr::new(sentinel_node)),
            holders,
            taken_sentinel,
        })
    }

    /// Tears down the Queue, assuming quiescence - no other thread may be
    /// concurrently calling [`Queue::enqueue`] or [`Queue::dequeue`] on this
    /// Queue, nor holding a previously returned item in a way that still
    /// depends on the Queue's internal state.
    ///
    /// Drains every remaining item (dropping it), reclaims the final Node
    /// directly instead of through the Hazard-Pointer Domain (no concurrent
    /// reader can exist at this point by the quiescence assumption), and
    /// forces a reclamation pass on the default Domain.
    pub fn destroy(self) {
        while self.dequeue(0).is_ok() {}

        let Self {
            head,
            holders,
            taken_sentinel,
            ..
        } = self;

        let last = head.load(atomic::Ordering::Acquire);
        drop(unsafe { Box::from_raw(last) });
        drop(holders);
        drop(unsafe { Box::from_raw(taken_sentinel as *mut u8) });

        hazard_ptr::global().cleanup();
    }

    fn holder(&self, tid: usize) -> Option<&Holder<'static>> {
        self.holders.get(tid)
    }

    /// Enqueues `item` on behalf of thread id `tid`.
    ///
    /// # Errors
    /// Returns [`EnqueueError::ThreadIdOutOfRange`] if `tid` is not less than
    /// the `max_threads` this Queue was created with. In debug builds this is
    /// additionally asserted, since calling with an out-of-range `tid` (or
    /// the same in-range `tid` from two threads at once) is always a logic
    /// error in the caller.
    pub fn enqueue(&self, item: T, tid: usize) -> Result<(), EnqueueError> {
        let holder = match self.holder(tid) {
            Some(holder) => holder,
            None => {
                debug_assert!(
                    false,
                    "thread id {} is out of range for a Queue with {} Holders",
                    tid,
                    self.holders.len()
                );
                return Err(EnqueueError::ThreadIdOutOfRange);
            }
        };

        let new_item = Box::into_raw(Box::new(item));

        loop {
            let ltail_ptr = holder.protect(&self.tail);
            let ltail = unsafe { &*ltail_ptr };

            let idx = ltail.enq_idx.fetch_add(1, atomic::Ordering::Relaxed);

            if idx < BUFFER_SIZE {
                let published = ltail.items[idx]
                    .compare_exchange(
                        std::ptr::null_mut(),
                        new_item,
                        atomic::Ordering::Release,
                        atomic::Ordering::Relaxed,
                    )
                    .is_ok();
                holder.reset(std::ptr::null_mut::<Node<T>>());
                if published {
                    return Ok(());
                }
                continue;
            }

            // Slow path: this Node's slots are exhausted.
            if !std::ptr::eq(self.tail.load(atomic::Ordering::Acquire), ltail_ptr) {
                holder.reset(std::ptr::null_mut::<Node<T>>());
                continue;
            }

            let next = ltail.next.load(atomic::Ordering::Acquire);
            if next.is_null() {
                let new_node = Node::create(Some(new_item));
                match ltail.next.compare_exchange(
                    std::ptr::null_mut(),
                    new_node,
                    atomic::Ordering::Release,
                    atomic::Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let _ = self.tail.compare_exchange_weak(
                            ltail_ptr,
                            new_node,
                            atomic::Ordering::Release,
                            atomic::Ordering::Relaxed,
                        );
                        holder.reset(std::ptr::null_mut::<Node<T>>());
                        return Ok(());
                    }
                    Err(_) => {
                        // Someone else linked a Node first; ours never
                        // became reachable, so freeing it does not touch
                        // `new_item` (slot 0 holds the pointer, not the
                        // value, and `AtomicPtr` does not drop its target).
                        drop(unsafe { Box::from_raw(new_node) });
                        holder.reset(std::ptr::null_mut::<Node<T>>());
                        continue;
                    }
                }
            } else {
                let _ = self.tail.compare_exchange_weak(
                    ltail_ptr,
                    next,
                    atomic::Ordering::Release,
                    atomic::Ordering::Relaxed,
                );
                holder.reset(std::ptr::null_mut::<Node<T>>());
                continue;
            }
        }
    }

    /// Dequeues the oldest available item on behalf of thread id `tid`.
    ///
    /// # Errors
    /// Returns [`DequeueError::Empty`] if the Queue had nothing to dequeue at
    /// the time of the call, or [`DequeueError::ThreadIdOutOfRange`] for the
    /// same reason as [`Queue::enqueue`].
    pub fn dequeue(&self, tid: usize) -> Result<T, DequeueError> {
        let holder = match self.holder(tid) {
            Some(holder) => holder,
            None => {
                debug_assert!(
                    false,
                    "thread id {} is out of range for a Queue with {} Holders",
                    tid,
                    self.holders.len()
                );
                return Err(DequeueError::ThreadIdOutOfRange);
            }
        };

        loop {
            let lhead_ptr = holder.protect(&self.head);
            let lhead = unsafe { &*lhead_ptr };

            let deq = lhead.deq_idx.load(atomic::Ordering::Acquire);
            let enq = lhead.enq_idx.load(atomic::Ordering::Acquire);
            let next = lhead.next.load(atomic::Ordering::Acquire);

            if deq >= enq && next.is_null() {
                holder.reset(std::ptr::null_mut::<Node<T>>());
                return Err(DequeueError::Empty);
            }

            let idx = lhead.deq_idx.fetch_add(1, atomic::Ordering::Relaxed);

            if idx >= BUFFER_SIZE {
                let next = lhead.next.load(atomic::Ordering::Acquire);
                if next.is_null() {
                    holder.reset(std::ptr::null_mut::<Node<T>>());
                    return Err(DequeueError::Empty);
                }

                let advanced = self
                    .head
                    .compare_exchange(
                        lhead_ptr,
                        next,
                        atomic::Ordering::Release,
                        atomic::Ordering::Relaxed,
                    )
                    .is_ok();
                holder.reset(std::ptr::null_mut::<Node<T>>());
                if advanced {
                    unsafe {
                        hazard_ptr::global().retire(
                            lhead_ptr as *mut hazard_ptr::descriptor::Retired,
                            Node::<T>::reclaim,
                        )
                    };
                }
                continue;
            }

            let taken = lhead.items[idx].swap(self.taken_sentinel, atomic::Ordering::Acquire);
            holder.reset(std::ptr::null_mut::<Node<T>>());

            if taken.is_null() {
                // A consumer's `deq_idx` FAA raced ahead of the matching
                // producer's publish. Back off and retry rather than
                // spinning hot on the same slot.
                std::thread::yield_now();
                continue;
            }

            return Ok(*unsafe { Box::from_raw(taken) });
        }
    }
}
