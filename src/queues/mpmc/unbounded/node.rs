use crossbeam_utils::CachePadded;

use crate::{
    hazard_ptr::descriptor::Retired,
    sync::atomic,
};

/// Number of slots in a single Node (`B` in the design). Chosen so that a
/// long-lived Queue allocates a new Node roughly once per thousand
/// enqueues rather than once per enqueue.
pub(crate) const BUFFER_SIZE: usize = 1024;


#[cfg(test)]
fn note_created() {
    counters::CREATED.fetch_add(1, atomic::Ordering::SeqCst);
}
#[cfg(not(test))]
fn note_created() {}

#[cfg(test)]
fn note_reclaimed() {
    counters::RECLAIMED.fetch_add(1, atomic::Ordering::SeqCst);
}
#[cfg(not(test))]
fn note_reclaimed() {}

/// A single segment of the unbounded Queue's linked list of fixed-size
/// slot arrays.
///
/// `header` must stay the first field: the Hazard-Pointer Domain casts a
/// retired Node back and forth through its `Retired` header without ever
/// looking at the rest of the layout, which only works if the header sits
/// at offset 0.
#[repr(C)]
pub(crate) struct Node<T> {
    pub(crate) header: Retired,
    pub(crate) deq_idx: CachePadded<atomic::AtomicUsize>,
    pub(crate) enq_idx: CachePadded<atomic::AtomicUsize>,
    pub(crate) next: CachePadded<atomic::AtomicPtr<Node<T>>>,
    pub(crate) items: [atomic::AtomicPtr<T>; BUFFER_SIZE],
}

impl<T> Node<T> {
    /// Allocates a new Node. If `initial_item` is given it is stored in slot
    /// `0` and `enq_idx` starts at `1`; otherwise every slot starts empty and
    /// `enq_idx` starts at `0`. Every other slot starts empty and `deq_idx`
    /// always starts at `0`. `next` always starts null.
    pub(crate) fn create(initial_item: Option<*mut T>) -> *mut Self {
        let items: [atomic::AtomicPtr<T>; BUFFER_SIZE] =
            std::array::from_fn(|_| atomic::AtomicPtr::new(std::ptr::null_mut()));

        let enq_start = match initial_item {
            Some(item) => {
                items[0].store(item, atomic::Ordering::Relaxed);
                1
            }
            None => 0,
        };

        let node = Box::new(Self {
            header: Retired::new(),
            deq_idx: CachePadded::new(atomic::AtomicUsize::new(0)),
            enq_idx: CachePadded::new(atomic::AtomicUsize::new(enq_start)),
            next: CachePadded::new(atomic::AtomicPtr::new(std::ptr::null_mut())),
            items,
        });

        note_created();

        Box::into_raw(node)
    }

    /// The Hazard-Pointer reclaim callback for a Node: deallocates the Node
    /// itself. Every slot still holding an item at this point has already
    /// been handed to a consumer via `items[idx].swap`, so dropping the
    /// `AtomicPtr<T>` array here does not leak or double-free anything - it
    /// never owned a `T`, only a borrowed view of one.
    ///
    /// # Safety
    /// `header` must be the `header` field of a `Node<T>` allocated by
    /// [`Node::create`], unlinked from every structure that exposed it, and
    /// not already reclaimed.
    pub(crate) unsafe fn reclaim(header: *mut Retired) {
        drop(unsafe { Box::from_raw(header as *mut Self) });

        note_reclaimed();
    }
}
