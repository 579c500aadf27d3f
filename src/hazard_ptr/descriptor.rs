use crate::sync::atomic;
use std::cell::Cell;

/// A Retired-Object descriptor.
///
/// Every object that can be handed to [`Domain::retire`](super::Domain::retire)
/// must embed one of these at a known offset (field order matters: a
/// `#[repr(C)]` type with `Retired` as its first field casts cleanly back and
/// forth between the concrete type and this header). The Domain only ever
/// touches this header; it never reads or writes the object's payload.
#[repr(C)]
pub struct Retired {
    /// Links this object into whichever Retired-Shard stack currently holds
    /// it. Only ever mutated while the object is on a Shard.
    pub(crate) next: atomic::AtomicPtr<Retired>,
    /// The function that actually deallocates the object, written once by
    /// `retire` right before the object is pushed onto a Shard.
    reclaim: Cell<Option<unsafe fn(*mut Retired)>>,
}

impl Retired {
    /// Creates a new, not-yet-retired descriptor.
    pub const fn new() -> Self {
        Self {
            next: atomic::AtomicPtr::new(std::ptr::null_mut()),
            reclaim: Cell::new(None),
        }
    }

    /// Stores the reclaim-Function for this descriptor, to be invoked once
    /// the Domain has determined that no Hazard-Pointer protects it anymore.
    ///
    /// # Safety
    /// Must only be called by `Domain::retire`, which has exclusive access to
    /// the header at this point (the object has just been logically unlinked
    /// and is not yet reachable by any other thread through the Domain).
    pub(crate) unsafe fn set_reclaim(&self, reclaim: unsafe fn(*mut Retired)) {
        self.reclaim.set(Some(reclaim));
    }

    /// Invokes the stored reclaim-Function on `self`.
    ///
    /// # Safety
    /// The caller must guarantee that no Hazard-Pointer protects `self`
    /// anymore, and that `self` has not already been reclaimed.
    pub(crate) unsafe fn reclaim(this: *mut Retired) {
        let reclaim = unsafe { (*this).reclaim.take() }.expect("retired object without a reclaim function");
        unsafe { reclaim(this) };
    }
}

// Safety:
// A `Retired` header is only ever mutated through the atomics it contains, or
// through `set_reclaim`/`reclaim`, both of which are only called while the
// caller holds exclusive logical access to the object (either because it was
// just unlinked by the only thread that could see it, or because the Domain's
// `reclaiming_flag` serializes reclamation). `Cell` is otherwise not `Sync`,
// which is why this impl is needed at all.
unsafe impl Sync for Retired {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_has_no_reclaim_fn() {
        let retired = Retired::new();
        assert!(retired.reclaim.take().is_none());
    }

    #[test]
    fn set_and_run_reclaim() {
        static CALLED: atomic::AtomicBool = atomic::AtomicBool::new(false);
        unsafe fn mark(_: *mut Retired) {
            CALLED.store(true, atomic::Ordering::SeqCst);
        }

        let boxed = Box::new(Retired::new());
        let ptr = Box::into_raw(boxed);
        unsafe {
            (*ptr).set_reclaim(mark);
            Retired::reclaim(ptr);
        }
        assert!(CALLED.load(atomic::Ordering::SeqCst));

        drop(unsafe { Box::from_raw(ptr) });
    }
}
