use std::fmt::Debug;

use crate::sync::atomic;

use super::domain::Domain;

/// A single Hazard-Pointer slot.
///
/// A Record is never deallocated once created; it is either *owned* by a
/// [`Holder`](super::Holder) or sitting available on a Domain's free stack or
/// a thread's [`Tlc`](super::tlc::Tlc). `all_next` links it into the Domain's
/// append-only list of every Record ever allocated (read by scans);
/// `avail_next` links it into the Domain's free stack while it is available.
/// `domain` is a fixed back-reference to the Domain that allocated this
/// Record: every Record a Domain ever hands out belongs to exactly that
/// Domain for its whole lifetime, so the pointer never changes after
/// construction.
#[repr(align(64))]
pub(crate) struct Record {
    /// The Pointer currently protected by this Record, or Null if the Record
    /// is not currently owned by any Holder.
    pub(crate) ptr: atomic::AtomicPtr<()>,
    /// Links this Record into the Domain-wide List of all Records.
    pub(crate) all_next: atomic::AtomicPtr<Record>,
    /// Links this Record into the Domain's free stack while it is available.
    pub(crate) avail_next: atomic::AtomicPtr<Record>,
    /// The Domain this Record was allocated by. Used to catch a Record being
    /// returned to a Domain other than the one that allocated it.
    pub(crate) domain: *const Domain,
}

impl Record {
    /// Creates a new, empty Record owned by `domain` and leaks it onto the
    /// Heap, as Records are never freed during normal operation.
    pub(crate) fn boxed_empty(domain: *const Domain) -> Box<Self> {
        Box::new(Self {
            ptr: atomic::AtomicPtr::new(std::ptr::null_mut()),
            all_next: atomic::AtomicPtr::new(std::ptr::null_mut()),
            avail_next: atomic::AtomicPtr::new(std::ptr::null_mut()),
            domain,
        })
    }

    /// Resets the protection slot back to its empty state.
    pub(crate) fn reset(&self) {
        self.ptr.store(std::ptr::null_mut(), atomic::Ordering::Release);
    }
}

impl Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Record ( ptr = {:p} )", self.ptr.load(atomic::Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxed_empty_is_null() {
        let record = Record::boxed_empty(std::ptr::null());
        assert!(record.ptr.load(atomic::Ordering::SeqCst).is_null());
    }

    #[test]
    fn reset_clears_ptr() {
        let record = Record::boxed_empty(std::ptr::null());
        record
            .ptr
            .store(0x1234 as *mut (), atomic::Ordering::SeqCst);
        record.reset();
        assert!(record.ptr.load(atomic::Ordering::SeqCst).is_null());
    }

    #[test]
    fn domain_back_reference_is_set() {
        let marker = 0x9999 as *const Domain;
        let record = Record::boxed_empty(marker);
        assert_eq!(marker, record.domain);
    }
}
