use crate::sync::atomic;

use super::{domain::Domain, record::Record};

/// A scoped owner of exactly one Hazard-Pointer Record.
///
/// Constructing a Holder obtains a Record (from the calling thread's cache,
/// else the Domain's free stack, else a fresh allocation) and dropping it
/// returns the Record to the Domain. Between those two points, the Holder's
/// Record is this thread's single protection slot for whatever it is
/// currently used to protect - calling [`Holder::reset`] or
/// [`Holder::protect`] again simply re-announces a different pointer through
/// the same slot.
pub struct Holder<'domain> {
    domain: &'domain Domain,
    record: *const Record,
}

impl<'domain> Holder<'domain> {
    /// Acquires a new Holder against `domain`.
    pub fn new(domain: &'domain Domain) -> Self {
        let record = domain.acquire_record();
        Self { domain, record }
    }

    fn record(&self) -> &Record {
        unsafe { &*self.record }
    }

    /// Announces that this thread may be about to dereference `p` (which may
    /// be null, clearing the protection), with release ordering.
    pub fn reset<T>(&self, p: *mut T) {
        self.record().ptr.store(p as *mut (), atomic::Ordering::Release);
    }

    /// The load-protect-validate primitive: loads `atomic_src`, publishes the
    /// loaded address through this Holder's Record, and retries until a
    /// reload of `atomic_src` agrees with what was published. On return, the
    /// returned pointer is guaranteed not to be reclaimed until this Holder's
    /// slot is cleared or overwritten.
    pub fn protect<T>(&self, atomic_src: &atomic::AtomicPtr<T>) -> *mut T {
        let mut candidate = atomic_src.load(atomic::Ordering::Relaxed);
        loop {
            self.record()
                .ptr
                .store(candidate as *mut (), atomic::Ordering::Release);

            // The protector-side half of the asymmetric fence pair (§4.1):
            // orders this publish before the reload below, and - paired with
            // a retirer's SeqCst fence in `Domain::retire` - guarantees that
            // either this protection is visible to that retirer's scan, or
            // this reload observes the retirer's unlink and retries.
            atomic::fence(atomic::Ordering::SeqCst);

            let observed = atomic_src.load(atomic::Ordering::Acquire);
            if observed == candidate {
                return candidate;
            }
            candidate = observed;
        }
    }
}

impl Drop for Holder<'_> {
    fn drop(&mut self) {
        self.domain.release_record(self.record);
    }
}

// Safety:
// A Holder owns an untyped protection slot, not a typed payload, so moving
// one to another thread is sound regardless of which `T`s it was used to
// protect.
unsafe impl Send for Holder<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hazard_ptr::domain::Domain;

    #[test]
    fn reset_then_protect_observes_store() {
        let domain = Domain::new();
        let holder = Holder::new(&domain);

        let value: Box<u32> = Box::new(7);
        let raw = Box::into_raw(value);
        let atomic_src = atomic::AtomicPtr::new(raw);

        let protected = holder.protect(&atomic_src);
        assert_eq!(raw, protected);
        assert_eq!(7, unsafe { *protected });

        holder.reset::<u32>(std::ptr::null_mut());
        drop(unsafe { Box::from_raw(raw) });
    }

    #[test]
    fn drop_returns_record_to_domain() {
        let domain = Domain::new();
        {
            let _holder = Holder::new(&domain);
        }
        let second = Holder::new(&domain);
        drop(second);
    }
}
