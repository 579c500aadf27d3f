//! Hazard-Pointer safe memory reclamation.
//!
//! This lets many threads dereference shared pointers to heap objects while
//! other threads logically remove and eventually deallocate those objects,
//! with no reader-side locking and no global quiescence requirement.
//!
//! # Reference
//! * [Hazard Pointers: Safe Memory Reclamation for Lock-Free Objects](https://www.eecg.utoronto.ca/~amza/ece1747h/papers/hazard_pointers.pdf)
//! * Folly's asymmetric-fence Hazard-Pointer algorithm, which the
//!   [`Holder::protect`]/[`Domain::retire`] fence pairing in this module is
//!   modeled on.
//!
//! # Usage
//! Embed a [`descriptor::Retired`] header at the start of every type you want
//! to reclaim through a [`Domain`], acquire a [`Holder`] per protected
//! region, and call [`Domain::retire`] once an object has been unlinked from
//! whatever structure exposed it to other threads.
//!
//! ```
//! use faaqueue::hazard_ptr::{self, descriptor::Retired, Holder};
//! use std::sync::atomic::{AtomicPtr, Ordering};
//!
//! #[repr(C)]
//! struct Node {
//!     header: Retired,
//!     value: u32,
//! }
//! unsafe fn reclaim_node(header: *mut Retired) {
//!     drop(Box::from_raw(header as *mut Node));
//! }
//!
//! let boxed = Box::into_raw(Box::new(Node { header: Retired::new(), value: 42 }));
//! let shared = AtomicPtr::new(boxed);
//!
//! let domain = hazard_ptr::global();
//! let holder = Holder::new(domain);
//! let protected = holder.protect(&shared);
//! assert_eq!(42, unsafe { (*protected).value });
//!
//! unsafe { domain.retire(protected as *mut Retired, reclaim_node) };
//! drop(holder);
//! domain.cleanup();
//! ```

pub mod descriptor;
mod record;
mod tlc;

mod domain;
pub use domain::Domain;

mod holder;
pub use holder::Holder;

/// Returns the default, process-wide Hazard-Pointer Domain.
///
/// This Domain is never dropped, so any thread may safely acquire a
/// [`Holder`] against it and let its thread-local cache flush back into it
/// at exit.
pub fn global() -> &'static Domain {
    &domain::GLOBAL
}
