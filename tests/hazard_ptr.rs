use std::sync::{atomic, Arc};

use faaqueue::hazard_ptr::{self, descriptor::Retired, Domain, Holder};

#[repr(C)]
struct Element {
    header: Retired,
    value: u32,
    dropped: Arc<atomic::AtomicBool>,
}

unsafe fn reclaim_element(header: *mut Retired) {
    let boxed = unsafe { Box::from_raw(header as *mut Element) };
    boxed.dropped.store(true, atomic::Ordering::SeqCst);
}

#[test]
fn protect_boxed() {
    let domain = Domain::new();

    let dropped_initial_element = Arc::new(atomic::AtomicBool::new(false));
    let initial_ptr = Box::into_raw(Box::new(Element {
        header: Retired::new(),
        value: 0,
        dropped: dropped_initial_element.clone(),
    }));

    let list_head = atomic::AtomicPtr::new(initial_ptr);

    let initial_holder = Holder::new(&domain);
    let initial_protected = initial_holder.protect(&list_head);

    let new_ptr = Box::into_raw(Box::new(Element {
        header: Retired::new(),
        value: 1,
        dropped: Arc::new(atomic::AtomicBool::new(false)),
    }));
    if list_head
        .compare_exchange(
            initial_ptr,
            new_ptr,
            atomic::Ordering::SeqCst,
            atomic::Ordering::SeqCst,
        )
        .is_ok()
    {
        unsafe {
            domain.retire(initial_protected as *mut Retired, reclaim_element);
        }
    }

    assert_eq!(0, unsafe { (*initial_protected).value });

    let new_holder = Holder::new(&domain);
    let new_protected = new_holder.protect(&list_head);

    assert_eq!(1, unsafe { (*new_protected).value });

    drop(initial_holder);
    domain.cleanup();

    assert!(dropped_initial_element.load(atomic::Ordering::SeqCst));

    drop(new_holder);
    unsafe {
        domain.retire(new_protected as *mut Retired, reclaim_element);
    }
    domain.cleanup();
}

#[test]
fn global_domain_protect_and_retire() {
    let dropped = Arc::new(atomic::AtomicBool::new(false));
    let boxed = Box::into_raw(Box::new(Element {
        header: Retired::new(),
        value: 42,
        dropped: dropped.clone(),
    }));
    let shared = atomic::AtomicPtr::new(boxed);

    let domain = hazard_ptr::global();
    let holder = Holder::new(domain);
    let protected = holder.protect(&shared);
    assert_eq!(42, unsafe { (*protected).value });

    unsafe {
        domain.retire(protected as *mut Retired, reclaim_element);
    }
    domain.cleanup();
    assert!(!dropped.load(atomic::Ordering::SeqCst));

    drop(holder);
    domain.cleanup();
    assert!(dropped.load(atomic::Ordering::SeqCst));
}
