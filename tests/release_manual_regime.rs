//! Release strategy behavior under the manual reference-counting regime.
//!
//! The regime cell is process-global, so every test pins it first; the
//! opposite regime gets its own test binary.

use catch_release::{
    allocation_stats, free_func, release_func, retain_raw, retain_storage, strong_count,
    MemoryRegime, ReleaseKind, SharedHandle, UniqueHandle,
};
use std::sync::atomic::{AtomicUsize, Ordering};

fn pin_manual_regime() {
    let _ = MemoryRegime::ManualRefCount.install();
    assert_eq!(MemoryRegime::ambient(), MemoryRegime::ManualRefCount);
}

struct DropCounter<'a>(&'a AtomicUsize);

impl Drop for DropCounter<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn free_func_is_behaviorally_stable_across_calls() {
    pin_manual_regime();
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    let first = free_func();
    let second = free_func();
    assert_eq!(first, second);
    assert_eq!(first.kind(), ReleaseKind::ExplicitFree);

    // Both selections deallocate immediately.
    for strategy in [first, second] {
        let ptr = retain_storage(DropCounter(&DROPS));
        let before = DROPS.load(Ordering::SeqCst);
        unsafe { strategy.release(ptr.cast()) };
        assert_eq!(DROPS.load(Ordering::SeqCst), before + 1);
    }
}

#[test]
fn explicit_free_reclaims_the_allocation() {
    pin_manual_regime();
    let before = allocation_stats();
    let ptr = retain_storage([0u8; 64]);
    unsafe { free_func().release(ptr.cast()) };
    let after = allocation_stats();
    assert!(after.total_freed > before.total_freed);
}

#[test]
fn release_func_decrements_and_frees_at_zero() {
    pin_manual_regime();
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    let ptr = retain_storage(DropCounter(&DROPS));
    unsafe {
        retain_raw(ptr.cast());
        assert_eq!(strong_count(ptr.cast()), 2);

        release_func().release(ptr.cast());
        // Count 2 -> 1: still live.
        assert_eq!(DROPS.load(Ordering::SeqCst), 0);
        assert_eq!(strong_count(ptr.cast()), 1);

        release_func().release(ptr.cast());
    }
    // Freed exactly once, on the second release.
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_releases_free_exactly_once() {
    pin_manual_regime();
    static DROPS: AtomicUsize = AtomicUsize::new(0);
    const THREADS: usize = 8;

    let ptr = retain_storage(DropCounter(&DROPS));
    unsafe {
        // One reference per thread.
        for _ in 1..THREADS {
            retain_raw(ptr.cast());
        }
    }

    let addr = ptr as usize;
    crossbeam_utils::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(move |_| unsafe {
                release_func().release(addr as *mut u8);
            });
        }
    })
    .unwrap();

    assert_eq!(DROPS.load(Ordering::SeqCst), 1);
}

#[test]
fn unique_handle_frees_immediately_on_drop() {
    pin_manual_regime();
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    let handle = UniqueHandle::new(DropCounter(&DROPS));
    assert_eq!(DROPS.load(Ordering::SeqCst), 0);
    drop(handle);
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);
}

#[test]
fn shared_handle_frees_when_the_last_clone_drops() {
    pin_manual_regime();
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    let a = SharedHandle::new(DropCounter(&DROPS));
    let b = a.clone();
    let c = b.clone();
    assert_eq!(a.strong_count(), 3);

    drop(a);
    drop(b);
    assert_eq!(DROPS.load(Ordering::SeqCst), 0);
    assert_eq!(c.strong_count(), 1);

    drop(c);
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);
}

#[test]
fn shared_handle_reads_stay_valid_while_any_clone_lives() {
    pin_manual_regime();
    let a = SharedHandle::new(String::from("payload"));
    let b = a.clone();
    drop(a);
    assert_eq!(&*b, "payload");
}
