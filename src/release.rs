//! Release-strategy selection and header-carrying allocations.
//!
//! Every allocation made through this crate is prefixed with an
//! [`AllocHeader`] recording the body size, a typed drop shim, and an atomic
//! strong count. A raw body pointer is therefore enough to destroy the value
//! and return the whole allocation, which is what lets the release
//! strategies stay untyped.

use crate::regime::MemoryRegime;
use std::alloc::{self, Layout};
use std::fmt;
use std::mem::{align_of, size_of};
use std::sync::atomic::{fence, AtomicUsize, Ordering};

/// Largest body alignment the fixed header prefix can serve.
pub const MAX_ALIGN: usize = 16;

/// Header placed ahead of every allocation made through this crate.
///
/// The layout keeps the strong count in the first word so the release path
/// touches a single cache line before deciding anything.
#[repr(C, align(16))]
pub struct AllocHeader {
    strong: AtomicUsize,
    body_size: usize,
    drop_value: unsafe fn(*mut u8),
}

const HEADER_SIZE: usize = size_of::<AllocHeader>();

// Process-wide allocation accounting, readable by test doubles.
static LIVE_ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);
static TOTAL_ALLOCATED: AtomicUsize = AtomicUsize::new(0);
static TOTAL_FREED: AtomicUsize = AtomicUsize::new(0);

/// Snapshot of the crate's allocation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocStats {
    /// Header-carrying allocations currently live.
    pub live_allocations: usize,
    /// Allocations made since process start.
    pub total_allocated: usize,
    /// Allocations returned since process start.
    pub total_freed: usize,
}

/// Read the current allocation counters.
pub fn allocation_stats() -> AllocStats {
    AllocStats {
        live_allocations: LIVE_ALLOCATIONS.load(Ordering::Acquire),
        total_allocated: TOTAL_ALLOCATED.load(Ordering::Acquire),
        total_freed: TOTAL_FREED.load(Ordering::Acquire),
    }
}

/// The closed set of release behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseKind {
    /// Destroy and deallocate immediately, ignoring the strong count.
    ExplicitFree,
    /// Decrement-and-maybe-free under manual counting, no-op under
    /// automatic reclamation.
    RegimeAware,
}

/// A selected release strategy.
///
/// Copyable and stateless; the only mutable state it ever touches is the
/// strong count inside the allocation it is applied to, so one `ReleaseFn`
/// may be called concurrently from any number of threads. Repeated accessor
/// calls return behaviorally identical values for the whole process
/// lifetime.
///
/// # Examples
///
/// ```
/// use catch_release::{free_func, retain_storage};
///
/// let ptr = retain_storage(vec![1u8, 2, 3]);
/// unsafe { free_func().release(ptr.cast()) };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseFn {
    kind: ReleaseKind,
}

impl ReleaseFn {
    /// Which member of the closed strategy set this is.
    pub fn kind(self) -> ReleaseKind {
        self.kind
    }

    /// Apply the strategy to a body pointer.
    ///
    /// Null pointers are ignored. After this call returns the caller must
    /// treat the pointer as potentially invalid.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must have come from [`retain_storage`] (directly or
    /// through a handle's `into_raw`) and must not have been freed already.
    pub unsafe fn release(self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        match self.kind {
            ReleaseKind::ExplicitFree => destroy(ptr),
            ReleaseKind::RegimeAware => match MemoryRegime::ambient() {
                // The regime owns reclamation; nothing to do here.
                MemoryRegime::Automatic => {}
                MemoryRegime::ManualRefCount => {
                    let header = header_of(ptr);
                    if (*header).strong.fetch_sub(1, Ordering::Release) == 1 {
                        // Pair with the Release above so the freeing thread
                        // sees every write made before the last decrement.
                        fence(Ordering::Acquire);
                        destroy(ptr);
                    }
                }
            },
        }
    }
}

/// Strategy that unconditionally destroys and deallocates, for allocations
/// the caller fully owns regardless of the ambient regime.
///
/// Idempotent and side-effect-free itself; it only selects, never frees.
pub fn free_func() -> ReleaseFn {
    ReleaseFn {
        kind: ReleaseKind::ExplicitFree,
    }
}

/// Strategy performing the regime-correct release for allocations whose
/// ownership is shared with the ambient regime.
///
/// The regime itself is resolved once, on its first read, and the answer is
/// stable for the rest of the process, so repeated calls return strategies
/// with identical behavior.
pub fn release_func() -> ReleaseFn {
    ReleaseFn {
        kind: ReleaseKind::RegimeAware,
    }
}

/// Move `value` into a fresh header-carrying allocation with strong count 1
/// and return the body pointer.
///
/// The returned pointer is released with a strategy from [`free_func`] or
/// [`release_func`], or re-wrapped via the typed handles.
///
/// # Panics
///
/// Panics if `T` needs alignment above [`MAX_ALIGN`].
pub fn retain_storage<T>(value: T) -> *mut T {
    assert!(
        align_of::<T>() <= MAX_ALIGN,
        "body alignment {} exceeds the supported maximum {}",
        align_of::<T>(),
        MAX_ALIGN
    );
    let layout = alloc_layout(size_of::<T>());
    unsafe {
        let raw = alloc::alloc(layout);
        if raw.is_null() {
            alloc::handle_alloc_error(layout);
        }
        raw.cast::<AllocHeader>().write(AllocHeader {
            strong: AtomicUsize::new(1),
            body_size: size_of::<T>(),
            drop_value: drop_shim::<T>,
        });
        let body = raw.add(HEADER_SIZE).cast::<T>();
        body.write(value);
        LIVE_ALLOCATIONS.fetch_add(1, Ordering::AcqRel);
        TOTAL_ALLOCATED.fetch_add(1, Ordering::AcqRel);
        body
    }
}

/// Increment the strong count of an existing allocation.
///
/// # Safety
///
/// `ptr` must have come from [`retain_storage`] and still be live.
pub unsafe fn retain_raw(ptr: *mut u8) {
    let header = header_of(ptr);
    (*header).strong.fetch_add(1, Ordering::Relaxed);
}

/// Read the strong count of an existing allocation.
///
/// # Safety
///
/// `ptr` must have come from [`retain_storage`] and still be live.
pub unsafe fn strong_count(ptr: *mut u8) -> usize {
    (*header_of(ptr)).strong.load(Ordering::Acquire)
}

/// Destroy a typed allocation unconditionally.
///
/// Equivalent to applying [`free_func`] to the erased pointer.
///
/// # Safety
///
/// `ptr` must have come from `retain_storage::<T>` and must not have been
/// freed already.
pub unsafe fn release_storage<T>(ptr: *mut T) {
    free_func().release(ptr.cast());
}

fn alloc_layout(body_size: usize) -> Layout {
    // HEADER_SIZE is already a multiple of MAX_ALIGN.
    match Layout::from_size_align(HEADER_SIZE + body_size, MAX_ALIGN) {
        Ok(layout) => layout,
        Err(_) => unreachable!("header-prefixed layout is always valid"),
    }
}

unsafe fn header_of(body: *mut u8) -> *mut AllocHeader {
    body.sub(HEADER_SIZE).cast()
}

unsafe fn drop_shim<T>(body: *mut u8) {
    std::ptr::drop_in_place(body.cast::<T>());
}

/// Run the stored drop shim, then return the allocation.
unsafe fn destroy(body: *mut u8) {
    let header = header_of(body);
    let drop_value = (*header).drop_value;
    let body_size = (*header).body_size;
    drop_value(body);
    alloc::dealloc(header.cast(), alloc_layout(body_size));
    LIVE_ALLOCATIONS.fetch_sub(1, Ordering::AcqRel);
    TOTAL_FREED.fetch_add(1, Ordering::AcqRel);
}

impl fmt::Display for ReleaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseKind::ExplicitFree => write!(f, "explicit free"),
            ReleaseKind::RegimeAware => write!(f, "regime-aware release"),
        }
    }
}
