//! Typed ownership handles over header-carrying allocations.
//!
//! These put the release strategies on the drop path, so "decrement and
//! maybe free" is enforced by the type system instead of by convention.

use crate::release::{free_func, release_func, retain_raw, retain_storage, strong_count};
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// Sole ownership of a header-carrying allocation.
///
/// Dropping the handle destroys the value through the explicit-free
/// strategy, regardless of the ambient regime.
///
/// # Examples
///
/// ```
/// use catch_release::UniqueHandle;
///
/// let mut handle = UniqueHandle::new(vec![1, 2, 3]);
/// handle.push(4);
/// assert_eq!(handle.len(), 4);
/// // Dropped here; the allocation is returned immediately.
/// ```
pub struct UniqueHandle<T> {
    ptr: NonNull<T>,
}

impl<T> UniqueHandle<T> {
    /// Move `value` into a fresh allocation owned by this handle alone.
    pub fn new(value: T) -> Self {
        Self {
            // retain_storage aborts on allocation failure, never null
            ptr: unsafe { NonNull::new_unchecked(retain_storage(value)) },
        }
    }

    /// Give up ownership and return the raw body pointer.
    ///
    /// The caller becomes responsible for releasing it, either through
    /// [`from_raw`](Self::from_raw) or a strategy from
    /// [`free_func`](crate::free_func).
    pub fn into_raw(self) -> *mut T {
        let ptr = self.ptr.as_ptr();
        mem::forget(self);
        ptr
    }

    /// Resume ownership of a pointer produced by [`into_raw`](Self::into_raw).
    ///
    /// # Safety
    ///
    /// `ptr` must have come from `UniqueHandle::<T>::into_raw` (or
    /// `retain_storage::<T>` with count 1) and must not be owned elsewhere.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self {
            ptr: NonNull::new_unchecked(ptr),
        }
    }
}

impl<T> Deref for UniqueHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for UniqueHandle<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for UniqueHandle<T> {
    fn drop(&mut self) {
        unsafe { free_func().release(self.ptr.as_ptr().cast()) }
    }
}

impl<T: fmt::Debug> fmt::Debug for UniqueHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UniqueHandle").field(&**self).finish()
    }
}

unsafe impl<T: Send> Send for UniqueHandle<T> {}
unsafe impl<T: Sync> Sync for UniqueHandle<T> {}

/// Shared ownership of a header-carrying allocation.
///
/// Cloning increments the allocation's strong count; dropping goes through
/// the regime-aware strategy, so under manual reference counting the value
/// is destroyed when the last clone drops, and under automatic reclamation
/// drops leave the allocation for the regime to collect.
pub struct SharedHandle<T> {
    ptr: NonNull<T>,
}

impl<T> SharedHandle<T> {
    /// Move `value` into a fresh shared allocation with strong count 1.
    pub fn new(value: T) -> Self {
        Self {
            ptr: unsafe { NonNull::new_unchecked(retain_storage(value)) },
        }
    }

    /// Current strong count of the underlying allocation.
    pub fn strong_count(&self) -> usize {
        unsafe { strong_count(self.ptr.as_ptr().cast()) }
    }
}

impl<T> Clone for SharedHandle<T> {
    fn clone(&self) -> Self {
        unsafe { retain_raw(self.ptr.as_ptr().cast()) };
        Self { ptr: self.ptr }
    }
}

impl<T> Deref for SharedHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Drop for SharedHandle<T> {
    fn drop(&mut self) {
        unsafe { release_func().release(self.ptr.as_ptr().cast()) }
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedHandle").field(&**self).finish()
    }
}

unsafe impl<T: Send + Sync> Send for SharedHandle<T> {}
unsafe impl<T: Send + Sync> Sync for SharedHandle<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DropCounter<'a>(&'a AtomicUsize);

    impl Drop for DropCounter<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn unique_handle_drops_its_value_once() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        let handle = UniqueHandle::new(DropCounter(&DROPS));
        drop(handle);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unique_handle_round_trips_through_raw() {
        let handle = UniqueHandle::new(String::from("raw"));
        let ptr = handle.into_raw();
        let handle = unsafe { UniqueHandle::from_raw(ptr) };
        assert_eq!(&*handle, "raw");
    }

    #[test]
    fn shared_handle_clone_tracks_the_count() {
        let a = SharedHandle::new(5u32);
        assert_eq!(a.strong_count(), 1);
        let b = a.clone();
        assert_eq!(a.strong_count(), 2);
        drop(b);
        assert_eq!(a.strong_count(), 1);
    }
}
