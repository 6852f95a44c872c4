//! Concurrency-support primitives for embedding panic-prone logic and
//! regime-dependent memory release behind two small, independent surfaces.
//!
//! - [`exc_catch`] and friends bridge panicking code into non-panicking
//!   callers: a panic in the protected block is caught, wrapped into an
//!   opaque [`Exception`], and handed to a recovery closure.
//! - [`free_func`] and [`release_func`] select a [`ReleaseFn`] strategy for
//!   returning raw heap allocations, branching on the ambient
//!   [`MemoryRegime`]; [`UniqueHandle`] and [`SharedHandle`] put the same
//!   strategies on a typed drop path.
//!
//! The two halves share no state and never call each other.

pub mod exception;
pub mod handle;
pub mod regime;
pub mod release;

pub use exception::{
    exc_catch, exc_throw, on_exception, try_catch, try_finally, try_or_recover, ExcResult,
    Exception,
};
pub use handle::{SharedHandle, UniqueHandle};
pub use regime::{MemoryRegime, RegimeInstallError};
pub use release::{
    allocation_stats, free_func, release_func, release_storage, retain_raw, retain_storage,
    strong_count, AllocHeader, AllocStats, ReleaseFn, ReleaseKind, MAX_ALIGN,
};
