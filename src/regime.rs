//! Ambient memory-management regime detection.
//!
//! The regime decides what the regime-aware release strategy does with a
//! pointer: decrement-and-maybe-free under manual reference counting, or
//! nothing under automatic reclamation. It is installed process-wide at most
//! once; the first reader locks in the default when nothing was installed.

use once_cell::sync::OnceCell;
use std::fmt;
use thiserror::Error;

static AMBIENT: OnceCell<MemoryRegime> = OnceCell::new();

/// Policy governing how heap objects obtained from this crate are reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryRegime {
    /// Objects are collected independently of explicit release calls.
    Automatic,
    /// Objects are freed when an explicit reference count reaches zero.
    ManualRefCount,
}

/// The regime was already fixed when an install was attempted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("memory regime already fixed as {existing}")]
pub struct RegimeInstallError {
    /// The regime the process is already committed to.
    pub existing: MemoryRegime,
}

impl MemoryRegime {
    /// Install the process-wide regime.
    ///
    /// The first successful install (or the first [`MemoryRegime::ambient`]
    /// read, which locks in the default) fixes the regime for the rest of
    /// the process lifetime. Later installs fail and change nothing.
    pub fn install(self) -> Result<(), RegimeInstallError> {
        AMBIENT.set(self).map_err(|_| RegimeInstallError {
            // set only fails once a value is present
            existing: Self::ambient(),
        })
    }

    /// The active regime, defaulting to manual reference counting.
    ///
    /// Rust's own discipline is ownership plus explicit counting, so an
    /// embedding that never installs anything gets `ManualRefCount`. The
    /// cell is written at most once and is safe to read concurrently
    /// thereafter.
    pub fn ambient() -> MemoryRegime {
        *AMBIENT.get_or_init(|| MemoryRegime::ManualRefCount)
    }

    /// Whether a regime has been fixed yet, by install or by first read.
    pub fn is_fixed() -> bool {
        AMBIENT.get().is_some()
    }
}

impl fmt::Display for MemoryRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryRegime::Automatic => write!(f, "automatic"),
            MemoryRegime::ManualRefCount => write!(f, "manual reference counting"),
        }
    }
}
