//! Opaque identifiers for transfers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Incremented every time a handle is allocated. Process-wide so handles stay
/// unique across manager instances and init/shutdown cycles.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identifies one transfer for its whole lifetime.
///
/// Handles are allocated when the transfer is created and are never reissued.
/// A handle is meaningless once its completion has been reported (or once the
/// transfer was cancelled at shutdown), so holders should not keep it around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferHandle(u64);

impl TransferHandle {
    /// Allocates a fresh handle.
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw handle value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
