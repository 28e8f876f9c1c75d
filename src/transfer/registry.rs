//! Arena of in-flight transfers keyed by handle.

use std::collections::HashMap;

use super::handle::TransferHandle;
use super::transfer::Transfer;

/// Owns every transfer between submission and completion.
///
/// Engine events carry a handle; this is where the handle is turned back into
/// the transfer it names.
#[derive(Debug, Default)]
pub(crate) struct TransferRegistry {
    transfers: HashMap<TransferHandle, Transfer>,
}

impl TransferRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a transfer. Handles are unique, so an existing entry is never replaced.
    pub(crate) fn insert(&mut self, transfer: Transfer) {
        self.transfers.entry(transfer.handle()).or_insert(transfer);
    }

    pub(crate) fn get_mut(&mut self, handle: TransferHandle) -> Option<&mut Transfer> {
        self.transfers.get_mut(&handle)
    }

    pub(crate) fn remove(&mut self, handle: TransferHandle) -> Option<Transfer> {
        self.transfers.remove(&handle)
    }

    pub(crate) fn contains(&self, handle: TransferHandle) -> bool {
        self.transfers.contains_key(&handle)
    }

    pub(crate) fn len(&self) -> usize {
        self.transfers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// Removes and returns every transfer still registered.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Transfer> + '_ {
        self.transfers.drain().map(|(_, transfer)| transfer)
    }
}
