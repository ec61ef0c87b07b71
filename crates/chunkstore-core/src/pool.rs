//! Transaction scratch pool: the reusable per-transaction state (delete/
//! insert/dirty bitmaps, per-column commit buffers, allocated-handle list)
//! that a fresh [`crate::transaction::Transaction`] would otherwise
//! allocate from scratch on every `Query`/`Insert` call (spec.md §5).
//!
//! Acquisition never blocks: on exhaustion of the bounded channel, a fresh
//! [`TransactionScratch`] is allocated instead, mirroring the non-blocking
//! fallback spec.md §5 describes for the commit-buffer pool.

use std::collections::BTreeSet;

use crossbeam_channel::{bounded, Receiver, Sender};
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

use crate::commit::CommitBuffer;
use crate::handle::RowHandle;

/// Default bounded capacity of a collection's transaction scratch pool.
pub const DEFAULT_POOL_CAPACITY: usize = 256;

/// Reusable scratch state for one transaction's lifetime. The filter
/// bitmap is not pooled here: it is always re-cloned from the collection's
/// fill list on `Transaction::new`, so pooling it would save nothing.
#[derive(Debug, Default)]
pub(crate) struct TransactionScratch {
    pub delete: RoaringBitmap,
    pub insert: RoaringBitmap,
    pub dirty: BTreeSet<u32>,
    pub buffers: FxHashMap<String, CommitBuffer>,
    pub allocated: Vec<RowHandle>,
}

impl TransactionScratch {
    fn reset(&mut self) {
        self.delete.clear();
        self.insert.clear();
        self.dirty.clear();
        self.buffers.clear();
        self.allocated.clear();
    }
}

/// Bounded FIFO pool of [`TransactionScratch`] values, backed by a
/// `crossbeam_channel`. Acquisition is non-blocking: an empty pool falls
/// back to a fresh allocation rather than waiting on a release.
pub(crate) struct ScratchPool {
    sender: Sender<TransactionScratch>,
    receiver: Receiver<TransactionScratch>,
}

impl ScratchPool {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    pub(crate) fn acquire(&self) -> TransactionScratch {
        self.receiver.try_recv().unwrap_or_default()
    }

    pub(crate) fn release(&self, mut scratch: TransactionScratch) {
        scratch.reset();
        let _ = self.sender.try_send(scratch);
    }
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}
