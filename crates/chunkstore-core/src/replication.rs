//! Replication hook: streams committed chunk deltas to an external writer
//! (spec.md §6).

use roaring::RoaringBitmap;

use crate::commit::CommitBuffer;
use crate::error::Result;

/// Set in [`CommitRecord::kind`] when `inserts` is non-empty.
pub const KIND_INSERT: u8 = 0b001;
/// Set in [`CommitRecord::kind`] when `deletes` is non-empty.
pub const KIND_DELETE: u8 = 0b010;
/// Set in [`CommitRecord::kind`] when `updates` carries at least one
/// non-empty buffer.
pub const KIND_UPDATE: u8 = 0b100;

/// One chunk's worth of committed changes, handed to a [`ReplicationSink`]
/// from inside the chunk's commit critical section.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    /// Bitmask of [`KIND_INSERT`]/[`KIND_DELETE`]/[`KIND_UPDATE`] naming which
    /// kinds of change this chunk's commit carried, spec.md §6's `type`
    /// field.
    pub kind: u8,
    /// Chunk index this record covers.
    pub chunk: u32,
    /// Every handle touched by this chunk's commit — inserted, deleted, or
    /// updated — spec.md §6's `dirty` bitmap.
    pub dirty: RoaringBitmap,
    /// Handles newly inserted in this chunk during the commit.
    pub inserts: RoaringBitmap,
    /// Handles deleted in this chunk during the commit.
    pub deletes: RoaringBitmap,
    /// Non-empty per-column commit buffers touching this chunk.
    pub updates: Vec<CommitBuffer>,
}

impl CommitRecord {
    /// Computes the `type` bitmask for a chunk's inserts/deletes/updates.
    #[must_use]
    pub fn kind_of(inserts: &RoaringBitmap, deletes: &RoaringBitmap, updates: &[CommitBuffer]) -> u8 {
        let mut kind = 0u8;
        if !inserts.is_empty() {
            kind |= KIND_INSERT;
        }
        if !deletes.is_empty() {
            kind |= KIND_DELETE;
        }
        if updates.iter().any(|b| !b.is_empty()) {
            kind |= KIND_UPDATE;
        }
        kind
    }
}

/// An external sink that durably records committed chunk deltas.
///
/// Per spec.md §6, a call to [`Self::write`] must be durable from the
/// sink's perspective before the next commit on the same chunk begins.
pub trait ReplicationSink: Send + Sync {
    /// Writes one committed chunk's delta.
    ///
    /// # Errors
    /// Any error aborts the commit that produced `commit` after the
    /// in-memory state has already been updated; callers should treat this
    /// as a replication-lag condition, not a rolled-back write.
    fn write(&self, commit: &CommitRecord) -> Result<()>;
}
