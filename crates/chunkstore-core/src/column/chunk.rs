//! Lazily materialized per-chunk storage shared by the typed column kinds.
//!
//! A chunk's backing `Vec` is only allocated once a handle inside it is
//! touched, so a column with rows scattered across a wide handle range does
//! not pay for empty chunks.

use roaring::RoaringBitmap;

use crate::handle::{chunk_of, offset_of, RowHandle, CHUNK_SIZE};

#[derive(Debug, Clone)]
pub(crate) struct ChunkedStorage<T> {
    chunks: Vec<Option<Vec<Option<T>>>>,
    presence: RoaringBitmap,
}

impl<T: Clone> Default for ChunkedStorage<T> {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            presence: RoaringBitmap::new(),
        }
    }
}

impl<T: Clone> ChunkedStorage<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn presence(&self) -> &RoaringBitmap {
        &self.presence
    }

    fn ensure_chunk(&mut self, chunk: u32) {
        let idx = chunk as usize;
        if self.chunks.len() <= idx {
            self.chunks.resize(idx + 1, None);
        }
        if self.chunks[idx].is_none() {
            self.chunks[idx] = Some(vec![None; CHUNK_SIZE as usize]);
        }
    }

    /// Marks `handle` present without assigning a value (used by columns
    /// whose default is meaningful, e.g. a numeric zero on `Grow`).
    pub(crate) fn grow(&mut self, handle: RowHandle) {
        self.ensure_chunk(chunk_of(handle.0));
        self.presence.insert(handle.0);
    }

    pub(crate) fn contains(&self, handle: RowHandle) -> bool {
        self.presence.contains(handle.0)
    }

    pub(crate) fn get(&self, handle: RowHandle) -> Option<&T> {
        if !self.presence.contains(handle.0) {
            return None;
        }
        self.chunks
            .get(chunk_of(handle.0) as usize)?
            .as_ref()?
            .get(offset_of(handle.0) as usize)?
            .as_ref()
    }

    pub(crate) fn set(&mut self, handle: RowHandle, value: T) {
        self.ensure_chunk(chunk_of(handle.0));
        self.presence.insert(handle.0);
        self.chunks[chunk_of(handle.0) as usize].as_mut().unwrap()
            [offset_of(handle.0) as usize] = Some(value);
    }

    pub(crate) fn clear(&mut self, handle: RowHandle) {
        self.presence.remove(handle.0);
        if let Some(Some(slots)) = self.chunks.get_mut(chunk_of(handle.0) as usize) {
            slots[offset_of(handle.0) as usize] = None;
        }
    }

    /// Clears presence and payload for every handle in `mask` that lies
    /// within `chunk`.
    pub(crate) fn delete_mask(&mut self, chunk: u32, mask: &RoaringBitmap) {
        let start = RowHandle::chunk_start(chunk);
        let end = start + CHUNK_SIZE;
        for handle in mask.range(start..end) {
            self.clear(RowHandle(handle));
        }
    }

    /// Iterates `(handle, value)` pairs present within `chunk`, in slot
    /// order.
    pub(crate) fn iter_chunk(&self, chunk: u32) -> impl Iterator<Item = (RowHandle, &T)> + '_ {
        let slots = self.chunks.get(chunk as usize).and_then(Option::as_ref);
        let start = RowHandle::chunk_start(chunk);
        slots.into_iter().flat_map(move |slots| {
            slots.iter().enumerate().filter_map(move |(i, v)| {
                v.as_ref().map(|v| (RowHandle(start + i as u32), v))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trip_across_chunks() {
        let mut storage: ChunkedStorage<i64> = ChunkedStorage::new();
        storage.set(RowHandle(0), 10);
        storage.set(RowHandle(CHUNK_SIZE + 5), 20);

        assert_eq!(storage.get(RowHandle(0)), Some(&10));
        assert_eq!(storage.get(RowHandle(CHUNK_SIZE + 5)), Some(&20));
        assert_eq!(storage.get(RowHandle(1)), None);
    }

    #[test]
    fn clear_removes_presence_and_payload() {
        let mut storage: ChunkedStorage<i64> = ChunkedStorage::new();
        storage.set(RowHandle(3), 99);
        storage.clear(RowHandle(3));

        assert!(!storage.contains(RowHandle(3)));
        assert_eq!(storage.get(RowHandle(3)), None);
    }

    #[test]
    fn iter_chunk_yields_present_slots_in_order() {
        let mut storage: ChunkedStorage<i64> = ChunkedStorage::new();
        storage.set(RowHandle(5), 1);
        storage.set(RowHandle(2), 2);

        let collected: Vec<_> = storage.iter_chunk(0).map(|(h, v)| (h.0, *v)).collect();
        assert_eq!(collected, vec![(2, 2), (5, 1)]);
    }
}
