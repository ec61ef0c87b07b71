//! Thin helpers over the bitmap primitive.
//!
//! The bitmap itself (`roaring::RoaringBitmap`) is treated as an external
//! collaborator per the design: set/clear/contains, rank, count,
//! and/or/andnot, and range iteration all come from `roaring` directly.
//! What lives here is the handful of chunk-restricted views the transaction
//! and commit-buffer code need on top of it.

use crate::handle::{chunk_of, RowHandle, CHUNK_SIZE};
use roaring::RoaringBitmap;

/// Returns the subset of `bitmap` whose handles fall within `chunk`.
#[must_use]
pub fn chunk_slice(bitmap: &RoaringBitmap, chunk: u32) -> RoaringBitmap {
    let start = RowHandle::chunk_start(chunk);
    let end = start.saturating_add(CHUNK_SIZE);
    bitmap_range(bitmap, start, end)
}

/// Returns the subset of `bitmap` whose values fall in `[start, end)`.
#[must_use]
pub fn bitmap_range(bitmap: &RoaringBitmap, start: u32, end: u32) -> RoaringBitmap {
    let mut out = RoaringBitmap::new();
    out.append(bitmap.range(start..end)).ok();
    out
}

/// Iterates the distinct chunk indices touched by `bitmap`.
pub fn touched_chunks(bitmap: &RoaringBitmap) -> impl Iterator<Item = u32> + '_ {
    let mut last: Option<u32> = None;
    bitmap.iter().filter_map(move |h| {
        let c = chunk_of(h);
        if last == Some(c) {
            None
        } else {
            last = Some(c);
            Some(c)
        }
    })
}

/// Highest chunk index touched by `bitmap`, if any.
#[must_use]
pub fn max_chunk(bitmap: &RoaringBitmap) -> Option<u32> {
    bitmap.max().map(chunk_of)
}
