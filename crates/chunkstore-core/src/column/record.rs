//! `Record` column: caller-defined binary marshaling over an opaque byte
//! column. Merge is meaningless for an arbitrary blob and is rejected
//! (spec.md §4.2, §9).

use std::marker::PhantomData;

use roaring::RoaringBitmap;

use super::chunk::ChunkedStorage;
use super::{ColumnKind, ColumnOps, Predicate};
use crate::commit::{CommitBuffer, Op};
use crate::error::{Error, Result};
use crate::handle::RowHandle;
use crate::value::Value;

/// A caller-defined marshaling contract for opaque record payloads.
pub trait Record: Sized + Send + Sync + 'static {
    /// Serializes `self` to bytes for storage.
    fn encode(&self) -> Vec<u8>;

    /// Deserializes a value previously produced by [`Self::encode`].
    ///
    /// # Errors
    /// Returns [`Error::SerializationError`] if `bytes` is malformed.
    fn decode(bytes: &[u8]) -> Result<Self>;
}

/// A chunked column of opaque, caller-marshaled records.
#[derive(Debug)]
pub struct RecordColumn<R: Record> {
    storage: ChunkedStorage<Vec<u8>>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> Default for RecordColumn<R> {
    fn default() -> Self {
        Self {
            storage: ChunkedStorage::new(),
            _marker: PhantomData,
        }
    }
}

impl<R: Record> RecordColumn<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and decodes the record at `handle`.
    ///
    /// # Errors
    /// Returns [`Error::SerializationError`] if the stored bytes do not
    /// decode as `R`.
    pub fn get(&self, handle: RowHandle) -> Result<Option<R>> {
        self.storage.get(handle).map(|bytes| R::decode(bytes)).transpose()
    }

    /// Encodes and stores `record` at `handle`.
    pub fn set(&mut self, handle: RowHandle, record: &R) {
        self.storage.set(handle, record.encode());
    }
}

impl<R: Record> ColumnOps for RecordColumn<R> {
    fn kind(&self) -> ColumnKind {
        ColumnKind::Record
    }

    fn grow(&mut self, handle: RowHandle) {
        self.storage.grow(handle);
    }

    fn contains(&self, handle: RowHandle) -> bool {
        self.storage.contains(handle)
    }

    fn value(&self, handle: RowHandle) -> (Option<Value>, bool) {
        let present = self.storage.contains(handle);
        (self.storage.get(handle).cloned().map(Value::Bytes), present)
    }

    fn index(&self) -> &RoaringBitmap {
        self.storage.presence()
    }

    fn filter(&self, mask: &RoaringBitmap, pred: &Predicate<'_>) -> RoaringBitmap {
        let Predicate::Value(f) = pred else {
            return RoaringBitmap::new();
        };
        let mut out = RoaringBitmap::new();
        for h in mask & self.storage.presence() {
            if let Some(bytes) = self.storage.get(RowHandle(h)) {
                if f(&Value::Bytes(bytes.clone())) {
                    out.insert(h);
                }
            }
        }
        out
    }

    fn apply(&mut self, _chunk: u32, ops: &[(RowHandle, Op)]) -> Result<()> {
        for (handle, op) in ops {
            match op {
                Op::Insert(v) | Op::Put(v) => {
                    self.storage.set(*handle, v.as_bytes()?.to_vec());
                }
                Op::Delete => self.storage.clear(*handle),
                Op::Merge(_) => {
                    return Err(Error::InvalidArgument(
                        "merge is not supported on record columns".into(),
                    ));
                }
                Op::PutBitmap(_) => {}
            }
        }
        Ok(())
    }

    fn snapshot(&self, chunk: u32, buffer: &mut CommitBuffer) {
        for (handle, bytes) in self.storage.iter_chunk(chunk) {
            buffer.push(handle, Op::Put(Value::Bytes(bytes.clone())));
        }
    }

    fn delete(&mut self, chunk: u32, mask: &RoaringBitmap) {
        self.storage.delete_mask(chunk, mask);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
