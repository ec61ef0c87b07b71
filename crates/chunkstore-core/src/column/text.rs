//! UTF-8 string column. `Merge` concatenates.

use roaring::RoaringBitmap;

use super::chunk::ChunkedStorage;
use super::{ColumnKind, ColumnOps, Predicate};
use crate::commit::{CommitBuffer, Op};
use crate::error::Result;
use crate::handle::RowHandle;
use crate::value::Value;

/// A chunked column of owned `String` values.
#[derive(Debug, Default)]
pub struct StringColumn {
    storage: ChunkedStorage<String>,
}

impl StringColumn {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the value at `handle`.
    #[must_use]
    pub fn get(&self, handle: RowHandle) -> Option<&str> {
        self.storage.get(handle).map(String::as_str)
    }
}

impl ColumnOps for StringColumn {
    fn kind(&self) -> ColumnKind {
        ColumnKind::String
    }

    fn grow(&mut self, handle: RowHandle) {
        self.storage.grow(handle);
    }

    fn contains(&self, handle: RowHandle) -> bool {
        self.storage.contains(handle)
    }

    fn value(&self, handle: RowHandle) -> (Option<Value>, bool) {
        let present = self.storage.contains(handle);
        (
            self.storage.get(handle).cloned().map(Value::Str),
            present,
        )
    }

    fn index(&self) -> &RoaringBitmap {
        self.storage.presence()
    }

    fn filter(&self, mask: &RoaringBitmap, pred: &Predicate<'_>) -> RoaringBitmap {
        let Predicate::Str(f) = pred else {
            return RoaringBitmap::new();
        };
        let mut out = RoaringBitmap::new();
        for h in mask & self.storage.presence() {
            if let Some(v) = self.storage.get(RowHandle(h)) {
                if f(v) {
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
                    self.storage.set(*handle, v.as_str()?.to_string());
                }
                Op::Delete => self.storage.clear(*handle),
                Op::Merge(v) => {
                    let addition = v.as_str()?;
                    let mut combined = self.storage.get(*handle).cloned().unwrap_or_default();
                    combined.push_str(addition);
                    self.storage.set(*handle, combined);
                }
                Op::PutBitmap(_) => {}
            }
        }
        Ok(())
    }

    fn snapshot(&self, chunk: u32, buffer: &mut CommitBuffer) {
        for (handle, v) in self.storage.iter_chunk(chunk) {
            buffer.push(handle, Op::Put(Value::Str(v.clone())));
        }
    }

    fn delete(&mut self, chunk: u32, mask: &RoaringBitmap) {
        self.storage.delete_mask(chunk, mask);
    }

    fn supports_merge(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
