//! `Any` column: stores the dynamic [`Value`] verbatim, for schemas where a
//! column's type genuinely varies row to row (spec.md §4.2, §9 — merge is
//! rejected for this kind).

use roaring::RoaringBitmap;

use super::chunk::ChunkedStorage;
use super::{ColumnKind, ColumnOps, Predicate};
use crate::commit::{CommitBuffer, Op};
use crate::error::{Error, Result};
use crate::handle::RowHandle;
use crate::value::Value;

/// A chunked column of opaque [`Value`]s.
#[derive(Debug, Default)]
pub struct AnyColumn {
    storage: ChunkedStorage<Value>,
}

impl AnyColumn {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the value at `handle`.
    #[must_use]
    pub fn get(&self, handle: RowHandle) -> Option<&Value> {
        self.storage.get(handle)
    }
}

impl ColumnOps for AnyColumn {
    fn kind(&self) -> ColumnKind {
        ColumnKind::Any
    }

    fn grow(&mut self, handle: RowHandle) {
        self.storage.grow(handle);
    }

    fn contains(&self, handle: RowHandle) -> bool {
        self.storage.contains(handle)
    }

    fn value(&self, handle: RowHandle) -> (Option<Value>, bool) {
        let present = self.storage.contains(handle);
        (self.storage.get(handle).cloned(), present)
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
                Op::Insert(v) | Op::Put(v) => self.storage.set(*handle, v.clone()),
                Op::Delete => self.storage.clear(*handle),
                Op::Merge(_) => {
                    return Err(Error::InvalidArgument(
                        "merge is not supported on any columns".into(),
                    ));
                }
                Op::PutBitmap(_) => {}
            }
        }
        Ok(())
    }

    fn snapshot(&self, chunk: u32, buffer: &mut CommitBuffer) {
        for (handle, v) in self.storage.iter_chunk(chunk) {
            buffer.push(handle, Op::Put(v.clone()));
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_mixed_value_kinds() {
        let mut col = AnyColumn::new();
        col.apply(
            0,
            &[
                (RowHandle(0), Op::Put(Value::I64(5))),
                (RowHandle(1), Op::Put(Value::Str("x".into()))),
            ],
        )
        .unwrap();
        assert_eq!(col.get(RowHandle(0)), Some(&Value::I64(5)));
        assert_eq!(col.get(RowHandle(1)), Some(&Value::Str("x".into())));
    }

    #[test]
    fn merge_is_rejected() {
        let mut col = AnyColumn::new();
        let result = col.apply(0, &[(RowHandle(0), Op::Merge(Value::I64(1)))]);
        assert!(result.is_err());
    }
}
