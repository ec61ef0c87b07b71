//! Boolean column: presence bitmap doubles as the payload, so `true` rows
//! are the ones present and `false` rows are absent-but-allocated. A
//! second bitmap tracks which handles have ever been grown so `Contains`
//! can distinguish "never touched" from "set to false" (spec.md §4.2,
//! §9 — merge is rejected for this kind).

use roaring::RoaringBitmap;

use super::{ColumnKind, ColumnOps, Predicate};
use crate::commit::{CommitBuffer, Op};
use crate::error::{Error, Result};
use crate::handle::RowHandle;
use crate::value::Value;

/// A chunked column of booleans.
#[derive(Debug, Default)]
pub struct BoolColumn {
    allocated: RoaringBitmap,
    truthy: RoaringBitmap,
}

impl BoolColumn {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the value at `handle`.
    #[must_use]
    pub fn get(&self, handle: RowHandle) -> Option<bool> {
        if !self.allocated.contains(handle.0) {
            return None;
        }
        Some(self.truthy.contains(handle.0))
    }
}

impl ColumnOps for BoolColumn {
    fn kind(&self) -> ColumnKind {
        ColumnKind::Bool
    }

    fn grow(&mut self, handle: RowHandle) {
        self.allocated.insert(handle.0);
    }

    fn contains(&self, handle: RowHandle) -> bool {
        self.allocated.contains(handle.0)
    }

    fn value(&self, handle: RowHandle) -> (Option<Value>, bool) {
        let present = self.allocated.contains(handle.0);
        (present.then(|| Value::Bool(self.truthy.contains(handle.0))), present)
    }

    fn index(&self) -> &RoaringBitmap {
        &self.truthy
    }

    fn filter(&self, mask: &RoaringBitmap, pred: &Predicate<'_>) -> RoaringBitmap {
        let Predicate::Bool(f) = pred else {
            return RoaringBitmap::new();
        };
        let present = mask & &self.allocated;
        if f(true) && f(false) {
            return present;
        }
        if f(true) {
            return present & &self.truthy;
        }
        if f(false) {
            return &present - &self.truthy;
        }
        RoaringBitmap::new()
    }

    fn apply(&mut self, _chunk: u32, ops: &[(RowHandle, Op)]) -> Result<()> {
        for (handle, op) in ops {
            match op {
                Op::Insert(v) | Op::Put(v) => {
                    let b = v.as_bool()?;
                    self.allocated.insert(handle.0);
                    if b {
                        self.truthy.insert(handle.0);
                    } else {
                        self.truthy.remove(handle.0);
                    }
                }
                Op::Delete => {
                    self.allocated.remove(handle.0);
                    self.truthy.remove(handle.0);
                }
                Op::Merge(_) => {
                    return Err(Error::InvalidArgument(
                        "merge is not supported on bool columns".into(),
                    ));
                }
                Op::PutBitmap(_) => {}
            }
        }
        Ok(())
    }

    fn snapshot(&self, chunk: u32, buffer: &mut CommitBuffer) {
        let start = RowHandle::chunk_start(chunk);
        let end = start + crate::handle::CHUNK_SIZE;
        for h in self.allocated.range(start..end) {
            buffer.push(RowHandle(h), Op::Put(Value::Bool(self.truthy.contains(h))));
        }
    }

    fn delete(&mut self, chunk: u32, mask: &RoaringBitmap) {
        let start = RowHandle::chunk_start(chunk);
        let end = start + crate::handle::CHUNK_SIZE;
        for h in mask.range(start..end) {
            self.allocated.remove(h);
            self.truthy.remove(h);
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
