//! Primary-key column: a unique string keyed to a row handle, with a
//! reverse index for O(1) key lookup (spec.md §4.2).

use std::collections::HashMap;

use roaring::RoaringBitmap;

use super::chunk::ChunkedStorage;
use super::{ColumnKind, ColumnOps, Predicate};
use crate::commit::{CommitBuffer, Op};
use crate::error::{Error, Result};
use crate::handle::RowHandle;
use crate::value::Value;

/// A unique string column used as a collection's primary key.
#[derive(Debug, Default)]
pub struct KeyColumn {
    storage: ChunkedStorage<String>,
    by_key: HashMap<String, RowHandle>,
}

impl KeyColumn {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the handle owning `key`, if any.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<RowHandle> {
        self.by_key.get(key).copied()
    }

    /// Assigns `key` to `handle`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `key` is already owned by a
    /// different handle.
    pub fn assign(&mut self, handle: RowHandle, key: String) -> Result<()> {
        if let Some(existing) = self.by_key.get(&key) {
            if *existing != handle {
                return Err(Error::InvalidArgument(format!(
                    "duplicate primary key '{key}'"
                )));
            }
        }
        if let Some(old) = self.storage.get(handle) {
            self.by_key.remove(old.as_str());
        }
        self.by_key.insert(key.clone(), handle);
        self.storage.set(handle, key);
        Ok(())
    }
}

impl ColumnOps for KeyColumn {
    fn kind(&self) -> ColumnKind {
        ColumnKind::Key
    }

    fn grow(&mut self, handle: RowHandle) {
        self.storage.grow(handle);
    }

    fn contains(&self, handle: RowHandle) -> bool {
        self.storage.contains(handle)
    }

    fn value(&self, handle: RowHandle) -> (Option<Value>, bool) {
        let present = self.storage.contains(handle);
        (self.storage.get(handle).cloned().map(Value::Str), present)
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
                    let key = v.as_str()?.to_string();
                    self.assign(*handle, key)?;
                }
                Op::Delete => {
                    if let Some(old) = self.storage.get(*handle) {
                        self.by_key.remove(old.as_str());
                    }
                    self.storage.clear(*handle);
                }
                Op::Merge(_) => {
                    return Err(Error::InvalidArgument(
                        "merge is not supported on key columns".into(),
                    ));
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
        let start = RowHandle::chunk_start(chunk);
        let end = start + crate::handle::CHUNK_SIZE;
        for h in mask.range(start..end) {
            if let Some(old) = self.storage.get(RowHandle(h)) {
                self.by_key.remove(old.as_str());
            }
        }
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
    fn assign_then_lookup_round_trips() {
        let mut col = KeyColumn::new();
        col.assign(RowHandle(0), "player-1".into()).unwrap();
        assert_eq!(col.lookup("player-1"), Some(RowHandle(0)));
    }

    #[test]
    fn duplicate_key_on_another_handle_errors() {
        let mut col = KeyColumn::new();
        col.assign(RowHandle(0), "player-1".into()).unwrap();
        assert!(col.assign(RowHandle(1), "player-1".into()).is_err());
    }

    #[test]
    fn delete_frees_the_key_for_reuse() {
        let mut col = KeyColumn::new();
        col.assign(RowHandle(0), "player-1".into()).unwrap();
        col.delete(0, &RoaringBitmap::from_iter([0]));
        assert_eq!(col.lookup("player-1"), None);
        col.assign(RowHandle(1), "player-1".into()).unwrap();
        assert_eq!(col.lookup("player-1"), Some(RowHandle(1)));
    }
}
