//! Enum column: values are interned into a small dictionary shared by every
//! enum column in a collection, so equality comparisons and predicate tests
//! compare integer codes rather than strings (spec.md §4.2).

use std::sync::Arc;

use parking_lot::RwLock;
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

use super::chunk::ChunkedStorage;
use super::{ColumnKind, ColumnOps, Predicate};
use crate::commit::{CommitBuffer, Op};
use crate::error::{Error, Result};
use crate::handle::RowHandle;
use crate::value::Value;

/// A collection-scoped string↔code dictionary shared by every enum column
/// in that collection, so the same variant name always interns to the same
/// code regardless of which column it was written through.
#[derive(Debug, Default)]
pub struct EnumDictionary {
    inner: RwLock<EnumDictionaryInner>,
}

#[derive(Debug, Default)]
struct EnumDictionaryInner {
    by_name: FxHashMap<String, u32>,
    by_code: Vec<String>,
}

impl EnumDictionary {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Interns `name`, returning its stable code.
    pub fn intern(&self, name: &str) -> u32 {
        if let Some(code) = self.inner.read().by_name.get(name) {
            return *code;
        }
        let mut inner = self.inner.write();
        if let Some(code) = inner.by_name.get(name) {
            return *code;
        }
        let code = inner.by_code.len() as u32;
        inner.by_code.push(name.to_string());
        inner.by_name.insert(name.to_string(), code);
        code
    }

    /// Resolves a code back to its name.
    #[must_use]
    pub fn name_of(&self, code: u32) -> Option<String> {
        self.inner.read().by_code.get(code as usize).cloned()
    }

    /// Looks up a name's code without interning it.
    #[must_use]
    pub fn code_of(&self, name: &str) -> Option<u32> {
        self.inner.read().by_name.get(name).copied()
    }
}

/// A chunked column of interned enum codes.
#[derive(Debug)]
pub struct EnumColumn {
    storage: ChunkedStorage<u32>,
    dictionary: Arc<EnumDictionary>,
}

impl EnumColumn {
    #[must_use]
    pub fn new(dictionary: Arc<EnumDictionary>) -> Self {
        Self {
            storage: ChunkedStorage::new(),
            dictionary,
        }
    }

    /// Reads the variant name at `handle`.
    #[must_use]
    pub fn get(&self, handle: RowHandle) -> Option<String> {
        self.storage
            .get(handle)
            .and_then(|code| self.dictionary.name_of(*code))
    }

    /// Reads the raw interned code at `handle`.
    #[must_use]
    pub fn get_code(&self, handle: RowHandle) -> Option<u32> {
        self.storage.get(handle).copied()
    }
}

impl ColumnOps for EnumColumn {
    fn kind(&self) -> ColumnKind {
        ColumnKind::Enum
    }

    fn grow(&mut self, handle: RowHandle) {
        self.storage.grow(handle);
    }

    fn contains(&self, handle: RowHandle) -> bool {
        self.storage.contains(handle)
    }

    fn value(&self, handle: RowHandle) -> (Option<Value>, bool) {
        let present = self.storage.contains(handle);
        (self.get(handle).map(Value::Enum), present)
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
            if let Some(code) = self.storage.get(RowHandle(h)) {
                if let Some(name) = self.dictionary.name_of(*code) {
                    if f(&name) {
                        out.insert(h);
                    }
                }
            }
        }
        out
    }

    fn apply(&mut self, _chunk: u32, ops: &[(RowHandle, Op)]) -> Result<()> {
        for (handle, op) in ops {
            match op {
                Op::Insert(v) | Op::Put(v) => {
                    let name = v.as_str()?;
                    let code = self.dictionary.intern(name);
                    self.storage.set(*handle, code);
                }
                Op::Delete => self.storage.clear(*handle),
                Op::Merge(_) => {
                    return Err(Error::InvalidArgument(
                        "merge is not supported on enum columns".into(),
                    ));
                }
                Op::PutBitmap(_) => {}
            }
        }
        Ok(())
    }

    fn snapshot(&self, chunk: u32, buffer: &mut CommitBuffer) {
        for (handle, code) in self.storage.iter_chunk(chunk) {
            if let Some(name) = self.dictionary.name_of(*code) {
                buffer.push(handle, Op::Put(Value::Enum(name)));
            }
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
