//! Chunked column storage.
//!
//! Every column is an ordered sequence of lazily materialized chunks, each
//! carrying a presence bitmap and a typed payload. See spec.md §4.1.

mod any;
mod boolean;
mod chunk;
mod enum_col;
mod index;
mod key;
mod numeric;
mod record;
pub(crate) mod registry;
mod sort_index;
mod text;

pub use any::AnyColumn;
pub use boolean::BoolColumn;
pub use enum_col::{EnumColumn, EnumDictionary};
pub use index::ComputedIndexColumn;
pub use key::KeyColumn;
pub use numeric::{MergeFn, Numeric, NumericColumn, NumericKind};
pub use record::{Record, RecordColumn};
pub use registry::{ColumnEntry, ColumnSlot, Registry};
pub use sort_index::SortIndexColumn;
pub use text::StringColumn;

use roaring::RoaringBitmap;

use crate::commit::{CommitBuffer, Op};
use crate::error::Result;
use crate::handle::RowHandle;
use crate::value::Value;

/// The factory tags a caller can request when creating a column
/// (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Unique primary-key string column with a reverse key→handle index.
    Key,
    /// Boolean; presence bitmap doubles as the payload.
    Bool,
    /// Heap-allocated UTF-8 strings.
    String,
    /// Interned enum code into a collection-scoped dictionary.
    Enum,
    Int16,
    Int32,
    Int64,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    /// Opaque dynamically-typed value.
    Any,
    /// Opaque binary blob via a caller-supplied marshal contract.
    Record,
    /// Predicate-derived bitmap over a source column.
    ComputedIndex,
    /// Ordered key→handle map over a source column's values.
    SortIndex,
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// A typed predicate, evaluated only against already-present, already
/// filtered positions (spec.md §4.4).
pub enum Predicate<'a> {
    /// Predicate over a 64-bit float.
    F64(&'a dyn Fn(f64) -> bool),
    /// Predicate over a 64-bit signed integer.
    I64(&'a dyn Fn(i64) -> bool),
    /// Predicate over a 64-bit unsigned integer.
    U64(&'a dyn Fn(u64) -> bool),
    /// Predicate over a string slice.
    Str(&'a dyn Fn(&str) -> bool),
    /// Predicate over a boolean.
    Bool(&'a dyn Fn(bool) -> bool),
    /// Predicate over the dynamically typed value, for `Any`/`Record` columns.
    Value(&'a dyn Fn(&Value) -> bool),
}

/// The shared contract every chunked column implementation satisfies.
///
/// Downcasts to a concrete type (e.g. [`NumericColumn<f64>`]) happen only at
/// the typed-reader boundary in `transaction.rs`; everything that composes
/// filters or runs commit/snapshot goes through this trait object.
pub trait ColumnOps: std::fmt::Debug + Send + Sync {
    /// The factory tag of this column.
    fn kind(&self) -> ColumnKind;

    /// Ensures the chunk containing `handle` is materialized. Idempotent.
    fn grow(&mut self, handle: RowHandle);

    /// Presence check.
    fn contains(&self, handle: RowHandle) -> bool;

    /// Reads the value at `handle`, with a presence flag.
    fn value(&self, handle: RowHandle) -> (Option<Value>, bool);

    /// For ordinary columns, the presence bitmap; for computed-index
    /// columns, the predicate-matched bitmap.
    fn index(&self) -> &RoaringBitmap;

    /// Restricts `mask` to positions whose payload satisfies `pred`,
    /// first intersecting with presence. A predicate of the wrong variant
    /// for this column's kind yields an empty bitmap.
    fn filter(&self, mask: &RoaringBitmap, pred: &Predicate<'_>) -> RoaringBitmap;

    /// Applies a commit-buffer slice for one chunk.
    ///
    /// # Errors
    /// Returns an error if an operation's value cannot be narrowed to this
    /// column's storage type.
    fn apply(&mut self, chunk: u32, ops: &[(RowHandle, Op)]) -> Result<()>;

    /// Emits one `Put` op per present slot of `chunk` into `buffer`.
    fn snapshot(&self, chunk: u32, buffer: &mut CommitBuffer);

    /// Clears presence (and payload, where applicable) for every handle in
    /// `mask` that falls within `chunk`.
    fn delete(&mut self, chunk: u32, mask: &RoaringBitmap);

    /// Whether `Merge` ops are meaningful for this column kind.
    fn supports_merge(&self) -> bool {
        false
    }

    /// Downcast hook for typed readers/writers bound at the call site
    /// (spec.md §9 — "downcasts occur only at the typed-reader boundary").
    fn as_any(&self) -> &dyn std::any::Any;

    /// Mutable counterpart of [`Self::as_any`].
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}
