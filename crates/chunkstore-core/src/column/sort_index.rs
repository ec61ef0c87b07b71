//! Sort-index column: an ordered key→handle map over a source column's
//! values. Unlike the other column kinds this is not bitmap algebra at
//! all, so it deliberately sits outside [`super::ColumnOps`] (spec.md
//! §4.2) and is driven directly by `Transaction::commit` the same way a
//! [`super::ComputedIndexColumn`] is.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::handle::RowHandle;
use crate::value::Value;

/// An orderable projection of a [`Value`], used as a `BTreeMap` key.
///
/// Float ordering uses [`f64::total_cmp`] so `NaN` sorts deterministically
/// instead of breaking the map's ordering invariant.
#[derive(Debug, Clone)]
pub enum SortKey {
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
}

impl SortKey {
    /// Builds a sort key from a dynamic value, if it is orderable.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::I64(v) => Some(Self::I64(*v)),
            Value::U64(v) => Some(Self::U64(*v)),
            Value::F64(v) => Some(Self::F64(*v)),
            Value::Str(v) | Value::Enum(v) => Some(Self::Str(v.clone())),
            Value::Bool(_) | Value::Bytes(_) | Value::Null => None,
        }
    }

    fn discriminant(&self) -> u8 {
        match self {
            Self::I64(_) => 0,
            Self::U64(_) => 1,
            Self::F64(_) => 2,
            Self::Str(_) => 3,
        }
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Self::I64(a), Self::I64(b)) => a.cmp(b),
            (Self::U64(a), Self::U64(b)) => a.cmp(b),
            (Self::F64(a), Self::F64(b)) => a.total_cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            _ => self.discriminant().cmp(&other.discriminant()),
        }
    }
}

/// An ordered index over a source column's values.
#[derive(Debug, Default)]
pub struct SortIndexColumn {
    source: String,
    by_key: BTreeMap<SortKey, Vec<RowHandle>>,
    by_handle: FxHashMap<u32, SortKey>,
}

impl SortIndexColumn {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            by_key: BTreeMap::new(),
            by_handle: FxHashMap::default(),
        }
    }

    /// Name of the column this index is derived from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Inserts or repositions `handle` under `key`, removing any prior
    /// entry for that handle first.
    pub fn reeval(&mut self, handle: RowHandle, value: Option<&Value>) {
        self.remove(handle);
        if let Some(key) = value.and_then(SortKey::from_value) {
            self.by_key.entry(key.clone()).or_default().push(handle);
            self.by_handle.insert(handle.0, key);
        }
    }

    /// Removes `handle` from the index, if present.
    pub fn remove(&mut self, handle: RowHandle) {
        if let Some(key) = self.by_handle.remove(&handle.0) {
            if let Some(handles) = self.by_key.get_mut(&key) {
                handles.retain(|h| *h != handle);
                if handles.is_empty() {
                    self.by_key.remove(&key);
                }
            }
        }
    }

    /// Number of distinct handles currently indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    /// True if no handle is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    /// Iterates handles in ascending key order.
    pub fn iter_ascending(&self) -> impl Iterator<Item = RowHandle> + '_ {
        self.by_key.values().flatten().copied()
    }

    /// Iterates handles in descending key order.
    pub fn iter_descending(&self) -> impl Iterator<Item = RowHandle> + '_ {
        self.by_key.values().rev().flat_map(|v| v.iter().rev()).copied()
    }

    /// The handle with the smallest key, if any.
    #[must_use]
    pub fn first(&self) -> Option<RowHandle> {
        self.by_key.values().next().and_then(|v| v.first()).copied()
    }

    /// The handle with the largest key, if any.
    #[must_use]
    pub fn last(&self) -> Option<RowHandle> {
        self.by_key.values().next_back().and_then(|v| v.last()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_in_ascending_key_order() {
        let mut idx = SortIndexColumn::new("score");
        idx.reeval(RowHandle(0), Some(&Value::I64(30)));
        idx.reeval(RowHandle(1), Some(&Value::I64(10)));
        idx.reeval(RowHandle(2), Some(&Value::I64(20)));

        let order: Vec<u32> = idx.iter_ascending().map(|h| h.0).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn reeval_repositions_existing_handle() {
        let mut idx = SortIndexColumn::new("score");
        idx.reeval(RowHandle(0), Some(&Value::I64(5)));
        idx.reeval(RowHandle(0), Some(&Value::I64(50)));

        assert_eq!(idx.len(), 1);
        assert_eq!(idx.last(), Some(RowHandle(0)));
    }

    #[test]
    fn removing_source_value_drops_handle() {
        let mut idx = SortIndexColumn::new("score");
        idx.reeval(RowHandle(0), Some(&Value::I64(5)));
        idx.reeval(RowHandle(0), None);
        assert!(idx.is_empty());
    }

    #[test]
    fn nan_sorts_deterministically() {
        let mut idx = SortIndexColumn::new("score");
        idx.reeval(RowHandle(0), Some(&Value::F64(f64::NAN)));
        idx.reeval(RowHandle(1), Some(&Value::F64(1.0)));
        let order: Vec<u32> = idx.iter_ascending().map(|h| h.0).collect();
        assert_eq!(order.len(), 2);
    }
}
