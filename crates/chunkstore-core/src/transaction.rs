//! Per-query scratchpad: filter bitmap, per-column commit buffers, dirty-
//! chunk set, typed readers/writers, commit/rollback (spec.md §4.4).

use std::collections::BTreeSet;

use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

use crate::bitmap;
use crate::collection::Collection;
use crate::column::registry::ColumnSlot;
use crate::column::{Numeric, NumericColumn, Predicate};
use crate::commit::{CommitBuffer, Op};
use crate::error::{Error, Result};
use crate::handle::{chunk_of, RowHandle};
use crate::replication::CommitRecord;
use crate::value::Value;

/// Which opcode a [`RowWriter`] emits for a plain `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Insert,
    Update,
}

/// A read-write transaction against one [`Collection`].
///
/// The filter bitmap starts as a clone of the collection's fill list.
/// Predicate methods narrow it; writes go to per-column commit buffers and
/// are not visible to subsequent reads in the same transaction (spec.md
/// §9 — cooperative iteration with mutation).
pub struct Transaction<'c> {
    pub(crate) collection: &'c Collection,
    filter: RoaringBitmap,
    delete: RoaringBitmap,
    insert: RoaringBitmap,
    dirty: BTreeSet<u32>,
    buffers: FxHashMap<String, CommitBuffer>,
    allocated: Vec<RowHandle>,
}

impl<'c> Transaction<'c> {
    pub(crate) fn new(collection: &'c Collection) -> Self {
        let scratch = collection.scratch_pool().acquire();
        Self {
            collection,
            filter: collection.fill_snapshot(),
            delete: scratch.delete,
            insert: scratch.insert,
            dirty: scratch.dirty,
            buffers: scratch.buffers,
            allocated: scratch.allocated,
        }
    }

    /// Binds this transaction to a single handle, for `QueryAt`/`QueryKey`.
    /// Errors if `handle` is not currently live.
    pub(crate) fn bind_single(collection: &'c Collection, handle: RowHandle) -> Result<Self> {
        let mut txn = Self::new(collection);
        if !txn.filter.contains(handle.0) {
            return Err(Error::NotFound(format!("handle {handle} is not live")));
        }
        txn.filter = RoaringBitmap::new();
        txn.filter.insert(handle.0);
        Ok(txn)
    }

    fn slot_index_bitmap(slot: &std::sync::Arc<ColumnSlot>) -> Option<RoaringBitmap> {
        match slot.as_ref() {
            ColumnSlot::Column(lock) => Some(lock.read().index().clone()),
            ColumnSlot::ComputedIndex(lock) => Some(lock.read().matched().clone()),
            ColumnSlot::SortIndex(_) => None,
        }
    }

    /// `filter = filter AND index(c)` for each named column. An unknown
    /// column clears the filter.
    #[must_use]
    pub fn with(mut self, columns: &[&str]) -> Self {
        let snapshot = self.collection.registry().load();
        for name in columns {
            match snapshot.get(name).and_then(Self::slot_index_bitmap) {
                Some(idx) => self.filter &= idx,
                None => self.filter = RoaringBitmap::new(),
            }
        }
        self
    }

    /// `filter = filter ANDNOT index(c)` for each named column. An unknown
    /// column is ignored.
    #[must_use]
    pub fn without(mut self, columns: &[&str]) -> Self {
        let snapshot = self.collection.registry().load();
        for name in columns {
            if let Some(idx) = snapshot.get(name).and_then(Self::slot_index_bitmap) {
                self.filter -= &idx;
            }
        }
        self
    }

    /// `filter = filter OR index(c)` for each named column. An unknown
    /// column is ignored.
    #[must_use]
    pub fn union(mut self, columns: &[&str]) -> Self {
        let snapshot = self.collection.registry().load();
        for name in columns {
            if let Some(idx) = snapshot.get(name).and_then(Self::slot_index_bitmap) {
                self.filter |= idx;
            }
        }
        self
    }

    /// `filter = filter AND (index(c1) OR index(c2) ...)`.
    #[must_use]
    pub fn with_union(mut self, columns: &[&str]) -> Self {
        let snapshot = self.collection.registry().load();
        let mut union = RoaringBitmap::new();
        for name in columns {
            if let Some(idx) = snapshot.get(name).and_then(Self::slot_index_bitmap) {
                union |= idx;
            }
        }
        self.filter &= union;
        self
    }

    fn with_predicate(mut self, column: &str, pred: &Predicate<'_>) -> Self {
        let snapshot = self.collection.registry().load();
        let restricted = match snapshot.get(column) {
            Some(slot) => match slot.as_ref() {
                ColumnSlot::Column(lock) => lock.read().filter(&self.filter, pred),
                ColumnSlot::ComputedIndex(lock) => lock.read().filter(&self.filter, pred),
                ColumnSlot::SortIndex(_) => RoaringBitmap::new(),
            },
            None => RoaringBitmap::new(),
        };
        self.filter = restricted;
        self
    }

    /// Restricts the filter to handles whose `column` value satisfies
    /// `pred`, interpreted as `i64`.
    #[must_use]
    pub fn with_i64(self, column: &str, pred: &dyn Fn(i64) -> bool) -> Self {
        self.with_predicate(column, &Predicate::I64(pred))
    }

    /// Restricts the filter to handles whose `column` value satisfies
    /// `pred`, interpreted as `u64`.
    #[must_use]
    pub fn with_u64(self, column: &str, pred: &dyn Fn(u64) -> bool) -> Self {
        self.with_predicate(column, &Predicate::U64(pred))
    }

    /// Restricts the filter to handles whose `column` value satisfies
    /// `pred`, interpreted as `f64`.
    #[must_use]
    pub fn with_f64(self, column: &str, pred: &dyn Fn(f64) -> bool) -> Self {
        self.with_predicate(column, &Predicate::F64(pred))
    }

    /// Restricts the filter to handles whose `column` value satisfies
    /// `pred`, interpreted as a string slice.
    #[must_use]
    pub fn with_str(self, column: &str, pred: &dyn Fn(&str) -> bool) -> Self {
        self.with_predicate(column, &Predicate::Str(pred))
    }

    /// Restricts the filter to handles whose `column` value satisfies
    /// `pred`, interpreted as a boolean.
    #[must_use]
    pub fn with_bool(self, column: &str, pred: &dyn Fn(bool) -> bool) -> Self {
        self.with_predicate(column, &Predicate::Bool(pred))
    }

    /// Restricts the filter to handles whose `column` value satisfies
    /// `pred`, evaluated against the dynamic [`Value`].
    #[must_use]
    pub fn with_value(self, column: &str, pred: &dyn Fn(&Value) -> bool) -> Self {
        self.with_predicate(column, &Predicate::Value(pred))
    }

    /// Population count of the filter.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.filter.len()
    }

    /// Iterates the filter in ascending handle order, chunk by chunk.
    pub fn range(&self, mut f: impl FnMut(RowHandle)) {
        for chunk in bitmap::touched_chunks(&self.filter) {
            let slice = bitmap::chunk_slice(&self.filter, chunk);
            for h in slice.iter() {
                f(RowHandle(h));
            }
        }
    }

    /// Iterates the filter, handing each handle to `f` through a read-only
    /// [`Selector`].
    pub fn select(&self, mut f: impl FnMut(Selector<'_, 'c>)) {
        self.range(|h| f(Selector { txn: self, handle: h }));
    }

    /// The first handle in the filter, in ascending handle order. Mainly
    /// useful for `QueryAt`/`QueryKey` transactions, whose filter is a
    /// single handle.
    #[must_use]
    pub fn select_first(&self) -> Option<RowHandle> {
        self.filter.min().map(RowHandle)
    }

    /// Iterates the handles in `index_name`'s sort order, restricted to
    /// handles currently in the filter.
    ///
    /// # Errors
    /// Returns [`Error::NoSuchColumn`] if `index_name` does not name a
    /// sort index.
    pub fn sorted_range(&self, index_name: &str, mut f: impl FnMut(RowHandle)) -> Result<()> {
        let snapshot = self.collection.registry().load();
        let slot = snapshot
            .get(index_name)
            .ok_or_else(|| Error::NoSuchColumn(index_name.to_string()))?;
        let ColumnSlot::SortIndex(lock) = slot.as_ref() else {
            return Err(Error::TypeMismatch {
                column: index_name.to_string(),
                expected: "sort-index".into(),
                found: slot.kind().to_string(),
            });
        };
        let guard = lock.read();
        for h in guard.iter_ascending() {
            if self.filter.contains(h.0) {
                f(h);
            }
        }
        Ok(())
    }

    fn with_numeric<T: Numeric, R>(
        &self,
        column: &str,
        f: impl FnOnce(&NumericColumn<T>) -> R,
    ) -> Result<R> {
        let snapshot = self.collection.registry().load();
        let slot = snapshot
            .get(column)
            .ok_or_else(|| Error::NoSuchColumn(column.to_string()))?;
        let ColumnSlot::Column(lock) = slot.as_ref() else {
            return Err(Error::TypeMismatch {
                column: column.to_string(),
                expected: "numeric".into(),
                found: slot.kind().to_string(),
            });
        };
        let guard = lock.read();
        let numeric = guard.as_any().downcast_ref::<NumericColumn<T>>().ok_or_else(|| {
            Error::TypeMismatch {
                column: column.to_string(),
                expected: "numeric".into(),
                found: guard.kind().to_string(),
            }
        })?;
        Ok(f(numeric))
    }

    /// Reads the value of a numeric `column` at `handle`.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`] if `column` is not a numeric column
    /// of type `T`.
    pub fn get<T: Numeric>(&self, column: &str, handle: RowHandle) -> Result<Option<T>> {
        self.with_numeric::<T, _>(column, |c| c.get(handle))
    }

    /// Sum of a numeric `column` over the filter.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`] if `column` is not numeric type `T`.
    pub fn sum<T: Numeric>(&self, column: &str) -> Result<T> {
        self.with_numeric::<T, _>(column, |c| c.sum(&self.filter))
    }

    /// Mean of a numeric `column` over the filter.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`] if `column` is not numeric type `T`.
    pub fn avg<T: Numeric>(&self, column: &str) -> Result<f64> {
        self.with_numeric::<T, _>(column, |c| c.avg(&self.filter))
    }

    /// Minimum of a numeric `column` over the filter.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`] if `column` is not numeric type `T`.
    pub fn min<T: Numeric>(&self, column: &str) -> Result<Option<T>> {
        self.with_numeric::<T, _>(column, |c| c.min(&self.filter))
    }

    /// Maximum of a numeric `column` over the filter.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`] if `column` is not numeric type `T`.
    pub fn max<T: Numeric>(&self, column: &str) -> Result<Option<T>> {
        self.with_numeric::<T, _>(column, |c| c.max(&self.filter))
    }

    fn buffer_for(&mut self, column: &str) -> &mut CommitBuffer {
        self.buffers
            .entry(column.to_string())
            .or_insert_with(|| CommitBuffer::new(column))
    }

    /// Opens a writer for a freshly allocated row; appends `handle` to the
    /// insert bitmap.
    pub fn insert_row(&mut self) -> RowWriter<'_, 'c> {
        let handle = self.collection.allocate_handle();
        self.insert.insert(handle.0);
        self.allocated.push(handle);
        self.dirty.insert(chunk_of(handle.0));
        RowWriter { txn: self, handle, mode: WriteMode::Insert }
    }

    /// Opens a writer bound to `handle`'s insert slot without allocating a
    /// fresh handle (used when the caller already reserved one, e.g.
    /// `UpsertKey` reusing an existing row).
    pub(crate) fn insert_row_at(&mut self, handle: RowHandle) -> RowWriter<'_, 'c> {
        self.insert.insert(handle.0);
        self.allocated.push(handle);
        self.dirty.insert(chunk_of(handle.0));
        RowWriter { txn: self, handle, mode: WriteMode::Insert }
    }

    /// Opens a writer for an existing, live row.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if `handle` is not in the filter.
    pub fn update_row(&mut self, handle: RowHandle) -> Result<RowWriter<'_, 'c>> {
        if !self.filter.contains(handle.0) {
            return Err(Error::NotFound(format!("handle {handle} is not live")));
        }
        self.dirty.insert(chunk_of(handle.0));
        Ok(RowWriter { txn: self, handle, mode: WriteMode::Update })
    }

    /// Marks `handle` for deletion at commit.
    ///
    /// # Errors
    /// Returns `Ok(false)` if `handle` is not currently in the filter.
    pub fn delete_at(&mut self, handle: RowHandle) -> Result<bool> {
        if !self.filter.contains(handle.0) {
            return Ok(false);
        }
        self.delete.insert(handle.0);
        self.dirty.insert(chunk_of(handle.0));
        Ok(true)
    }

    /// Marks every handle in the filter for which `pred` holds for
    /// deletion at commit.
    pub fn delete_if(&mut self, mut pred: impl FnMut(&Selector<'_, 'c>) -> bool) {
        let handles: Vec<u32> = self.filter.iter().collect();
        for h in handles {
            let matched = {
                let selector = Selector { txn: self, handle: RowHandle(h) };
                pred(&selector)
            };
            if matched {
                self.delete.insert(h);
                self.dirty.insert(chunk_of(h));
            }
        }
    }

    /// Marks every handle currently in the filter for deletion at commit.
    pub fn delete_all(&mut self) {
        let handles: Vec<u32> = self.filter.iter().collect();
        for h in handles {
            self.delete.insert(h);
            self.dirty.insert(chunk_of(h));
        }
    }

    /// Discards this transaction's state, freeing any handles it
    /// allocated this transaction back to the fill list.
    pub fn rollback(self) {
        for handle in &self.allocated {
            self.collection.release_handle(*handle);
        }
    }

    /// Applies the transaction atomically, chunk by chunk (spec.md §4.4).
    ///
    /// # Errors
    /// Returns an error (and leaves the collection unmodified) if applying
    /// a buffered operation fails, e.g. a value that does not narrow to
    /// its column's type.
    pub fn commit(self) -> Result<()> {
        let span = tracing::info_span!("commit", collection = self.collection.name());
        let _enter = span.enter();

        let snapshot = self.collection.registry().load();
        let sink = self.collection.replication_sink();

        for chunk in &self.dirty {
            let chunk = *chunk;
            let deletes_c = bitmap::chunk_slice(&self.delete, chunk);
            let inserts_c = bitmap::chunk_slice(&self.insert, chunk);

            for entry in &snapshot.entries {
                match entry.slot.as_ref() {
                    ColumnSlot::Column(lock) => lock.write().delete(chunk, &self.delete),
                    ColumnSlot::ComputedIndex(lock) => lock.write().delete(chunk, &self.delete),
                    ColumnSlot::SortIndex(lock) => {
                        let mut idx = lock.write();
                        for h in deletes_c.iter() {
                            idx.remove(RowHandle(h));
                        }
                    }
                }
            }

            for (column_name, buffer) in &self.buffers {
                let ops = buffer.chunk_ops(chunk);
                if ops.is_empty() {
                    continue;
                }
                let Some(slot) = snapshot.get(column_name) else {
                    continue;
                };
                let ColumnSlot::Column(lock) = slot.as_ref() else {
                    continue;
                };

                {
                    let mut guard = lock.write();
                    guard.apply(chunk, ops)?;
                }

                let bindings = self.collection.index_bindings(column_name);
                if !bindings.is_empty() {
                    let touched: Vec<RowHandle> = ops.iter().map(|(h, _)| *h).collect();
                    let guard = lock.read();
                    for index_name in bindings {
                        let Some(index_slot) = snapshot.get(&index_name) else {
                            continue;
                        };
                        match index_slot.as_ref() {
                            ColumnSlot::ComputedIndex(idx_lock) => {
                                let mut idx = idx_lock.write();
                                for h in &touched {
                                    let (value, _) = guard.value(*h);
                                    idx.reeval(*h, value.as_ref());
                                }
                            }
                            ColumnSlot::SortIndex(idx_lock) => {
                                let mut idx = idx_lock.write();
                                for h in &touched {
                                    let (value, _) = guard.value(*h);
                                    idx.reeval(*h, value.as_ref());
                                }
                            }
                            ColumnSlot::Column(_) => {}
                        }
                    }
                }
            }

            let new_count = self.collection.apply_fill_delta(&deletes_c, &inserts_c);

            if let Some(sink) = &sink {
                let mut dirty_bitmap = inserts_c.clone();
                dirty_bitmap |= &deletes_c;
                let mut updates: Vec<CommitBuffer> = Vec::new();
                for b in self.buffers.values() {
                    let ops = b.chunk_ops(chunk);
                    if ops.is_empty() {
                        continue;
                    }
                    let mut slice = CommitBuffer::new(b.column.clone());
                    for (h, op) in ops {
                        dirty_bitmap.insert(h.0);
                        slice.push(*h, op.clone());
                    }
                    updates.push(slice);
                }
                let kind = CommitRecord::kind_of(&inserts_c, &deletes_c, &updates);
                sink.write(&CommitRecord {
                    kind,
                    chunk,
                    dirty: dirty_bitmap,
                    inserts: inserts_c.clone(),
                    deletes: deletes_c.clone(),
                    updates,
                })?;
            }

            tracing::debug!(
                chunk,
                inserts = inserts_c.len(),
                deletes = deletes_c.len(),
                live = new_count,
                "chunk committed"
            );
        }

        Ok(())
    }

    /// Merges one decoded commit buffer into this transaction's replay
    /// state: the synthetic fill-list buffer feeds the insert bitmap
    /// directly, everything else is queued as an ordinary column buffer
    /// (spec.md §4.5, §6).
    pub(crate) fn replay_buffer(&mut self, buffer: CommitBuffer) {
        if buffer.column == crate::commit::FILL_BUFFER_NAME {
            for chunk in buffer.touched_chunks() {
                self.dirty.insert(chunk);
                for (_, op) in buffer.chunk_ops(chunk) {
                    if let Op::PutBitmap(bitmap) = op {
                        self.insert |= bitmap;
                    }
                }
            }
            return;
        }

        let target = self
            .buffers
            .entry(buffer.column.clone())
            .or_insert_with(|| CommitBuffer::new(buffer.column.clone()));
        for chunk in buffer.touched_chunks() {
            self.dirty.insert(chunk);
            for (handle, op) in buffer.chunk_ops(chunk) {
                target.push(*handle, op.clone());
            }
        }
    }

    /// Marks a whole chunk record (inserts/deletes from a [`CommitRecord`])
    /// as part of this transaction's replay state, used by
    /// [`Collection::replay`].
    pub(crate) fn replay_record(&mut self, record: &CommitRecord) {
        self.dirty.insert(record.chunk);
        self.insert |= &record.inserts;
        self.delete |= &record.deletes;
    }
}

impl<'c> Drop for Transaction<'c> {
    fn drop(&mut self) {
        self.collection.scratch_pool().release(crate::pool::TransactionScratch {
            delete: std::mem::take(&mut self.delete),
            insert: std::mem::take(&mut self.insert),
            dirty: std::mem::take(&mut self.dirty),
            buffers: std::mem::take(&mut self.buffers),
            allocated: std::mem::take(&mut self.allocated),
        });
    }
}

/// A handle-bound write cursor, borrowed from a [`Transaction`].
pub struct RowWriter<'t, 'c> {
    txn: &'t mut Transaction<'c>,
    handle: RowHandle,
    mode: WriteMode,
}

impl<'t, 'c> RowWriter<'t, 'c> {
    /// The handle this writer targets.
    #[must_use]
    pub fn handle(&self) -> RowHandle {
        self.handle
    }

    /// Overwrites (or, for a freshly inserted row, initializes) `column`'s
    /// value at this handle.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        let op = match self.mode {
            WriteMode::Insert => Op::Insert(value.into()),
            WriteMode::Update => Op::Put(value.into()),
        };
        self.txn.buffer_for(column).push(self.handle, op);
    }

    /// Combines `value` with the existing payload via the column's merge
    /// function.
    pub fn merge(&mut self, column: &str, value: impl Into<Value>) {
        self.txn.buffer_for(column).push(self.handle, Op::Merge(value.into()));
    }

    /// Reads `column`'s current, pre-transaction value at this handle.
    ///
    /// # Errors
    /// Returns [`Error::NoSuchColumn`] if `column` is not registered.
    pub fn get(&self, column: &str) -> Result<Option<Value>> {
        let selector = Selector { txn: self.txn, handle: self.handle };
        selector.get(column)
    }
}

/// A read-only cursor over one handle, bound to a transaction's filter
/// view.
pub struct Selector<'t, 'c> {
    txn: &'t Transaction<'c>,
    handle: RowHandle,
}

impl<'t, 'c> Selector<'t, 'c> {
    /// The handle this selector reads.
    #[must_use]
    pub fn handle(&self) -> RowHandle {
        self.handle
    }

    /// Reads `column`'s current value at this handle.
    ///
    /// # Errors
    /// Returns [`Error::NoSuchColumn`] if `column` is not registered, or
    /// [`Error::TypeMismatch`] if `column` names a sort index.
    pub fn get(&self, column: &str) -> Result<Option<Value>> {
        let snapshot = self.txn.collection.registry().load();
        let slot = snapshot
            .get(column)
            .ok_or_else(|| Error::NoSuchColumn(column.to_string()))?;
        match slot.as_ref() {
            ColumnSlot::Column(lock) => Ok(lock.read().value(self.handle).0),
            ColumnSlot::ComputedIndex(lock) => Ok(lock.read().value(self.handle).0),
            ColumnSlot::SortIndex(_) => Err(Error::TypeMismatch {
                column: column.to_string(),
                expected: "value".into(),
                found: "sort-index".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::collection::Collection;
    use crate::column::ColumnKind;
    use crate::value::Value;

    fn fixture_collection() -> Collection {
        let collection = Collection::new("players");
        collection.create_column("name", ColumnKind::String).unwrap();
        collection.create_column("age", ColumnKind::Float64).unwrap();
        collection.create_column("race", ColumnKind::Enum).unwrap();
        collection
            .create_index("human", "race", |v| v.as_str().map(|s| s == "human").unwrap_or(false))
            .unwrap();
        collection
    }

    #[test]
    fn insert_then_with_filters_by_index() {
        let collection = fixture_collection();
        collection
            .insert(|row| {
                row.set("name", "alice");
                row.set("age", 30.0);
                row.set("race", Value::Enum("human".into()));
                Ok(())
            })
            .unwrap();
        collection
            .insert(|row| {
                row.set("name", "grog");
                row.set("age", 40.0);
                row.set("race", Value::Enum("orc".into()));
                Ok(())
            })
            .unwrap();

        assert_eq!(collection.count(), 2);
        let txn = collection.query().with(&["human"]);
        assert_eq!(txn.count(), 1);
    }

    #[test]
    fn rollback_on_callback_error_frees_the_handle() {
        let collection = fixture_collection();
        let before = collection.count();
        let result = collection.insert(|row| {
            row.set("name", "broken");
            Err(crate::error::Error::UserAbort("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(collection.count(), before);
    }

    #[test]
    fn delete_all_then_commit_clears_count() {
        let collection = fixture_collection();
        collection
            .insert(|row| {
                row.set("name", "alice");
                row.set("age", 30.0);
                row.set("race", Value::Enum("human".into()));
                Ok(())
            })
            .unwrap();

        let mut txn = collection.query();
        txn.delete_all();
        txn.commit().unwrap();

        assert_eq!(collection.count(), 0);
    }

    #[test]
    fn sum_over_filter_matches_inserted_values() {
        let collection = fixture_collection();
        collection
            .insert(|row| {
                row.set("name", "alice");
                row.set("age", 10.0);
                row.set("race", Value::Enum("human".into()));
                Ok(())
            })
            .unwrap();
        collection
            .insert(|row| {
                row.set("name", "bob");
                row.set("age", 20.0);
                row.set("race", Value::Enum("human".into()));
                Ok(())
            })
            .unwrap();

        let txn = collection.query();
        let sum: f64 = txn.sum::<f64>("age").unwrap();
        assert!((sum - 30.0).abs() < f64::EPSILON);
    }
}
