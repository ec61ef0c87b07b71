//! Collection: the registry of columns and indexes for one fixed-schema
//! row set, plus the handle allocator and fill list every [`Transaction`]
//! reads and writes against (spec.md §4.3).

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

use crate::column::{
    AnyColumn, BoolColumn, ColumnKind, ColumnOps, ColumnSlot, ComputedIndexColumn, EnumColumn,
    EnumDictionary, KeyColumn, NumericColumn, Record, RecordColumn, Registry, SortIndexColumn,
    StringColumn,
};
use crate::error::{Error, Result};
use crate::handle::RowHandle;
use crate::pool::{ScratchPool, DEFAULT_POOL_CAPACITY};
use crate::replication::{CommitRecord, ReplicationSink};
use crate::transaction::{RowWriter, Transaction};
use crate::value::Value;

/// Name of the TTL column lazily created by the first `insert_with_ttl`
/// call. Not accessible through ordinary column lookups by convention only
/// (nothing stops a caller from naming a real column `__ttl__`, but no
/// caller should).
pub(crate) const TTL_COLUMN_NAME: &str = "__ttl__";

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// First-zero-slot-else-grow handle allocator (spec.md §4.3): freed
/// handles are reused before a fresh one is minted off the monotonic
/// watermark, so the dense-handle invariant holds without the O(handle
/// count) bit scan a literal "first clear bit" search would require.
#[derive(Default)]
struct HandleAllocator {
    next: AtomicU32,
    freed: Mutex<BTreeSet<u32>>,
}

impl HandleAllocator {
    fn allocate(&self) -> RowHandle {
        let mut freed = self.freed.lock();
        if let Some(&h) = freed.iter().next() {
            freed.remove(&h);
            return RowHandle(h);
        }
        drop(freed);
        RowHandle(self.next.fetch_add(1, Ordering::SeqCst))
    }

    fn release(&self, handle: RowHandle) {
        self.freed.lock().insert(handle.0);
    }
}

/// Tunable parameters accepted by [`Collection::with_options`]
/// (spec.md §6).
#[derive(Default)]
pub struct CollectionOptions {
    /// Initial fill-list reservation hint. `roaring::RoaringBitmap` needs
    /// no pre-reservation to stay compact; accepted for interface parity
    /// with spec.md §6 and otherwise unused.
    pub capacity: Option<u32>,
    /// TTL vacuum sweep period. `None` leaves the background sweep
    /// unconfigured; see `vacuum::spawn`.
    pub vacuum: Option<Duration>,
    /// Replication sink notified of every committed chunk.
    pub writer: Option<Arc<dyn ReplicationSink>>,
    /// Bounded capacity of the transaction scratch pool.
    pub pool_capacity: Option<usize>,
}

/// A fixed-schema, column-oriented row set addressed by dense
/// [`RowHandle`]s.
pub struct Collection {
    name: String,
    registry: Registry,
    fill: RwLock<RoaringBitmap>,
    count: AtomicU64,
    handles: HandleAllocator,
    bindings: RwLock<FxHashMap<String, Vec<String>>>,
    key_column: RwLock<Option<String>>,
    ttl_column: RwLock<Option<String>>,
    enum_dictionary: Arc<EnumDictionary>,
    replication: Option<Arc<dyn ReplicationSink>>,
    scratch_pool: ScratchPool,
    vacuum_period: Option<Duration>,
}

impl Collection {
    /// Creates an empty, unconfigured collection named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, CollectionOptions::default())
    }

    /// Creates an empty collection with the given [`CollectionOptions`].
    #[must_use]
    pub fn with_options(name: impl Into<String>, options: CollectionOptions) -> Self {
        Self {
            name: name.into(),
            registry: Registry::new(),
            fill: RwLock::new(RoaringBitmap::new()),
            count: AtomicU64::new(0),
            handles: HandleAllocator::default(),
            bindings: RwLock::new(FxHashMap::default()),
            key_column: RwLock::new(None),
            ttl_column: RwLock::new(None),
            enum_dictionary: EnumDictionary::new(),
            replication: options.writer,
            scratch_pool: ScratchPool::new(options.pool_capacity.unwrap_or(DEFAULT_POOL_CAPACITY)),
            vacuum_period: options.vacuum,
        }
    }

    /// The collection's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows currently live.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// The configured TTL vacuum sweep period, if any.
    #[must_use]
    pub fn vacuum_period(&self) -> Option<Duration> {
        self.vacuum_period
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn scratch_pool(&self) -> &ScratchPool {
        &self.scratch_pool
    }

    pub(crate) fn replication_sink(&self) -> Option<Arc<dyn ReplicationSink>> {
        self.replication.clone()
    }

    pub(crate) fn fill_snapshot(&self) -> RoaringBitmap {
        self.fill.read().clone()
    }

    /// Names of every computed/sort index bound to `column`, i.e. created
    /// via `create_index`/`create_sort_index` with `column` as the source.
    pub(crate) fn index_bindings(&self, column: &str) -> Vec<String> {
        self.bindings.read().get(column).cloned().unwrap_or_default()
    }

    pub(crate) fn allocate_handle(&self) -> RowHandle {
        self.handles.allocate()
    }

    pub(crate) fn release_handle(&self, handle: RowHandle) {
        self.handles.release(handle);
    }

    /// Applies one chunk's worth of delete/insert bitmaps to the fill list
    /// and returns the new total live count (spec.md §4.4 step 4).
    pub(crate) fn apply_fill_delta(&self, deletes: &RoaringBitmap, inserts: &RoaringBitmap) -> u64 {
        let mut fill = self.fill.write();
        *fill -= deletes;
        *fill |= inserts;
        let count = fill.len();
        self.count.store(count, Ordering::SeqCst);
        count
    }

    fn detach_bindings(&self, index_name: &str) {
        let mut bindings = self.bindings.write();
        for indexes in bindings.values_mut() {
            indexes.retain(|n| n != index_name);
        }
        bindings.retain(|_, v| !v.is_empty());
    }

    fn require_key_column(&self) -> Result<String> {
        self.key_column
            .read()
            .clone()
            .ok_or_else(|| Error::InvalidArgument("collection has no key column".into()))
    }

    fn lookup_key(&self, key_column: &str, key: &str) -> Result<Option<RowHandle>> {
        let snapshot = self.registry.load();
        let slot = snapshot
            .get(key_column)
            .ok_or_else(|| Error::NoSuchColumn(key_column.to_string()))?;
        let ColumnSlot::Column(lock) = slot.as_ref() else {
            return Err(Error::TypeMismatch {
                column: key_column.to_string(),
                expected: "key".into(),
                found: slot.kind().to_string(),
            });
        };
        let guard = lock.read();
        let key_col = guard.as_any().downcast_ref::<KeyColumn>().ok_or_else(|| Error::TypeMismatch {
            column: key_column.to_string(),
            expected: "key".into(),
            found: guard.kind().to_string(),
        })?;
        Ok(key_col.lookup(key))
    }

    fn ensure_ttl_column(&self) -> Result<()> {
        let mut ttl = self.ttl_column.write();
        if ttl.is_none() {
            if !self.registry.load().contains(TTL_COLUMN_NAME) {
                self.create_column(TTL_COLUMN_NAME, ColumnKind::Uint64)?;
            }
            *ttl = Some(TTL_COLUMN_NAME.to_string());
        }
        Ok(())
    }

    /// Registers a new column of `kind` under `name`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `name` is empty or `kind` is
    /// one of the factory-only kinds (`Record`, `ComputedIndex`,
    /// `SortIndex`); returns [`Error::DuplicateColumn`] if `name` is
    /// already registered, or if `kind` is `Key` and this collection
    /// already has a key column.
    pub fn create_column(&self, name: &str, kind: ColumnKind) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("column name must not be empty".into()));
        }
        if self.registry.load().contains(name) {
            return Err(Error::DuplicateColumn(name.to_string()));
        }
        if matches!(kind, ColumnKind::Key) && self.key_column.read().is_some() {
            return Err(Error::DuplicateColumn(
                "collection already has a key column".into(),
            ));
        }

        let boxed: Box<dyn ColumnOps> = match kind {
            ColumnKind::Key => Box::new(KeyColumn::new()),
            ColumnKind::Bool => Box::new(BoolColumn::new()),
            ColumnKind::String => Box::new(StringColumn::new()),
            ColumnKind::Enum => Box::new(EnumColumn::new(self.enum_dictionary.clone())),
            ColumnKind::Int16 => Box::new(NumericColumn::<i16>::new()),
            ColumnKind::Int32 => Box::new(NumericColumn::<i32>::new()),
            ColumnKind::Int64 => Box::new(NumericColumn::<i64>::new()),
            ColumnKind::Uint16 => Box::new(NumericColumn::<u16>::new()),
            ColumnKind::Uint32 => Box::new(NumericColumn::<u32>::new()),
            ColumnKind::Uint64 => Box::new(NumericColumn::<u64>::new()),
            ColumnKind::Float32 => Box::new(NumericColumn::<f32>::new()),
            ColumnKind::Float64 => Box::new(NumericColumn::<f64>::new()),
            ColumnKind::Any => Box::new(AnyColumn::new()),
            ColumnKind::Record => {
                return Err(Error::InvalidArgument(
                    "Record columns are created via create_record_column".into(),
                ));
            }
            ColumnKind::ComputedIndex => {
                return Err(Error::InvalidArgument(
                    "computed indexes are created via create_index".into(),
                ));
            }
            ColumnKind::SortIndex => {
                return Err(Error::InvalidArgument(
                    "sort indexes are created via create_sort_index".into(),
                ));
            }
        };

        self.registry.register(name, ColumnSlot::Column(RwLock::new(boxed)))?;
        if matches!(kind, ColumnKind::Key) {
            *self.key_column.write() = Some(name.to_string());
        }
        Ok(())
    }

    /// Registers a `Record` column of caller-marshaled type `R` under
    /// `name`.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateColumn`] if `name` is already registered.
    pub fn create_record_column<R: Record>(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("column name must not be empty".into()));
        }
        if self.registry.load().contains(name) {
            return Err(Error::DuplicateColumn(name.to_string()));
        }
        self.registry
            .register(name, ColumnSlot::Column(RwLock::new(Box::new(RecordColumn::<R>::new()))))
    }

    /// Bulk-creates one column per entry of `template`, inferring
    /// [`ColumnKind`] from each [`Value`] variant. Rust has no runtime
    /// struct reflection, so this template map stands in for the
    /// struct-tag scan the design this is distilled from performs.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if a template value is
    /// [`Value::Null`] (no kind can be inferred from it), or any error
    /// `create_column` would return for an individual entry.
    pub fn create_columns_of(&self, template: &HashMap<String, Value>) -> Result<()> {
        for (name, value) in template {
            let kind = match value {
                Value::I64(_) => ColumnKind::Int64,
                Value::U64(_) => ColumnKind::Uint64,
                Value::F64(_) => ColumnKind::Float64,
                Value::Str(_) => ColumnKind::String,
                Value::Enum(_) => ColumnKind::Enum,
                Value::Bool(_) => ColumnKind::Bool,
                Value::Bytes(_) => ColumnKind::Any,
                Value::Null => {
                    return Err(Error::InvalidArgument(format!(
                        "cannot infer a column kind for '{name}' from a null template value"
                    )));
                }
            };
            self.create_column(name, kind)?;
        }
        Ok(())
    }

    /// Drops `name`, detaching it as both a column and (if applicable) an
    /// index source. No-op if `name` is not registered.
    pub fn drop_column(&self, name: &str) {
        self.registry.remove(name);
        {
            let mut key_column = self.key_column.write();
            if key_column.as_deref() == Some(name) {
                *key_column = None;
            }
        }
        {
            let mut ttl_column = self.ttl_column.write();
            if ttl_column.as_deref() == Some(name) {
                *ttl_column = None;
            }
        }
        self.detach_bindings(name);
    }

    /// Drops the computed or sort index named `name`, detaching it from
    /// its source column's binding list. No-op if `name` is not
    /// registered.
    pub fn drop_index(&self, name: &str) {
        self.registry.remove(name);
        self.detach_bindings(name);
    }

    /// Creates a computed-index column named `index_name`, matching rows
    /// of `source` where `pred` holds, backfilled over every currently
    /// live row.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateColumn`] if `index_name` is already
    /// registered, or [`Error::NoSuchColumn`]/[`Error::TypeMismatch`] if
    /// `source` does not name a data column.
    pub fn create_index(
        &self,
        index_name: &str,
        source: &str,
        pred: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Result<()> {
        if index_name.is_empty() {
            return Err(Error::InvalidArgument("index name must not be empty".into()));
        }
        let snapshot = self.registry.load();
        if snapshot.contains(index_name) {
            return Err(Error::DuplicateColumn(index_name.to_string()));
        }
        let Some(source_slot) = snapshot.get(source) else {
            return Err(Error::NoSuchColumn(source.to_string()));
        };
        let ColumnSlot::Column(lock) = source_slot.as_ref() else {
            return Err(Error::TypeMismatch {
                column: source.to_string(),
                expected: "data column".into(),
                found: source_slot.kind().to_string(),
            });
        };

        let mut index_column = ComputedIndexColumn::new(source, pred);
        {
            let guard = lock.read();
            for h in self.fill_snapshot().iter() {
                let handle = RowHandle(h);
                let (value, _) = guard.value(handle);
                index_column.reeval(handle, value.as_ref());
            }
        }

        self.registry
            .register(index_name, ColumnSlot::ComputedIndex(RwLock::new(index_column)))?;
        self.bindings
            .write()
            .entry(source.to_string())
            .or_default()
            .push(index_name.to_string());
        Ok(())
    }

    /// Creates a sort-index column named `index_name` over `source`'s
    /// ordered values, backfilled over every currently live row.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateColumn`] if `index_name` is already
    /// registered, or [`Error::NoSuchColumn`]/[`Error::TypeMismatch`] if
    /// `source` does not name a data column.
    pub fn create_sort_index(&self, index_name: &str, source: &str) -> Result<()> {
        if index_name.is_empty() {
            return Err(Error::InvalidArgument("index name must not be empty".into()));
        }
        let snapshot = self.registry.load();
        if snapshot.contains(index_name) {
            return Err(Error::DuplicateColumn(index_name.to_string()));
        }
        let Some(source_slot) = snapshot.get(source) else {
            return Err(Error::NoSuchColumn(source.to_string()));
        };
        let ColumnSlot::Column(lock) = source_slot.as_ref() else {
            return Err(Error::TypeMismatch {
                column: source.to_string(),
                expected: "data column".into(),
                found: source_slot.kind().to_string(),
            });
        };

        let mut sort_column = SortIndexColumn::new(source);
        {
            let guard = lock.read();
            for h in self.fill_snapshot().iter() {
                let handle = RowHandle(h);
                let (value, _) = guard.value(handle);
                sort_column.reeval(handle, value.as_ref());
            }
        }

        self.registry
            .register(index_name, ColumnSlot::SortIndex(RwLock::new(sort_column)))?;
        self.bindings
            .write()
            .entry(source.to_string())
            .or_default()
            .push(index_name.to_string());
        Ok(())
    }

    /// Runs `f` against a freshly allocated row inside its own
    /// transaction, committing on `Ok` and rolling back (freeing the
    /// handle) on `Err` (spec.md §4.3).
    ///
    /// # Errors
    /// Propagates `f`'s error, or any error `Transaction::commit` returns.
    pub fn insert(&self, f: impl FnOnce(&mut RowWriter) -> Result<()>) -> Result<()> {
        let mut txn = Transaction::new(self);
        let result = {
            let mut writer = txn.insert_row();
            f(&mut writer)
        };
        match result {
            Ok(()) => txn.commit(),
            Err(err) => {
                txn.rollback();
                Err(err)
            }
        }
    }

    /// Like [`Self::insert`], but also stamps the row with a TTL column
    /// entry that expires `ttl` from now. Lazily creates the TTL column
    /// on first use.
    ///
    /// # Errors
    /// Propagates `f`'s error, or any error `Transaction::commit` returns.
    pub fn insert_with_ttl(
        &self,
        f: impl FnOnce(&mut RowWriter) -> Result<()>,
        ttl: Duration,
    ) -> Result<()> {
        self.ensure_ttl_column()?;
        let expires_at = now_unix_secs().saturating_add(ttl.as_secs());

        let mut txn = Transaction::new(self);
        let result = {
            let mut writer = txn.insert_row();
            writer.set(TTL_COLUMN_NAME, expires_at);
            f(&mut writer)
        };
        match result {
            Ok(()) => txn.commit(),
            Err(err) => {
                txn.rollback();
                Err(err)
            }
        }
    }

    /// Like [`Self::insert`], but also assigns `key` on the collection's
    /// key column.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if this collection has no key
    /// column or `key` is already assigned to a live row; otherwise
    /// propagates `f`'s error or a commit error.
    pub fn insert_key(&self, key: &str, f: impl FnOnce(&mut RowWriter) -> Result<()>) -> Result<()> {
        let key_column = self.require_key_column()?;
        if self.lookup_key(&key_column, key)?.is_some() {
            return Err(Error::InvalidArgument(format!("key '{key}' already exists")));
        }

        let mut txn = Transaction::new(self);
        let result = {
            let mut writer = txn.insert_row();
            writer.set(&key_column, key);
            f(&mut writer)
        };
        match result {
            Ok(()) => txn.commit(),
            Err(err) => {
                txn.rollback();
                Err(err)
            }
        }
    }

    /// Inserts a fresh row under `key` if it does not exist yet, otherwise
    /// updates the existing row in place.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if this collection has no key
    /// column; otherwise propagates `f`'s error or a commit error.
    pub fn upsert_key(&self, key: &str, f: impl FnOnce(&mut RowWriter) -> Result<()>) -> Result<()> {
        let key_column = self.require_key_column()?;
        let existing = self.lookup_key(&key_column, key)?;

        let mut txn = Transaction::new(self);
        let result = match existing {
            Some(handle) => match txn.update_row(handle) {
                Ok(mut writer) => f(&mut writer),
                Err(err) => Err(err),
            },
            None => {
                let mut writer = txn.insert_row();
                writer.set(&key_column, key);
                f(&mut writer)
            }
        };
        match result {
            Ok(()) => txn.commit(),
            Err(err) => {
                txn.rollback();
                Err(err)
            }
        }
    }

    /// Opens a read-write transaction over every currently live row.
    #[must_use]
    pub fn query(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Opens a read-write transaction bound to a single handle.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if `handle` is not currently live.
    pub fn query_at(&self, handle: RowHandle) -> Result<Transaction<'_>> {
        Transaction::bind_single(self, handle)
    }

    /// Opens a read-write transaction bound to the row owning `key`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if this collection has no key
    /// column, or [`Error::NotFound`] if `key` does not name a live row.
    pub fn query_key(&self, key: &str) -> Result<Transaction<'_>> {
        let key_column = self.require_key_column()?;
        let handle = self
            .lookup_key(&key_column, key)?
            .ok_or_else(|| Error::NotFound(format!("key '{key}'")))?;
        self.query_at(handle)
    }

    /// Deletes `handle` in its own transaction. Returns `false` (without
    /// error) if `handle` was not live.
    ///
    /// # Errors
    /// Propagates any error `Transaction::commit` returns.
    pub fn delete_at(&self, handle: RowHandle) -> Result<bool> {
        let mut txn = Transaction::new(self);
        let deleted = txn.delete_at(handle)?;
        if deleted {
            txn.commit()?;
        } else {
            txn.rollback();
        }
        Ok(deleted)
    }

    /// Deletes the row owning `key` in its own transaction.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if this collection has no key
    /// column, or [`Error::NotFound`] if `key` does not name a live row.
    pub fn delete_key(&self, key: &str) -> Result<()> {
        let key_column = self.require_key_column()?;
        let handle = self
            .lookup_key(&key_column, key)?
            .ok_or_else(|| Error::NotFound(format!("key '{key}'")))?;
        if !self.delete_at(handle)? {
            return Err(Error::NotFound(format!("key '{key}'")));
        }
        Ok(())
    }

    /// Opens a non-transactional read handle bound to `handle`.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if `handle` is not currently live.
    pub fn fetch(&self, handle: RowHandle) -> Result<Fetched<'_>> {
        if !self.fill.read().contains(handle.0) {
            return Err(Error::NotFound(format!("handle {handle} is not live")));
        }
        Ok(Fetched { collection: self, handle })
    }

    /// Replays one externally-received [`CommitRecord`] in its own
    /// transaction, immediately committing it (spec.md §4.5) — the path a
    /// replication consumer uses to mirror a primary's commits.
    ///
    /// # Errors
    /// Propagates any error `Transaction::commit` returns.
    pub fn replay(&self, record: CommitRecord) -> Result<()> {
        let mut txn = Transaction::new(self);
        txn.replay_record(&record);
        for buffer in record.updates {
            txn.replay_buffer(buffer);
        }
        txn.commit()
    }

    /// Sweeps the TTL column (if one has ever been created) for expired
    /// rows and deletes them in a single synthetic transaction. A no-op if
    /// `insert_with_ttl` has never been called.
    ///
    /// # Errors
    /// Propagates any error `Transaction::commit` returns.
    pub fn vacuum_expired(&self) -> Result<()> {
        let Some(ttl_column) = self.ttl_column.read().clone() else {
            return Ok(());
        };
        let now = now_unix_secs();
        let mut txn = Transaction::new(self).with_u64(&ttl_column, &|expires_at| expires_at <= now);
        txn.delete_all();
        txn.commit()
    }
}

/// A non-transactional read cursor bound to one live handle, returned by
/// [`Collection::fetch`]. Reads see the collection's current committed
/// state directly, with no filter composition or deferred writes.
pub struct Fetched<'c> {
    collection: &'c Collection,
    handle: RowHandle,
}

impl<'c> Fetched<'c> {
    /// The handle this cursor reads.
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
        let snapshot = self.collection.registry.load();
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
    use super::*;

    fn fixture() -> Collection {
        let collection = Collection::new("players");
        collection.create_column("id", ColumnKind::Key).unwrap();
        collection.create_column("level", ColumnKind::Int64).unwrap();
        collection
    }

    #[test]
    fn create_column_rejects_duplicate_name() {
        let collection = fixture();
        let result = collection.create_column("level", ColumnKind::Int64);
        assert!(result.is_err());
    }

    #[test]
    fn create_column_rejects_second_key_column() {
        let collection = fixture();
        let result = collection.create_column("other_id", ColumnKind::Key);
        assert!(result.is_err());
    }

    #[test]
    fn insert_key_then_duplicate_key_errors() {
        let collection = fixture();
        collection
            .insert_key("p1", |row| {
                row.set("level", 1_i64);
                Ok(())
            })
            .unwrap();
        let result = collection.insert_key("p1", |row| {
            row.set("level", 2_i64);
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(collection.count(), 1);
    }

    #[test]
    fn upsert_key_creates_then_updates_in_place() {
        let collection = fixture();
        collection
            .upsert_key("p1", |row| {
                row.set("level", 1_i64);
                Ok(())
            })
            .unwrap();
        collection
            .upsert_key("p1", |row| {
                row.set("level", 2_i64);
                Ok(())
            })
            .unwrap();

        assert_eq!(collection.count(), 1);
        let txn = collection.query_key("p1").unwrap();
        let level: Option<i64> = txn.get::<i64>("level", txn.select_first().unwrap()).unwrap();
        assert_eq!(level, Some(2));
    }

    #[test]
    fn delete_at_on_dead_handle_returns_false() {
        let collection = fixture();
        let result = collection.delete_at(RowHandle(12345)).unwrap();
        assert!(!result);
    }

    #[test]
    fn delete_key_on_missing_key_errors() {
        let collection = fixture();
        let result = collection.delete_key("ghost");
        assert!(result.is_err());
    }

    #[test]
    fn fetch_reads_committed_value_without_a_transaction() {
        let collection = fixture();
        collection
            .insert_key("p1", |row| {
                row.set("level", 7_i64);
                Ok(())
            })
            .unwrap();
        let handle = collection.query_key("p1").unwrap().select_first().unwrap();
        let fetched = collection.fetch(handle).unwrap();
        assert_eq!(fetched.get("level").unwrap(), Some(Value::I64(7)));
    }

    #[test]
    fn create_index_backfills_existing_rows() {
        let collection = fixture();
        collection
            .insert_key("p1", |row| {
                row.set("level", 50_i64);
                Ok(())
            })
            .unwrap();
        collection
            .create_index("high_level", "level", |v| v.as_i64().unwrap_or(0) >= 10)
            .unwrap();

        let txn = collection.query().with(&["high_level"]);
        assert_eq!(txn.count(), 1);
    }

    #[test]
    fn drop_index_detaches_from_source_bindings() {
        let collection = fixture();
        collection
            .create_index("high_level", "level", |v| v.as_i64().unwrap_or(0) >= 10)
            .unwrap();
        assert_eq!(collection.index_bindings("level"), vec!["high_level".to_string()]);

        collection.drop_index("high_level");
        assert!(collection.index_bindings("level").is_empty());
    }

    #[test]
    fn vacuum_expired_is_a_no_op_without_a_ttl_column() {
        let collection = fixture();
        collection.vacuum_expired().unwrap();
    }

    #[test]
    fn insert_with_ttl_expires_after_sweep() {
        let collection = fixture();
        collection
            .insert_with_ttl(
                |row| {
                    row.set("level", 1_i64);
                    Ok(())
                },
                Duration::from_secs(0),
            )
            .unwrap();
        assert_eq!(collection.count(), 1);

        collection.vacuum_expired().unwrap();
        assert_eq!(collection.count(), 0);
    }
}
