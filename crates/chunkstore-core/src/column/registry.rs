//! Column registry: lock-free reads via an RCU-published snapshot, with a
//! per-column lock guarding the actual mutation a commit performs
//! (spec.md §4.3, §5).
//!
//! Looking a name up, or enumerating every column, never blocks: readers
//! load an `Arc<RegistrySnapshot>` and walk it without taking any lock.
//! Registering a new column takes `write_lock`, clones the (cheap, Arc-of-
//! pointers) entry vector, and publishes the result via `ArcSwap::swap`.
//! Mutating an existing column's payload (`apply`, `delete`) happens
//! through that column's own `RwLock`, so two commits touching different
//! columns never contend.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use super::{ColumnKind, ColumnOps, ComputedIndexColumn, SortIndexColumn};
use crate::error::{Error, Result};

/// The three storage shapes a registered name can resolve to.
pub enum ColumnSlot {
    /// An ordinary bitmap-algebra column.
    Column(RwLock<Box<dyn ColumnOps>>),
    /// A predicate-derived bitmap over another column.
    ComputedIndex(RwLock<ComputedIndexColumn>),
    /// An ordered key→handle map over another column.
    SortIndex(RwLock<SortIndexColumn>),
}

impl ColumnSlot {
    /// The factory kind this slot reports, without taking its lock where
    /// avoidable.
    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Column(c) => c.read().kind(),
            Self::ComputedIndex(_) => ColumnKind::ComputedIndex,
            Self::SortIndex(_) => ColumnKind::SortIndex,
        }
    }
}

/// One registered name and the slot it resolves to.
pub struct ColumnEntry {
    /// The column's name, unique within a collection.
    pub name: String,
    /// The underlying storage, shared so republishing the snapshot is a
    /// cheap `Arc` clone rather than a deep copy.
    pub slot: Arc<ColumnSlot>,
}

/// An immutable point-in-time view of every registered column.
#[derive(Default)]
pub struct RegistrySnapshot {
    /// Entries in registration order.
    pub entries: Vec<ColumnEntry>,
    index_by_name: FxHashMap<String, usize>,
}

impl RegistrySnapshot {
    fn with_entry(&self, name: String, slot: Arc<ColumnSlot>) -> Self {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        for entry in &self.entries {
            entries.push(ColumnEntry {
                name: entry.name.clone(),
                slot: entry.slot.clone(),
            });
        }
        let index = entries.len();
        entries.push(ColumnEntry { name: name.clone(), slot });

        let mut index_by_name = self.index_by_name.clone();
        index_by_name.insert(name, index);

        Self { entries, index_by_name }
    }

    fn without_entry(&self, name: &str) -> Self {
        let mut entries = Vec::with_capacity(self.entries.len());
        let mut index_by_name = FxHashMap::default();
        for entry in &self.entries {
            if entry.name == name {
                continue;
            }
            index_by_name.insert(entry.name.clone(), entries.len());
            entries.push(ColumnEntry {
                name: entry.name.clone(),
                slot: entry.slot.clone(),
            });
        }
        Self { entries, index_by_name }
    }

    /// Looks up a column's slot by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ColumnSlot>> {
        self.index_by_name.get(name).map(|i| &self.entries[*i].slot)
    }

    /// True if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index_by_name.contains_key(name)
    }
}

/// The collection-level column registry.
#[derive(Default)]
pub struct Registry {
    snapshot: ArcSwap<RegistrySnapshot>,
    write_lock: Mutex<()>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the current snapshot. Lock-free.
    #[must_use]
    pub fn load(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    /// Registers a new column under `name`.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateColumn`] if `name` is already registered.
    pub fn register(&self, name: impl Into<String>, slot: ColumnSlot) -> Result<()> {
        let name = name.into();
        let _guard = self.write_lock.lock();
        let current = self.snapshot.load();
        if current.contains(&name) {
            return Err(Error::DuplicateColumn(name));
        }
        let next = current.with_entry(name, Arc::new(slot));
        self.snapshot.store(Arc::new(next));
        Ok(())
    }

    /// Removes `name` from the registry. No-op if absent, per spec's
    /// `DropColumn`/`DropIndex` contract.
    pub fn remove(&self, name: &str) {
        let _guard = self.write_lock.lock();
        let current = self.snapshot.load();
        if !current.contains(name) {
            return;
        }
        let next = current.without_entry(name);
        self.snapshot.store(Arc::new(next));
    }
}
