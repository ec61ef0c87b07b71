//! `chunkstore-core`: an in-memory, column-oriented data store for
//! high-throughput scan, filter, and point-update workloads over
//! fixed-schema row collections (spec.md §1).
//!
//! Rows are addressed by a dense 32-bit [`handle::RowHandle`]; columns are
//! stored as independent, chunked arrays (`column`) with a parallel
//! presence bitmap. Queries run inside a [`transaction::Transaction`] that
//! composes bitmap-algebra predicates and iterates selected rows through
//! typed cursors. Writes are buffered in a transaction-local
//! [`commit::CommitBuffer`] and applied atomically per-chunk at commit; on
//! error the transaction is discarded. A [`replication::ReplicationSink`]
//! can stream committed chunk deltas to an external writer, and a whole
//! [`collection::Collection`] can be snapshotted to and restored from a
//! compressed binary stream (`snapshot`).
//!
//! ```
//! use chunkstore_core::collection::Collection;
//! use chunkstore_core::column::ColumnKind;
//!
//! let players = Collection::new("players");
//! players.create_column("name", ColumnKind::String).unwrap();
//! players.create_column("level", ColumnKind::Int64).unwrap();
//! players
//!     .create_index("veteran", "level", |v| v.as_i64().unwrap_or(0) >= 30)
//!     .unwrap();
//!
//! players
//!     .insert(|row| {
//!         row.set("name", "grog");
//!         row.set("level", 42i64);
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let veterans = players.query().with(&["veteran"]);
//! assert_eq!(veterans.count(), 1);
//! ```

pub mod bitmap;
pub mod codec;
pub mod collection;
pub mod column;
pub mod commit;
pub mod config;
pub mod error;
pub mod handle;
pub mod pool;
pub mod replication;
pub mod snapshot;
pub mod transaction;
pub mod value;

#[cfg(feature = "vacuum")]
pub mod vacuum;

pub use collection::{Collection, CollectionOptions};
pub use error::{Error, Result};
pub use handle::RowHandle;
