pub mod core;
pub mod schema;
pub mod batch;
pub mod identity;
pub mod commit;
pub mod lock;
pub mod storage;
pub mod cache;

pub use crate::batch::change_set::{ChangeSet, RowHandle, RowState};
pub use crate::core::config::Config;
pub use crate::core::database::{CommitReport, Database};
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{Row, RowId, Value};
pub use crate::schema::schema::{Schema, TableDef};

/*
┌──────────────────────────────────────────── CORE LAYER ─────────────────────────────────────────────┐
│                                                                                                     │
│  struct Database                                                                                    │
│  │ config: Config                      // storage path, sync mode, cache size, row limit            │
│  │ catalog: ReferenceCatalog           // who points at whom, processing order                      │
│  │ store: Arc<dyn RowStore>            // MemoryStore / FileStore                                   │
│  │ authority: IdentifierAuthority      // one per store, MAX(id)+1 per table                        │
│  │ commit_lock: CommitLock             // short-term, serializes commits                            │
│  │ long_locks: LongTermLockList        // explicit document reservations                            │
│  │ hooks: Arc<dyn EngineHooks>         // before_init, size_limit_exceeded                          │
│  │ invalidators: Vec<Arc<dyn CacheInvalidator>>                                                     │
│  │ stats: CommitStats                                                                               │
│                                                                                                     │
└─────────────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────────────── COMMIT PIPELINE ────────────────────────────────────────┐
│                                                                                                     │
│  ChangeSet ──clone──> assign_real_ids ──IdMaps──> rewrite_references ──DeferredWriteQueue──┐        │
│   (placeholder ids < 0)   (authority)                 (catalog)                            │        │
│                                                                                            v        │
│  store.begin ─> deletes (reverse order) ─> inserts/updates (processing order) ─> patches ─> commit  │
│                                                                                            │        │
│  caller's ChangeSet <── accept_changes <── resolved copy <─────────────────────────────────┘        │
│  CacheInvalidator::invalidate(Invalidation)                                                         │
│                                                                                                     │
└─────────────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────────────── STORAGE LAYER ──────────────────────────────────────────┐
│                                                                                                     │
│  trait RowStore: MaxIdSource        struct FileStore                  struct Wal                    │
│  • begin / commit / rollback        • layout: StorageLayout           • frame: len | crc32 | bincode│
│  • insert_row / update_row          • tables: TableSet                • WalRecord::Op / Commit      │
│  • delete_row / update_column       • wal: Wal                        • sync_mode: SyncMode         │
│  • load_row / total_rows            • _lock: FileLock (flock)                                       │
│                                     Checkpoint: TableSet + wal_sequence                             │
└─────────────────────────────────────────────────────────────────────────────────────────────────────┘
*/
