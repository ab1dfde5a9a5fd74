//! # zencia-store: Durable Local State
//!
//! Everything the dashboard keeps on the device lives behind a small
//! key-value seam, with repositories for each kind of state on top.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Dashboard Data Flow                              │
//! │                                                                         │
//! │  zencia-sync (coordinator, issuer, reactivation workflow)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   zencia-store (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  Repositories │    │ KeyValueStore │    │  Migrations  │  │   │
//! │  │   │               │    │               │    │  (embedded)  │  │   │
//! │  │   │ Queue         │───►│ SqliteStore   │    │ 001_kv_store │  │   │
//! │  │   │ TicketCache   │    │ MemoryStore   │    │              │  │   │
//! │  │   │ LicenseCache  │    │               │    │              │  │   │
//! │  │   │ Ledger, ...   │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (dashboard.db)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zencia_store::{Database, QueueRepository, StoreConfig};
//!
//! let db = Database::new(StoreConfig::new("dashboard.db")).await?;
//! let queue = QueueRepository::new(db.kv());
//! let handle = queue.enqueue(action).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod kv;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use kv::{KeyValueStore, MemoryStore, SharedStore, SqliteStore};
pub use pool::{Database, StoreConfig};

pub use repository::ledger::DeliveredLedger;
pub use repository::licenses::LicenseCache;
pub use repository::notices::NoticeLog;
pub use repository::queue::{QueueHandle, QueueRepository, QueuedAction};
pub use repository::reactivations::ReactivationCache;
pub use repository::tickets::TicketCache;
