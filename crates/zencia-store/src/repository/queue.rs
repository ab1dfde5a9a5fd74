//! # Pending Action Queue
//!
//! Durable FIFO of mutations that have not been confirmed by the remote.
//!
//! ## The Queue Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Pending Queue Lifecycle                              │
//! │                                                                         │
//! │  USER ACTION (reply, close, new ticket)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  enqueue(action) ── awaited write ──► queue/<scope>                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            SYNC PASS (zencia-sync coordinator)                  │   │
//! │  │                                                                 │   │
//! │  │  1. peek_next()            ← head of FIFO, still queued        │   │
//! │  │  2. send to remote                                             │   │
//! │  │  3. On success:  acknowledge(handle)                           │   │
//! │  │     On network failure: leave it, stop the pass                │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • An action is never lost before it is acknowledged                   │
//! │  • Order is (created_at, enqueue sequence) across all scopes           │
//! │  • Restarting the app keeps everything queued                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use zencia_core::PendingAction;

use crate::error::StoreResult;
use crate::kv::{load_json, save_json, SharedStore};

const QUEUE_PREFIX: &str = "queue/";
const INDEX_KEY: &str = "queue-meta/index";
const SEQ_KEY: &str = "queue-meta/seq";

/// Opaque receipt for a queued action, used to acknowledge it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueHandle(u64);

impl QueueHandle {
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A pending action together with its queue receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub handle: QueueHandle,
    pub action: PendingAction,
}

/// Repository for the pending action queue.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    store: SharedStore,
    lock: Arc<Mutex<()>>,
}

impl QueueRepository {
    pub fn new(store: SharedStore) -> Self {
        QueueRepository {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Persists `action` and returns its handle. The action is durable once
    /// this returns.
    pub async fn enqueue(&self, action: PendingAction) -> StoreResult<QueueHandle> {
        let _guard = self.lock.lock().await;

        let seq: u64 = load_json(self.store.as_ref(), SEQ_KEY).await?;
        let handle = QueueHandle(seq + 1);
        save_json(self.store.as_ref(), SEQ_KEY, &handle.0).await?;

        let scope = action.scope().to_string();
        let mut index = self.load_index().await?;
        if !index.contains(&scope) {
            index.push(scope.clone());
            save_json(self.store.as_ref(), INDEX_KEY, &index).await?;
        }

        let mut entries = self.load_scope(&scope).await?;
        debug!(
            handle = %handle,
            scope = %scope,
            kind = ?action.kind(),
            "Queuing pending action"
        );
        entries.push(QueuedAction { handle, action });
        self.save_scope(&scope, &entries).await?;

        Ok(handle)
    }

    /// Returns every queued action in FIFO order without removing anything.
    pub async fn peek_all(&self) -> StoreResult<Vec<QueuedAction>> {
        let _guard = self.lock.lock().await;
        self.load_all().await
    }

    /// Returns the head of the FIFO.
    pub async fn peek_next(&self) -> StoreResult<Option<QueuedAction>> {
        Ok(self.peek_all().await?.into_iter().next())
    }

    /// Removes and returns every queued action in FIFO order.
    pub async fn drain(&self) -> StoreResult<Vec<QueuedAction>> {
        let _guard = self.lock.lock().await;
        let all = self.load_all().await?;

        for scope in self.load_index().await? {
            self.store.delete(&scope_key(&scope)).await?;
        }
        save_json(self.store.as_ref(), INDEX_KEY, &Vec::<String>::new()).await?;

        debug!(count = all.len(), "Drained pending queue");
        Ok(all)
    }

    /// Removes one action. Returns false if it was no longer queued.
    pub async fn acknowledge(&self, handle: QueueHandle) -> StoreResult<bool> {
        let _guard = self.lock.lock().await;
        let mut index = self.load_index().await?;

        for scope in index.clone() {
            let mut entries = self.load_scope(&scope).await?;
            let Some(pos) = entries.iter().position(|e| e.handle == handle) else {
                continue;
            };
            entries.remove(pos);
            if entries.is_empty() {
                self.store.delete(&scope_key(&scope)).await?;
                index.retain(|s| s != &scope);
                save_json(self.store.as_ref(), INDEX_KEY, &index).await?;
            } else {
                self.save_scope(&scope, &entries).await?;
            }
            debug!(handle = %handle, scope = %scope, "Acknowledged pending action");
            return Ok(true);
        }

        Ok(false)
    }

    /// Points every action queued against `local_id` at `server_id` and
    /// moves them to the server id's scope. Returns how many were moved.
    pub async fn rebind_ticket(&self, local_id: &str, server_id: &str) -> StoreResult<usize> {
        let _guard = self.lock.lock().await;

        let mut moved = self.load_scope(local_id).await?;
        if moved.is_empty() {
            return Ok(0);
        }
        for entry in &mut moved {
            entry.action.retarget(server_id);
        }
        let count = moved.len();

        let mut target = self.load_scope(server_id).await?;
        target.extend(moved);
        sort_fifo(&mut target);
        self.save_scope(server_id, &target).await?;
        self.store.delete(&scope_key(local_id)).await?;

        let mut index = self.load_index().await?;
        index.retain(|s| s != local_id);
        if !index.iter().any(|s| s == server_id) {
            index.push(server_id.to_string());
        }
        save_json(self.store.as_ref(), INDEX_KEY, &index).await?;

        debug!(local_id = %local_id, server_id = %server_id, count, "Rebound queued actions");
        Ok(count)
    }

    /// Number of queued actions.
    pub async fn len(&self) -> StoreResult<usize> {
        Ok(self.peek_all().await?.len())
    }

    pub async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len().await? == 0)
    }

    // -------------------------------------------------------------------------
    // Helpers (caller holds the lock)
    // -------------------------------------------------------------------------

    async fn load_index(&self) -> StoreResult<Vec<String>> {
        load_json(self.store.as_ref(), INDEX_KEY).await
    }

    async fn load_scope(&self, scope: &str) -> StoreResult<Vec<QueuedAction>> {
        load_json(self.store.as_ref(), &scope_key(scope)).await
    }

    async fn save_scope(&self, scope: &str, entries: &[QueuedAction]) -> StoreResult<()> {
        save_json(self.store.as_ref(), &scope_key(scope), entries).await
    }

    async fn load_all(&self) -> StoreResult<Vec<QueuedAction>> {
        let mut all = Vec::new();
        for scope in self.load_index().await? {
            all.extend(self.load_scope(&scope).await?);
        }
        sort_fifo(&mut all);
        Ok(all)
    }
}

fn scope_key(scope: &str) -> String {
    format!("{}{}", QUEUE_PREFIX, scope)
}

fn sort_fifo(entries: &mut [QueuedAction]) {
    entries.sort_by(|a, b| {
        a.action
            .created_at
            .cmp(&b.action.created_at)
            .then(a.handle.0.cmp(&b.handle.0))
    });
}

// =============================================================================
// Unit Tests
// =============================================================================
