//! # Repository Module
//!
//! Repositories layered on the key-value store.
//!
//! ## Key Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Key                         Value (JSON)            Repository         │
//! │  ──────────────────────────  ──────────────────────  ─────────────────  │
//! │  queue/<scope>               [QueuedAction]          QueueRepository    │
//! │  queue-meta/index            [scope]                 QueueRepository    │
//! │  queue-meta/seq              u64                     QueueRepository    │
//! │  cache/tickets               [Ticket]                TicketCache        │
//! │  cache/licenses              [License]               LicenseCache       │
//! │  cache/reactivations         [ReactivationRequest]   ReactivationCache  │
//! │  sync/delivered              [DedupKey]              DeliveredLedger    │
//! │  sync/notices                [FailureNotice]         NoticeLog          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each repository serializes its own read-modify-write cycles. Clone a
//! repository to share it; two independently constructed repositories over
//! the same key do not coordinate.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::StoreResult;
use crate::kv::{load_json, save_json, SharedStore};

pub mod ledger;
pub mod licenses;
pub mod notices;
pub mod queue;
pub mod reactivations;
pub mod tickets;

/// One JSON document under a fixed key, with serialized updates.
#[derive(Debug)]
pub(crate) struct Document<T> {
    store: SharedStore,
    key: &'static str,
    lock: Arc<Mutex<()>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Document<T> {
    fn clone(&self) -> Self {
        Document {
            store: self.store.clone(),
            key: self.key,
            lock: self.lock.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Document<T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    pub(crate) fn new(store: SharedStore, key: &'static str) -> Self {
        Document {
            store,
            key,
            lock: Arc::new(Mutex::new(())),
            _marker: PhantomData,
        }
    }

    pub(crate) async fn read(&self) -> StoreResult<T> {
        load_json(self.store.as_ref(), self.key).await
    }

    /// Applies `f` to the stored value and writes the result back.
    pub(crate) async fn modify<R, F>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut T) -> R + Send,
        R: Send,
    {
        let _guard = self.lock.lock().await;
        let mut value = self.read().await?;
        let out = f(&mut value);
        save_json(self.store.as_ref(), self.key, &value).await?;
        Ok(out)
    }

    pub(crate) async fn replace(&self, value: &T) -> StoreResult<()>
    where
        T: Sync,
    {
        let _guard = self.lock.lock().await;
        save_json(self.store.as_ref(), self.key, value).await
    }
}
