//! # Delivered Ledger
//!
//! Dedup keys of actions the remote has already applied. A key is recorded
//! before its queue entry is acknowledged, so a crash in between replays the
//! entry as a no-op instead of sending it twice.

use std::collections::VecDeque;

use zencia_core::DedupKey;

use crate::error::StoreResult;
use crate::kv::SharedStore;
use crate::repository::Document;

const LEDGER_KEY: &str = "sync/delivered";

/// Oldest keys are forgotten past this many entries.
pub const LEDGER_CAPACITY: usize = 1_000;

#[derive(Debug, Clone)]
pub struct DeliveredLedger {
    doc: Document<VecDeque<DedupKey>>,
}

impl DeliveredLedger {
    pub fn new(store: SharedStore) -> Self {
        DeliveredLedger {
            doc: Document::new(store, LEDGER_KEY),
        }
    }

    pub async fn contains(&self, key: &DedupKey) -> StoreResult<bool> {
        Ok(self.doc.read().await?.contains(key))
    }

    pub async fn record(&self, key: &DedupKey) -> StoreResult<()> {
        let key = key.clone();
        self.doc
            .modify(move |keys| {
                if !keys.contains(&key) {
                    keys.push_back(key);
                }
                while keys.len() > LEDGER_CAPACITY {
                    keys.pop_front();
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_record_and_evict() {
        let ledger = DeliveredLedger::new(Arc::new(MemoryStore::new()));
        let key_at = |ms: i64| DedupKey::derive("T1", "hi", Utc.timestamp_millis_opt(ms).unwrap());

        ledger.record(&key_at(0)).await.unwrap();
        ledger.record(&key_at(0)).await.unwrap();
        assert!(ledger.contains(&key_at(0)).await.unwrap());
        assert!(!ledger.contains(&key_at(1)).await.unwrap());

        for ms in 1..=LEDGER_CAPACITY as i64 {
            ledger.record(&key_at(ms)).await.unwrap();
        }
        assert!(!ledger.contains(&key_at(0)).await.unwrap());
        assert!(ledger.contains(&key_at(LEDGER_CAPACITY as i64)).await.unwrap());
    }
}
