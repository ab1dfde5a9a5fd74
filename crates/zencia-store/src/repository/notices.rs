//! # Failure Notices
//!
//! Persisted list of user-visible notices for actions that were dropped
//! after a non-retryable failure. Notices stay until dismissed.

use zencia_core::FailureNotice;

use crate::error::StoreResult;
use crate::kv::SharedStore;
use crate::repository::Document;

const NOTICES_KEY: &str = "sync/notices";

/// Oldest notices are dropped past this many entries.
pub const NOTICE_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct NoticeLog {
    doc: Document<Vec<FailureNotice>>,
}

impl NoticeLog {
    pub fn new(store: SharedStore) -> Self {
        NoticeLog {
            doc: Document::new(store, NOTICES_KEY),
        }
    }

    pub async fn all(&self) -> StoreResult<Vec<FailureNotice>> {
        self.doc.read().await
    }

    pub async fn push(&self, notice: FailureNotice) -> StoreResult<()> {
        self.doc
            .modify(move |notices| {
                notices.push(notice);
                if notices.len() > NOTICE_CAPACITY {
                    let excess = notices.len() - NOTICE_CAPACITY;
                    notices.drain(..excess);
                }
            })
            .await
    }

    /// Removes a notice. Returns false if it did not exist.
    pub async fn dismiss(&self, id: &str) -> StoreResult<bool> {
        self.doc
            .modify(move |notices| {
                let before = notices.len();
                notices.retain(|n| n.id != id);
                notices.len() != before
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use std::sync::Arc;
    use zencia_core::ActionKind;

    #[tokio::test]
    async fn test_push_and_dismiss() {
        let log = NoticeLog::new(Arc::new(MemoryStore::new()));
        let notice = FailureNotice::new(ActionKind::Reply, Some("T1"), "ticket not found");
        let id = notice.id.clone();
        log.push(notice).await.unwrap();

        assert_eq!(log.all().await.unwrap().len(), 1);
        assert!(log.dismiss(&id).await.unwrap());
        assert!(!log.dismiss(&id).await.unwrap());
        assert!(log.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oldest_notices_are_dropped_past_capacity() {
        let log = NoticeLog::new(Arc::new(MemoryStore::new()));
        for i in 0..NOTICE_CAPACITY + 5 {
            let ticket = format!("T{}", i);
            log.push(FailureNotice::new(ActionKind::Close, Some(&ticket), "not found"))
                .await
                .unwrap();
        }

        let notices = log.all().await.unwrap();
        assert_eq!(notices.len(), NOTICE_CAPACITY);
        assert_eq!(notices[0].ticket_id.as_deref(), Some("T5"));
        assert_eq!(
            notices.last().unwrap().ticket_id.as_deref(),
            Some(format!("T{}", NOTICE_CAPACITY + 4).as_str())
        );
    }
}
