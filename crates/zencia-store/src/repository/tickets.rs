//! # Ticket Cache
//!
//! Local copy of the owner's tickets, including optimistic changes that are
//! still waiting in the queue.
//!
//! ```text
//!   remote list ──► merge_remote ──► cache/tickets ◄── optimistic updates
//!                        │                               (SyncState::Pending)
//!                        └── keeps local placeholders and pending messages
//! ```

use tracing::debug;

use zencia_core::{is_local_id, Ticket};

use crate::error::StoreResult;
use crate::kv::SharedStore;
use crate::repository::Document;

const TICKETS_KEY: &str = "cache/tickets";

/// Repository for cached tickets (newest first).
#[derive(Debug, Clone)]
pub struct TicketCache {
    doc: Document<Vec<Ticket>>,
}

impl TicketCache {
    pub fn new(store: SharedStore) -> Self {
        TicketCache {
            doc: Document::new(store, TICKETS_KEY),
        }
    }

    pub async fn all(&self) -> StoreResult<Vec<Ticket>> {
        self.doc.read().await
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<Ticket>> {
        Ok(self.all().await?.into_iter().find(|t| t.id == id))
    }

    /// Inserts `ticket` at the front or replaces the entry with the same id.
    pub async fn upsert(&self, ticket: Ticket) -> StoreResult<()> {
        self.doc
            .modify(move |tickets| {
                if let Some(existing) = tickets.iter_mut().find(|t| t.id == ticket.id) {
                    *existing = ticket;
                } else {
                    tickets.insert(0, ticket);
                }
            })
            .await
    }

    /// Applies `f` to the cached ticket with `id`. Returns the updated
    /// ticket, or `None` if it is not cached.
    pub async fn update<F>(&self, id: &str, f: F) -> StoreResult<Option<Ticket>>
    where
        F: FnOnce(&mut Ticket) + Send,
    {
        self.doc
            .modify(move |tickets| {
                tickets.iter_mut().find(|t| t.id == id).map(|t| {
                    f(t);
                    t.clone()
                })
            })
            .await
    }

    /// Swaps the placeholder `local_id` for the server's copy, keeping its
    /// position in the list.
    pub async fn replace(&self, local_id: &str, ticket: Ticket) -> StoreResult<()> {
        debug!(local_id = %local_id, server_id = %ticket.id, "Replacing ticket placeholder");
        self.doc
            .modify(move |tickets| {
                tickets.retain(|t| t.id != ticket.id);
                match tickets.iter_mut().find(|t| t.id == local_id) {
                    Some(slot) => *slot = ticket,
                    None => tickets.insert(0, ticket),
                }
            })
            .await
    }

    pub async fn remove(&self, id: &str) -> StoreResult<bool> {
        self.doc
            .modify(move |tickets| {
                let before = tickets.len();
                tickets.retain(|t| t.id != id);
                tickets.len() != before
            })
            .await
    }

    /// Replaces the cache with the remote list, keeping local placeholders
    /// and any messages that are still pending.
    pub async fn merge_remote(&self, remote: Vec<Ticket>) -> StoreResult<Vec<Ticket>> {
        self.doc
            .modify(move |cached| {
                let mut merged: Vec<Ticket> = cached
                    .iter()
                    .filter(|t| is_local_id(&t.id))
                    .cloned()
                    .collect();

                for mut ticket in remote {
                    if let Some(local) = cached.iter().find(|t| t.id == ticket.id) {
                        let pending = local
                            .messages
                            .iter()
                            .filter(|m| m.sync_state.is_pending())
                            .cloned();
                        ticket.messages.extend(pending);
                    }
                    merged.push(ticket);
                }

                *cached = merged.clone();
                merged
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use chrono::Utc;
    use std::sync::Arc;
    use zencia_core::{Message, PendingAction, SyncState, TicketDraft, TicketStatus};

    fn cache() -> TicketCache {
        TicketCache::new(Arc::new(MemoryStore::new()))
    }

    fn draft() -> TicketDraft {
        TicketDraft {
            owner_email: "a@b.com".into(),
            customer_name: "Ada".into(),
            subject: "Help".into(),
            description: "Broken".into(),
            category: "technical".into(),
            priority: "low".into(),
            license_id: None,
        }
    }

    fn synced(id: &str) -> Ticket {
        let now = Utc::now();
        let action = PendingAction::create(draft(), now);
        let mut t = Ticket::local(id, &draft(), now, action.dedup_key);
        t.sync_state = SyncState::Synced;
        t.messages.clear();
        t
    }

    #[tokio::test]
    async fn test_upsert_and_update() {
        let cache = cache();
        cache.upsert(synced("T1")).await.unwrap();
        cache.upsert(synced("T2")).await.unwrap();
        assert_eq!(cache.all().await.unwrap()[0].id, "T2");

        let updated = cache
            .update("T1", |t| t.status = TicketStatus::Closed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, TicketStatus::Closed);
        assert!(cache.update("T9", |_| {}).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_placeholder_keeps_position() {
        let cache = cache();
        cache.upsert(synced("pending-1")).await.unwrap();
        cache.upsert(synced("T2")).await.unwrap();

        cache.replace("pending-1", synced("T1")).await.unwrap();
        let ids: Vec<_> = cache.all().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["T2", "T1"]);
    }

    #[tokio::test]
    async fn test_merge_remote_keeps_pending_work() {
        let cache = cache();
        let now = Utc::now();
        cache.upsert(synced("pending-1")).await.unwrap();

        let reply = PendingAction::reply("T1", "still broken", "Ada", now);
        let mut t1 = synced("T1");
        t1.messages
            .push(Message::local("Ada", "still broken", now, reply.dedup_key));
        cache.upsert(t1).await.unwrap();
        cache.upsert(synced("T-gone")).await.unwrap();

        let merged = cache.merge_remote(vec![synced("T1")]).await.unwrap();
        let ids: Vec<_> = merged.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["pending-1", "T1"]);
        assert!(merged[1].pending_sync());
    }
}
