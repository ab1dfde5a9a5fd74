//! # Remote Ticket Client
//!
//! Ticket CRUD against the REST backend.
//!
//! ## Endpoints
//! ```text
//! POST /tickets                   create_ticket   → { ticketId }
//! POST /tickets/{id}/messages     add_reply       → { messageId }
//! PUT  /tickets/{id}/status       set_status      → { message }
//! GET  /tickets?email=&status=…   list_tickets    → { tickets: [...] }
//! GET  /tickets/{id}?email=       get_ticket      → { ticket: {...} }
//! GET  /tickets/stats?email=      ticket_stats    → { stats: {...} }
//! ```
//!
//! Mutations forward the dedup key (`Idempotency-Key` header and
//! `clientRequestId` body field). Failures come back classified, see
//! [`crate::http`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use zencia_core::{DedupKey, Ticket, TicketDraft, TicketFilters, TicketRef, TicketStats, TicketStatus};

use crate::error::SyncResult;
use crate::http::{Ack, ApiClient, Target};
use crate::subscription::Subscription;

/// A reply as sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyDraft {
    #[serde(rename = "message")]
    pub content: String,
    pub sender: String,
    pub sender_email: String,
    pub is_staff: bool,
}

/// Server id of a delivered reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyReceipt {
    #[serde(alias = "id")]
    pub message_id: String,
}

/// Remote ticket operations.
#[async_trait]
pub trait RemoteTicketClient: Send + Sync {
    async fn create_ticket(&self, draft: &TicketDraft, dedup_key: &DedupKey) -> SyncResult<TicketRef>;

    async fn add_reply(
        &self,
        ticket_id: &str,
        reply: &ReplyDraft,
        dedup_key: &DedupKey,
    ) -> SyncResult<ReplyReceipt>;

    async fn set_status(
        &self,
        ticket_id: &str,
        status: TicketStatus,
        updated_by: &str,
        dedup_key: &DedupKey,
    ) -> SyncResult<Ack>;

    async fn list_tickets(&self, owner_email: &str, filters: &TicketFilters) -> SyncResult<Vec<Ticket>>;

    async fn get_ticket(&self, id: &str, owner_email: &str) -> SyncResult<Ticket>;

    async fn ticket_stats(&self, owner_email: &str) -> SyncResult<TicketStats>;
}

// =============================================================================
// Wire Bodies
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTicketBody<'a> {
    email: &'a str,
    customer_name: &'a str,
    subject: &'a str,
    description: &'a str,
    category: &'a str,
    priority: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    license_id: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody<'a> {
    status: TicketStatus,
    updated_by: &'a str,
    email: &'a str,
}

#[derive(Deserialize)]
struct TicketList {
    #[serde(default)]
    tickets: Vec<Ticket>,
}

#[derive(Deserialize)]
struct TicketEnvelope {
    ticket: Ticket,
}

#[derive(Deserialize)]
struct StatsEnvelope {
    stats: TicketStats,
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// [`RemoteTicketClient`] over the REST backend.
#[derive(Clone)]
pub struct HttpTicketClient {
    api: ApiClient,
}

impl HttpTicketClient {
    pub fn new(api: ApiClient) -> Self {
        HttpTicketClient { api }
    }
}

#[async_trait]
impl RemoteTicketClient for HttpTicketClient {
    async fn create_ticket(&self, draft: &TicketDraft, dedup_key: &DedupKey) -> SyncResult<TicketRef> {
        let body = CreateTicketBody {
            email: &draft.owner_email,
            customer_name: &draft.customer_name,
            subject: &draft.subject,
            description: &draft.description,
            category: &draft.category,
            priority: &draft.priority,
            license_id: draft.license_id.as_deref(),
        };
        let created: TicketRef = self
            .api
            .post(
                self.api.endpoint(&["tickets"]),
                &body,
                Some(dedup_key),
                Target::new("ticket", &draft.subject),
            )
            .await?;
        debug!(ticket_id = %created.id, "Ticket created");
        Ok(created)
    }

    async fn add_reply(
        &self,
        ticket_id: &str,
        reply: &ReplyDraft,
        dedup_key: &DedupKey,
    ) -> SyncResult<ReplyReceipt> {
        self.api
            .post(
                self.api.endpoint(&["tickets", ticket_id, "messages"]),
                reply,
                Some(dedup_key),
                Target::new("ticket", ticket_id),
            )
            .await
    }

    async fn set_status(
        &self,
        ticket_id: &str,
        status: TicketStatus,
        updated_by: &str,
        dedup_key: &DedupKey,
    ) -> SyncResult<Ack> {
        let body = StatusBody {
            status,
            updated_by,
            email: updated_by,
        };
        self.api
            .put(
                self.api.endpoint(&["tickets", ticket_id, "status"]),
                &body,
                Some(dedup_key),
                Target::new("ticket", ticket_id),
            )
            .await
    }

    async fn list_tickets(&self, owner_email: &str, filters: &TicketFilters) -> SyncResult<Vec<Ticket>> {
        let url = self.api.endpoint_with_query(
            &["tickets"],
            &[
                ("email", Some(owner_email)),
                ("status", filters.status.map(TicketStatus::as_str)),
                ("category", filters.category.as_deref().filter(|c| *c != "all")),
                ("search", filters.search.as_deref().filter(|s| !s.is_empty())),
            ],
        );
        let list: TicketList = self.api.get(url, Target::new("tickets", owner_email)).await?;
        Ok(list.tickets)
    }

    async fn get_ticket(&self, id: &str, owner_email: &str) -> SyncResult<Ticket> {
        let url = self
            .api
            .endpoint_with_query(&["tickets", id], &[("email", Some(owner_email))]);
        let envelope: TicketEnvelope = self.api.get(url, Target::new("ticket", id)).await?;
        Ok(envelope.ticket)
    }

    async fn ticket_stats(&self, owner_email: &str) -> SyncResult<TicketStats> {
        let url = self
            .api
            .endpoint_with_query(&["tickets", "stats"], &[("email", Some(owner_email))]);
        let envelope: StatsEnvelope = self.api.get(url, Target::new("stats", owner_email)).await?;
        Ok(envelope.stats)
    }
}

// =============================================================================
// Ticket Watch
// =============================================================================

/// Callback invoked with the latest copy of a watched ticket.
pub type TicketCallback = Arc<dyn Fn(Ticket) + Send + Sync>;

/// Polls a ticket and calls back when it changes (status, `updatedAt` or
/// message count). The first successful poll always calls back. Errors are
/// logged and polling continues until the subscription is dropped.
pub fn watch_ticket(
    client: Arc<dyn RemoteTicketClient>,
    ticket_id: String,
    owner_email: String,
    interval: Duration,
    callback: TicketCallback,
) -> Subscription {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen: Option<(DateTime<Utc>, usize, TicketStatus)> = None;

        loop {
            ticker.tick().await;
            match client.get_ticket(&ticket_id, &owner_email).await {
                Ok(ticket) => {
                    let fingerprint = (ticket.updated_at, ticket.messages.len(), ticket.status);
                    if last_seen != Some(fingerprint) {
                        last_seen = Some(fingerprint);
                        callback(ticket);
                    }
                }
                Err(e) => warn!(ticket_id = %ticket_id, error = %e, "Ticket watch poll failed"),
            }
        }
    });
    Subscription::from_task(task)
}
