//! In-process fakes of the remote collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use chrono::Utc;

use zencia_core::{
    DedupKey, License, LicenseFilters, LicenseStatus, Message, ReactivationRequest,
    ReactivationStatus, SyncState, Ticket, TicketDraft, TicketFilters, TicketRef, TicketStats,
    TicketStatus,
};
use zencia_store::{KeyValueStore, MemoryStore, SharedStore, StoreError, StoreResult};

use crate::auth::{AuthUser, StaticAuth};
use crate::error::{SyncError, SyncResult};
use crate::http::Ack;
use crate::licenses::{
    GenerateLicense, GeneratedLicense, LicenseRemote, ProcessedReactivation,
    ReactivationDecision, ReviewAction,
};
use crate::tickets::{RemoteTicketClient, ReplyDraft, ReplyReceipt};

/// Routes `tracing` output to the test harness. `RUST_LOG` controls the
/// level.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn memory_store() -> SharedStore {
    Arc::new(MemoryStore::new())
}

pub fn user() -> AuthUser {
    AuthUser {
        uid: "u1".into(),
        email: "a@b.com".into(),
        display_name: Some("Ada".into()),
        is_admin: false,
    }
}

pub fn signed_in() -> Arc<StaticAuth> {
    Arc::new(StaticAuth::signed_in(user(), "t1"))
}

pub fn draft(subject: &str) -> TicketDraft {
    TicketDraft {
        owner_email: "a@b.com".into(),
        customer_name: "Ada".into(),
        subject: subject.into(),
        description: format!("{} (details)", subject),
        category: "technical".into(),
        priority: "medium".into(),
        license_id: None,
    }
}

/// Memory store whose next write to one key fails.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_next_set: Mutex<Option<String>>,
}

impl FlakyStore {
    pub fn fail_next_set(&self, key: &str) {
        *self.fail_next_set.lock().unwrap() = Some(key.to_string());
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let fail = {
            let mut armed = self.fail_next_set.lock().unwrap();
            if armed.as_deref() == Some(key) {
                armed.take();
                true
            } else {
                false
            }
        };
        if fail {
            return Err(StoreError::QueryFailed("disk full".into()));
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(key).await
    }
}

/// A scripted failure, turned into a fresh [`SyncError`] per call.
#[derive(Debug, Clone)]
pub enum Failure {
    Network,
    Timeout,
    NotFound,
    Validation(String),
    Server(u16),
}

impl Failure {
    fn to_error(&self, id: &str) -> SyncError {
        match self {
            Failure::Network => SyncError::Network("connection refused".into()),
            Failure::Timeout => SyncError::Timeout(8000),
            Failure::NotFound => SyncError::not_found("ticket", id),
            Failure::Validation(msg) => SyncError::Validation(msg.clone()),
            Failure::Server(status) => SyncError::Server {
                status: Some(*status),
                message: "scripted".into(),
            },
        }
    }
}

// =============================================================================
// Tickets
// =============================================================================

#[derive(Default)]
struct TicketServer {
    tickets: Vec<Ticket>,
    next_id: u32,
    /// Failures keyed by 1-based mutation call number.
    scripted: HashMap<usize, Failure>,
    received_keys: Vec<DedupKey>,
}

/// Fake ticket backend. Counts mutating calls and can fail selected ones.
#[derive(Default)]
pub struct FakeTicketRemote {
    server: Mutex<TicketServer>,
    mutations: AtomicUsize,
    offline: AtomicBool,
    hanging: AtomicBool,
}

impl FakeTicketRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the `call`-th mutation (1-based).
    pub fn fail_call(&self, call: usize, failure: Failure) {
        self.server.lock().unwrap().scripted.insert(call, failure);
    }

    /// While offline every call fails with `Network`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// While hanging every mutation waits forever.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn received_keys(&self) -> Vec<DedupKey> {
        self.server.lock().unwrap().received_keys.clone()
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.server.lock().unwrap().tickets.clone()
    }

    /// Seeds a server-side ticket.
    pub fn insert(&self, ticket: Ticket) {
        self.server.lock().unwrap().tickets.push(ticket);
    }

    fn check_online(&self, id: &str) -> SyncResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Failure::Network.to_error(id));
        }
        Ok(())
    }

    async fn begin_mutation(&self, id: &str, key: &DedupKey) -> SyncResult<()> {
        self.check_online(id)?;
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let call = self.mutations.fetch_add(1, Ordering::SeqCst) + 1;
        let mut server = self.server.lock().unwrap();
        if let Some(failure) = server.scripted.remove(&call) {
            return Err(failure.to_error(id));
        }
        server.received_keys.push(key.clone());
        Ok(())
    }
}

#[async_trait]
impl RemoteTicketClient for FakeTicketRemote {
    async fn create_ticket(&self, draft: &TicketDraft, dedup_key: &DedupKey) -> SyncResult<TicketRef> {
        self.begin_mutation("new", dedup_key).await?;
        let mut server = self.server.lock().unwrap();
        server.next_id += 1;
        let id = format!("T{}", server.next_id);
        let human_id = format!("TKT-{}", 1000 + server.next_id);
        let now = Utc::now();
        server.tickets.push(Ticket {
            id: id.clone(),
            human_id: human_id.clone(),
            owner_email: draft.owner_email.clone(),
            subject: draft.subject.clone(),
            category: draft.category.clone(),
            priority: draft.priority.clone(),
            status: TicketStatus::Open,
            messages: vec![Message {
                id: format!("{}-M0", id),
                sender: draft.customer_name.clone(),
                content: draft.description.clone(),
                timestamp: now,
                is_staff: false,
                attachments: Vec::new(),
                sync_state: SyncState::Synced,
            }],
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Synced,
        });
        Ok(TicketRef { id, human_id })
    }

    async fn add_reply(
        &self,
        ticket_id: &str,
        reply: &ReplyDraft,
        dedup_key: &DedupKey,
    ) -> SyncResult<ReplyReceipt> {
        self.begin_mutation(ticket_id, dedup_key).await?;
        let mut server = self.server.lock().unwrap();
        let ticket = server
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket_id)
            .ok_or_else(|| SyncError::not_found("ticket", ticket_id))?;
        let message_id = format!("{}-M{}", ticket_id, ticket.messages.len());
        let now = Utc::now();
        ticket.messages.push(Message {
            id: message_id.clone(),
            sender: reply.sender.clone(),
            content: reply.content.clone(),
            timestamp: now,
            is_staff: reply.is_staff,
            attachments: Vec::new(),
            sync_state: SyncState::Synced,
        });
        ticket.reopen_on_reply(now);
        Ok(ReplyReceipt { message_id })
    }

    async fn set_status(
        &self,
        ticket_id: &str,
        status: TicketStatus,
        _updated_by: &str,
        dedup_key: &DedupKey,
    ) -> SyncResult<Ack> {
        self.begin_mutation(ticket_id, dedup_key).await?;
        let mut server = self.server.lock().unwrap();
        let ticket = server
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket_id)
            .ok_or_else(|| SyncError::not_found("ticket", ticket_id))?;
        ticket.status = status;
        ticket.updated_at = Utc::now();
        Ok(Ack::default())
    }

    async fn list_tickets(&self, owner_email: &str, filters: &TicketFilters) -> SyncResult<Vec<Ticket>> {
        self.check_online(owner_email)?;
        Ok(self
            .tickets()
            .into_iter()
            .filter(|t| t.owner_email == owner_email)
            .filter(|t| filters.status.map_or(true, |s| t.status == s))
            .collect())
    }

    async fn get_ticket(&self, id: &str, _owner_email: &str) -> SyncResult<Ticket> {
        self.check_online(id)?;
        self.tickets()
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| SyncError::not_found("ticket", id))
    }

    async fn ticket_stats(&self, owner_email: &str) -> SyncResult<TicketStats> {
        let tickets = self.list_tickets(owner_email, &TicketFilters::default()).await?;
        Ok(TicketStats::from_tickets(&tickets))
    }
}

// =============================================================================
// Licenses
// =============================================================================

#[derive(Default)]
struct LicenseServer {
    licenses: Vec<License>,
    reactivations: Vec<ReactivationRequest>,
    next_id: u32,
    generated: Option<GeneratedLicense>,
    failure: Option<Failure>,
}

/// Fake license admin backend.
#[derive(Default)]
pub struct FakeLicenseRemote {
    server: Mutex<LicenseServer>,
    calls: AtomicUsize,
}

impl FakeLicenseRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total remote calls of any kind.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fixes the response of the next generation.
    pub fn respond_with(&self, generated: GeneratedLicense) {
        self.server.lock().unwrap().generated = Some(generated);
    }

    /// Fails every call until cleared.
    pub fn fail_with(&self, failure: Option<Failure>) {
        self.server.lock().unwrap().failure = failure;
    }

    pub fn seed_licenses(&self, licenses: Vec<License>) {
        self.server.lock().unwrap().licenses = licenses;
    }

    pub fn seed_reactivations(&self, requests: Vec<ReactivationRequest>) {
        self.server.lock().unwrap().reactivations = requests;
    }

    fn begin(&self, id: &str) -> SyncResult<std::sync::MutexGuard<'_, LicenseServer>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let server = self.server.lock().unwrap();
        if let Some(failure) = &server.failure {
            return Err(failure.to_error(id));
        }
        Ok(server)
    }
}

#[async_trait]
impl LicenseRemote for FakeLicenseRemote {
    async fn generate(&self, request: &GenerateLicense) -> SyncResult<GeneratedLicense> {
        let mut server = self.begin(&request.hardware_id)?;
        server.next_id += 1;
        let next_id = server.next_id;
        let generated = server.generated.take().unwrap_or_else(|| GeneratedLicense {
            id: format!("LIC{}", next_id),
            license_key: format!("KEY-{}", next_id),
            formatted_key: None,
            expiration_date: None,
            features: Vec::new(),
        });
        Ok(generated)
    }

    async fn list_licenses(&self, filters: &LicenseFilters) -> SyncResult<Vec<License>> {
        let server = self.begin("all")?;
        Ok(server
            .licenses
            .iter()
            .filter(|l| filters.status.map_or(true, |s| l.status == s))
            .cloned()
            .collect())
    }

    async fn get_license(&self, id: &str) -> SyncResult<License> {
        let server = self.begin(id)?;
        server
            .licenses
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| SyncError::not_found("license", id))
    }

    async fn revoke(&self, id: &str, _reason: &str) -> SyncResult<Ack> {
        let mut server = self.begin(id)?;
        let license = server
            .licenses
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| SyncError::not_found("license", id))?;
        license.status = LicenseStatus::Revoked;
        Ok(Ack::default())
    }

    async fn list_reactivations(&self) -> SyncResult<Vec<ReactivationRequest>> {
        let server = self.begin("all")?;
        Ok(server.reactivations.clone())
    }

    async fn process_reactivation(
        &self,
        decision: &ReactivationDecision,
    ) -> SyncResult<ProcessedReactivation> {
        let mut server = self.begin(&decision.id)?;
        server.next_id += 1;
        let new_license_id = format!("LIC{}", server.next_id);
        let request = server
            .reactivations
            .iter_mut()
            .find(|r| r.id == decision.id && r.status.is_pending())
            .ok_or_else(|| SyncError::not_found("reactivation request", &decision.id))?;
        Ok(match decision.action {
            ReviewAction::Approve => {
                request.status = ReactivationStatus::Approved {
                    new_license_id: new_license_id.clone(),
                };
                ProcessedReactivation {
                    license_id: Some(new_license_id),
                }
            }
            ReviewAction::Reject => {
                request.status = ReactivationStatus::Rejected;
                ProcessedReactivation::default()
            }
        })
    }
}
