//! # Sync Coordinator
//!
//! Reconciles the durable queue of pending ticket actions with the remote.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SyncCoordinator                                 │
//! │                                                                         │
//! │  submit_create / submit_reply / submit_close                           │
//! │     │ validate ──► optimistic cache change (Pending) ──► enqueue       │
//! │     │                                                                   │
//! │     ├── Offline ──► Queued(handle)                                     │
//! │     └── Online  ──► detached pass ──► Delivered(..) / Queued / Err     │
//! │                                                                         │
//! │  ┌──────────────────────── Sync Pass ──────────────────────────────┐   │
//! │  │  loop peek_next()                                               │   │
//! │  │    key in delivered ledger? ──► acknowledge (no remote call)    │   │
//! │  │    deliver under bounded wait                                   │   │
//! │  │      Ok            ──► record key, reconcile cache, acknowledge │   │
//! │  │      Network/Timeout ──► stop, leave in place, go Offline       │   │
//! │  │      other error   ──► acknowledge, FailureNotice, continue     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  CoordinatorHandle (spawned loop)                                      │
//! │     link up   ──► debounce (1s) ──► pass                               │
//! │     link down ──► Offline immediately                                  │
//! │     pass aborted ──► backoff delay ──► pass                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Connectivity States
//! ```text
//!            link up + debounce            pass finished
//!   Offline ──────────────────► Syncing ──────────────────► Online
//!      ▲                          │                           │
//!      └──── Network / Timeout ───┘◄──────── submit ──────────┘
//! ```
//!
//! Only one pass runs at a time. An action submitted while a pass is in
//! flight is queued and picked up by that pass.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex, Notify, RwLock};
use tokio::time::Sleep;
use tracing::{debug, error, info, instrument, warn};

use zencia_core::validation::{validate_draft, validate_reply_content};
use zencia_core::{
    is_local_id, ActionPayload, DedupKey, FailureNotice, Message, PendingAction, SyncState, Ticket,
    TicketDraft, TicketFilters, TicketRef, TicketStats, TicketStatus,
};
use zencia_store::{
    DeliveredLedger, NoticeLog, QueueHandle, QueueRepository, SharedStore, TicketCache,
};

use crate::auth::AuthProvider;
use crate::config::DashboardConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::ApiClient;
use crate::retry::BoxedBackoff;
use crate::tickets::{HttpTicketClient, RemoteTicketClient, ReplyDraft};

// =============================================================================
// Status
// =============================================================================

/// Link state as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
    Syncing,
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::Offline => write!(f, "offline"),
            ConnectivityState::Syncing => write!(f, "syncing"),
        }
    }
}

/// Current sync status for external queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: ConnectivityState,

    /// Actions waiting in the queue.
    pub pending: usize,

    /// End of the last pass that drained the queue.
    pub last_sync: Option<DateTime<Utc>>,

    /// Why the last pass stopped early, if it did.
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus {
            state: ConnectivityState::Online,
            pending: 0,
            last_sync: None,
            last_error: None,
        }
    }
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives coordinator events (wired to the dashboard UI).
pub trait SyncEventEmitter: Send + Sync {
    /// Status changed.
    fn emit_status(&self, status: &SyncStatus);

    /// One action delivered during a pass.
    fn emit_progress(&self, delivered: usize, remaining: usize);

    /// An action was dropped after a failure that is not retried.
    fn emit_notice(&self, notice: &FailureNotice);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_progress(&self, _delivered: usize, _remaining: usize) {}
    fn emit_notice(&self, _notice: &FailureNotice) {}
}

// =============================================================================
// Outcomes
// =============================================================================

/// What the remote confirmed for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Created(TicketRef),
    Replied { message_id: String },
    Closed,
}

/// Result of a submit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The remote confirmed the action before the call returned.
    Delivered(Delivery),
    /// The action is durable and will be delivered by a later pass.
    Queued(QueueHandle),
}

/// Summary of one sync pass.
#[derive(Debug, Default)]
pub struct PassReport {
    pub delivered: Vec<(QueueHandle, Delivery)>,
    /// Entries acknowledged because their key was already delivered.
    pub replayed: usize,
    /// Entries dropped after a non-retryable failure.
    pub discarded: usize,
    /// The transport failure that stopped the pass early.
    pub aborted: Option<SyncError>,
    /// Failure of the action whose submitter is waiting on this pass.
    owner_failure: Option<(QueueHandle, SyncError)>,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.aborted.is_none()
    }

    fn take_delivery(&mut self, handle: QueueHandle) -> Option<Delivery> {
        let index = self.delivered.iter().position(|(h, _)| *h == handle)?;
        Some(self.delivered.remove(index).1)
    }

    fn take_failure(&mut self, handle: QueueHandle) -> Option<SyncError> {
        match self.owner_failure.take() {
            Some((h, err)) if h == handle => Some(err),
            other => {
                self.owner_failure = other;
                None
            }
        }
    }

    fn absorb(&mut self, next: PassReport) {
        self.delivered.extend(next.delivered);
        self.replayed += next.replayed;
        self.discarded += next.discarded;
        self.aborted = next.aborted;
        if next.owner_failure.is_some() {
            self.owner_failure = next.owner_failure;
        }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

struct Inner {
    remote: Arc<dyn RemoteTicketClient>,
    auth: Arc<dyn AuthProvider>,
    queue: QueueRepository,
    tickets: TicketCache,
    ledger: DeliveredLedger,
    notices: NoticeLog,
    emitter: Arc<dyn SyncEventEmitter>,
    status: RwLock<SyncStatus>,
    /// Held for the duration of a pass.
    pass_lock: Mutex<()>,
    /// Last connectivity reported by the platform.
    link_up: AtomicBool,
    /// Signalled when a pass stops on a transport failure.
    pass_aborted: Notify,
    backoff: Mutex<BoxedBackoff>,
    request_timeout: Duration,
    debounce: Duration,
}

/// Offline-tolerant ticket sync. Cheap to clone.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// Returns the current sync status.
    pub async fn status(&self) -> SyncStatus {
        self.inner.status.read().await.clone()
    }

    // =========================================================================
    // User Entry Points
    // =========================================================================

    /// Opens a ticket. Offline, the ticket appears under a `pending-` id
    /// until the queue drains.
    #[instrument(skip(self, draft), fields(subject = %draft.subject))]
    pub async fn submit_create(&self, draft: TicketDraft) -> SyncResult<SubmitOutcome> {
        validate_draft(&draft)?;

        let action = PendingAction::create(draft, Utc::now());
        if let ActionPayload::Create { local_id, draft } = &action.payload {
            let placeholder = Ticket::local(local_id, draft, action.created_at, action.dedup_key.clone());
            self.inner.tickets.upsert(placeholder).await?;
        }
        self.enqueue_and_deliver(action).await
    }

    /// Adds a reply as the signed-in user.
    #[instrument(skip(self, content))]
    pub async fn submit_reply(&self, ticket_id: &str, content: &str) -> SyncResult<SubmitOutcome> {
        validate_reply_content(content)?;
        let user = self
            .inner
            .auth
            .current_user()
            .await
            .ok_or_else(|| SyncError::Unauthenticated("sign in to reply".into()))?;

        let action = PendingAction::reply(ticket_id, content, user.sender_name(), Utc::now());
        let message = Message::local(
            user.sender_name(),
            content,
            action.created_at,
            action.dedup_key.clone(),
        );
        let at = action.created_at;
        self.inner
            .tickets
            .update(ticket_id, move |t| {
                t.messages.push(message);
                t.updated_at = at;
            })
            .await?;
        self.enqueue_and_deliver(action).await
    }

    /// Closes a ticket.
    #[instrument(skip(self))]
    pub async fn submit_close(&self, ticket_id: &str) -> SyncResult<SubmitOutcome> {
        let action = PendingAction::close(ticket_id, Utc::now());
        let key = action.dedup_key.clone();
        let at = action.created_at;
        self.inner
            .tickets
            .update(ticket_id, move |t| {
                t.status = TicketStatus::Closed;
                t.updated_at = at;
                t.sync_state = SyncState::Pending { dedup_key: key };
            })
            .await?;
        self.enqueue_and_deliver(action).await
    }

    async fn enqueue_and_deliver(&self, action: PendingAction) -> SyncResult<SubmitOutcome> {
        let kind = action.kind();
        let handle = self.inner.queue.enqueue(action).await?;
        self.inner.refresh_pending().await;

        if self.inner.status.read().await.state == ConnectivityState::Offline {
            debug!(handle = %handle, kind = ?kind, "Offline, action queued");
            return Ok(SubmitOutcome::Queued(handle));
        }

        // Detached so that dropping the caller does not cancel the remote call
        let inner = self.inner.clone();
        let pass = tokio::spawn(async move { inner.drain(Some(handle)).await });

        match pass.await {
            Ok(Ok(Some(mut report))) => {
                if let Some(delivery) = report.take_delivery(handle) {
                    Ok(SubmitOutcome::Delivered(delivery))
                } else if let Some(err) = report.take_failure(handle) {
                    Err(err)
                } else {
                    Ok(SubmitOutcome::Queued(handle))
                }
            }
            // Another pass is in flight and will pick the action up
            Ok(Ok(None)) => Ok(SubmitOutcome::Queued(handle)),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(SyncError::Internal(format!("sync pass panicked: {}", e))),
        }
    }

    // =========================================================================
    // Passes
    // =========================================================================

    /// Runs one pass now, waiting for an in-flight pass to finish first.
    pub async fn sync_now(&self) -> SyncResult<PassReport> {
        self.inner.run_pass(None).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Cached tickets, newest first, including local placeholders.
    pub async fn tickets(&self) -> SyncResult<Vec<Ticket>> {
        Ok(self.inner.tickets.all().await?)
    }

    pub async fn ticket(&self, id: &str) -> SyncResult<Option<Ticket>> {
        Ok(self.inner.tickets.get(id).await?)
    }

    /// Re-reads the signed-in user's tickets from the remote, keeping
    /// anything still pending locally.
    pub async fn refresh(&self, filters: &TicketFilters) -> SyncResult<Vec<Ticket>> {
        let user = self
            .inner
            .auth
            .current_user()
            .await
            .ok_or_else(|| SyncError::Unauthenticated("sign in to load tickets".into()))?;
        let remote = self.inner.remote.list_tickets(&user.email, filters).await?;
        let merged = self.inner.tickets.merge_remote(remote).await?;
        debug!(count = merged.len(), "Ticket cache refreshed");
        Ok(merged)
    }

    /// Counts by status over the cached tickets.
    pub async fn stats(&self) -> SyncResult<TicketStats> {
        Ok(TicketStats::from_tickets(&self.inner.tickets.all().await?))
    }

    /// Failure notices not yet dismissed.
    pub async fn notices(&self) -> SyncResult<Vec<FailureNotice>> {
        Ok(self.inner.notices.all().await?)
    }

    pub async fn dismiss_notice(&self, id: &str) -> SyncResult<bool> {
        Ok(self.inner.notices.dismiss(id).await?)
    }

    // =========================================================================
    // Background Loop
    // =========================================================================

    /// Starts the loop that reacts to connectivity changes and retries
    /// aborted passes.
    pub fn spawn(&self) -> CoordinatorHandle {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(run_loop(self.inner.clone(), command_rx, shutdown_rx));
        info!(debounce_ms = self.inner.debounce.as_millis() as u64, "Sync coordinator started");

        CoordinatorHandle {
            commands: command_tx,
            shutdown_tx,
            coordinator: self.clone(),
        }
    }
}

impl Inner {
    async fn update_status(&self, f: impl FnOnce(&mut SyncStatus)) {
        let snapshot = {
            let mut status = self.status.write().await;
            let before = status.clone();
            f(&mut *status);
            if *status == before {
                return;
            }
            status.clone()
        };
        self.emitter.emit_status(&snapshot);
    }

    async fn refresh_pending(&self) {
        match self.queue.len().await {
            Ok(pending) => self.update_status(|s| s.pending = pending).await,
            Err(e) => warn!(error = %e, "Could not count queued actions"),
        }
    }

    async fn go_offline(&self) {
        self.link_up.store(false, Ordering::SeqCst);
        self.update_status(|s| s.state = ConnectivityState::Offline).await;
        info!("Link down, sync paused");
    }

    /// Runs passes until the queue is empty or a pass aborts. Returns
    /// `None` without doing anything if a pass is already running.
    async fn drain(&self, owner: Option<QueueHandle>) -> SyncResult<Option<PassReport>> {
        let mut combined: Option<PassReport> = None;
        loop {
            let Ok(guard) = self.pass_lock.try_lock() else {
                return Ok(combined);
            };
            let report = self.pass(owner).await;
            drop(guard);
            let report = report?;

            let stop = !report.is_clean();
            combined = Some(match combined.take() {
                Some(mut all) => {
                    all.absorb(report);
                    all
                }
                None => report,
            });
            // Actions enqueued while the lock was held would otherwise wait
            // for the next trigger.
            if stop || !self.link_up.load(Ordering::SeqCst) || self.queue.is_empty().await? {
                return Ok(combined);
            }
        }
    }

    async fn run_pass(&self, owner: Option<QueueHandle>) -> SyncResult<PassReport> {
        let _guard = self.pass_lock.lock().await;
        self.pass(owner).await
    }

    /// One pass over the queue. Caller holds `pass_lock`.
    async fn pass(&self, owner: Option<QueueHandle>) -> SyncResult<PassReport> {
        self.update_status(|s| s.state = ConnectivityState::Syncing).await;
        let mut report = PassReport::default();
        let result = self.pass_body(owner, &mut report).await;

        let pending = self.queue.len().await.unwrap_or_default();
        let link_up = self.link_up.load(Ordering::SeqCst);
        let settled = if link_up {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        };

        match (&result, &report.aborted) {
            (Err(e), _) => {
                error!(error = %e, "Sync pass failed on local state");
                let message = e.to_string();
                self.update_status(|s| {
                    s.state = settled;
                    s.pending = pending;
                    s.last_error = Some(message);
                })
                .await;
            }
            (Ok(()), Some(e)) => {
                warn!(error = %e, pending, "Sync pass stopped, going offline");
                let message = e.to_string();
                self.update_status(|s| {
                    s.state = ConnectivityState::Offline;
                    s.pending = pending;
                    s.last_error = Some(message);
                })
                .await;
                self.pass_aborted.notify_one();
            }
            (Ok(()), None) => {
                info!(
                    delivered = report.delivered.len(),
                    replayed = report.replayed,
                    discarded = report.discarded,
                    pending,
                    "Sync pass complete"
                );
                self.backoff.lock().await.reset();
                self.update_status(|s| {
                    s.state = settled;
                    s.pending = pending;
                    s.last_sync = Some(Utc::now());
                    s.last_error = None;
                })
                .await;
            }
        }

        result.map(|_| report)
    }

    async fn pass_body(&self, owner: Option<QueueHandle>, report: &mut PassReport) -> SyncResult<()> {
        while let Some(entry) = self.queue.peek_next().await? {
            let action = &entry.action;

            if self.ledger.contains(&action.dedup_key).await? {
                debug!(handle = %entry.handle, key = %action.dedup_key, "Already delivered, acknowledging");
                self.queue.acknowledge(entry.handle).await?;
                report.replayed += 1;
                continue;
            }

            debug!(handle = %entry.handle, kind = ?action.kind(), "Delivering action");
            match self.deliver(action).await {
                Ok(delivery) => {
                    // The remote has applied the action: record it before any
                    // local bookkeeping that could fail.
                    self.ledger.record(&action.dedup_key).await?;
                    if let Err(e) = self.reconcile(action, &delivery).await {
                        warn!(
                            handle = %entry.handle,
                            error = %e,
                            "Delivered action not reflected in the ticket cache"
                        );
                    }
                    self.queue.acknowledge(entry.handle).await?;
                    report.delivered.push((entry.handle, delivery));

                    let remaining = self.queue.len().await?;
                    self.emitter.emit_progress(report.delivered.len(), remaining);
                }
                Err(e) if e.is_retryable() => {
                    report.aborted = Some(e);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        handle = %entry.handle,
                        kind = ?action.kind(),
                        error = %e,
                        "Discarding action after non-retryable failure"
                    );
                    self.queue.acknowledge(entry.handle).await?;
                    if let Err(rollback) = self.roll_back(action).await {
                        warn!(handle = %entry.handle, error = %rollback, "Could not undo discarded action locally");
                    }
                    report.discarded += 1;

                    if owner == Some(entry.handle) {
                        report.owner_failure = Some((entry.handle, e));
                    } else {
                        let notice = e.failure_notice(action);
                        self.notices.push(notice.clone()).await?;
                        self.emitter.emit_notice(&notice);
                    }
                }
            }
        }
        Ok(())
    }

    async fn deliver(&self, action: &PendingAction) -> SyncResult<Delivery> {
        let call = async {
            match &action.payload {
                ActionPayload::Create { draft, .. } => self
                    .remote
                    .create_ticket(draft, &action.dedup_key)
                    .await
                    .map(Delivery::Created),
                ActionPayload::Reply {
                    ticket_id,
                    content,
                    sender,
                } => {
                    ensure_known_to_remote(ticket_id)?;
                    let reply = ReplyDraft {
                        content: content.clone(),
                        sender: sender.clone(),
                        sender_email: self.current_email().await,
                        is_staff: false,
                    };
                    self.remote
                        .add_reply(ticket_id, &reply, &action.dedup_key)
                        .await
                        .map(|r| Delivery::Replied {
                            message_id: r.message_id,
                        })
                }
                ActionPayload::Close { ticket_id } => {
                    ensure_known_to_remote(ticket_id)?;
                    let updated_by = self.current_email().await;
                    self.remote
                        .set_status(ticket_id, TicketStatus::Closed, &updated_by, &action.dedup_key)
                        .await
                        .map(|_| Delivery::Closed)
                }
            }
        };

        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.request_timeout.as_millis() as u64)),
        }
    }

    async fn current_email(&self) -> String {
        self.auth
            .current_user()
            .await
            .map(|u| u.email)
            .unwrap_or_default()
    }

    /// Applies a confirmed action to the cache.
    async fn reconcile(&self, action: &PendingAction, delivery: &Delivery) -> SyncResult<()> {
        let now = Utc::now();
        match (&action.payload, delivery) {
            (ActionPayload::Create { local_id, .. }, Delivery::Created(created)) => {
                // Follow-ups first: they must never reach the remote under
                // the placeholder id.
                let rebound = self.queue.rebind_ticket(local_id, &created.id).await?;
                info!(local_id = %local_id, ticket_id = %created.id, rebound, "Ticket created");
                if let Some(mut ticket) = self.tickets.get(local_id).await? {
                    ticket.id = created.id.clone();
                    if !created.human_id.is_empty() {
                        ticket.human_id = created.human_id.clone();
                    }
                    ticket.sync_state = SyncState::Synced;
                    confirm_by_key(&mut ticket, &action.dedup_key);
                    self.tickets.replace(local_id, ticket).await?;
                }
            }
            (ActionPayload::Reply { ticket_id, .. }, Delivery::Replied { message_id }) => {
                let key = action.dedup_key.clone();
                let message_id = message_id.clone();
                self.tickets
                    .update(ticket_id, move |t| {
                        if let Err(e) = t.confirm_message(&key, &message_id) {
                            debug!(error = %e, "Delivered reply not in cache");
                        }
                        t.reopen_on_reply(now);
                    })
                    .await?;
            }
            (ActionPayload::Close { ticket_id }, Delivery::Closed) => {
                let key = action.dedup_key.clone();
                self.tickets
                    .update(ticket_id, move |t| {
                        t.status = TicketStatus::Closed;
                        t.updated_at = now;
                        if t.sync_state == (SyncState::Pending { dedup_key: key }) {
                            t.sync_state = SyncState::Synced;
                        }
                    })
                    .await?;
            }
            (payload, delivery) => {
                return Err(SyncError::Internal(format!(
                    "delivery {:?} does not match action {:?}",
                    delivery, payload
                )));
            }
        }
        Ok(())
    }

    /// Undoes the optimistic change of a discarded action.
    async fn roll_back(&self, action: &PendingAction) -> SyncResult<()> {
        match &action.payload {
            ActionPayload::Create { local_id, .. } => {
                self.tickets.remove(local_id).await?;
            }
            ActionPayload::Reply { ticket_id, .. } => {
                let key = action.dedup_key.clone();
                self.tickets
                    .update(ticket_id, move |t| {
                        t.messages.retain(|m| m.dedup_key() != Some(&key));
                    })
                    .await?;
            }
            ActionPayload::Close { ticket_id } => {
                // Previous status is unknown locally; the next refresh restores it
                let key = action.dedup_key.clone();
                self.tickets
                    .update(ticket_id, move |t| {
                        if t.sync_state == (SyncState::Pending { dedup_key: key }) {
                            t.sync_state = SyncState::Synced;
                        }
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

/// A follow-up still aimed at a placeholder means its create was
/// discarded; the remote has never seen that id.
fn ensure_known_to_remote(ticket_id: &str) -> SyncResult<()> {
    if is_local_id(ticket_id) {
        return Err(SyncError::not_found("ticket", ticket_id));
    }
    Ok(())
}

fn confirm_by_key(ticket: &mut Ticket, key: &DedupKey) {
    for message in ticket.messages.iter_mut() {
        if message.dedup_key() == Some(key) {
            message.sync_state = SyncState::Synced;
        }
    }
}

// =============================================================================
// Background Loop
// =============================================================================

enum Command {
    Connectivity(bool),
    SyncNow(oneshot::Sender<SyncResult<PassReport>>),
}

async fn wait_for(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

async fn run_loop(
    inner: Arc<Inner>,
    mut commands: mpsc::Receiver<Command>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut debounce: Option<Pin<Box<Sleep>>> = None;
    let mut retry: Option<Pin<Box<Sleep>>> = None;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Sync coordinator received shutdown");
                break;
            }

            command = commands.recv() => match command {
                None => break,
                Some(Command::Connectivity(true)) => {
                    inner.link_up.store(true, Ordering::SeqCst);
                    inner.backoff.lock().await.reset();
                    retry = None;
                    debounce = Some(Box::pin(tokio::time::sleep(inner.debounce)));
                    debug!("Link up, waiting for it to settle");
                }
                Some(Command::Connectivity(false)) => {
                    debounce = None;
                    retry = None;
                    inner.go_offline().await;
                }
                Some(Command::SyncNow(reply)) => {
                    // Off the loop so connectivity changes still land mid-pass
                    let inner = inner.clone();
                    tokio::spawn(async move {
                        let _ = reply.send(inner.run_pass(None).await);
                    });
                }
            },

            _ = wait_for(&mut debounce) => {
                debounce = None;
                spawn_drain(&inner);
            }

            _ = wait_for(&mut retry) => {
                retry = None;
                if inner.link_up.load(Ordering::SeqCst) {
                    debug!("Retrying sync pass");
                    spawn_drain(&inner);
                }
            }

            _ = inner.pass_aborted.notified() => {
                if !inner.link_up.load(Ordering::SeqCst) {
                    continue;
                }
                match inner.backoff.lock().await.next_backoff() {
                    Some(delay) => {
                        debug!(delay_ms = delay.as_millis() as u64, "Scheduling sync retry");
                        retry = Some(Box::pin(tokio::time::sleep(delay)));
                    }
                    None => warn!("Sync retries exhausted, waiting for the next connectivity change"),
                }
            }
        }
    }
}

fn spawn_drain(inner: &Arc<Inner>) {
    let inner = inner.clone();
    tokio::spawn(async move {
        if let Err(e) = inner.drain(None).await {
            error!(error = %e, "Background sync pass failed");
        }
    });
}

/// Handle for controlling a running coordinator loop.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    shutdown_tx: mpsc::Sender<()>,
    coordinator: SyncCoordinator,
}

impl CoordinatorHandle {
    /// Reports a platform connectivity change. Going offline takes effect
    /// immediately; going online is debounced.
    pub async fn notify_connectivity(&self, online: bool) -> SyncResult<()> {
        self.commands
            .send(Command::Connectivity(online))
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }

    /// Runs a pass through the loop and waits for its report.
    pub async fn sync_now(&self) -> SyncResult<PassReport> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::SyncNow(tx))
            .await
            .map_err(|_| SyncError::ShuttingDown)?;
        rx.await
            .map_err(|e| SyncError::ChannelError(e.to_string()))?
    }

    pub async fn status(&self) -> SyncStatus {
        self.coordinator.status().await
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Stops the loop. A pass already running completes on its own.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for [`SyncCoordinator`].
pub struct SyncCoordinatorBuilder {
    config: DashboardConfig,
    store: Option<SharedStore>,
    auth: Option<Arc<dyn AuthProvider>>,
    remote: Option<Arc<dyn RemoteTicketClient>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
    backoff: Option<BoxedBackoff>,
}

impl SyncCoordinatorBuilder {
    pub fn new(config: DashboardConfig) -> Self {
        SyncCoordinatorBuilder {
            config,
            store: None,
            auth: None,
            remote: None,
            emitter: None,
            backoff: None,
        }
    }

    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Overrides the HTTP ticket client built from the config.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteTicketClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Overrides the retry strategy built from the config.
    pub fn with_backoff(mut self, backoff: BoxedBackoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn build(self) -> SyncResult<SyncCoordinator> {
        let store = self
            .store
            .ok_or_else(|| SyncError::InvalidConfig("Store required".into()))?;
        let auth = self
            .auth
            .ok_or_else(|| SyncError::InvalidConfig("Auth provider required".into()))?;

        let remote = match self.remote {
            Some(remote) => remote,
            None => {
                let api = ApiClient::new(
                    &self.config.api.base_url,
                    auth.clone(),
                    self.config.request_timeout(),
                )?;
                Arc::new(HttpTicketClient::new(api)) as Arc<dyn RemoteTicketClient>
            }
        };
        let backoff = self
            .backoff
            .unwrap_or_else(|| self.config.retry_policy().build());

        let inner = Inner {
            remote,
            auth,
            queue: QueueRepository::new(store.clone()),
            tickets: TicketCache::new(store.clone()),
            ledger: DeliveredLedger::new(store.clone()),
            notices: NoticeLog::new(store),
            emitter: self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter)),
            status: RwLock::new(SyncStatus::default()),
            pass_lock: Mutex::new(()),
            link_up: AtomicBool::new(true),
            pass_aborted: Notify::new(),
            backoff: Mutex::new(backoff),
            request_timeout: self.config.request_timeout(),
            debounce: self.config.debounce(),
        };

        Ok(SyncCoordinator {
            inner: Arc::new(inner),
        })
    }
}
