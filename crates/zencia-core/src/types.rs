//! # Domain Types
//!
//! Core domain types used throughout the dashboard sync core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Ticket       │   │    Message      │   │  PendingAction  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (server)    │   │  id             │   │  Create         │       │
//! │  │  human_id       │──►│  content        │   │  Reply          │       │
//! │  │  status         │   │  sync_state     │   │  Close          │       │
//! │  │  sync_state     │   └─────────────────┘   │  dedup_key      │       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    License      │   │ LicenseStatus   │   │ Reactivation    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  Request        │       │
//! │  │  hardware_id    │   │  Active         │   │  ─────────────  │       │
//! │  │  status         │   │  Expired        │   │  Pending        │       │
//! │  │  license_key    │   │  Revoked        │   │  Approved{id}   │       │
//! │  └─────────────────┘   └─────────────────┘   │  Rejected       │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Tickets carry:
//! - `id`: opaque server id (or `pending-<uuid>` while only queued locally)
//! - `human_id`: display code such as `TKT-1234`

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::dedup::DedupKey;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::{GLOBAL_SCOPE, PENDING_ID_PREFIX, TRIAL_DURATION, TRIAL_DURATION_ALIAS};

/// Generates a local placeholder id (`pending-<uuid>`).
pub fn local_id() -> String {
    format!("{}{}", PENDING_ID_PREFIX, Uuid::new_v4())
}

/// Returns true if the id was assigned locally and is unknown to the server.
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(PENDING_ID_PREFIX)
}

// =============================================================================
// Sync State
// =============================================================================

/// Whether a cached record has been confirmed by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(tag = "state", rename_all = "camelCase")]
#[ts(export)]
pub enum SyncState {
    /// Confirmed by the remote (canonical copy).
    #[default]
    Synced,
    /// Local change waiting for remote confirmation.
    Pending {
        #[serde(rename = "dedupKey")]
        dedup_key: DedupKey,
    },
}

impl SyncState {
    /// The boolean view the UI renders as a "waiting to sync" marker.
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncState::Pending { .. })
    }
}

// =============================================================================
// Ticket Status
// =============================================================================

/// Lifecycle of a support ticket.
///
/// ```text
///   open ──► in-progress ──► waiting ──► closed
///    ▲                                     │
///    └────────── reopen on reply ──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum TicketStatus {
    #[default]
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "in-progress", alias = "in_progress")]
    InProgress,
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "closed")]
    Closed,
}

impl TicketStatus {
    fn rank(self) -> u8 {
        match self {
            TicketStatus::Open => 0,
            TicketStatus::InProgress => 1,
            TicketStatus::Waiting => 2,
            TicketStatus::Closed => 3,
        }
    }

    /// Returns true if a status change to `next` only moves forward.
    ///
    /// Staying in place is allowed so that replays are harmless.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        next.rank() >= self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in-progress",
            TicketStatus::Waiting => "waiting",
            TicketStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(TicketStatus::Open),
            "in-progress" | "in_progress" => Ok(TicketStatus::InProgress),
            "waiting" => Ok(TicketStatus::Waiting),
            "closed" => Ok(TicketStatus::Closed),
            other => Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!(
                    "unknown status '{}'; valid options: open, in-progress, waiting, closed",
                    other
                ),
            }),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// A file attached to a ticket message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    #[serde(alias = "type", default)]
    pub content_type: String,
    #[serde(default)]
    pub size: u64,
}

/// One message in a ticket conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Message {
    pub id: String,
    pub sender: String,
    #[serde(alias = "message")]
    pub content: String,
    #[ts(as = "String")]
    #[serde(alias = "createdAt", default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl Message {
    /// Builds an optimistic local copy of a reply that is not confirmed yet.
    pub fn local(sender: &str, content: &str, at: DateTime<Utc>, dedup_key: DedupKey) -> Self {
        Message {
            id: local_id(),
            sender: sender.to_string(),
            content: content.to_string(),
            timestamp: at,
            is_staff: false,
            attachments: Vec::new(),
            sync_state: SyncState::Pending { dedup_key },
        }
    }

    /// Dedup key of a pending message.
    pub fn dedup_key(&self) -> Option<&DedupKey> {
        match &self.sync_state {
            SyncState::Pending { dedup_key } => Some(dedup_key),
            SyncState::Synced => None,
        }
    }
}

// =============================================================================
// Ticket
// =============================================================================

/// Fields the owner fills in when opening a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TicketDraft {
    pub owner_email: String,
    pub customer_name: String,
    pub subject: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    #[serde(default)]
    pub license_id: Option<String>,
}

/// A support ticket as cached on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Ticket {
    pub id: String,
    #[serde(alias = "ticketId")]
    pub human_id: String,
    #[serde(alias = "email", alias = "userEmail")]
    pub owner_email: String,
    pub subject: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[ts(as = "String")]
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl Ticket {
    /// Builds the optimistic placeholder shown while a create is queued.
    pub fn local(
        local_id: &str,
        draft: &TicketDraft,
        at: DateTime<Utc>,
        dedup_key: DedupKey,
    ) -> Self {
        let first = Message::local(&draft.customer_name, &draft.description, at, dedup_key.clone());
        Ticket {
            id: local_id.to_string(),
            human_id: String::new(),
            owner_email: draft.owner_email.clone(),
            subject: draft.subject.clone(),
            category: draft.category.clone(),
            priority: draft.priority.clone(),
            status: TicketStatus::Open,
            messages: vec![first],
            created_at: at,
            updated_at: at,
            sync_state: SyncState::Pending { dedup_key },
        }
    }

    /// The boolean view used by list rendering.
    pub fn pending_sync(&self) -> bool {
        self.sync_state.is_pending() || self.messages.iter().any(|m| m.sync_state.is_pending())
    }

    /// Moves the ticket forward to `next`.
    pub fn transition_to(&mut self, next: TicketStatus, at: DateTime<Utc>) -> Result<(), ValidationError> {
        if !self.status.can_transition_to(next) {
            return Err(ValidationError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// A delivered reply reopens a closed ticket.
    pub fn reopen_on_reply(&mut self, at: DateTime<Utc>) {
        if self.status == TicketStatus::Closed {
            self.status = TicketStatus::Open;
        }
        self.updated_at = at;
    }

    /// Marks the pending message carrying `dedup_key` as confirmed under its
    /// server id.
    pub fn confirm_message(&mut self, dedup_key: &DedupKey, server_id: &str) -> CoreResult<()> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.dedup_key() == Some(dedup_key))
            .ok_or_else(|| CoreError::MessageNotFound {
                ticket_id: self.id.clone(),
                message_id: dedup_key.to_string(),
            })?;
        message.id = server_id.to_string();
        message.sync_state = SyncState::Synced;
        Ok(())
    }
}

/// Ids the server assigns to a newly created ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TicketRef {
    #[serde(alias = "ticketId", alias = "docId")]
    pub id: String,
    #[serde(alias = "ticketCode", default)]
    pub human_id: String,
}

/// Filters for listing tickets. `None` means "all".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketFilters {
    pub status: Option<TicketStatus>,
    pub category: Option<String>,
    pub search: Option<String>,
}

/// Ticket counts by status for the dashboard widget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TicketStats {
    pub total: u32,
    pub open: u32,
    #[serde(alias = "in_progress")]
    pub in_progress: u32,
    pub waiting: u32,
    pub closed: u32,
}

impl TicketStats {
    /// Counts tickets by status.
    pub fn from_tickets(tickets: &[Ticket]) -> Self {
        tickets.iter().fold(TicketStats::default(), |mut stats, t| {
            stats.total += 1;
            match t.status {
                TicketStatus::Open => stats.open += 1,
                TicketStatus::InProgress => stats.in_progress += 1,
                TicketStatus::Waiting => stats.waiting += 1,
                TicketStatus::Closed => stats.closed += 1,
            }
            stats
        })
    }
}

// =============================================================================
// Pending Actions
// =============================================================================

/// Kind of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ActionKind {
    Create,
    Reply,
    Close,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Create => write!(f, "create ticket"),
            ActionKind::Reply => write!(f, "send reply"),
            ActionKind::Close => write!(f, "close ticket"),
        }
    }
}

/// What a pending action asks the remote to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPayload {
    Create { local_id: String, draft: TicketDraft },
    Reply { ticket_id: String, content: String, sender: String },
    Close { ticket_id: String },
}

/// A locally queued mutation awaiting remote confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub payload: ActionPayload,
    pub created_at: DateTime<Utc>,
    pub dedup_key: DedupKey,
}

impl PendingAction {
    /// Queues a new ticket under a fresh local placeholder id.
    pub fn create(draft: TicketDraft, at: DateTime<Utc>) -> Self {
        let local_id = local_id();
        let content = format!("{}\n{}", draft.subject, draft.description);
        let dedup_key = DedupKey::derive(&local_id, &content, at);
        PendingAction {
            payload: ActionPayload::Create { local_id, draft },
            created_at: at,
            dedup_key,
        }
    }

    pub fn reply(ticket_id: &str, content: &str, sender: &str, at: DateTime<Utc>) -> Self {
        PendingAction {
            payload: ActionPayload::Reply {
                ticket_id: ticket_id.to_string(),
                content: content.to_string(),
                sender: sender.to_string(),
            },
            created_at: at,
            dedup_key: DedupKey::derive(ticket_id, content, at),
        }
    }

    pub fn close(ticket_id: &str, at: DateTime<Utc>) -> Self {
        PendingAction {
            payload: ActionPayload::Close {
                ticket_id: ticket_id.to_string(),
            },
            created_at: at,
            dedup_key: DedupKey::derive(ticket_id, "status:closed", at),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self.payload {
            ActionPayload::Create { .. } => ActionKind::Create,
            ActionPayload::Reply { .. } => ActionKind::Reply,
            ActionPayload::Close { .. } => ActionKind::Close,
        }
    }

    /// Target ticket; `None` for creates.
    pub fn ticket_id(&self) -> Option<&str> {
        match &self.payload {
            ActionPayload::Create { .. } => None,
            ActionPayload::Reply { ticket_id, .. } | ActionPayload::Close { ticket_id } => {
                Some(ticket_id)
            }
        }
    }

    /// Queue scope: the target ticket id, or [`GLOBAL_SCOPE`] for creates.
    pub fn scope(&self) -> &str {
        self.ticket_id().unwrap_or(GLOBAL_SCOPE)
    }

    /// Points a reply/close at a different ticket id. Returns false for
    /// creates, which have no target.
    pub fn retarget(&mut self, new_ticket_id: &str) -> bool {
        match &mut self.payload {
            ActionPayload::Create { .. } => false,
            ActionPayload::Reply { ticket_id, .. } | ActionPayload::Close { ticket_id } => {
                *ticket_id = new_ticket_id.to_string();
                true
            }
        }
    }
}

/// A dismissible, user-visible record of an action that was dropped
/// because it failed in a way that is not retried automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FailureNotice {
    pub id: String,
    pub kind: ActionKind,
    pub ticket_id: Option<String>,
    pub message: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl FailureNotice {
    pub fn new(kind: ActionKind, ticket_id: Option<&str>, reason: &str) -> Self {
        FailureNotice {
            id: Uuid::new_v4().to_string(),
            kind,
            ticket_id: ticket_id.map(str::to_string),
            message: format!(
                "Could not {}: will not retry automatically, please resend ({})",
                kind, reason
            ),
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Licenses
// =============================================================================

/// License lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum LicenseStatus {
    #[serde(alias = "Active", alias = "ACTIVE")]
    Active,
    #[serde(alias = "Expired", alias = "EXPIRED")]
    Expired,
    #[serde(alias = "Revoked", alias = "REVOKED")]
    Revoked,
}

/// An issued license key bound to one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct License {
    #[serde(alias = "license_id", alias = "LicenseID")]
    pub id: String,
    #[serde(alias = "hwid", alias = "HardwareID")]
    pub hardware_id: String,
    #[serde(alias = "email", alias = "Email")]
    pub customer_email: String,
    #[serde(alias = "name", alias = "CustomerName", default)]
    pub customer_name: String,
    #[serde(alias = "Tier")]
    pub tier: String,
    #[serde(alias = "Status")]
    pub status: LicenseStatus,
    #[ts(as = "String")]
    #[serde(alias = "creation_date", alias = "CreationDate")]
    pub creation_date: DateTime<Utc>,
    /// `None` for lifetime licenses.
    #[ts(as = "Option<String>")]
    #[serde(
        alias = "expiration_date",
        alias = "ExpirationDate",
        default,
        deserialize_with = "lenient_expiry"
    )]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(alias = "license_key", alias = "LicenseKey")]
    pub license_key: String,
    #[serde(alias = "formatted_key", default)]
    pub formatted_key: Option<String>,
    #[serde(alias = "Features", default, deserialize_with = "feature_list")]
    pub features: Vec<String>,
}

/// Expiry as sent by the license backend: a timestamp, a bare date, an
/// empty string or `"Lifetime"`. Only a date means the license expires.
fn lenient_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("lifetime") {
        return Ok(None);
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Some(Utc.from_utc_datetime(&midnight)))
        .ok_or_else(|| de::Error::custom(format!("invalid expiration date: {}", raw)))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureField {
    List(Vec<String>),
    Joined(String),
}

/// Features arrive either as a list or as one comma-separated string.
fn feature_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<FeatureField>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(FeatureField::List(features)) => features,
        Some(FeatureField::Joined(raw)) => raw
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

impl License {
    pub fn is_active(&self) -> bool {
        self.status == LicenseStatus::Active
    }
}

/// Plan length requested for a new license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseDuration {
    /// The 15-day trial, the only plan currently enabled.
    Trial,
    /// Any longer plan; gated behind billing that does not exist yet.
    Extended(String),
}

impl LicenseDuration {
    /// Parses a requested duration. `"trial-default"` and `"15d"` both name
    /// the trial plan.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            TRIAL_DURATION | TRIAL_DURATION_ALIAS => LicenseDuration::Trial,
            other => LicenseDuration::Extended(other.to_string()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, LicenseDuration::Trial)
    }

    /// Value sent to the generation endpoint.
    pub fn wire_value(&self) -> &str {
        match self {
            LicenseDuration::Trial => TRIAL_DURATION,
            LicenseDuration::Extended(raw) => raw,
        }
    }
}

/// Input to license issuance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LicenseRequest {
    pub hardware_id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub tier: String,
    pub duration: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Filters for listing licenses. `None` means "all".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LicenseFilters {
    pub status: Option<LicenseStatus>,
    pub tier: Option<String>,
    pub search: Option<String>,
}

// =============================================================================
// Reactivation Requests
// =============================================================================

/// Review state of a reactivation request.
///
/// An approved request always carries the license issued for the new
/// hardware id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "state", rename_all = "camelCase")]
#[ts(export)]
pub enum ReactivationStatus {
    Pending,
    Approved {
        #[serde(rename = "newLicenseId")]
        new_license_id: String,
    },
    Rejected,
}

impl ReactivationStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, ReactivationStatus::Pending)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReactivationStatus::Pending => "pending",
            ReactivationStatus::Approved { .. } => "approved",
            ReactivationStatus::Rejected => "rejected",
        }
    }
}

/// A customer's request to move a license to new hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReactivationRequest {
    pub id: String,
    pub email: String,
    pub old_hardware_id: String,
    pub new_hardware_id: String,
    pub reason: String,
    #[ts(as = "Option<String>")]
    pub requested_at: Option<DateTime<Utc>>,
    pub status: ReactivationStatus,
}

// =============================================================================
// Unit Tests
// =============================================================================
