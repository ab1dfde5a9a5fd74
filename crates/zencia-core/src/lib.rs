//! # zencia-core: Pure Domain Model for the Dashboard Sync Core
//!
//! This crate holds the types and rules shared by the storage and sync
//! layers. It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Dashboard Sync Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  Dashboard UI (event handlers)                  │   │
//! │  │   New ticket ──► Reply ──► Close ──► Issue license ──► Approve  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            zencia-sync (coordinator, issuer, clients)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ zencia-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   dedup   │  │ validation│  │   error   │  │   │
//! │  │   │  Ticket   │  │ DedupKey  │  │  rules    │  │ Validation│  │   │
//! │  │   │  License  │  │ (sha256)  │  │  checks   │  │   Error   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORE • NO NETWORK • PURE FUNCTIONS               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Ticket, Message, License, PendingAction, ...)
//! - [`dedup`] - Dedup key derivation for idempotent replay
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use zencia_core::types::TicketStatus;
//!
//! // Tickets only move forward...
//! assert!(TicketStatus::Open.can_transition_to(TicketStatus::Closed));
//! // ...except for reopen-on-reply, which has its own entry point.
//! assert!(!TicketStatus::Closed.can_transition_to(TicketStatus::Open));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod dedup;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use dedup::DedupKey;
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Queue scope used for actions that are not bound to an existing ticket
/// (ticket creation).
pub const GLOBAL_SCOPE: &str = "global";

/// Prefix of ticket ids assigned locally while the ticket exists only in
/// the pending queue.
pub const PENDING_ID_PREFIX: &str = "pending-";

/// Wire value of the only license duration currently enabled (15-day trial).
pub const TRIAL_DURATION: &str = "15d";

/// Plan name accepted by the issuer as an alias of [`TRIAL_DURATION`].
pub const TRIAL_DURATION_ALIAS: &str = "trial-default";

/// Maximum length of a ticket subject.
pub const MAX_SUBJECT_LENGTH: usize = 200;

/// Maximum length of a single reply.
pub const MAX_REPLY_LENGTH: usize = 10_000;
