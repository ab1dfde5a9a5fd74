//! # zencia-sync: Offline Sync and License Workflows
//!
//! This crate keeps support tickets usable while the dashboard is offline
//! and drives license issuance and hardware reactivation against the
//! admin backend.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Dashboard Sync Architecture                       │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 Dashboard (wiring, one per session)              │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ SyncCoordinator│  │ LicenseIssuer  │  │ ReactivationWorkflow   │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Pending queue  │  │ One active     │  │ Pending → Approved     │    │
//! │  │ FIFO replay    │  │ license per    │  │        ╲ Rejected      │    │
//! │  │ Dedup ledger   │  │ hardware id    │  │ (terminal)             │    │
//! │  └───────┬────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │          ▼                   └──────────┬────────────┘                  │
//! │  ┌────────────────┐             ┌───────▼────────┐                     │
//! │  │ HttpTicket     │             │ HttpLicense    │                     │
//! │  │ Client         │             │ Client         │                     │
//! │  └───────┬────────┘             └───────┬────────┘                     │
//! │          └──────────────┬───────────────┘                              │
//! │                 ┌───────▼────────┐   ┌────────────────┐                │
//! │                 │   ApiClient    │──►│  TokenCache    │                │
//! │                 │ status → error │   │  AuthProvider  │                │
//! │                 └────────────────┘   └────────────────┘                │
//! │                                                                         │
//! │  STATUS EVENTS (SyncEventEmitter):                                     │
//! │  • status   - Online / Offline / Syncing, pending count                │
//! │  • progress - actions delivered during a pass                          │
//! │  • notice   - an action dropped after a failure that is not retried    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`coordinator`] - `SyncCoordinator`, its background loop and handle
//! - [`tickets`] - Remote ticket operations and ticket watching
//! - [`licenses`] - Remote license and reactivation operations
//! - [`issuer`] - License issuance with the one-active-license guard
//! - [`reactivation`] - Admin review of reactivation requests
//! - [`http`] - Shared REST client and response classification
//! - [`auth`] - Auth provider seam and bearer token cache
//! - [`config`] - Configuration (TOML file + environment)
//! - [`retry`] - Backoff between aborted passes
//! - [`subscription`] - Cancellable listener handles
//! - [`dashboard`] - Wires everything to one store and one auth provider
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zencia_sync::{Dashboard, DashboardConfig};
//!
//! let config = DashboardConfig::load_or_default(None);
//! let dashboard = Dashboard::open(config, auth, None).await?;
//!
//! // Queued when offline, delivered once the link is back
//! dashboard.sync().notify_connectivity(false).await?;
//! dashboard.coordinator().submit_reply("T1", "Any update?").await?;
//! dashboard.sync().notify_connectivity(true).await?;
//!
//! let status = dashboard.sync().status().await;
//! println!("{} ({} pending)", status.state, status.pending);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod issuer;
pub mod licenses;
pub mod reactivation;
pub mod retry;
pub mod subscription;
pub mod tickets;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::{AuthCallback, AuthProvider, AuthUser, StaticAuth, TokenCache};
pub use config::{ApiSettings, DashboardConfig, StoreSettings, SyncSettings};
pub use coordinator::{
    ConnectivityState, CoordinatorHandle, Delivery, NoOpEmitter, PassReport, SubmitOutcome,
    SyncCoordinator, SyncCoordinatorBuilder, SyncEventEmitter, SyncStatus,
};
pub use dashboard::Dashboard;
pub use error::{SyncError, SyncResult};
pub use http::{Ack, ApiClient};
pub use issuer::LicenseIssuer;
pub use licenses::{HttpLicenseClient, LicenseRemote};
pub use reactivation::ReactivationWorkflow;
pub use retry::RetryPolicy;
pub use subscription::Subscription;
pub use tickets::{watch_ticket, HttpTicketClient, RemoteTicketClient, TicketCallback};
