//! # License Issuer
//!
//! Issues trial licenses while keeping at most one active license per
//! hardware id.
//!
//! ## Issue Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  issue(request)                                                        │
//! │     │                                                                   │
//! │     ├── hardware id empty?        ──► Required               (local)   │
//! │     ├── email malformed?          ──► InvalidFormat          (local)   │
//! │     ├── duration not the trial?   ──► UnsupportedDuration    (local)   │
//! │     ├── cached active license     ──► DuplicateActiveLicense (local)   │
//! │     │   for this hardware id?                                           │
//! │     ▼                                                                   │
//! │  POST /admin/generate-license ── error ──► surfaced, cache untouched   │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  prepend to license cache ──► return License                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cached list is only a client-side guard. The backend stays the
//! source of truth for the one-active-license rule.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use zencia_core::validation::{
    ensure_no_active_license, validate_duration, validate_email, validate_hardware_id,
};
use zencia_core::{License, LicenseFilters, LicenseRequest, LicenseStatus};
use zencia_store::LicenseCache;

use crate::error::{SyncError, SyncResult};
use crate::licenses::{GenerateLicense, LicenseRemote};

/// License issuance and administration over the cached license list.
pub struct LicenseIssuer {
    remote: Arc<dyn LicenseRemote>,
    cache: LicenseCache,
    /// Serializes issue/revoke so the duplicate check and the cache update
    /// see the same list.
    lock: Mutex<()>,
}

impl LicenseIssuer {
    pub fn new(remote: Arc<dyn LicenseRemote>, cache: LicenseCache) -> Self {
        LicenseIssuer {
            remote,
            cache,
            lock: Mutex::new(()),
        }
    }

    /// Issues a license for `request.hardware_id`.
    #[instrument(skip(self, request), fields(hardware_id = %request.hardware_id))]
    pub async fn issue(&self, request: &LicenseRequest) -> SyncResult<License> {
        validate_hardware_id(&request.hardware_id)?;
        validate_email(&request.email)?;
        let duration = validate_duration(&request.duration)?;

        let _guard = self.lock.lock().await;

        let cached = self.cache.all().await?;
        ensure_no_active_license(&cached, request.hardware_id.trim())?;

        let body = GenerateLicense {
            hardware_id: request.hardware_id.trim().to_string(),
            duration: duration.wire_value().to_string(),
            tier: request.tier.clone(),
            name: request.name.clone(),
            email: request.email.trim().to_string(),
            notes: request.notes.clone().unwrap_or_default(),
        };
        let generated = self.remote.generate(&body).await?;

        let license = License {
            id: generated.id,
            hardware_id: body.hardware_id,
            customer_email: body.email,
            customer_name: body.name,
            tier: body.tier,
            status: LicenseStatus::Active,
            creation_date: Utc::now(),
            expiration_date: generated.expiration_date,
            license_key: generated.license_key,
            formatted_key: generated.formatted_key,
            features: generated.features,
        };
        self.cache.prepend(license.clone()).await?;

        info!(license_id = %license.id, "License issued");
        Ok(license)
    }

    /// Replaces the cached list with the backend's.
    pub async fn refresh(&self, filters: &LicenseFilters) -> SyncResult<Vec<License>> {
        let licenses = self.remote.list_licenses(filters).await?;
        let _guard = self.lock.lock().await;
        self.cache.replace_all(licenses.clone()).await?;
        debug!(count = licenses.len(), "License cache refreshed");
        Ok(licenses)
    }

    /// Fetches one license from the backend.
    pub async fn license(&self, id: &str) -> SyncResult<License> {
        self.remote.get_license(id).await
    }

    /// Revokes a license and marks the cached copy.
    pub async fn revoke(&self, id: &str, reason: &str) -> SyncResult<License> {
        let _guard = self.lock.lock().await;
        self.remote.revoke(id, reason).await?;
        let revoked = self
            .cache
            .set_status(id, LicenseStatus::Revoked)
            .await?
            .ok_or_else(|| SyncError::not_found("license", id))?;
        info!(license_id = %id, "License revoked");
        Ok(revoked)
    }

    /// The cached list, newest first.
    pub async fn licenses(&self) -> SyncResult<Vec<License>> {
        Ok(self.cache.all().await?)
    }
}
