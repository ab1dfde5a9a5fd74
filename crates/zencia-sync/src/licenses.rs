//! # Remote License Client
//!
//! License administration endpoints used by [`crate::issuer`] and
//! [`crate::reactivation`].
//!
//! ```text
//! POST /admin/generate-license       { hwid, duration, tier, name, email, notes }
//! GET  /admin/licenses?status=&tier=&search=
//! GET  /admin/license/{id}
//! POST /admin/revoke-license         { id, reason }
//! GET  /admin/reactivations          { pending: [], approved: [], rejected: [] }
//! POST /admin/process-reactivation   { id, action, hwid?, email? } → { license_id? }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use zencia_core::{License, LicenseFilters, LicenseStatus, ReactivationRequest, ReactivationStatus};

use crate::error::{SyncError, SyncResult};
use crate::http::{Ack, ApiClient, Target};

// =============================================================================
// Request / Response Types
// =============================================================================

/// Body of a license generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateLicense {
    #[serde(rename = "hwid")]
    pub hardware_id: String,
    pub duration: String,
    pub tier: String,
    pub name: String,
    pub email: String,
    pub notes: String,
}

/// What the backend returns for a generated license.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedLicense {
    pub id: String,
    pub license_key: String,
    pub formatted_key: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub features: Vec<String>,
}

/// Generation response; the backend has used both field spellings.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    license_id: Option<String>,
    id: Option<String>,
    license_key: Option<String>,
    key: Option<String>,
    formatted_key: Option<String>,
    expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    features: Vec<String>,
}

impl GenerateResponse {
    fn into_generated(self) -> SyncResult<GeneratedLicense> {
        let missing = |field: &str| SyncError::Server {
            status: None,
            message: format!("generate-license response has no {}", field),
        };
        Ok(GeneratedLicense {
            id: self.license_id.or(self.id).ok_or_else(|| missing("license id"))?,
            license_key: self
                .license_key
                .or(self.key)
                .ok_or_else(|| missing("license key"))?,
            formatted_key: self.formatted_key,
            expiration_date: self.expiration_date,
            features: self.features,
        })
    }
}

/// Review decision sent for a reactivation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactivationDecision {
    pub id: String,
    pub action: ReviewAction,
    #[serde(rename = "hwid", skip_serializing_if = "Option::is_none")]
    pub hardware_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
}

/// Result of processing a reactivation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProcessedReactivation {
    #[serde(alias = "newLicenseId", default)]
    pub license_id: Option<String>,
}

#[derive(Deserialize)]
struct LicenseList {
    #[serde(default)]
    licenses: Vec<License>,
}

/// `GET /admin/license/{id}` answers either the bare license or
/// `{ license: {...} }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum LicenseBody {
    Wrapped { license: License },
    Bare(License),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReactivation {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(alias = "old_hwid", default)]
    old_hardware_id: String,
    #[serde(alias = "new_hwid", default)]
    new_hardware_id: String,
    #[serde(default)]
    reason: String,
    #[serde(alias = "createdAt", default)]
    requested_at: Option<DateTime<Utc>>,
    #[serde(alias = "new_license_id", default)]
    new_license_id: Option<String>,
}

#[derive(Deserialize)]
struct ReactivationGroups {
    #[serde(default)]
    pending: Vec<WireReactivation>,
    #[serde(default)]
    approved: Vec<WireReactivation>,
    #[serde(default)]
    rejected: Vec<WireReactivation>,
}

impl ReactivationGroups {
    fn into_requests(self) -> Vec<ReactivationRequest> {
        let pending = self
            .pending
            .into_iter()
            .map(|r| into_request(r, ReactivationStatus::Pending));
        let rejected = self
            .rejected
            .into_iter()
            .map(|r| into_request(r, ReactivationStatus::Rejected));
        let approved = self.approved.into_iter().filter_map(|r| {
            match r.new_license_id.clone() {
                Some(new_license_id) => {
                    Some(into_request(r, ReactivationStatus::Approved { new_license_id }))
                }
                None => {
                    warn!(request_id = %r.id, "Skipping approved reactivation without a license id");
                    None
                }
            }
        });
        pending.chain(approved).chain(rejected).collect()
    }
}

fn into_request(wire: WireReactivation, status: ReactivationStatus) -> ReactivationRequest {
    ReactivationRequest {
        id: wire.id,
        email: wire.email,
        old_hardware_id: wire.old_hardware_id,
        new_hardware_id: wire.new_hardware_id,
        reason: wire.reason,
        requested_at: wire.requested_at,
        status,
    }
}

fn status_param(status: LicenseStatus) -> &'static str {
    match status {
        LicenseStatus::Active => "active",
        LicenseStatus::Expired => "expired",
        LicenseStatus::Revoked => "revoked",
    }
}

// =============================================================================
// Remote Trait
// =============================================================================

/// Remote license administration.
#[async_trait]
pub trait LicenseRemote: Send + Sync {
    async fn generate(&self, request: &GenerateLicense) -> SyncResult<GeneratedLicense>;

    async fn list_licenses(&self, filters: &LicenseFilters) -> SyncResult<Vec<License>>;

    async fn get_license(&self, id: &str) -> SyncResult<License>;

    async fn revoke(&self, id: &str, reason: &str) -> SyncResult<Ack>;

    async fn list_reactivations(&self) -> SyncResult<Vec<ReactivationRequest>>;

    async fn process_reactivation(
        &self,
        decision: &ReactivationDecision,
    ) -> SyncResult<ProcessedReactivation>;
}

/// [`LicenseRemote`] over the admin REST API.
#[derive(Clone)]
pub struct HttpLicenseClient {
    api: ApiClient,
}

impl HttpLicenseClient {
    pub fn new(api: ApiClient) -> Self {
        HttpLicenseClient { api }
    }
}

#[async_trait]
impl LicenseRemote for HttpLicenseClient {
    async fn generate(&self, request: &GenerateLicense) -> SyncResult<GeneratedLicense> {
        let response: GenerateResponse = self
            .api
            .post(
                self.api.endpoint(&["admin", "generate-license"]),
                request,
                None,
                Target::new("license", &request.hardware_id),
            )
            .await?;
        response.into_generated()
    }

    async fn list_licenses(&self, filters: &LicenseFilters) -> SyncResult<Vec<License>> {
        let url = self.api.endpoint_with_query(
            &["admin", "licenses"],
            &[
                ("status", filters.status.map(status_param)),
                ("tier", filters.tier.as_deref().filter(|t| *t != "all")),
                ("search", filters.search.as_deref().filter(|s| !s.is_empty())),
            ],
        );
        let list: LicenseList = self.api.get(url, Target::new("licenses", "all")).await?;
        Ok(list.licenses)
    }

    async fn get_license(&self, id: &str) -> SyncResult<License> {
        let body: LicenseBody = self
            .api
            .get(self.api.endpoint(&["admin", "license", id]), Target::new("license", id))
            .await?;
        Ok(match body {
            LicenseBody::Wrapped { license } => license,
            LicenseBody::Bare(license) => license,
        })
    }

    async fn revoke(&self, id: &str, reason: &str) -> SyncResult<Ack> {
        #[derive(Serialize)]
        struct RevokeBody<'a> {
            id: &'a str,
            reason: &'a str,
        }
        self.api
            .post(
                self.api.endpoint(&["admin", "revoke-license"]),
                &RevokeBody { id, reason },
                None,
                Target::new("license", id),
            )
            .await
    }

    async fn list_reactivations(&self) -> SyncResult<Vec<ReactivationRequest>> {
        let groups: ReactivationGroups = self
            .api
            .get(
                self.api.endpoint(&["admin", "reactivations"]),
                Target::new("reactivations", "all"),
            )
            .await?;
        Ok(groups.into_requests())
    }

    async fn process_reactivation(
        &self,
        decision: &ReactivationDecision,
    ) -> SyncResult<ProcessedReactivation> {
        self.api
            .post(
                self.api.endpoint(&["admin", "process-reactivation"]),
                decision,
                None,
                Target::new("reactivation request", &decision.id),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthProvider, AuthUser, StaticAuth};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpLicenseClient {
        let admin = AuthUser {
            uid: "admin".into(),
            email: "admin@zencia.dev".into(),
            display_name: None,
            is_admin: true,
        };
        let auth: Arc<dyn AuthProvider> = Arc::new(StaticAuth::signed_in(admin, "t1"));
        HttpLicenseClient::new(ApiClient::new(&server.uri(), auth, Duration::from_secs(2)).unwrap())
    }

    fn request() -> GenerateLicense {
        GenerateLicense {
            hardware_id: "ABC123".into(),
            duration: "15d".into(),
            tier: "basic".into(),
            name: "Ada".into(),
            email: "a@b.com".into(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_generate_accepts_both_spellings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/generate-license"))
            .and(body_json(json!({
                "hwid": "ABC123",
                "duration": "15d",
                "tier": "basic",
                "name": "Ada",
                "email": "a@b.com",
                "notes": ""
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "LIC1", "key": "XXXX-YYYY"})),
            )
            .mount(&server)
            .await;

        let generated = client(&server).generate(&request()).await.unwrap();
        assert_eq!(generated.id, "LIC1");
        assert_eq!(generated.license_key, "XXXX-YYYY");
        assert_eq!(generated.expiration_date, None);

        let response: GenerateResponse = serde_json::from_value(json!({
            "license_id": "LIC2",
            "license_key": "K",
            "formatted_key": "K-K",
            "expiration_date": "2026-01-15T00:00:00Z"
        }))
        .unwrap();
        let generated = response.into_generated().unwrap();
        assert_eq!(generated.id, "LIC2");
        assert!(generated.expiration_date.is_some());
    }

    #[test]
    fn test_generate_without_key_is_server_error() {
        let response: GenerateResponse = serde_json::from_value(json!({"id": "LIC1"})).unwrap();
        assert!(matches!(
            response.into_generated(),
            Err(SyncError::Server { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_licenses_with_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/licenses"))
            .and(query_param("status", "active"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "licenses": [{
                    "license_id": "LIC1",
                    "hwid": "ABC123",
                    "email": "a@b.com",
                    "tier": "basic",
                    "status": "ACTIVE",
                    "creation_date": "2025-01-01T00:00:00Z",
                    "license_key": "XXXX-YYYY"
                }]
            })))
            .mount(&server)
            .await;

        let filters = LicenseFilters {
            status: Some(LicenseStatus::Active),
            ..Default::default()
        };
        let licenses = client(&server).list_licenses(&filters).await.unwrap();
        assert_eq!(licenses.len(), 1);
        assert_eq!(licenses[0].hardware_id, "ABC123");
        assert!(licenses[0].is_active());
    }

    #[tokio::test]
    async fn test_reactivation_groups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/reactivations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pending": [{"id": "R1", "email": "a@b.com", "oldHardwareId": "OLD", "newHardwareId": "NEW", "reason": "new laptop"}],
                "approved": [
                    {"id": "R2", "email": "c@d.com", "newLicenseId": "LIC9"},
                    {"id": "R3", "email": "e@f.com"}
                ],
                "rejected": [{"id": "R4", "email": "g@h.com"}]
            })))
            .mount(&server)
            .await;

        let requests = client(&server).list_reactivations().await.unwrap();
        let ids: Vec<_> = requests.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["R1", "R2", "R4"]);
        assert_eq!(requests[0].new_hardware_id, "NEW");
        assert_eq!(
            requests[1].status,
            ReactivationStatus::Approved {
                new_license_id: "LIC9".into()
            }
        );
        assert_eq!(requests[2].status, ReactivationStatus::Rejected);
    }

    #[tokio::test]
    async fn test_process_reactivation_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/process-reactivation"))
            .and(body_json(json!({"id": "R1", "action": "reject"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        let decision = ReactivationDecision {
            id: "R1".into(),
            action: ReviewAction::Reject,
            hardware_id: None,
            email: None,
        };
        let processed = client(&server).process_reactivation(&decision).await.unwrap();
        assert_eq!(processed.license_id, None);
    }
}
