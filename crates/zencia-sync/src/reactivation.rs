//! # Reactivation Workflow
//!
//! Admin review of requests to move a license to new hardware.
//!
//! ```text
//!            approve(id) ──► Approved { new_license_id }
//!          ╱
//!   Pending
//!          ╲
//!            reject(id)  ──► Rejected
//! ```
//!
//! Both outcomes are terminal: a second decision on the same request is
//! `NotFound`. The workflow lock is held across the remote call so two
//! concurrent approvals cannot both reach the backend.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument};

use zencia_core::{ReactivationRequest, ReactivationStatus};
use zencia_store::ReactivationCache;

use crate::error::{SyncError, SyncResult};
use crate::http::Ack;
use crate::licenses::{LicenseRemote, ReactivationDecision, ReviewAction};

const ENTITY: &str = "reactivation request";

pub struct ReactivationWorkflow {
    remote: Arc<dyn LicenseRemote>,
    cache: ReactivationCache,
    lock: Mutex<()>,
}

impl ReactivationWorkflow {
    pub fn new(remote: Arc<dyn LicenseRemote>, cache: ReactivationCache) -> Self {
        ReactivationWorkflow {
            remote,
            cache,
            lock: Mutex::new(()),
        }
    }

    /// Reloads all requests from the backend.
    pub async fn refresh(&self) -> SyncResult<Vec<ReactivationRequest>> {
        let requests = self.remote.list_reactivations().await?;
        let _guard = self.lock.lock().await;
        self.cache.replace_all(requests.clone()).await?;
        Ok(requests)
    }

    /// Approves a pending request and returns the license issued for the
    /// new hardware id.
    #[instrument(skip(self))]
    pub async fn approve(&self, id: &str) -> SyncResult<String> {
        let _guard = self.lock.lock().await;
        let request = self.pending_request(id).await?;

        let decision = ReactivationDecision {
            id: request.id.clone(),
            action: ReviewAction::Approve,
            hardware_id: Some(request.new_hardware_id.clone()),
            email: Some(request.email.clone()),
        };
        let processed = self.remote.process_reactivation(&decision).await?;
        let new_license_id = processed.license_id.ok_or_else(|| SyncError::Server {
            status: None,
            message: "approval response has no license id".into(),
        })?;

        self.cache
            .set_status(
                id,
                ReactivationStatus::Approved {
                    new_license_id: new_license_id.clone(),
                },
            )
            .await?;
        info!(request_id = %id, license_id = %new_license_id, "Reactivation approved");
        Ok(new_license_id)
    }

    /// Rejects a pending request.
    #[instrument(skip(self))]
    pub async fn reject(&self, id: &str) -> SyncResult<Ack> {
        let _guard = self.lock.lock().await;
        let request = self.pending_request(id).await?;

        let decision = ReactivationDecision {
            id: request.id,
            action: ReviewAction::Reject,
            hardware_id: None,
            email: None,
        };
        self.remote.process_reactivation(&decision).await?;

        self.cache.set_status(id, ReactivationStatus::Rejected).await?;
        info!(request_id = %id, "Reactivation rejected");
        Ok(Ack::default())
    }

    pub async fn requests(&self) -> SyncResult<Vec<ReactivationRequest>> {
        Ok(self.cache.all().await?)
    }

    pub async fn pending(&self) -> SyncResult<Vec<ReactivationRequest>> {
        Ok(self
            .requests()
            .await?
            .into_iter()
            .filter(|r| r.status.is_pending())
            .collect())
    }

    async fn pending_request(&self, id: &str) -> SyncResult<ReactivationRequest> {
        self.cache
            .get(id)
            .await?
            .filter(|r| r.status.is_pending())
            .ok_or_else(|| SyncError::not_found(ENTITY, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{init_tracing, memory_store, Failure, FakeLicenseRemote};

    fn request(id: &str) -> ReactivationRequest {
        ReactivationRequest {
            id: id.into(),
            email: "a@b.com".into(),
            old_hardware_id: "OLD".into(),
            new_hardware_id: "NEW".into(),
            reason: "replaced motherboard".into(),
            requested_at: None,
            status: ReactivationStatus::Pending,
        }
    }

    async fn setup(ids: &[&str]) -> (Arc<FakeLicenseRemote>, Arc<ReactivationWorkflow>) {
        init_tracing();
        let remote = Arc::new(FakeLicenseRemote::new());
        remote.seed_reactivations(ids.iter().map(|id| request(id)).collect());
        let workflow = Arc::new(ReactivationWorkflow::new(
            remote.clone(),
            ReactivationCache::new(memory_store()),
        ));
        workflow.refresh().await.unwrap();
        (remote, workflow)
    }

    #[tokio::test]
    async fn test_approve_is_terminal() {
        let (remote, workflow) = setup(&["R1"]).await;

        let license_id = workflow.approve("R1").await.unwrap();
        assert!(license_id.starts_with("LIC"));

        let calls = remote.call_count();
        let err = workflow.approve("R1").await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { ref id, .. } if id == "R1"));
        assert!(matches!(workflow.reject("R1").await, Err(SyncError::NotFound { .. })));
        assert_eq!(remote.call_count(), calls);

        let stored = workflow.requests().await.unwrap();
        assert_eq!(
            stored[0].status,
            ReactivationStatus::Approved {
                new_license_id: license_id
            }
        );
    }

    #[tokio::test]
    async fn test_reject_and_pending_view() {
        let (_remote, workflow) = setup(&["R1", "R2"]).await;
        assert_eq!(workflow.pending().await.unwrap().len(), 2);

        workflow.reject("R2").await.unwrap();
        let pending = workflow.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "R1");
    }

    #[tokio::test]
    async fn test_unknown_request_is_not_found() {
        let (remote, workflow) = setup(&[]).await;
        let calls = remote.call_count();
        assert!(matches!(workflow.approve("nope").await, Err(SyncError::NotFound { .. })));
        assert_eq!(remote.call_count(), calls);
    }

    #[tokio::test]
    async fn test_concurrent_approvals_one_wins() {
        let (_remote, workflow) = setup(&["R1"]).await;
        let a = tokio::spawn({
            let workflow = workflow.clone();
            async move { workflow.approve("R1").await }
        });
        let b = tokio::spawn({
            let workflow = workflow.clone();
            async move { workflow.approve("R1").await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(SyncError::NotFound { .. }))));
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_request_pending() {
        let (remote, workflow) = setup(&["R1"]).await;
        remote.fail_with(Some(Failure::Server(500)));
        assert!(matches!(workflow.approve("R1").await, Err(SyncError::Server { .. })));
        assert_eq!(workflow.pending().await.unwrap().len(), 1);

        remote.fail_with(None);
        assert!(workflow.approve("R1").await.is_ok());
    }
}
