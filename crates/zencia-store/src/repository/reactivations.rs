//! # Reactivation Cache
//!
//! Reactivation requests as last loaded from the admin API, with local
//! status updates applied after approve/reject.

use zencia_core::{ReactivationRequest, ReactivationStatus};

use crate::error::StoreResult;
use crate::kv::SharedStore;
use crate::repository::Document;

const REACTIVATIONS_KEY: &str = "cache/reactivations";

#[derive(Debug, Clone)]
pub struct ReactivationCache {
    doc: Document<Vec<ReactivationRequest>>,
}

impl ReactivationCache {
    pub fn new(store: SharedStore) -> Self {
        ReactivationCache {
            doc: Document::new(store, REACTIVATIONS_KEY),
        }
    }

    pub async fn all(&self) -> StoreResult<Vec<ReactivationRequest>> {
        self.doc.read().await
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<ReactivationRequest>> {
        Ok(self.all().await?.into_iter().find(|r| r.id == id))
    }

    pub async fn replace_all(&self, requests: Vec<ReactivationRequest>) -> StoreResult<()> {
        self.doc.replace(&requests).await
    }

    /// Records a review decision. Returns the updated request.
    pub async fn set_status(
        &self,
        id: &str,
        status: ReactivationStatus,
    ) -> StoreResult<Option<ReactivationRequest>> {
        self.doc
            .modify(move |requests| {
                requests.iter_mut().find(|r| r.id == id).map(|r| {
                    r.status = status;
                    r.clone()
                })
            })
            .await
    }
}
