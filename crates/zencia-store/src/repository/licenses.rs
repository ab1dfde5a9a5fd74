//! # License Cache
//!
//! The list of licenses last fetched from (or issued through) the admin
//! API. The issuer scans it for duplicate active hardware ids before
//! calling the remote.

use zencia_core::{License, LicenseStatus};

use crate::error::StoreResult;
use crate::kv::SharedStore;
use crate::repository::Document;

const LICENSES_KEY: &str = "cache/licenses";

/// Repository for cached licenses (newest first).
#[derive(Debug, Clone)]
pub struct LicenseCache {
    doc: Document<Vec<License>>,
}

impl LicenseCache {
    pub fn new(store: SharedStore) -> Self {
        LicenseCache {
            doc: Document::new(store, LICENSES_KEY),
        }
    }

    pub async fn all(&self) -> StoreResult<Vec<License>> {
        self.doc.read().await
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<License>> {
        Ok(self.all().await?.into_iter().find(|l| l.id == id))
    }

    /// Puts a newly issued license at the head of the list.
    pub async fn prepend(&self, license: License) -> StoreResult<()> {
        self.doc
            .modify(move |licenses| {
                licenses.retain(|l| l.id != license.id);
                licenses.insert(0, license);
            })
            .await
    }

    pub async fn replace_all(&self, licenses: Vec<License>) -> StoreResult<()> {
        self.doc.replace(&licenses).await
    }

    /// Sets the status of a cached license. Returns the updated entry.
    pub async fn set_status(&self, id: &str, status: LicenseStatus) -> StoreResult<Option<License>> {
        self.doc
            .modify(move |licenses| {
                licenses.iter_mut().find(|l| l.id == id).map(|l| {
                    l.status = status;
                    l.clone()
                })
            })
            .await
    }
}
