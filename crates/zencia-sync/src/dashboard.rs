//! # Dashboard Wiring
//!
//! Opens the local store and connects every component to one auth
//! provider and one configuration.
//!
//! ```text
//!   DashboardConfig ──► Database (SQLite) ──► SharedStore
//!                                                 │
//!   AuthProvider ──► TokenCache ──┬──► ApiClient (tickets)  ──► SyncCoordinator ──► CoordinatorHandle
//!                                 └──► ApiClient (licenses) ──► LicenseIssuer
//!                                                           └──► ReactivationWorkflow
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use zencia_store::{
    Database, LicenseCache, ReactivationCache, SharedStore, StoreConfig,
};

use crate::auth::{AuthCallback, AuthProvider, TokenCache};
use crate::config::DashboardConfig;
use crate::coordinator::{
    CoordinatorHandle, SyncCoordinator, SyncCoordinatorBuilder, SyncEventEmitter,
};
use crate::error::{SyncError, SyncResult};
use crate::http::ApiClient;
use crate::issuer::LicenseIssuer;
use crate::licenses::{HttpLicenseClient, LicenseRemote};
use crate::reactivation::ReactivationWorkflow;
use crate::subscription::Subscription;
use crate::tickets::{watch_ticket, HttpTicketClient, RemoteTicketClient, TicketCallback};

fn store_config(path: Option<PathBuf>) -> SyncResult<StoreConfig> {
    path.map(StoreConfig::new).ok_or_else(|| {
        SyncError::InvalidConfig(
            "no store path: set [store] path or ZENCIA_STORE_PATH".into(),
        )
    })
}

/// The running sync core of one dashboard session.
pub struct Dashboard {
    config: DashboardConfig,
    auth: Arc<TokenCache>,
    database: Option<Database>,
    tickets: Arc<dyn RemoteTicketClient>,
    sync: CoordinatorHandle,
    issuer: LicenseIssuer,
    reactivations: ReactivationWorkflow,
    _sign_out: Subscription,
}

impl Dashboard {
    /// Opens the store named by `config` and starts the coordinator loop.
    /// Fails when no store path can be resolved, since queued actions must
    /// outlive the session.
    pub async fn open(
        config: DashboardConfig,
        auth: Arc<dyn AuthProvider>,
        emitter: Option<Arc<dyn SyncEventEmitter>>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let database = Database::new(store_config(config.store_path())?).await?;
        let store = database.kv();

        let mut dashboard = Self::with_store(config, auth, store, emitter)?;
        dashboard.database = Some(database);
        Ok(dashboard)
    }

    /// Same as [`Dashboard::open`] over an already open store.
    pub fn with_store(
        config: DashboardConfig,
        auth: Arc<dyn AuthProvider>,
        store: SharedStore,
        emitter: Option<Arc<dyn SyncEventEmitter>>,
    ) -> SyncResult<Self> {
        let auth = Arc::new(TokenCache::new(auth));
        let provider: Arc<dyn AuthProvider> = auth.clone();
        let timeout = config.request_timeout();

        let tickets: Arc<dyn RemoteTicketClient> = Arc::new(HttpTicketClient::new(ApiClient::new(
            &config.api.base_url,
            provider.clone(),
            timeout,
        )?));
        let licenses: Arc<dyn LicenseRemote> = Arc::new(HttpLicenseClient::new(ApiClient::new(
            &config.api.license_base_url,
            provider.clone(),
            timeout,
        )?));

        let mut builder = SyncCoordinatorBuilder::new(config.clone())
            .with_store(store.clone())
            .with_auth(provider)
            .with_remote(tickets.clone());
        if let Some(emitter) = emitter {
            builder = builder.with_emitter(emitter);
        }
        let sync = builder.build()?.spawn();

        let issuer = LicenseIssuer::new(licenses.clone(), LicenseCache::new(store.clone()));
        let reactivations = ReactivationWorkflow::new(licenses, ReactivationCache::new(store));

        // A signed-out session must not reuse the previous bearer token
        let on_change = {
            let cache = auth.clone();
            let callback: AuthCallback = Arc::new(move |user| {
                if user.is_none() {
                    let cache = cache.clone();
                    tokio::spawn(async move { cache.clear().await });
                }
            });
            auth.on_auth_change(callback)
        };

        info!(api = %config.api.base_url, "Dashboard sync core started");
        Ok(Dashboard {
            config,
            auth,
            database: None,
            tickets,
            sync,
            issuer,
            reactivations,
            _sign_out: on_change,
        })
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        self.sync.coordinator()
    }

    /// Control handle of the coordinator loop (connectivity, manual sync).
    pub fn sync(&self) -> &CoordinatorHandle {
        &self.sync
    }

    pub fn issuer(&self) -> &LicenseIssuer {
        &self.issuer
    }

    pub fn reactivations(&self) -> &ReactivationWorkflow {
        &self.reactivations
    }

    pub fn auth(&self) -> Arc<dyn AuthProvider> {
        self.auth.clone()
    }

    /// Polls one ticket of the signed-in user at the configured interval.
    pub async fn watch_ticket(
        &self,
        ticket_id: &str,
        callback: TicketCallback,
    ) -> SyncResult<Subscription> {
        let user = self
            .auth
            .current_user()
            .await
            .ok_or_else(|| SyncError::Unauthenticated("sign in to watch tickets".into()))?;
        Ok(watch_ticket(
            self.tickets.clone(),
            ticket_id.to_string(),
            user.email,
            self.config.watch_interval(),
            callback,
        ))
    }

    /// Stops the coordinator loop and closes the store. Queued actions stay
    /// on disk for the next session.
    pub async fn shutdown(self) {
        self.sync.shutdown().await;
        if let Some(database) = &self.database {
            database.close().await;
        }
        info!("Dashboard sync core stopped");
    }
}
