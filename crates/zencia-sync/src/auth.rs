//! # Authentication
//!
//! Bearer tokens for the REST backend. The identity provider itself is an
//! external collaborator behind [`AuthProvider`].
//!
//! ## Token Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ApiClient ──get_token(false)──► TokenCache ──► AuthProvider           │
//! │      │                              │                                   │
//! │      │                              ├── cached & exp > now + 5 min     │
//! │      │                              │      → cached token              │
//! │      │                              └── otherwise → provider refresh   │
//! │      │                                                                  │
//! │      └── HTTP 401 ──get_token(true)──► forced refresh, one retry       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tokens are opaque to this crate. The `exp` claim is read without
//! verifying the signature, only to schedule refreshes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info};

use crate::error::SyncResult;
use crate::subscription::Subscription;

/// Refresh this long before `exp` (5 minutes).
const REFRESH_MARGIN_SECS: i64 = 300;

/// The signed-in dashboard user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl AuthUser {
    /// Name shown as a message sender.
    pub fn sender_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

/// Callback invoked with the new user (or `None` after sign-out).
pub type AuthCallback = Arc<dyn Fn(Option<AuthUser>) + Send + Sync>;

/// Identity provider seam.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_user(&self) -> Option<AuthUser>;

    /// Returns a bearer token, or `None` when nobody is signed in.
    /// `force_refresh` asks the provider for a new token even if the
    /// current one looks valid.
    async fn get_token(&self, force_refresh: bool) -> SyncResult<Option<String>>;

    /// Calls `callback` with the current user and on every change.
    fn on_auth_change(&self, callback: AuthCallback) -> Subscription;
}

// =============================================================================
// Token Cache
// =============================================================================

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    /// `exp` claim (unix seconds); `None` for non-JWT tokens.
    expires_at: Option<i64>,
}

impl CachedToken {
    fn new(token: String) -> Self {
        let expires_at = token_expiry(&token);
        CachedToken { token, expires_at }
    }

    fn needs_refresh(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now().timestamp() + REFRESH_MARGIN_SECS >= exp,
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: Option<i64>,
}

/// Reads the `exp` claim of a JWT without verifying it.
pub fn token_expiry(token: &str) -> Option<i64> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .and_then(|data| data.claims.exp)
}

/// Wraps a provider and refreshes its token ahead of expiry.
pub struct TokenCache {
    inner: Arc<dyn AuthProvider>,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(inner: Arc<dyn AuthProvider>) -> Self {
        TokenCache {
            inner,
            cached: RwLock::new(None),
        }
    }

    /// Drops the cached token (e.g. after sign-out).
    pub async fn clear(&self) {
        *self.cached.write().await = None;
    }
}

#[async_trait]
impl AuthProvider for TokenCache {
    async fn current_user(&self) -> Option<AuthUser> {
        self.inner.current_user().await
    }

    async fn get_token(&self, force_refresh: bool) -> SyncResult<Option<String>> {
        if !force_refresh {
            if let Some(cached) = self.cached.read().await.as_ref() {
                if !cached.needs_refresh() {
                    return Ok(Some(cached.token.clone()));
                }
            }
        }

        let mut guard = self.cached.write().await;
        // Double-check after acquiring write lock
        let near_expiry = match guard.as_ref() {
            Some(cached) if !force_refresh && !cached.needs_refresh() => {
                return Ok(Some(cached.token.clone()));
            }
            Some(_) => true,
            None => false,
        };

        let refresh = force_refresh || near_expiry;
        if refresh {
            debug!(forced = force_refresh, "Refreshing bearer token");
        }
        let token = self.inner.get_token(refresh).await?;
        *guard = token.clone().map(CachedToken::new);
        Ok(token)
    }

    fn on_auth_change(&self, callback: AuthCallback) -> Subscription {
        self.inner.on_auth_change(callback)
    }
}

// =============================================================================
// Static Auth (in-process provider)
// =============================================================================

/// In-process provider holding a user and a sequence of tokens.
///
/// A forced refresh advances to the next token when one is queued, which
/// mirrors a provider issuing a new token.
pub struct StaticAuth {
    user: watch::Sender<Option<AuthUser>>,
    tokens: Mutex<VecDeque<String>>,
    refreshes: AtomicUsize,
}

impl StaticAuth {
    /// Nobody signed in.
    pub fn signed_out() -> Self {
        let (user, _) = watch::channel(None);
        StaticAuth {
            user,
            tokens: Mutex::new(VecDeque::new()),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn signed_in(user: AuthUser, token: impl Into<String>) -> Self {
        let auth = Self::signed_out();
        auth.user.send_replace(Some(user));
        auth.tokens.try_lock().map(|mut t| t.push_back(token.into())).ok();
        auth
    }

    /// Queues the token handed out by the next forced refresh.
    pub async fn push_token(&self, token: impl Into<String>) {
        self.tokens.lock().await.push_back(token.into());
    }

    pub async fn sign_in(&self, user: AuthUser, token: impl Into<String>) {
        let mut tokens = self.tokens.lock().await;
        tokens.clear();
        tokens.push_back(token.into());
        info!(email = %user.email, "Signed in");
        self.user.send_replace(Some(user));
    }

    pub async fn sign_out(&self) {
        self.tokens.lock().await.clear();
        info!("Signed out");
        self.user.send_replace(None);
    }

    /// Number of forced refreshes served.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn current_user(&self) -> Option<AuthUser> {
        self.user.borrow().clone()
    }

    async fn get_token(&self, force_refresh: bool) -> SyncResult<Option<String>> {
        let mut tokens = self.tokens.lock().await;
        if force_refresh {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if tokens.len() > 1 {
                tokens.pop_front();
            }
        }
        Ok(tokens.front().cloned())
    }

    fn on_auth_change(&self, callback: AuthCallback) -> Subscription {
        let mut rx = self.user.subscribe();
        let task = tokio::spawn(async move {
            let current = rx.borrow_and_update().clone();
            callback(current);
            while rx.changed().await.is_ok() {
                let user = rx.borrow_and_update().clone();
                callback(user);
            }
        });
        Subscription::from_task(task)
    }
}
