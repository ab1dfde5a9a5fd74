//! # HTTP Plumbing
//!
//! Authenticated JSON requests against the REST backend, shared by the
//! ticket and license clients.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  get_token(false) ── None ──► Unauthenticated                          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  send (bounded wait) ── elapsed ──► Timeout        (retryable)         │
//! │        │              ── refused ──► Network        (retryable)         │
//! │        ▼                                                                │
//! │  401 ──► get_token(true) ──► send again ──► 401 ──► Unauthenticated    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  classify(status, content-type, body)                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Classification
//! | Condition                              | Error                         |
//! |----------------------------------------|-------------------------------|
//! | content type is not JSON (any status)  | `Server { status }`           |
//! | 403 / 404                              | `NotFound`                    |
//! | 400 / 409 / 422                        | `Validation` (body `error`)   |
//! | other non-2xx                          | `Server { status, message }`  |
//! | 2xx JSON that does not decode          | `Server`                      |

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use zencia_core::DedupKey;

use crate::auth::AuthProvider;
use crate::error::{SyncError, SyncResult};

/// Header carrying the dedup key of a mutating request.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Body field carrying the dedup key of a mutating request.
pub const CLIENT_REQUEST_ID_FIELD: &str = "clientRequestId";

/// What a request is about, used to build `NotFound` errors.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub entity: &'a str,
    pub id: &'a str,
}

impl<'a> Target<'a> {
    pub fn new(entity: &'a str, id: &'a str) -> Self {
        Target { entity, id }
    }
}

/// Acknowledgement body of mutations that return nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

/// A response as read off the wire, before classification.
#[derive(Debug)]
struct RawResponse {
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
}

/// Authenticated JSON client for one API base URL.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    auth: Arc<dyn AuthProvider>,
    timeout: Duration,
}

impl ApiClient {
    /// Creates a client. `timeout` bounds each request including reading
    /// the body.
    pub fn new(base_url: &str, auth: Arc<dyn AuthProvider>, timeout: Duration) -> SyncResult<Self> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(format!("not a base URL: {}", base_url)));
        }

        let http = reqwest::Client::builder().connect_timeout(timeout).build()?;

        Ok(ApiClient {
            http,
            base,
            auth,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    /// Appends path segments to the base URL. Segments are percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Like [`endpoint`](Self::endpoint) with query parameters; `None`
    /// values are skipped.
    pub fn endpoint_with_query(&self, segments: &[&str], query: &[(&str, Option<&str>)]) -> Url {
        let mut url = self.endpoint(segments);
        let present: Vec<(&str, &str)> = query
            .iter()
            .filter_map(|(k, v)| v.map(|v| (*k, v)))
            .collect();
        if !present.is_empty() {
            url.query_pairs_mut().extend_pairs(present);
        }
        url
    }

    // =========================================================================
    // Verbs
    // =========================================================================

    pub async fn get<T: DeserializeOwned>(&self, url: Url, target: Target<'_>) -> SyncResult<T> {
        self.send(Method::GET, url, None, None, target).await
    }

    /// POST with an optional dedup key forwarded as header and body field.
    pub async fn post<B, T>(
        &self,
        url: Url,
        body: &B,
        dedup_key: Option<&DedupKey>,
        target: Target<'_>,
    ) -> SyncResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = with_client_request_id(serde_json::to_value(body)?, dedup_key);
        self.send(Method::POST, url, Some(body), dedup_key, target).await
    }

    pub async fn put<B, T>(
        &self,
        url: Url,
        body: &B,
        dedup_key: Option<&DedupKey>,
        target: Target<'_>,
    ) -> SyncResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = with_client_request_id(serde_json::to_value(body)?, dedup_key);
        self.send(Method::PUT, url, Some(body), dedup_key, target).await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
        dedup_key: Option<&DedupKey>,
        target: Target<'_>,
    ) -> SyncResult<T> {
        let token = self.token(false).await?;
        debug!(method = %method, url = %url, "API request");

        let mut raw = self
            .execute(&method, &url, body.as_ref(), dedup_key, &token)
            .await?;

        if raw.status == 401 {
            debug!(url = %url, "Credential rejected, forcing token refresh");
            let token = self.token(true).await?;
            raw = self
                .execute(&method, &url, body.as_ref(), dedup_key, &token)
                .await?;
            if raw.status == 401 {
                warn!(url = %url, "Credential rejected after refresh");
                return Err(SyncError::Unauthenticated(
                    "credential rejected after refresh".into(),
                ));
            }
        }

        classify(raw.status, raw.content_type.as_deref(), &raw.body, target)
    }

    async fn token(&self, force_refresh: bool) -> SyncResult<String> {
        self.auth
            .get_token(force_refresh)
            .await?
            .ok_or_else(|| SyncError::Unauthenticated("no credential available".into()))
    }

    async fn execute(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
        dedup_key: Option<&DedupKey>,
        token: &str,
    ) -> SyncResult<RawResponse> {
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(token);
        if let Some(key) = dedup_key {
            request = request.header(IDEMPOTENCY_HEADER, key.as_str());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await?.to_vec();
            Ok::<_, SyncError>(RawResponse {
                status,
                content_type,
                body,
            })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

fn with_client_request_id(mut body: Value, dedup_key: Option<&DedupKey>) -> Value {
    if let (Some(key), Some(map)) = (dedup_key, body.as_object_mut()) {
        map.insert(
            CLIENT_REQUEST_ID_FIELD.to_string(),
            Value::String(key.as_str().to_string()),
        );
    }
    body
}

/// Maps a response onto the typed error taxonomy, or decodes it.
pub(crate) fn classify<T: DeserializeOwned>(
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
    target: Target<'_>,
) -> SyncResult<T> {
    let is_json = content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(SyncError::Server {
            status: Some(status),
            message: format!(
                "expected a JSON response, got {}",
                content_type.unwrap_or("no content type")
            ),
        });
    }

    if (200..300).contains(&status) {
        return serde_json::from_slice(body).map_err(|e| SyncError::Server {
            status: Some(status),
            message: format!("response did not decode: {}", e),
        });
    }

    let message = error_message(body).unwrap_or_else(|| format!("Status {}", status));
    match status {
        403 | 404 => Err(SyncError::not_found(target.entity, target.id)),
        400 | 409 | 422 => Err(SyncError::Validation(message)),
        _ => Err(SyncError::Server {
            status: Some(status),
            message,
        }),
    }
}

fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, StaticAuth};
    use serde::Deserialize;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Echo {
        ok: bool,
    }

    fn target() -> Target<'static> {
        Target::new("ticket", "T1")
    }

    fn user() -> AuthUser {
        AuthUser {
            uid: "u1".into(),
            email: "a@b.com".into(),
            display_name: None,
            is_admin: true,
        }
    }

    fn client(base: &str, auth: Arc<dyn AuthProvider>) -> ApiClient {
        ApiClient::new(base, auth, Duration::from_millis(500)).unwrap()
    }

    #[test]
    fn test_classification_table() {
        let json = Some("application/json; charset=utf-8");
        let err = classify::<Echo>(404, json, br#"{"error":"gone"}"#, target()).unwrap_err();
        assert!(matches!(err, SyncError::NotFound { ref id, .. } if id == "T1"));

        let err = classify::<Echo>(403, json, b"{}", target()).unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));

        let err = classify::<Echo>(409, json, br#"{"error":"duplicate"}"#, target()).unwrap_err();
        assert!(matches!(err, SyncError::Validation(ref m) if m == "duplicate"));

        let err = classify::<Echo>(500, json, br#"{"message":"boom"}"#, target()).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Server { status: Some(500), ref message } if message == "boom"
        ));

        let err = classify::<Echo>(200, Some("text/html"), b"<html>", target()).unwrap_err();
        assert!(matches!(err, SyncError::Server { status: Some(200), .. }));

        let err = classify::<Echo>(200, json, br#"{"unexpected":1}"#, target()).unwrap_err();
        assert!(matches!(err, SyncError::Server { .. }));

        let ok = classify::<Echo>(201, json, br#"{"ok":true}"#, target()).unwrap();
        assert_eq!(ok, Echo { ok: true });
    }

    #[test]
    fn test_endpoint_building() {
        let auth: Arc<dyn AuthProvider> = Arc::new(StaticAuth::signed_out());
        let api = client("http://localhost:8080/api/", auth);
        assert_eq!(
            api.endpoint(&["tickets", "T 1", "messages"]).as_str(),
            "http://localhost:8080/api/tickets/T%201/messages"
        );
        let url = api.endpoint_with_query(
            &["tickets"],
            &[("email", Some("a@b.com")), ("status", None), ("search", Some("key"))],
        );
        assert_eq!(url.query(), Some("email=a%40b.com&search=key"));
        assert_eq!(api.endpoint(&["tickets"]).query(), None);
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthenticated() {
        let auth: Arc<dyn AuthProvider> = Arc::new(StaticAuth::signed_out());
        let api = client("http://127.0.0.1:1", auth);
        let err = api
            .get::<Echo>(api.endpoint(&["tickets"]), target())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Unauthenticated(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network() {
        let auth: Arc<dyn AuthProvider> = Arc::new(StaticAuth::signed_in(user(), "t1"));
        let api = client("http://127.0.0.1:1", auth);
        let err = api
            .get::<Echo>(api.endpoint(&["tickets"]), target())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Network(_)), "got {:?}", err);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let auth: Arc<dyn AuthProvider> = Arc::new(StaticAuth::signed_in(user(), "t1"));
        let api = ApiClient::new(&server.uri(), auth, Duration::from_millis(100)).unwrap();
        let err = api
            .get::<Echo>(api.endpoint(&["slow"]), target())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Timeout(100)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_once_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tickets"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "expired"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tickets"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let auth = Arc::new(StaticAuth::signed_in(user(), "stale"));
        auth.push_token("fresh").await;
        let api = client(&server.uri(), auth.clone());

        let echo: Echo = api.get(api.endpoint(&["tickets"]), target()).await.unwrap();
        assert!(echo.ok);
        assert_eq!(auth.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_second_unauthorized_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "nope"})))
            .expect(2)
            .mount(&server)
            .await;

        let auth = Arc::new(StaticAuth::signed_in(user(), "t1"));
        let api = client(&server.uri(), auth.clone());
        let err = api
            .get::<Echo>(api.endpoint(&["tickets"]), target())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Unauthenticated(_)));
        assert_eq!(auth.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_post_forwards_dedup_key() {
        let server = MockServer::start().await;
        let key = DedupKey::derive("T1", "hello", chrono::Utc::now());
        Mock::given(method("POST"))
            .and(path("/tickets/T1/messages"))
            .and(header(IDEMPOTENCY_HEADER, key.as_str()))
            .and(wiremock::matchers::body_partial_json(
                json!({"message": "hello", "clientRequestId": key.as_str()}),
            ))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let auth: Arc<dyn AuthProvider> = Arc::new(StaticAuth::signed_in(user(), "t1"));
        let api = client(&server.uri(), auth);
        let echo: Echo = api
            .post(
                api.endpoint(&["tickets", "T1", "messages"]),
                &json!({"message": "hello"}),
                Some(&key),
                target(),
            )
            .await
            .unwrap();
        assert!(echo.ok);
    }
}
