//! Request pipeline shared by every feature of the dashboard.
//!
//! `ApiClient` decorates each outgoing request with the session's bearer
//! token, reissues timed-out requests that are safe to repeat, and turns a
//! 401 into a forced logout plus a redirect to the login screen.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{self, HeaderValue};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::request::{ApiRequest, ApiResponse};
use super::transport::{HttpTransport, Transport, TransportError, TransportRequest, TransportResponse};
use super::ApiError;
use crate::auth::{AuthBackend, SessionGuard};
use crate::config::ApiConfig;
use crate::models::{AuthPayload, Credentials, Envelope, Registration, UserProfile};
use crate::navigation::{route_of, Navigator};

const LOGIN_ENDPOINT: &str = "/auth/login";
const REGISTER_ENDPOINT: &str = "/auth/register";
const VERIFY_ENDPOINT: &str = "/auth/verify";

/// API client for the dashboard backend.
/// Clone is cheap; clones share the transport, session and navigator.
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ApiConfig>,
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionGuard>,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    /// Create a client that talks HTTP through reqwest
    pub fn new(
        config: ApiConfig,
        session: Arc<dyn SessionGuard>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(config.timeout)
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self::with_transport(config, Arc::new(transport), session, navigator))
    }

    pub fn with_transport(
        config: ApiConfig,
        transport: Arc<dyn Transport>,
        session: Arc<dyn SessionGuard>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            session,
            navigator,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Issue a request. Resolves with a 2xx response or rejects.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.dispatch(request, None).await
    }

    /// Like [`ApiClient::send`], but gives up with `ApiError::Cancelled` as
    /// soon as `cancel` fires, including during a retry backoff.
    pub async fn send_with_cancel(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ApiError> {
        self.dispatch(request, Some(cancel)).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// GET an endpoint following the `{ success, data }` convention.
    pub async fn get_envelope<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let envelope: Envelope<T> = self.get(path).await?;
        envelope.into_result()
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::put(path).json(body)?).await?.json()
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::delete(path)).await?.json()
    }

    async fn dispatch(
        &self,
        request: ApiRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<ApiResponse, ApiError> {
        let retry_safe = request.is_retry_safe();
        let policy = self.config.retry;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let outbound = self.prepare(&request)?;
            debug!(method = %request.method, path = %request.path, attempt = attempts, "Sending request");

            match cancellable(self.transport.execute(outbound), cancel).await? {
                Ok(response) => return self.inspect(&request, response),
                Err(TransportError::Timeout) => {
                    let retries_used = attempts - 1;
                    if !retry_safe || retries_used >= policy.max_timeout_retries {
                        warn!(
                            method = %request.method,
                            path = %request.path,
                            attempts = attempts,
                            retry_safe = retry_safe,
                            "Request timed out"
                        );
                        return Err(ApiError::Timeout { attempts });
                    }
                    let delay = policy.delay_for(attempts);
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        retry = attempts,
                        backoff_ms = delay.as_millis() as u64,
                        "Request timed out, retrying"
                    );
                    if !delay.is_zero() {
                        cancellable(tokio::time::sleep(delay), cancel).await?;
                    }
                }
                Err(TransportError::Network(message)) => {
                    warn!(method = %request.method, path = %request.path, error = %message, "Network error");
                    return Err(ApiError::Network(message));
                }
            }
        }
    }

    /// Outbound interceptor: resolve the URL and attach the bearer token.
    fn prepare(&self, request: &ApiRequest) -> Result<TransportRequest, ApiError> {
        let mut headers = request.headers.clone();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = self.session.bearer_token() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::InvalidRequest(format!("Bad bearer token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        Ok(TransportRequest {
            method: request.method.clone(),
            url: self.config.url_for(&request.path),
            headers,
            body: request.body.clone(),
            timeout: self.config.timeout,
        })
    }

    /// Inbound interceptor for responses that made it back.
    fn inspect(&self, request: &ApiRequest, response: TransportResponse) -> Result<ApiResponse, ApiError> {
        let status = response.status;
        if status.is_success() {
            debug!(method = %request.method, path = %request.path, status = status.as_u16(), "Request succeeded");
            return Ok(ApiResponse {
                status,
                headers: response.headers,
                body: response.body,
            });
        }

        if status.as_u16() == 401 {
            self.handle_unauthorized(request);
            return Err(ApiError::Unauthorized);
        }

        let body = String::from_utf8_lossy(&response.body);
        debug!(method = %request.method, path = %request.path, status = status.as_u16(), "Request failed");
        Err(ApiError::from_status(status, &body))
    }

    /// Tear the session down and send the user to the login screen, unless
    /// they are already there.
    fn handle_unauthorized(&self, request: &ApiRequest) {
        let location = self.navigator.current_path();
        if route_of(&location) == self.config.login_path {
            debug!(path = %request.path, "401 on login screen, leaving session alone");
            return;
        }
        warn!(path = %request.path, from = %location, "Session rejected by backend, returning to login");
        self.session.force_logout();
        self.navigator.redirect(&self.config.login_path);
    }
}

/// Race `fut` against an optional cancellation token.
async fn cancellable<F: Future>(fut: F, cancel: Option<&CancellationToken>) -> Result<F::Output, ApiError> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(ApiError::Cancelled),
            out = fut => Ok(out),
        },
        None => Ok(fut.await),
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<AuthPayload, ApiError> {
        self.post(LOGIN_ENDPOINT, credentials).await
    }

    async fn register(&self, registration: &Registration) -> Result<AuthPayload, ApiError> {
        self.post(REGISTER_ENDPOINT, registration).await
    }

    async fn verify(&self) -> Result<UserProfile, ApiError> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum VerifyResponse {
            Wrapped { user: UserProfile },
            Bare(UserProfile),
        }

        match self.get::<VerifyResponse>(VERIFY_ENDPOINT).await? {
            VerifyResponse::Wrapped { user } | VerifyResponse::Bare(user) => Ok(user),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use reqwest::header::HeaderMap;
    use reqwest::{Method, StatusCode};
    use serde_json::{json, Value};

    use super::*;
    use crate::auth::{MemoryTokenStore, SessionStore, TokenStore};
    use crate::api::request::IDEMPOTENCY_KEY;
    use crate::config::RetryPolicy;
    use crate::navigation::MemoryNavigator;

    type Outcome = Result<(u16, Value), TransportError>;

    /// Replays scripted outcomes in order and records every request seen
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Outcome>>,
        seen: Mutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Outcome>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(outcomes.into()),
                seen: Mutex::default(),
            })
        }

        fn seen(&self) -> Vec<TransportRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Timeout));
            next.map(|(status, body)| TransportResponse {
                status: StatusCode::from_u16(status).unwrap(),
                headers: HeaderMap::new(),
                body: serde_json::to_vec(&body).unwrap(),
            })
        }
    }

    /// Never answers
    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn execute(&self, _: TransportRequest) -> Result<TransportResponse, TransportError> {
            std::future::pending().await
        }
    }

    struct Harness {
        client: ApiClient,
        session: SessionStore,
        storage: Arc<MemoryTokenStore>,
        navigator: Arc<MemoryNavigator>,
    }

    fn harness(transport: Arc<dyn Transport>, token: Option<&str>, location: &str) -> Harness {
        let storage = Arc::new(match token {
            Some(t) => MemoryTokenStore::with_token(t),
            None => MemoryTokenStore::new(),
        });
        let session = SessionStore::new(storage.clone());
        session.initialize();
        let navigator = Arc::new(MemoryNavigator::new(location));
        let config = ApiConfig::with_base_url("http://backend.test/api").retry(RetryPolicy {
            max_timeout_retries: 1,
            backoff: Duration::ZERO,
        });
        let client = ApiClient::with_transport(
            config,
            transport,
            Arc::new(session.clone()),
            navigator.clone(),
        );
        Harness {
            client,
            session,
            storage,
            navigator,
        }
    }

    fn ok(body: Value) -> Outcome {
        Ok((200, body))
    }

    #[tokio::test]
    async fn test_attaches_bearer_token_when_signed_in() {
        let transport = ScriptedTransport::new(vec![ok(json!({"success": true}))]);
        let h = harness(transport.clone(), Some("abc123"), "/dashboard");

        let _: Value = h.client.get("/tips").await.unwrap();

        let seen = transport.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "http://backend.test/api/tips");
        assert_eq!(seen[0].method, Method::GET);
        assert_eq!(seen[0].headers.get(header::AUTHORIZATION).unwrap(), "Bearer abc123");
        assert_eq!(seen[0].timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_persisted_token_attached_before_initialize() {
        let transport = ScriptedTransport::new(vec![ok(json!({}))]);
        let session = SessionStore::new(Arc::new(MemoryTokenStore::with_token("abc123")));
        let client = ApiClient::with_transport(
            ApiConfig::with_base_url("http://backend.test/api"),
            transport.clone(),
            Arc::new(session.clone()),
            Arc::new(MemoryNavigator::new("/dashboard")),
        );

        let _: Value = client.get("/tips").await.unwrap();
        assert_eq!(
            transport.seen()[0].headers.get(header::AUTHORIZATION).unwrap(),
            "Bearer abc123"
        );
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_no_authorization_header_when_signed_out() {
        let transport = ScriptedTransport::new(vec![ok(json!([]))]);
        let h = harness(transport.clone(), None, "/news");

        let _: Value = h.client.get("/news/public").await.unwrap();
        assert!(transport.seen()[0].headers.get(header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_timeout_retried_once_then_succeeds() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            ok(json!({"price": 101.5})),
        ]);
        let h = harness(transport.clone(), Some("t"), "/dashboard");

        let quote: Value = h.client.get("/quotes/AAPL").await.unwrap();
        assert_eq!(quote["price"], 101.5);
        assert_eq!(transport.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_persistent_timeout_gives_two_attempts() {
        let transport = ScriptedTransport::new(vec![]);
        let h = harness(transport.clone(), Some("t"), "/dashboard");

        let err = h.client.get::<Value>("/slow").await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout { attempts: 2 }));
        assert_eq!(transport.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_post_timeout_not_retried() {
        let transport = ScriptedTransport::new(vec![]);
        let h = harness(transport.clone(), Some("t"), "/orders");

        let err = h
            .client
            .post::<Value, _>("/orders", &json!({"symbol": "AAPL", "qty": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Timeout { attempts: 1 }));
        assert_eq!(transport.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_post_with_idempotency_key_is_retried() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Timeout), ok(json!({"id": 9}))]);
        let h = harness(transport.clone(), Some("t"), "/orders");

        let request = ApiRequest::post("/orders")
            .json(&json!({"symbol": "AAPL"}))
            .unwrap()
            .idempotency_key("order-9")
            .unwrap();
        let response = h.client.send(request).await.unwrap();
        assert_eq!(response.json::<Value>().unwrap()["id"], 9);

        let seen = transport.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].body, seen[1].body);
        assert_eq!(seen[1].headers.get(IDEMPOTENCY_KEY).unwrap(), "order-9");
    }

    #[tokio::test]
    async fn test_retry_budget_is_configurable() {
        let transport = ScriptedTransport::new(vec![]);
        let mut h = harness(transport.clone(), None, "/");
        h.client = ApiClient::with_transport(
            ApiConfig::with_base_url("http://backend.test").retry(RetryPolicy {
                max_timeout_retries: 3,
                backoff: Duration::ZERO,
            }),
            transport.clone(),
            Arc::new(h.session.clone()),
            h.navigator.clone(),
        );

        let err = h.client.get::<Value>("/x").await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout { attempts: 4 }));
        assert_eq!(transport.seen().len(), 4);
    }

    #[tokio::test]
    async fn test_unauthorized_tears_down_session_and_redirects() {
        let transport = ScriptedTransport::new(vec![Ok((401, json!({"message": "expired"})))]);
        let h = harness(transport, Some("abc123"), "/dashboard");

        let err = h.client.get::<Value>("/portfolio").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(h.storage.load().unwrap(), None);
        assert!(!h.session.is_authenticated());
        assert_eq!(h.navigator.current_path(), "/login");
        assert_eq!(h.navigator.redirects(), vec!["/login"]);
    }

    #[tokio::test]
    async fn test_unauthorized_on_login_screen_is_not_redirected() {
        let transport = ScriptedTransport::new(vec![Ok((401, json!({}))), Ok((401, json!({})))]);
        let h = harness(transport, Some("abc123"), "/login?next=/tips");

        assert!(h.client.get::<Value>("/tips").await.unwrap_err().is_unauthorized());
        assert!(h.client.get::<Value>("/tips").await.unwrap_err().is_unauthorized());
        assert!(h.navigator.redirects().is_empty());
        assert_eq!(h.storage.load().unwrap().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_each_unauthorized_response_redirects_once() {
        let transport = ScriptedTransport::new(vec![Ok((401, json!({}))), Ok((401, json!({})))]);
        let h = harness(transport, Some("abc123"), "/dashboard");

        let _ = h.client.get::<Value>("/a").await;
        assert_eq!(h.navigator.redirects().len(), 1);

        // user wanders off the login screen and hits another 401
        h.navigator.navigate("/tips");
        let _ = h.client.get::<Value>("/b").await;
        assert_eq!(h.navigator.redirects(), vec!["/login", "/login"]);
    }

    #[tokio::test]
    async fn test_other_errors_propagate_unchanged() {
        let transport = ScriptedTransport::new(vec![
            Ok((404, json!({"message": "no such ticker"}))),
            Ok((503, json!({}))),
            Err(TransportError::Network("connection refused".into())),
        ]);
        let h = harness(transport, Some("t"), "/dashboard");

        assert!(matches!(h.client.get::<Value>("/t/ZZZ").await, Err(ApiError::NotFound(_))));
        assert!(matches!(h.client.get::<Value>("/t").await, Err(ApiError::ServerError(_))));
        assert!(matches!(h.client.get::<Value>("/t").await, Err(ApiError::Network(ref m)) if m == "connection refused"));
        assert!(h.session.is_authenticated());
        assert!(h.navigator.redirects().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_abandons_in_flight_request() {
        let h = harness(Arc::new(StalledTransport), Some("t"), "/dashboard");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = h
            .client
            .send_with_cancel(ApiRequest::get("/tips"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Timeout), ok(json!({}))]);
        let h = harness(transport.clone(), None, "/");
        let client = ApiClient::with_transport(
            ApiConfig::with_base_url("http://backend.test").retry(RetryPolicy {
                max_timeout_retries: 1,
                backoff: Duration::from_secs(60),
            }),
            transport.clone(),
            Arc::new(h.session.clone()),
            h.navigator.clone(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = client
            .send_with_cancel(ApiRequest::get("/tips"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Cancelled));
        assert_eq!(transport.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_login_through_pipeline_is_not_retried() {
        let transport = ScriptedTransport::new(vec![]);
        let h = harness(transport.clone(), None, "/login");

        let err = h
            .session
            .login(&h.client, "a@b.com", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Timeout { attempts: 1 }));
        assert_eq!(transport.seen().len(), 1);
        assert_eq!(transport.seen()[0].url, "http://backend.test/api/auth/login");
    }

    #[tokio::test]
    async fn test_bad_credentials_on_login_screen_keep_user_there() {
        let transport = ScriptedTransport::new(vec![Ok((401, json!({"message": "bad password"})))]);
        let h = harness(transport, None, "/login");

        let err = h.session.login(&h.client, "a@b.com", "nope").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(h.navigator.redirects().is_empty());
    }

    #[tokio::test]
    async fn test_verify_accepts_wrapped_and_bare_user() {
        let transport = ScriptedTransport::new(vec![
            ok(json!({"user": {"id": 1, "email": "a@b.com"}})),
            ok(json!({"id": 2, "name": "Bo"})),
        ]);
        let h = harness(transport, Some("t"), "/dashboard");

        let first = AuthBackend::verify(&h.client).await.unwrap();
        assert_eq!(first.email.as_deref(), Some("a@b.com"));
        let second = AuthBackend::verify(&h.client).await.unwrap();
        assert_eq!(second.name.as_deref(), Some("Bo"));
    }

    #[tokio::test]
    async fn test_get_envelope() {
        let transport = ScriptedTransport::new(vec![ok(json!({"success": true, "data": [1, 2, 3]}))]);
        let h = harness(transport, Some("t"), "/dashboard");

        let data: Vec<i32> = h.client.get_envelope("/digest").await.unwrap();
        assert_eq!(data, vec![1, 2, 3]);
    }
}
