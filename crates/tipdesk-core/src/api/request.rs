use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::ApiError;

/// Header that makes a non-idempotent request safe to reissue
pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

/// Whether a timed-out request may be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryClass {
    /// Decide from the method and an `Idempotency-Key` header
    #[default]
    Auto,
    Idempotent,
    NonIdempotent,
}

/// One logical call to the backend, before the pipeline decorates it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub retry: RetryClass,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            retry: RetryClass::Auto,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self, ApiError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::InvalidRequest(format!("Bad header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::InvalidRequest(format!("Bad header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Attach an idempotency key so the backend can deduplicate a retried call.
    pub fn idempotency_key(self, key: &str) -> Result<Self, ApiError> {
        self.header(IDEMPOTENCY_KEY, key)
    }

    pub fn retry_class(mut self, retry: RetryClass) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_retry_safe(&self) -> bool {
        match self.retry {
            RetryClass::Idempotent => true,
            RetryClass::NonIdempotent => false,
            RetryClass::Auto => {
                self.method.is_idempotent() || self.headers.contains_key(IDEMPOTENCY_KEY)
            }
        }
    }
}

/// A successful (2xx) backend response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {}", e)))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
