//! REST API request pipeline for the dashboard backend.
//!
//! `ApiClient` wraps every call with bearer-token attachment, a single
//! timeout retry for requests that are safe to repeat, and global handling
//! of 401 responses (forced logout plus redirect to the login screen).
//!
//! The network itself sits behind the `Transport` trait; `HttpTransport` is
//! the reqwest implementation.

pub mod client;
pub mod error;
pub mod request;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use request::{ApiRequest, ApiResponse, RetryClass, IDEMPOTENCY_KEY};
pub use transport::{HttpTransport, Transport, TransportError, TransportRequest, TransportResponse};
