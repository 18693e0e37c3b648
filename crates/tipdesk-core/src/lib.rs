//! Core library for tipdesk.
//!
//! Provides the pieces every dashboard screen depends on:
//!
//! - [`auth::SessionStore`]: who is signed in, backed by durable token storage
//! - [`api::ApiClient`]: the request pipeline (bearer token, timeout retry,
//!   401 teardown, cancellation)
//! - [`navigation::Navigator`]: where the user currently is
//! - [`config`]: build-time pipeline settings and persisted user preferences

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod navigation;

pub use api::{ApiClient, ApiError, ApiRequest, ApiResponse};
pub use auth::{SessionSnapshot, SessionStore};
pub use config::{ApiConfig, Config, RetryPolicy};
pub use navigation::{MemoryNavigator, Navigator};
