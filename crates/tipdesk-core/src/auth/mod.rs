//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: process-wide session state with login/register/logout
//! - `TokenStore`: the durable slot the bearer token lives in, with file,
//!   keychain and in-memory implementations
//!
//! Restored sessions are trusted optimistically until a request says otherwise.

pub mod credentials;
pub mod session;
pub mod storage;

pub use credentials::KeyringTokenStore;
pub use session::{AuthBackend, SessionGuard, SessionSnapshot, SessionStore};
pub use storage::{FileTokenStore, MemoryTokenStore, PersistedToken, TokenStore};
