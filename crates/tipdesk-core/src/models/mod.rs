//! Data models shared by the session store and the request pipeline.
//!
//! - `UserProfile`, `UserId`: the signed-in user as returned by auth endpoints
//! - `AuthPayload`, `Credentials`, `Registration`: auth request/response bodies
//! - `Envelope`: the `{ success, data }` response convention of the backend

pub mod envelope;
pub mod user;

pub use envelope::Envelope;
pub use user::{AuthPayload, Credentials, Registration, UserId, UserProfile};
