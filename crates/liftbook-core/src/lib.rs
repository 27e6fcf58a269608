//! Liftbook core - session management for the Liftbook workout client.
//!
//! The crate owns everything between the user typing a password and an
//! authenticated request reaching the server:
//!
//! - [`auth::CredentialStore`]: durable persistence of the signed-in user and token pair
//! - [`auth::SessionStore`]: the session state machine consumers subscribe to
//! - [`auth::TokenRefresher`]: single-flight exchange of a refresh token
//! - [`api::AuthorizedClient`]: the request interceptor that retries after a refresh
//!
//! Consumers hold a [`auth::SessionStore`] handle explicitly; there is no global session.

pub mod api;
pub mod auth;
pub mod config;
pub mod consumer;
pub mod error;
pub mod models;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{AuthorizedClient, HttpTransport, Transport};
pub use auth::{CredentialStore, SessionStore, TokenRefresher};
pub use config::Config;
pub use error::{SessionError, StorageError};
pub use models::{SessionState, TokenPair, User};
