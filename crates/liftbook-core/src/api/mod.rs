//! REST API module for the Liftbook server.
//!
//! - `Transport`: the network seam, with the reqwest-backed `HttpTransport`
//! - `AuthApi`: sign-in, refresh and registration endpoints
//! - `AuthorizedClient`: bearer-token interceptor with refresh-and-retry,
//!   plus the typed workout calls consumers make through it
//!
//! The API uses JWT bearer tokens obtained from `POST /sessions`.

pub mod auth;
pub mod client;
pub mod error;
pub mod transport;

pub use auth::AuthApi;
pub use client::AuthorizedClient;
pub use error::ApiError;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
