//! Authentication module: session state and credential persistence.
//!
//! This module provides:
//! - `SessionStore`: the session state machine consumers subscribe to
//! - `CredentialStore`: durable storage of the user and token pair
//!   (file, OS keychain or in-memory)
//! - `TokenRefresher`: single-flight refresh-token exchange

pub mod credentials;
pub mod refresher;
pub mod session;

use std::sync::{Mutex, MutexGuard};

pub use credentials::{
    CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore,
};
pub use refresher::TokenRefresher;
pub use session::{SessionEvent, SessionSnapshot, SessionStore, Subscription};

/// Lock a std mutex, recovering the data if a listener panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
