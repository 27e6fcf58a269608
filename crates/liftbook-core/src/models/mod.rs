//! Data models for Liftbook entities.
//!
//! - `User`, `TokenPair`, `ProfileUpdate`: identity and credentials
//! - `SessionState`: what consumers see of the current session
//! - `HistoryDay`, `HistoryEntry`, `Exercise`: workout data fetched by consumers

pub mod user;
pub mod workout;

pub use user::{PasswordChange, ProfileUpdate, SessionState, TokenPair, User};
pub use workout::{Exercise, HistoryDay, HistoryEntry};
