//! Error taxonomy surfaced to session consumers.
//!
//! Expected rejections (`Credentials`, `Transport`) are kept apart from
//! local persistence faults (`Storage`) so a corrupt store is never mistaken
//! for a bad password.

use thiserror::Error;

use crate::api::ApiError;

/// Local persistence failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Credential storage unavailable: {0}")]
    Unavailable(String),

    #[error("Stored session is corrupt: {0}")]
    Corrupt(String),
}

/// Outcome of a refresh-token exchange. Cloned to every caller that joined the exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Refresh token rejected")]
    Expired,

    #[error("Network error during token refresh: {0}")]
    Transport(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// E-mail/password rejected. Carries the server's reason when it sent one.
    #[error("{}", .0.as_deref().unwrap_or("Invalid e-mail or password"))]
    Credentials(Option<String>),

    #[error("Session expired - please sign in again")]
    SessionExpired,

    #[error("Network error: {0}")]
    Transport(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Non-authorization failure passed through from the server
    #[error(transparent)]
    Api(ApiError),

    #[error("Not signed in")]
    NotAuthenticated,
}

impl SessionError {
    /// Text for the single notification shown to the user: the server's
    /// own reason when it supplied one, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            SessionError::Credentials(Some(message)) => message.clone(),
            SessionError::Api(ApiError::Rejected { message, .. }) => message.clone(),
            SessionError::Credentials(None) => self.to_string(),
            SessionError::SessionExpired => self.to_string(),
            _ => fallback.to_string(),
        }
    }
}

impl From<ApiError> for SessionError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Network(msg) => SessionError::Transport(msg),
            ApiError::Timeout => SessionError::Transport("request timed out".to_string()),
            other => SessionError::Api(other),
        }
    }
}

impl From<RefreshError> for SessionError {
    fn from(e: RefreshError) -> Self {
        match e {
            RefreshError::Expired => SessionError::SessionExpired,
            RefreshError::Transport(msg) => SessionError::Transport(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: &str = "Could not sign in. Try again later.";

    #[test]
    fn test_user_message_uses_server_reason() {
        let err = SessionError::Credentials(Some("E-mail e/ou senha incorreta.".to_string()));
        assert_eq!(err.user_message(FALLBACK), "E-mail e/ou senha incorreta.");

        let err = SessionError::Api(ApiError::Rejected {
            status: 400,
            message: "Informe o nome.".to_string(),
        });
        assert_eq!(err.user_message(FALLBACK), "Informe o nome.");
    }

    #[test]
    fn test_user_message_falls_back() {
        assert_eq!(SessionError::Transport("dns".to_string()).user_message(FALLBACK), FALLBACK);
        assert_eq!(
            SessionError::Storage(StorageError::Unavailable("disk".to_string())).user_message(FALLBACK),
            FALLBACK
        );
        assert_eq!(
            SessionError::Credentials(None).user_message(FALLBACK),
            "Invalid e-mail or password"
        );
    }

    #[test]
    fn test_transport_api_errors_become_transport() {
        assert_eq!(
            SessionError::from(ApiError::Timeout),
            SessionError::Transport("request timed out".to_string())
        );
        assert!(matches!(
            SessionError::from(ApiError::NotFound("x".to_string())),
            SessionError::Api(ApiError::NotFound(_))
        ));
        assert_eq!(SessionError::from(RefreshError::Expired), SessionError::SessionExpired);
    }
}
