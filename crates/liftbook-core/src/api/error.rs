use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    /// The server rejected the request with a human-readable reason.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Structured error payload returned by the API
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// The `message` field of a structured error body, if the server sent one.
    pub fn server_message(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorPayload>(body)
            .ok()
            .and_then(|p| p.message)
            .filter(|m| !m.trim().is_empty())
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 401 {
            return ApiError::Unauthorized;
        }
        if status == 429 {
            return ApiError::RateLimited;
        }
        if let Some(message) = Self::server_message(body) {
            return ApiError::Rejected { status, message };
        }
        let truncated = Self::truncate_body(body);
        match status {
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::InvalidResponse(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_prefers_server_message() {
        let body = r#"{"status": "error", "message": "E-mail e/ou senha incorreta."}"#;
        assert_eq!(
            ApiError::from_status(400, body),
            ApiError::Rejected {
                status: 400,
                message: "E-mail e/ou senha incorreta.".to_string()
            }
        );
    }

    #[test]
    fn test_from_status_unauthorized_ignores_message() {
        let body = r#"{"status": "error", "message": "token.expired"}"#;
        assert_eq!(ApiError::from_status(401, body), ApiError::Unauthorized);
    }

    #[test]
    fn test_from_status_without_message() {
        assert_eq!(ApiError::from_status(404, "nope"), ApiError::NotFound("nope".to_string()));
        assert_eq!(ApiError::from_status(429, ""), ApiError::RateLimited);
        assert!(matches!(ApiError::from_status(502, "<html>"), ApiError::ServerError(_)));
        assert!(matches!(ApiError::from_status(418, ""), ApiError::InvalidResponse(_)));
        // Blank messages don't count as a reason
        assert!(matches!(
            ApiError::from_status(500, r#"{"message": "  "}"#),
            ApiError::ServerError(_)
        ));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with(&format!("(truncated, {} total bytes)", long.len())));

        // Never split a multi-byte character
        let accented = "é".repeat(MAX_ERROR_BODY_LENGTH);
        assert!(ApiError::truncate_body(&accented).contains("truncated"));
    }
}
