//! Unauthenticated endpoints: sign-in, token refresh and account creation.
//!
//! These calls never go through the interceptor - they are what the
//! interceptor falls back on.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{ApiError, ApiRequest, Transport};
use crate::error::{RefreshError, SessionError};
use crate::models::{TokenPair, User};

const SESSIONS_PATH: &str = "/sessions";
const REFRESH_PATH: &str = "/sessions/refresh-token";
const USERS_PATH: &str = "/users";

#[derive(Debug, Deserialize)]
struct SignInResponse {
    user: User,
    #[serde(flatten)]
    tokens: TokenPair,
}

#[derive(Clone)]
pub struct AuthApi {
    transport: Arc<dyn Transport>,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Exchange e-mail and password for a user and token pair
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(User, TokenPair), SessionError> {
        let request = ApiRequest::post(SESSIONS_PATH, json!({ "email": email, "password": password }));
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            debug!(status = response.status, "Sign-in rejected");
            return Err(match ApiError::server_message(&response.body) {
                Some(message) => SessionError::Credentials(Some(message)),
                None if matches!(response.status, 400 | 401) => SessionError::Credentials(None),
                None => SessionError::Transport(
                    ApiError::from_status(response.status, &response.body).to_string(),
                ),
            });
        }

        let parsed: SignInResponse = response.json()?;
        Ok((parsed.user, parsed.tokens))
    }

    /// Exchange a refresh token for a new token pair.
    /// Any non-success answer means the refresh token is no longer good.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let request = ApiRequest::post(REFRESH_PATH, json!({ "refresh_token": refresh_token }));
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        if !response.is_success() {
            warn!(status = response.status, "Refresh token rejected");
            return Err(RefreshError::Expired);
        }

        response.json::<TokenPair>().map_err(|e| {
            warn!(error = %e, "Unreadable refresh response");
            RefreshError::Expired
        })
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), SessionError> {
        let request = ApiRequest::post(
            USERS_PATH,
            json!({ "name": name, "email": email, "password": password }),
        );
        self.transport.send(request).await?.error_for_status()?;
        Ok(())
    }
}
