//! Authorized requests: bearer token on the way out, refresh-and-retry on
//! the way back.
//!
//! On a 401 the failing request waits for the session's single in-flight
//! refresh, then is re-sent once with the new access token. A second 401
//! after a refresh is a hard failure. Any other status is handed back
//! untouched and never retried.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ApiError, ApiRequest, ApiResponse, Transport};
use crate::auth::SessionStore;
use crate::error::{RefreshError, SessionError};
use crate::models::{Exercise, HistoryDay, TokenPair};

#[derive(Clone)]
pub struct AuthorizedClient {
    session: SessionStore,
    transport: Arc<dyn Transport>,
}

impl AuthorizedClient {
    pub fn new(session: SessionStore) -> Self {
        Self {
            transport: session.transport(),
            session,
        }
    }

    /// Send a request with the current access token.
    ///
    /// `Ok` carries whatever the server answered except an unrecoverable 401.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let Some(tokens) = self.session.tokens() else {
            let response = self.transport.send(request).await?;
            if response.is_unauthorized() {
                return Err(SessionError::NotAuthenticated);
            }
            return Ok(response);
        };

        let response = self
            .transport
            .send(request.clone().with_bearer(&tokens.access_token))
            .await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        debug!(path = %request.path, "Access token rejected");
        let fresh = self.renew(&tokens).await?;

        let retried = self
            .transport
            .send(request.clone().with_bearer(&fresh.access_token))
            .await?;
        if retried.is_unauthorized() {
            warn!(path = %request.path, "Request rejected again after token refresh");
            return Err(SessionError::Api(ApiError::Unauthorized));
        }
        Ok(retried)
    }

    /// Get a usable pair after `used` was rejected
    async fn renew(&self, used: &TokenPair) -> Result<TokenPair, SessionError> {
        match self.session.tokens() {
            None => return Err(SessionError::SessionExpired),
            // Someone else refreshed while this request was out
            Some(current) if current.access_token != used.access_token => return Ok(current),
            Some(_) => {}
        }

        match self.session.refresher().refresh(&used.refresh_token).await {
            Ok(fresh) => self.session.commit_refresh(&used.refresh_token, fresh).await,
            Err(RefreshError::Expired) => {
                self.session.expire(&used.refresh_token).await;
                Err(SessionError::SessionExpired)
            }
            Err(e @ RefreshError::Transport(_)) => Err(e.into()),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        let response = self.send(ApiRequest::get(path)).await?.error_for_status()?;
        Ok(response.json()?)
    }

    async fn post(&self, path: &str, body: Value) -> Result<(), SessionError> {
        self.send(ApiRequest::post(path, body)).await?.error_for_status()?;
        Ok(())
    }

    pub(crate) async fn put_user(&self, body: Value) -> Result<(), SessionError> {
        self.send(ApiRequest::put("/users", body)).await?.error_for_status()?;
        Ok(())
    }

    // ===== Data Fetching Methods =====

    /// Fetch the exercise history, grouped by day
    pub async fn fetch_history(&self) -> Result<Vec<HistoryDay>, SessionError> {
        self.get("/history").await
    }

    /// Fetch a single exercise
    pub async fn fetch_exercise(&self, exercise_id: &str) -> Result<Exercise, SessionError> {
        self.get(&format!("/exercises/{}", exercise_id)).await
    }

    /// Log an exercise as done now
    pub async fn register_exercise(&self, exercise_id: &str) -> Result<(), SessionError> {
        self.post("/history", json!({ "exercise_id": exercise_id })).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::join_all;

    use super::*;
    use crate::auth::{CredentialStore, MemoryCredentialStore};
    use crate::models::{SessionState, User};
    use crate::test_support::FakeTransport;

    const REFRESH_PATH: &str = "/sessions/refresh-token";

    fn user() -> User {
        User {
            id: "1".to_string(),
            name: "A".to_string(),
            email: "a@b.com".to_string(),
            avatar: None,
        }
    }

    /// Server that accepts only `valid` as access token and rotates r1 -> (t2, r2)
    fn server(valid: &'static str, refresh_ok: bool) -> Arc<FakeTransport> {
        FakeTransport::new(move |req| match req.path.as_str() {
            REFRESH_PATH if refresh_ok => ApiResponse::new(200, r#"{"token": "t2", "refresh_token": "r2"}"#),
            REFRESH_PATH => ApiResponse::new(401, r#"{"message": "token.invalid"}"#),
            p if p.ends_with("/missing") => ApiResponse::new(404, r#"{"message": "Exercício não encontrado."}"#),
            _ if req.bearer.as_deref() == Some(valid) => ApiResponse::new(200, "[]"),
            _ => ApiResponse::new(401, r#"{"message": "token.expired"}"#),
        })
        .with_delay(REFRESH_PATH, Duration::from_millis(20))
    }

    async fn signed_in(transport: Arc<FakeTransport>) -> (SessionStore, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        store.save(&user(), &TokenPair::new("t1", "r1")).await.expect("seed");
        let session = SessionStore::new(store.clone(), transport);
        session.bootstrap().await;
        (session, store)
    }

    #[tokio::test]
    async fn test_request_carries_bearer_token() {
        let transport = server("t1", true);
        let (session, _) = signed_in(transport.clone()).await;

        let history = session.client().fetch_history().await.expect("history");
        assert!(history.is_empty());
        assert_eq!(transport.requests()[0].bearer.as_deref(), Some("t1"));
        assert_eq!(transport.calls_to(REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_refresh_then_retry() {
        let transport = server("t2", true);
        let (session, store) = signed_in(transport.clone()).await;
        let epoch = session.get_epoch();

        session.client().fetch_history().await.expect("history after refresh");

        let history_calls: Vec<_> = transport
            .requests()
            .into_iter()
            .filter(|r| r.path == "/history")
            .map(|r| r.bearer)
            .collect();
        assert_eq!(history_calls, [Some("t1".to_string()), Some("t2".to_string())]);
        assert_eq!(session.get_epoch(), epoch + 1);
        assert_eq!(
            store.load().await.expect("load"),
            Some((user(), TokenPair::new("t2", "r2")))
        );
    }

    #[tokio::test]
    async fn test_concurrent_failures_refresh_once() {
        let transport = server("t2", true);
        let (session, _) = signed_in(transport.clone()).await;
        let client = session.client();

        let outcomes = join_all((0..6).map(|_| client.fetch_history())).await;

        assert!(outcomes.iter().all(|o| o.is_ok()));
        assert_eq!(transport.calls_to(REFRESH_PATH), 1);
        assert_eq!(session.get_epoch(), 1);
        assert_eq!(session.access_token().as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_refresh_retried_after_network_recovers() {
        let transport = server("t2", true);
        let (session, store) = signed_in(transport.clone()).await;
        let client = session.client();

        transport.set_unreachable(REFRESH_PATH, true);
        let err = client.fetch_history().await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert!(session.get_state().is_authenticated());
        assert_eq!(session.get_epoch(), 0);

        transport.set_unreachable(REFRESH_PATH, false);
        client.fetch_history().await.expect("history once the network is back");

        assert_eq!(transport.calls_to(REFRESH_PATH), 2);
        assert_eq!(session.get_epoch(), 1);
        assert_eq!(
            store.load().await.expect("load"),
            Some((user(), TokenPair::new("t2", "r2")))
        );
    }

    #[tokio::test]
    async fn test_rejected_refresh_signs_out_everyone() {
        let transport = server("t2", false);
        let (session, store) = signed_in(transport.clone()).await;
        let client = session.client();

        let outcomes = join_all((0..4).map(|_| client.fetch_history())).await;

        assert!(outcomes.iter().all(|o| *o == Err(SessionError::SessionExpired)));
        assert_eq!(transport.calls_to(REFRESH_PATH), 1);
        assert_eq!(session.get_state(), SessionState::Unauthenticated);
        assert_eq!(store.raw(), None);
        assert_eq!(session.get_epoch(), 0);
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_hard_failure() {
        // Nothing is ever accepted, even the refreshed token
        let transport = server("never", true);
        let (session, _) = signed_in(transport.clone()).await;

        let err = session.client().fetch_history().await.unwrap_err();

        assert_eq!(err, SessionError::Api(ApiError::Unauthorized));
        assert_eq!(transport.calls_to(REFRESH_PATH), 1);
        assert_eq!(transport.calls_to("/history"), 2);
        // Still signed in with the refreshed pair
        assert!(session.get_state().is_authenticated());
    }

    #[tokio::test]
    async fn test_other_failures_pass_through() {
        let transport = server("t1", true);
        let (session, _) = signed_in(transport.clone()).await;

        let err = session.client().fetch_exercise("missing").await.unwrap_err();
        assert_eq!(err.user_message("fallback"), "Exercício não encontrado.");
        let response = session
            .client()
            .send(ApiRequest::get("/missing"))
            .await
            .expect("404 is a response");
        assert_eq!(response.status, 404);
        assert_eq!(transport.calls_to("/missing"), 1);
        assert_eq!(transport.calls_to("/exercises/missing"), 1);
        assert_eq!(transport.calls_to(REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_sign_out_during_refresh_discards_result() {
        let transport = server("t2", true);
        let (session, store) = signed_in(transport.clone()).await;
        let client = session.client();

        let request = client.fetch_history();
        let sign_out = async {
            // Let the request reach the refresh before signing out
            tokio::time::sleep(Duration::from_millis(5)).await;
            session.sign_out().await;
        };
        let (outcome, ()) = tokio::join!(request, sign_out);

        assert_eq!(outcome, Err(SessionError::SessionExpired));
        assert_eq!(transport.calls_to(REFRESH_PATH), 1);
        assert_eq!(session.get_state(), SessionState::Unauthenticated);
        assert_eq!(session.get_epoch(), 0);
        assert_eq!(store.raw(), None);
    }

    #[tokio::test]
    async fn test_later_requests_use_refreshed_token() {
        let transport = server("t2", true);
        let (session, _) = signed_in(transport.clone()).await;

        session.client().fetch_history().await.expect("first");
        session.client().fetch_history().await.expect("second uses t2 directly");
        assert_eq!(transport.calls_to(REFRESH_PATH), 1);
        assert_eq!(transport.calls_to("/history"), 3);
        assert_eq!(session.get_epoch(), 1);
    }

    #[tokio::test]
    async fn test_unauthenticated_request() {
        let transport = server("t1", true);
        let session = SessionStore::new(Arc::new(MemoryCredentialStore::new()), transport.clone());
        session.bootstrap().await;

        let err = session.client().fetch_history().await.unwrap_err();
        assert_eq!(err, SessionError::NotAuthenticated);
        assert!(transport.requests()[0].bearer.is_none());
    }

    #[tokio::test]
    async fn test_register_exercise_posts_id() {
        let transport = server("t1", true);
        let (session, _) = signed_in(transport.clone()).await;

        session.client().register_exercise("12").await.expect("register");
        let request = transport.requests().pop().expect("request");
        assert_eq!(request.path, "/history");
        assert_eq!(request.body, Some(json!({ "exercise_id": "12" })));
    }
}
