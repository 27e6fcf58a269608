use std::sync::Mutex;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info};

use super::lock;
use crate::api::AuthApi;
use crate::error::RefreshError;
use crate::models::TokenPair;

type Exchange = Shared<BoxFuture<'static, Result<TokenPair, RefreshError>>>;

/// Exchanges a refresh token for a new pair, at most once per refresh token.
///
/// Callers presenting the refresh token of the exchange already in flight
/// join it instead of hitting the network; callers arriving after it settled
/// get the same settled outcome. A rejected refresh token is never retried;
/// an exchange that failed in transit is dropped so the next caller retries.
pub struct TokenRefresher {
    api: AuthApi,
    /// Latest exchange, keyed by the refresh token it spent
    latest: Mutex<Option<(String, Exchange)>>,
}

impl TokenRefresher {
    pub fn new(api: AuthApi) -> Self {
        Self {
            api,
            latest: Mutex::new(None),
        }
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let exchange = {
            let mut latest = lock(&self.latest);
            match latest.as_ref() {
                Some((spent, exchange)) if spent == refresh_token => {
                    debug!("Joining token refresh");
                    exchange.clone()
                }
                _ => {
                    info!("Starting token refresh");
                    let api = self.api.clone();
                    let token = refresh_token.to_string();
                    let exchange = async move { api.refresh(&token).await }.boxed().shared();
                    *latest = Some((refresh_token.to_string(), exchange.clone()));
                    exchange
                }
            }
        };

        let outcome = exchange.clone().await;
        debug!(ok = outcome.is_ok(), "Token refresh settled");

        // A transport failure says nothing about the token; let the next caller retry
        if matches!(outcome, Err(RefreshError::Transport(_))) {
            let mut latest = lock(&self.latest);
            if latest
                .as_ref()
                .is_some_and(|(_, settled)| settled.ptr_eq(&exchange))
            {
                *latest = None;
            }
        }
        outcome
    }

    /// Forget the latest exchange. One still in flight completes for the
    /// callers already waiting on it.
    pub fn forget(&self) {
        *lock(&self.latest) = None;
    }
}
