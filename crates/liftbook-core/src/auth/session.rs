//! The session state machine.
//!
//! `Unknown -> {Authenticated, Unauthenticated}`, then
//! `Authenticated <-> Unauthenticated`. Profile updates and token refreshes
//! are self-transitions of `Authenticated`.
//!
//! Every mutating operation holds the async `ops` lock for its whole
//! duration, so operations run one at a time and listeners see transitions
//! in exactly the order they happened. The in-memory fields sit behind a
//! plain mutex that is never held across an `.await`.

use std::sync::{Arc, Mutex, Weak};

use serde_json::{json, Value};
use tokio::sync::MutexGuard as OpsGuard;
use tracing::{debug, info, warn};

use super::{lock, CredentialStore, TokenRefresher};
use crate::api::{AuthApi, AuthorizedClient, Transport};
use crate::error::{SessionError, StorageError};
use crate::models::{ProfileUpdate, SessionState, TokenPair, User};

/// What changed. Delivered to listeners along with the resulting snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Bootstrapped,
    SignedIn,
    /// Sign-out started; `signing_out` is set until `SignedOut`
    SigningOut,
    SignedOut,
    ProfileUpdated,
    /// New token pair committed; the epoch has moved
    TokensRefreshed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub epoch: u64,
    pub signing_out: bool,
}

type Listener = Arc<dyn Fn(SessionEvent, &SessionSnapshot) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// User and tokens live and die together.
enum Current {
    Unknown,
    Authenticated { user: User, tokens: TokenPair },
    Unauthenticated,
}

struct SessionData {
    current: Current,
    epoch: u64,
    signing_out: bool,
}

impl SessionData {
    fn snapshot(&self) -> SessionSnapshot {
        let state = match &self.current {
            Current::Unknown => SessionState::Unknown,
            Current::Authenticated { user, .. } => SessionState::Authenticated(user.clone()),
            Current::Unauthenticated => SessionState::Unauthenticated,
        };
        SessionSnapshot {
            state,
            epoch: self.epoch,
            signing_out: self.signing_out,
        }
    }

    fn session(&self) -> Option<(User, TokenPair)> {
        match &self.current {
            Current::Authenticated { user, tokens } => Some((user.clone(), tokens.clone())),
            _ => None,
        }
    }
}

struct Inner {
    credentials: Arc<dyn CredentialStore>,
    auth: AuthApi,
    refresher: TokenRefresher,
    data: Mutex<SessionData>,
    listeners: Arc<Mutex<Listeners>>,
    ops: tokio::sync::Mutex<()>,
}

/// Handle to the session. Clone is cheap; all clones share one session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(credentials: Arc<dyn CredentialStore>, transport: Arc<dyn Transport>) -> Self {
        let auth = AuthApi::new(transport);
        Self {
            inner: Arc::new(Inner {
                credentials,
                refresher: TokenRefresher::new(auth.clone()),
                auth,
                data: Mutex::new(SessionData {
                    current: Current::Unknown,
                    epoch: 0,
                    signing_out: false,
                }),
                listeners: Arc::new(Mutex::new(Listeners::default())),
                ops: tokio::sync::Mutex::new(()),
            }),
        }
    }

    // ===== Reads =====

    pub fn get_state(&self) -> SessionState {
        self.snapshot().state
    }

    pub fn get_epoch(&self) -> u64 {
        lock(&self.inner.data).epoch
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        lock(&self.inner.data).snapshot()
    }

    pub fn is_signing_out(&self) -> bool {
        lock(&self.inner.data).signing_out
    }

    pub fn current_user(&self) -> Option<User> {
        lock(&self.inner.data).session().map(|(user, _)| user)
    }

    /// Bearer credential for the next request
    pub fn access_token(&self) -> Option<String> {
        self.tokens().map(|t| t.access_token)
    }

    pub(crate) fn tokens(&self) -> Option<TokenPair> {
        lock(&self.inner.data).session().map(|(_, tokens)| tokens)
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        self.inner.auth.transport().clone()
    }

    pub(crate) fn refresher(&self) -> &TokenRefresher {
        &self.inner.refresher
    }

    /// A client that sends requests with this session's access token
    pub fn client(&self) -> AuthorizedClient {
        AuthorizedClient::new(self.clone())
    }

    // ===== Subscriptions =====

    /// Register a listener, called synchronously on every transition in the
    /// order transitions happen. Listeners must not block.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(SessionEvent, &SessionSnapshot) + Send + Sync + 'static,
    {
        let mut listeners = lock(&self.inner.listeners);
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.inner.listeners),
        }
    }

    /// Mutate in-memory state and notify listeners. Requires the ops lock.
    fn transition(&self, _ops: &OpsGuard<'_, ()>, event: SessionEvent, apply: impl FnOnce(&mut SessionData)) {
        let snapshot = {
            let mut data = lock(&self.inner.data);
            apply(&mut data);
            data.snapshot()
        };
        info!(
            ?event,
            epoch = snapshot.epoch,
            authenticated = snapshot.state.is_authenticated(),
            "Session transition"
        );

        // Listeners may subscribe or read state, so call them unlocked
        let listeners: Vec<Listener> = lock(&self.inner.listeners)
            .entries
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(event, &snapshot);
        }
    }

    // ===== Operations =====

    /// Restore the persisted session. Runs once; later calls return the
    /// current state untouched. A storage fault means "no session".
    pub async fn bootstrap(&self) -> SessionState {
        let ops = self.inner.ops.lock().await;
        if !matches!(lock(&self.inner.data).current, Current::Unknown) {
            debug!("Bootstrap already settled");
            return self.get_state();
        }

        let restored = match self.inner.credentials.load().await {
            Ok(Some((user, tokens))) => {
                info!(user_id = %user.id, "Restored persisted session");
                Current::Authenticated { user, tokens }
            }
            Ok(None) => {
                debug!("No persisted session");
                Current::Unauthenticated
            }
            Err(e) => {
                warn!(error = %e, "Could not read persisted session, starting signed out");
                if matches!(e, StorageError::Corrupt(_)) {
                    if let Err(e) = self.inner.credentials.clear().await {
                        warn!(error = %e, "Failed to discard corrupt session record");
                    }
                }
                Current::Unauthenticated
            }
        };

        self.transition(&ops, SessionEvent::Bootstrapped, |data| data.current = restored);
        self.get_state()
    }

    /// Sign in with e-mail and password. The epoch is left alone.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let ops = self.inner.ops.lock().await;

        let (user, tokens) = self.inner.auth.sign_in(email, password).await.inspect_err(|e| {
            warn!(error = %e, "Sign-in failed");
        })?;
        self.inner.credentials.save(&user, &tokens).await.inspect_err(|e| {
            warn!(error = %e, "Failed to persist session, sign-in aborted");
        })?;
        self.inner.refresher.forget();

        info!(user_id = %user.id, "Signed in");
        let signed_in = user.clone();
        self.transition(&ops, SessionEvent::SignedIn, |data| {
            data.current = Current::Authenticated { user: signed_in, tokens };
        });
        Ok(user)
    }

    /// Sign out. Always succeeds locally, even if the persisted record
    /// cannot be cleared.
    pub async fn sign_out(&self) {
        let ops = self.inner.ops.lock().await;
        self.sign_out_locked(&ops).await;
    }

    async fn sign_out_locked(&self, ops: &OpsGuard<'_, ()>) {
        let state = self.get_state();
        if state.is_authenticated() {
            self.transition(ops, SessionEvent::SigningOut, |data| data.signing_out = true);
        }

        if let Err(e) = self.inner.credentials.clear().await {
            warn!(error = %e, "Failed to clear persisted session, signing out locally");
        }
        self.inner.refresher.forget();

        if state == SessionState::Unauthenticated {
            return;
        }
        info!("Signed out");
        self.transition(ops, SessionEvent::SignedOut, |data| {
            data.current = Current::Unauthenticated;
            data.signing_out = false;
        });
    }

    /// Send a profile edit to the server, then merge it locally.
    ///
    /// Nothing changes locally unless both the server call and the
    /// persisted write succeed.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User, SessionError> {
        let user = self.current_user().ok_or(SessionError::NotAuthenticated)?;
        let merged = user.merged(&update);

        self.client().put_user(profile_body(&merged, &update)).await.inspect_err(|e| {
            warn!(error = %e, "Profile update rejected");
        })?;

        let ops = self.inner.ops.lock().await;
        self.apply_profile_locked(&ops, Some(&user.id), &update).await
    }

    /// Merge a profile edit locally without calling the server, e.g. the
    /// avatar reference returned by an upload that happened elsewhere.
    pub async fn apply_profile(&self, update: ProfileUpdate) -> Result<User, SessionError> {
        let ops = self.inner.ops.lock().await;
        self.apply_profile_locked(&ops, None, &update).await
    }

    async fn apply_profile_locked(
        &self,
        ops: &OpsGuard<'_, ()>,
        expected_id: Option<&str>,
        update: &ProfileUpdate,
    ) -> Result<User, SessionError> {
        let (user, tokens) = lock(&self.inner.data)
            .session()
            .ok_or(SessionError::NotAuthenticated)?;
        if expected_id.is_some_and(|id| id != user.id) {
            warn!("Session changed while the profile update was in flight");
            return Err(SessionError::NotAuthenticated);
        }

        let merged = user.merged(update);
        self.inner.credentials.save(&merged, &tokens).await.inspect_err(|e| {
            warn!(error = %e, "Failed to persist profile, keeping previous profile");
        })?;

        let updated = merged.clone();
        self.transition(ops, SessionEvent::ProfileUpdated, |data| {
            if let Current::Authenticated { user, .. } = &mut data.current {
                *user = updated;
            }
        });
        Ok(merged)
    }

    /// Create an account. The caller signs in separately.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), SessionError> {
        self.inner.auth.register(name, email, password).await
    }

    // ===== Refresh plumbing (interceptor only) =====

    /// Commit the outcome of exchanging `spent`. The first commit of an
    /// exchange persists the pair and bumps the epoch; later commits of the
    /// same exchange return the committed pair. If the session ended or was
    /// replaced meanwhile the pair is discarded.
    pub(crate) async fn commit_refresh(&self, spent: &str, fresh: TokenPair) -> Result<TokenPair, SessionError> {
        let ops = self.inner.ops.lock().await;
        let Some((user, current)) = lock(&self.inner.data).session() else {
            debug!("Session ended during refresh, discarding new tokens");
            return Err(SessionError::SessionExpired);
        };

        if current.refresh_token != spent {
            return if current == fresh {
                Ok(current)
            } else {
                debug!("Session replaced during refresh, discarding new tokens");
                Err(SessionError::SessionExpired)
            };
        }

        // The server has already rotated the refresh token, so the new pair
        // is kept in memory even if it cannot be written.
        if let Err(e) = self.inner.credentials.save(&user, &fresh).await {
            warn!(error = %e, "Failed to persist refreshed tokens");
        }

        let committed = fresh.clone();
        self.transition(&ops, SessionEvent::TokensRefreshed, |data| {
            if let Current::Authenticated { tokens, .. } = &mut data.current {
                *tokens = committed;
            }
            data.epoch += 1;
        });
        Ok(fresh)
    }

    /// End the session because `spent` was rejected, unless the session has
    /// already moved past that refresh token.
    pub(crate) async fn expire(&self, spent: &str) {
        let ops = self.inner.ops.lock().await;
        let current = lock(&self.inner.data).session();
        match current {
            Some((_, tokens)) if tokens.refresh_token == spent => {
                warn!("Refresh token rejected, ending session");
                self.sign_out_locked(&ops).await;
            }
            _ => debug!("Session already moved past the rejected refresh token"),
        }
    }
}

/// Body for `PUT /users`: the merged identity plus any password change
fn profile_body(merged: &User, update: &ProfileUpdate) -> Value {
    let mut body = json!({
        "name": merged.name,
        "email": merged.email,
    });
    if let Some(ref change) = update.password {
        body["password"] = json!(change.new_password);
        body["old_password"] = json!(change.old_password);
    }
    body
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).entries.retain(|(id, _)| *id != self.id);
        }
    }
}
