//! Session lifecycle
//!
//! One [`SessionManager`] exists per running client. It is the only writer of
//! the token store during bootstrap, login, refresh and logout, and publishes
//! every state change on a `watch` channel.

use crate::api::auth::{AuthApi, AuthGrant, User};
use crate::auth::claims::{self, UnverifiedClaims};
use crate::error::{AuthError, ClientError, ErrorContext};
use crate::navigation::Navigator;
use crate::storage::TokenStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Bootstrapping,
    Anonymous,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_bootstrapping: bool,
}

impl SessionState {
    pub fn starting() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            is_bootstrapping: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            is_bootstrapping: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.is_bootstrapping {
            SessionPhase::Bootstrapping
        } else if self.is_authenticated {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Anonymous
        }
    }
}

pub struct SessionManager {
    auth_api: AuthApi,
    tokens: TokenStore,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    state: watch::Sender<SessionState>,
    // Bumped on login and logout. Async results from an older epoch are dropped.
    epoch: AtomicU64,
}

impl SessionManager {
    pub fn new(
        auth_api: AuthApi,
        tokens: TokenStore,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::starting());
        Self {
            auth_api,
            tokens,
            navigator,
            login_route: login_route.into(),
            state,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens.access_token()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tokens.refresh_token()
    }

    /// Unverified claims of the stored access token.
    pub fn claims(&self) -> Option<UnverifiedClaims> {
        self.access_token().and_then(|token| claims::decode(&token))
    }

    /// Restore a stored session at startup.
    ///
    /// A missing or locally expired token ends anonymous without touching the
    /// network. A token the server refuses gets one refresh attempt.
    /// `is_bootstrapping` is false when this returns, on every path.
    pub async fn bootstrap(&self) {
        let epoch = self.current_epoch();

        match self.tokens.access_token() {
            Some(token) if claims::is_valid(Some(&token)) => {
                match self.auth_api.validate(&token).await {
                    Ok(user) if self.is_current(epoch) => {
                        tracing::info!(user_id = ?user.as_ref().map(|u| u.id), "Session restored");
                        self.publish_authenticated(user);
                    }
                    Ok(_) => tracing::debug!("Discarding validation for a replaced session"),
                    Err(e) if self.is_current(epoch) => {
                        tracing::info!(error = %e, "Stored session not accepted, refreshing");
                        if let Err(e) = self.refresh().await {
                            tracing::debug!(error = %e, "Bootstrap refresh did not restore the session");
                        }
                    }
                    Err(_) => tracing::debug!("Discarding validation failure for a replaced session"),
                }
            }
            Some(_) => tracing::debug!("Stored access token expired, starting anonymous"),
            None => tracing::debug!("No stored access token, starting anonymous"),
        }

        self.state.send_modify(|state| state.is_bootstrapping = false);
    }

    /// Exchange a username and one-time password for a token pair.
    ///
    /// Session state is untouched on failure.
    pub async fn login(&self, username: &str, otp: &str) -> Result<(), ClientError> {
        let grant = match self.auth_api.login(username, otp).await {
            Ok(grant) => grant,
            Err(e) => {
                ErrorContext::new("login").log_error(&e);
                return Err(e);
            }
        };

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.adopt(grant);
        self.state.send_modify(|state| state.is_bootstrapping = false);
        tracing::info!(user_id = ?self.current_user().map(|u| u.id), "Logged in");
        Ok(())
    }

    /// Trade the stored refresh token for a new pair.
    ///
    /// Without a refresh token, or when the exchange fails, the session is
    /// logged out. Overlapping calls are tolerated; the last pair stored wins.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let epoch = self.current_epoch();

        let refresh_token = match self.tokens.refresh_token() {
            Some(token) => token,
            None => {
                tracing::info!("No refresh token stored, logging out");
                self.logout();
                return Err(AuthError::MissingRefreshToken.into());
            }
        };

        let result = self.auth_api.refresh(&refresh_token).await;

        if !self.is_current(epoch) {
            tracing::debug!("Discarding refresh result for a replaced session");
            return Err(AuthError::Superseded.into());
        }

        match result {
            Ok(grant) => {
                self.adopt(grant);
                tracing::debug!("Access token refreshed");
                Ok(())
            }
            Err(e) => {
                let mut ctx = ErrorContext::new("refresh_session");
                if let Some(user) = self.current_user() {
                    ctx = ctx.with_user_id(user.id);
                }
                ctx.log_error(&e);
                self.logout();
                Err(e)
            }
        }
    }

    /// End the session locally. The server is notified in the background and
    /// its answer is never awaited.
    pub fn logout(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(token) = self.tokens.access_token() {
            self.auth_api.notify_logout(token);
        }

        self.tokens.clear();
        self.tokens.clear_preferences();
        self.state.send_replace(SessionState::anonymous());
        tracing::info!("Logged out");

        self.navigator.navigate(&self.login_route);
    }

    fn adopt(&self, grant: AuthGrant) {
        self.tokens.save_pair(&grant.token, &grant.refresh_token);
        let user = grant.user.or_else(|| self.current_user());
        self.publish_authenticated(user);
    }

    fn publish_authenticated(&self, user: Option<User>) {
        self.state.send_modify(|state| {
            state.user = user;
            state.is_authenticated = true;
        });
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }
}
