use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::clock::{Clock, SystemClock};
use super::login::{self, Authenticator};
use super::store::TokenStore;
use super::types::{Credential, Token};
use crate::error::{AuthError, Result};

/// Default bound on a single login attempt (seconds)
pub const DEFAULT_LOGIN_TIMEOUT: u64 = 30;

/// Outcome of the most recent login attempt
type LoginOutcome = std::result::Result<Token, Arc<anyhow::Error>>;

/// Login failure handed to every caller that waited on the same attempt
#[derive(Debug, thiserror::Error)]
#[error("{0:#}")]
struct SharedLoginFailure(Arc<anyhow::Error>);

/// Snapshot of the cached token for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub token: Token,
    pub fresh: bool,
    pub remaining: Duration,
}

/// Token manager
/// Hands out a currently-valid access token, logging in only when the cached one is
/// missing or stale. Concurrent callers share a single login, including its failure.
pub struct TokenManager<A> {
    /// Configured login identity
    credential: Credential,

    /// On-disk token cache
    store: TokenStore,

    /// Network login collaborator
    authenticator: A,

    /// Time source for freshness and expiry
    clock: Arc<dyn Clock>,

    /// Upper bound on one login call
    login_timeout: std::time::Duration,

    /// Serializes "re-check cache, log in, persist" and holds the last attempt's outcome
    last_login: Mutex<Option<LoginOutcome>>,

    /// Bumped, under `last_login`, after every login attempt
    generation: AtomicU64,
}

impl<A: Authenticator> TokenManager<A> {
    pub fn new(credential: Credential, store: TokenStore, authenticator: A) -> Self {
        Self {
            credential,
            store,
            authenticator,
            clock: Arc::new(SystemClock),
            login_timeout: std::time::Duration::from_secs(DEFAULT_LOGIN_TIMEOUT),
            last_login: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound each login attempt; an attempt that runs over counts as a failed login
    pub fn with_login_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Cached token, fresh or not, without logging in
    pub fn cached_token(&self) -> Option<Token> {
        self.store.load()
    }

    /// Cached token with its freshness judged by the manager's clock
    pub fn status(&self) -> Option<TokenStatus> {
        let now = self.clock.now();
        self.store.load().map(|token| TokenStatus {
            fresh: token.is_fresh(now),
            remaining: token.remaining(now),
            token,
        })
    }

    /// Get a valid access token, logging in if necessary
    pub async fn get_token(&self) -> Result<String> {
        if let Some(token) = self.fresh_cached_token() {
            tracing::debug!("Using cached token (expires: {})", token.expires_at.to_rfc3339());
            return Ok(token.access_token);
        }

        let seen = self.generation.load(Ordering::Acquire);
        let mut last_login = self.last_login.lock().await;

        if let Some(token) = self.fresh_cached_token() {
            tracing::debug!("Token refreshed by a concurrent caller");
            return Ok(token.access_token);
        }

        // A login finished while we waited: share its outcome instead of logging in again
        if self.generation.load(Ordering::Acquire) != seen {
            match last_login.as_ref() {
                Some(Ok(token)) if token.is_fresh(self.clock.now()) => {
                    tracing::debug!("Using token from a concurrent login");
                    return Ok(token.access_token.clone());
                }
                Some(Err(failure)) => {
                    tracing::debug!("Concurrent login failed, not retrying");
                    return Err(shared_failure(failure));
                }
                _ => {}
            }
        }

        let outcome = match self.login_and_persist().await {
            Ok(token) => Ok(token),
            Err(AuthError::LoginFailed(e)) => Err(Arc::new(e)),
            Err(other) => return Err(other),
        };
        *last_login = Some(outcome.clone());
        self.generation.fetch_add(1, Ordering::Release);

        match outcome {
            Ok(token) => Ok(token.access_token),
            Err(failure) => Err(shared_failure(&failure)),
        }
    }

    fn fresh_cached_token(&self) -> Option<Token> {
        self.store
            .load()
            .filter(|token| TokenStore::is_fresh(token, self.clock.now()))
    }

    async fn login_and_persist(&self) -> Result<Token> {
        tracing::debug!("Cached token missing or stale, logging in...");

        let response = match tokio::time::timeout(
            self.login_timeout,
            self.authenticator.login(&self.credential),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!("Login failed: {:#}", e);
                return Err(AuthError::LoginFailed(e));
            }
            Err(_) => {
                tracing::error!("Login timed out after {:?}", self.login_timeout);
                return Err(AuthError::LoginFailed(anyhow::anyhow!(
                    "Login timed out after {:?}",
                    self.login_timeout
                )));
            }
        };
        login::validate_response(&response).map_err(AuthError::LoginFailed)?;

        let token = Token {
            access_token: response.access_token,
            expires_at: expiry_from(self.clock.now(), response.expires_in)?,
        };

        tracing::info!(
            "Logged in (token: {}..., expires: {})",
            token.access_token.chars().take(8).collect::<String>(),
            token.expires_at.to_rfc3339()
        );

        // Caching is best-effort: a usable token is still returned
        if let Err(e) = self.store.save(&token, &response.extra) {
            tracing::warn!("{}; next call will log in again", e);
        }

        Ok(token)
    }
}

fn shared_failure(failure: &Arc<anyhow::Error>) -> AuthError {
    AuthError::LoginFailed(anyhow::Error::new(SharedLoginFailure(failure.clone())))
}

/// Absolute expiry in whole seconds, so it survives the round trip through the record
fn expiry_from(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.timestamp().checked_add(lifetime.num_seconds()))
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| {
            AuthError::LoginFailed(anyhow::anyhow!("expiresIn out of range: {}", expires_in))
        })
}
