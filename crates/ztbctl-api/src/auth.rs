// Bearer-token lifecycle for the management API.
//
// The tenant issues short-lived delegate tokens in exchange for an API
// key. Several site workflows share one client, so a burst of 401s must
// collapse into a single login: `TokenProvider::refresh` serializes on a
// mutex and uses a generation counter to detect that another caller
// already refreshed while it was waiting.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDateTime, Utc};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::Error;

/// Refresh this long before the advertised expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// Credentials for authenticating against the management API.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// A pre-issued bearer token. A 401 cannot be recovered.
    Bearer { token: SecretString },

    /// An API key, exchanged for a delegate token on first use
    /// and again whenever the token is rejected.
    ApiKey { key: SecretString },

    /// Start with an existing token, fall back to the API key on 401.
    BearerWithApiKey {
        token: SecretString,
        key: SecretString,
    },
}

impl Credentials {
    pub fn initial_token(&self) -> Option<SecretString> {
        match self {
            Self::Bearer { token } | Self::BearerWithApiKey { token, .. } => Some(token.clone()),
            Self::ApiKey { .. } => None,
        }
    }

    pub fn api_key(&self) -> Option<&SecretString> {
        match self {
            Self::ApiKey { key } | Self::BearerWithApiKey { key, .. } => Some(key),
            Self::Bearer { .. } => None,
        }
    }
}

// ── Token ───────────────────────────────────────────────────────────

/// A bearer token plus its (optional) local expiry deadline.
#[derive(Debug, Clone)]
pub struct Token {
    pub secret: SecretString,
    pub expires_at: Option<Instant>,
}

impl Token {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Parse the login response.
    ///
    /// The token sits at `result.delegate_token`. Expiry may be given as
    /// an ISO timestamp (`expires_at`) or a lifetime in seconds
    /// (`expires_in`, `ttl`, `ttl_seconds`).
    pub fn from_login_response(body: &Value) -> Result<Self, Error> {
        let result = body.get("result").unwrap_or(body);
        let secret = result
            .get("delegate_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Authentication {
                message: "login response did not contain result.delegate_token".into(),
            })?;

        let lifetime = ["expires_in", "ttl", "ttl_seconds"]
            .iter()
            .find_map(|k| result.get(*k).and_then(Value::as_f64))
            .map(|secs| Duration::from_secs_f64(secs.max(0.0)))
            .or_else(|| {
                result
                    .get("expires_at")
                    .and_then(Value::as_str)
                    .and_then(remaining_until)
            });

        Ok(Self {
            secret: SecretString::from(secret.to_owned()),
            expires_at: lifetime.map(|d| Instant::now() + d.saturating_sub(EXPIRY_SKEW)),
        })
    }
}

/// Time left until an ISO-8601 instant; naive timestamps are taken as UTC.
fn remaining_until(iso: &str) -> Option<Duration> {
    let at = DateTime::parse_from_rfc3339(iso)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc()))
        .ok()?;
    (at - Utc::now()).to_std().ok().or(Some(Duration::ZERO))
}

// ── TokenProvider ───────────────────────────────────────────────────

struct TokenState {
    token: Option<Token>,
    generation: u64,
}

/// Point-in-time view of the current token.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    pub token: Option<SecretString>,
    pub generation: u64,
    pub stale: bool,
}

/// Shared bearer token with single-flight refresh.
pub struct TokenProvider {
    state: RwLock<TokenState>,
    refresh_lock: Mutex<()>,
}

impl TokenProvider {
    pub fn new(initial: Option<SecretString>) -> Self {
        Self {
            state: RwLock::new(TokenState {
                token: initial.map(Token::new),
                generation: 0,
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn snapshot(&self) -> TokenSnapshot {
        let state = self.state.read().await;
        TokenSnapshot {
            token: state.token.as_ref().map(|t| t.secret.clone()),
            generation: state.generation,
            stale: state.token.as_ref().is_none_or(Token::is_expired),
        }
    }

    /// Number of successful refreshes so far.
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Replace the token unless someone already did since `seen_generation`.
    ///
    /// Callers pass the generation they observed when their request was
    /// rejected. Waiters that queue behind an in-flight refresh find the
    /// generation bumped and return without logging in again.
    pub async fn refresh<F, Fut>(&self, seen_generation: u64, login: F) -> Result<(), Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Token, Error>>,
    {
        let _guard = self.refresh_lock.lock().await;

        if self.state.read().await.generation != seen_generation {
            tracing::debug!("token already refreshed by a concurrent caller");
            return Ok(());
        }

        let token = login().await?;
        let mut state = self.state.write().await;
        state.token = Some(token);
        state.generation += 1;
        tracing::info!(generation = state.generation, "bearer token refreshed");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
