use thiserror::Error;

/// Top-level error type for the `ztbctl-api` crate.
///
/// Only failures that prevent a response from being obtained live here.
/// A non-2xx status is still a response: [`crate::Transport::call`] hands
/// it back to the caller, which decides what the status means for the
/// resource it was touching. `ztbctl-core` maps these into workflow errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed (bad API key, malformed login response, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The bearer token was rejected again right after a refresh.
    #[error("Session expired -- token rejected after refresh")]
    SessionExpired,

    /// A 401 arrived but the configured credential cannot be refreshed.
    #[error("Bearer token rejected and no API key is configured to refresh it")]
    NotRefreshable,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates auth has expired
    /// and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::NotRefreshable)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}
