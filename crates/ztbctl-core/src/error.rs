// ── Core error types ──
//
// Workflow-level errors from ztbctl-core. Callers never see reqwest
// errors directly; the `From<ztbctl_api::Error>` impl folds transport
// failures into the variants below.

use serde::Serialize;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Validation ───────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── Resolution (terminal, never retried) ─────────────────────────
    #[error("Template not found: '{name}'. Available names: {available}")]
    TemplateNotFound { name: String, available: String },

    #[error("Site not found: '{name}'")]
    SiteNotFound { name: String },

    #[error("Template name '{name}' matches {count} templates; use template_id instead")]
    AmbiguousTemplate { name: String, count: usize },

    // ── Structural workflow failures ─────────────────────────────────
    #[error("Site not ready after {attempts} polls (last state: {last_state})")]
    ProvisioningTimeout { attempts: u32, last_state: String },

    #[error("No HA link interface defined for site '{site}'")]
    NoHaLinkDefined { site: String },

    #[error("VRRP track list is empty for site '{site}' after exclusions")]
    EmptyTrackList { site: String },

    #[error("{operation} rejected by API: {message}")]
    Rejected {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("Provisioning cancelled")]
    Cancelled,

    // ── Transport ────────────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Cannot reach API: {reason}")]
    ConnectionFailed { reason: String },

    #[error("API request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("{operation} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        message: String,
    },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether another attempt of the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout { .. })
    }

    pub fn rejected(operation: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ztbctl_api::Error> for CoreError {
    fn from(err: ztbctl_api::Error) -> Self {
        match err {
            ztbctl_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            ztbctl_api::Error::SessionExpired => CoreError::AuthenticationFailed {
                message: "token rejected again after refresh".into(),
            },
            ztbctl_api::Error::NotRefreshable => CoreError::AuthenticationFailed {
                message: "bearer token rejected and no API key configured".into(),
            },
            ztbctl_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() || e.is_request() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Internal(e.to_string())
                }
            }
            ztbctl_api::Error::InvalidUrl(e) => CoreError::Validation {
                message: format!("invalid API URL: {e}"),
            },
            ztbctl_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            ztbctl_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            ztbctl_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

// ── Accumulated per-resource failures ────────────────────────────────

/// A failure on an independent resource (one VLAN, one patch).
///
/// Recorded in the session and reported in the summary; never aborts
/// the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceError {
    pub resource: String,
    pub message: String,
}

impl ResourceError {
    pub fn new(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.resource, self.message)
    }
}
