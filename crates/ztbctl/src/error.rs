//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use ztbctl_config::ConfigError;
use ztbctl_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the management API: {reason}")]
    #[diagnostic(
        code(ztbctl::connection_failed),
        help(
            "Check the api_base in your profile and your network path.\n\
             Lab tenants behind an intercepting proxy may need --insecure (-k)."
        )
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(ztbctl::auth_failed),
        help(
            "Verify the API key for this profile.\n\
             Run: ztbctl config set-key"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(ztbctl::no_credentials),
        help(
            "Configure credentials with: ztbctl config init\n\
             Or set the ZTB_API_KEY environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Template '{name}' not found")]
    #[diagnostic(
        code(ztbctl::template_not_found),
        help("Available templates: {available}\nRun: ztbctl templates")
    )]
    TemplateNotFound { name: String, available: String },

    #[error("Site '{name}' is not provisioned on this tenant")]
    #[diagnostic(code(ztbctl::site_not_listed), help("Run: ztbctl sites"))]
    SiteNotListed { name: String },

    #[error("Site '{name}' is not in the manifest")]
    #[diagnostic(code(ztbctl::site_not_found))]
    SiteNotFound { name: String },

    // ── Manifest ─────────────────────────────────────────────────────
    #[error("Cannot read manifest {path}: {reason}")]
    #[diagnostic(
        code(ztbctl::manifest),
        help("Manifests are YAML, JSON, or TOML with a top-level `sites` list.")
    )]
    Manifest { path: String, reason: String },

    #[error("{count} manifest row(s) failed validation")]
    #[diagnostic(
        code(ztbctl::invalid_rows),
        help("Run: ztbctl validate <manifest> for the full list.")
    )]
    InvalidRows { count: usize },

    // ── Provisioning ─────────────────────────────────────────────────
    #[error("{failed} of {total} site(s) failed")]
    #[diagnostic(
        code(ztbctl::provisioning_failed),
        help("Rerun after fixing; sites that already exist are picked up where they are.")
    )]
    SitesFailed { failed: usize, total: usize },

    #[error("Interrupted")]
    #[diagnostic(code(ztbctl::interrupted))]
    Interrupted,

    #[error(transparent)]
    #[diagnostic(code(ztbctl::core))]
    Core(CoreError),

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ztbctl::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found")]
    #[diagnostic(
        code(ztbctl::no_config),
        help(
            "Create one with: ztbctl config init\n\
             Or pass --api-base and --api-key.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(ztbctl::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(ztbctl::timeout),
        help("Increase timeout with --timeout or check API responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => Self::ConnectionFailed { reason },
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::TemplateNotFound { name, available } => {
                Self::TemplateNotFound { name, available }
            }
            CoreError::SiteNotFound { name } => Self::SiteNotListed { name },
            CoreError::Cancelled => Self::Interrupted,
            other => Self::Core(other),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::TemplateNotFound { .. }
            | Self::SiteNotFound { .. }
            | Self::SiteNotListed { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Manifest { .. }
            | Self::InvalidRows { .. }
            | Self::Validation { .. }
            | Self::NoConfig { .. } => exit_code::USAGE,
            Self::Interrupted => exit_code::INTERRUPTED,
            Self::SitesFailed { .. } | Self::Core(_) | Self::Config(_) | Self::Io(_) => {
                exit_code::GENERAL
            }
        }
    }
}
