//! Shared configuration for ztbctl.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to `ztbctl_api::TransportConfig` and
//! `ztbctl_core::OrchestratorConfig`. The CLI layers its flag overrides
//! on top of what this crate resolves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ztbctl_api::{Credentials, TlsMode, TransportConfig};
use ztbctl_core::{OrchestratorConfig, PollPolicy, RetryPolicy};

/// Keyring service name; entries are `{profile}/api-key` and `{profile}/bearer`.
pub const KEYRING_SERVICE: &str = "ztbctl";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found in {path}")]
    UnknownProfile { profile: String, path: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named tenant profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Profile name to use: explicit choice, then `default_profile`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    60
}

/// A named tenant profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Tenant API root (e.g., "https://acme-api.ztb.example.com").
    pub api_base: String,

    /// API key (plaintext; prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Pre-issued bearer token (plaintext; prefer keyring or env var).
    pub bearer: Option<String>,

    /// Environment variable name containing the bearer token.
    pub bearer_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Request timeout in seconds.
    pub timeout: Option<u64>,

    /// Readiness poll interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Readiness poll ceiling.
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,

    /// Attempts per call for connection errors and 5xx.
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Sites provisioned concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Command that prints an app-connector provision key on stdout.
    pub connector_command: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_poll_max_attempts() -> u32 {
    12
}
fn default_retry_max_attempts() -> u32 {
    3
}
fn default_workers() -> usize {
    4
}

impl Profile {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_attempts: default_poll_max_attempts(),
            retry_max_attempts: default_retry_max_attempts(),
            workers: default_workers(),
            ..Self::default()
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "ztbctl", "ztbctl").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ztbctl");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
///
/// Environment overrides use `__` as the nesting separator, e.g.
/// `ZTB_PROFILES__LAB__WORKERS=8`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ZTB_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution (without CLI flags) ───────────────────────

fn keyring_entry(profile_name: &str, kind: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/{kind}"),
    )?)
}

/// Walk one secret's chain: named env var, keyring, plaintext.
fn resolve_secret(
    env_name: Option<&str>,
    profile_name: &str,
    kind: &str,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    // 1. Profile's *_env → env var lookup
    if let Some(value) = env_name.and_then(|name| std::env::var(name).ok()) {
        return Some(SecretString::from(value));
    }

    // 2. System keyring
    let stored = keyring_entry(profile_name, kind)
        .and_then(|e| e.get_password().map_err(ConfigError::from));
    if let Ok(secret) = stored {
        return Some(SecretString::from(secret));
    }

    // 3. Plaintext in config
    plaintext.map(|value| SecretString::from(value.to_owned()))
}

pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_secret(
        profile.api_key_env.as_deref(),
        profile_name,
        "api-key",
        profile.api_key.as_deref(),
    )
}

pub fn resolve_bearer(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_secret(
        profile.bearer_env.as_deref(),
        profile_name,
        "bearer",
        profile.bearer.as_deref(),
    )
}

/// Combine whatever secrets resolved into transport credentials.
pub fn credentials_from(
    bearer: Option<SecretString>,
    api_key: Option<SecretString>,
    profile_name: &str,
) -> Result<Credentials, ConfigError> {
    match (bearer, api_key) {
        (Some(token), Some(key)) => Ok(Credentials::BearerWithApiKey { token, key }),
        (Some(token), None) => Ok(Credentials::Bearer { token }),
        (None, Some(key)) => Ok(Credentials::ApiKey { key }),
        (None, None) => Err(ConfigError::NoCredentials {
            profile: profile_name.into(),
        }),
    }
}

/// Store an API key for `profile_name` in the system keyring.
pub fn store_api_key(profile_name: &str, key: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name, "api-key")?.set_password(key)?;
    Ok(())
}

/// Store a bearer token for `profile_name` in the system keyring.
pub fn store_bearer(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name, "bearer")?.set_password(token)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

pub fn transport_config(profile: &Profile, defaults: &Defaults) -> TransportConfig {
    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    TransportConfig {
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
    }
}

pub fn profile_to_orchestrator_config(profile: &Profile) -> OrchestratorConfig {
    OrchestratorConfig {
        poll: PollPolicy {
            interval: Duration::from_millis(profile.poll_interval_ms),
            max_attempts: profile.poll_max_attempts,
        },
        retry: RetryPolicy {
            max_attempts: profile.retry_max_attempts,
            ..RetryPolicy::default()
        },
        ..OrchestratorConfig::default()
    }
}
