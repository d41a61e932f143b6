//! Profile resolution with CLI flag overrides.
//!
//! `ztbctl-config` owns the file format and credential chain; this module
//! layers `--api-base`, `--api-key`, `--bearer`, `--insecure`, and
//! `--timeout` on top and builds the configs the commands need.

use secrecy::SecretString;

use ztbctl_api::ClientConfig;
use ztbctl_config::{Config, ConfigError, Profile};
use ztbctl_core::OrchestratorConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// A profile with flag overrides applied.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub name: String,
    pub profile: Profile,
    pub client: ClientConfig,
}

impl ResolvedProfile {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        ztbctl_config::profile_to_orchestrator_config(&self.profile)
    }
}

/// Select the profile and apply flag overrides, without touching secrets.
pub fn select_profile(global: &GlobalOpts, cfg: &Config) -> Result<(String, Profile), CliError> {
    let name = cfg.active_profile_name(global.profile.as_deref());

    let mut profile = match (cfg.profiles.get(&name), global.api_base.as_deref()) {
        (Some(profile), _) => profile.clone(),
        (None, Some(api_base)) => Profile::new(api_base),
        (None, None) if global.profile.is_some() => {
            return Err(ConfigError::UnknownProfile {
                profile: name,
                path: ztbctl_config::config_path().display().to_string(),
            }
            .into());
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: ztbctl_config::config_path().display().to_string(),
            });
        }
    };

    if let Some(api_base) = &global.api_base {
        profile.api_base.clone_from(api_base);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    Ok((name, profile))
}

/// Resolve the active profile and its credentials.
pub fn resolve(global: &GlobalOpts) -> Result<ResolvedProfile, CliError> {
    let cfg = ztbctl_config::load_config()?;
    let (name, profile) = select_profile(global, &cfg)?;

    let bearer = global
        .bearer
        .clone()
        .map(SecretString::from)
        .or_else(|| ztbctl_config::resolve_bearer(&profile, &name));
    let api_key = global
        .api_key
        .clone()
        .map(SecretString::from)
        .or_else(|| ztbctl_config::resolve_api_key(&profile, &name));
    let credentials = ztbctl_config::credentials_from(bearer, api_key, &name)?;

    tracing::debug!(profile = %name, api_base = %profile.api_base, "resolved profile");
    let client = ClientConfig {
        base_url: profile.api_base.clone(),
        credentials,
        transport: ztbctl_config::transport_config(&profile, &cfg.defaults),
    };
    Ok(ResolvedProfile {
        name,
        profile,
        client,
    })
}
