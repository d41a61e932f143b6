//! Config subcommand handlers.

use dialoguer::{Input, Select};
use serde::Serialize;

use ztbctl_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// How a secret is configured, never its value.
fn secret_source(plaintext: Option<&str>, env: Option<&str>) -> String {
    match (env, plaintext) {
        (Some(name), _) => format!("env:{name}"),
        (None, Some(_)) => "******** (config file)".into(),
        (None, None) => "keyring or unset".into(),
    }
}

#[derive(Debug, Serialize)]
struct ProfileView {
    profile: String,
    config_path: String,
    api_base: String,
    api_key: String,
    bearer: String,
    insecure: bool,
    timeout_secs: u64,
    poll_interval_ms: u64,
    poll_max_attempts: u32,
    retry_max_attempts: u32,
    workers: usize,
    connector_command: Option<String>,
}

impl ProfileView {
    fn new(name: &str, profile: &Profile, cfg: &Config) -> Self {
        Self {
            profile: name.to_owned(),
            config_path: ztbctl_config::config_path().display().to_string(),
            api_base: profile.api_base.clone(),
            api_key: secret_source(profile.api_key.as_deref(), profile.api_key_env.as_deref()),
            bearer: secret_source(profile.bearer.as_deref(), profile.bearer_env.as_deref()),
            insecure: profile.insecure.unwrap_or(cfg.defaults.insecure),
            timeout_secs: profile.timeout.unwrap_or(cfg.defaults.timeout),
            poll_interval_ms: profile.poll_interval_ms,
            poll_max_attempts: profile.poll_max_attempts,
            retry_max_attempts: profile.retry_max_attempts,
            workers: profile.workers,
            connector_command: profile.connector_command.clone(),
        }
    }

    fn detail(&self) -> String {
        [
            ("Profile", self.profile.clone()),
            ("Config", self.config_path.clone()),
            ("API base", self.api_base.clone()),
            ("API key", self.api_key.clone()),
            ("Bearer", self.bearer.clone()),
            ("Insecure", self.insecure.to_string()),
            ("Timeout", format!("{}s", self.timeout_secs)),
            (
                "Polling",
                format!("{} x {}ms", self.poll_max_attempts, self.poll_interval_ms),
            ),
            ("Retries", self.retry_max_attempts.to_string()),
            ("Workers", self.workers.to_string()),
            (
                "Connector",
                self.connector_command.clone().unwrap_or_else(|| "-".into()),
            ),
        ]
        .iter()
        .map(|(k, v)| format!("{k:<10} {v}"))
        .collect::<Vec<_>>()
        .join("\n")
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(),

        ConfigCommand::Show => {
            let cfg = ztbctl_config::load_config()?;
            let (name, profile) = config::select_profile(global, &cfg)?;
            let view = ProfileView::new(&name, &profile, &cfg);
            let out = output::render_single(
                &global.output,
                &view,
                ProfileView::detail,
                |v| v.profile.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::SetKey => {
            let cfg = ztbctl_config::load_config()?;
            let name = cfg.active_profile_name(global.profile.as_deref());
            let key = rpassword::prompt_password(format!("API key for '{name}': "))
                .map_err(prompt_err)?;
            if key.trim().is_empty() {
                return Err(CliError::Validation {
                    field: "api_key".into(),
                    reason: "API key cannot be empty".into(),
                });
            }
            ztbctl_config::store_api_key(&name, key.trim())?;
            eprintln!("✓ API key for '{name}' stored in system keyring");
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(
                &ztbctl_config::config_path().display().to_string(),
                global.quiet,
            );
            Ok(())
        }
    }
}

// ── Init: interactive wizard ────────────────────────────────────────

fn init() -> Result<(), CliError> {
    let config_path = ztbctl_config::config_path();
    eprintln!("ztbctl configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let mut cfg = ztbctl_config::load_config()?;

    // 1. Profile name
    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    // 2. API base
    let api_base: String = Input::new()
        .with_prompt("API base URL")
        .with_initial_text("https://")
        .interact_text()
        .map_err(prompt_err)?;

    // 3. Credential kind
    let kinds = &["API key (recommended)", "Bearer token"];
    let kind = Select::new()
        .with_prompt("Authentication method")
        .items(kinds)
        .default(0)
        .interact()
        .map_err(prompt_err)?;
    let label = if kind == 0 { "API key" } else { "Bearer token" };

    let secret = rpassword::prompt_password(format!("{label}: ")).map_err(prompt_err)?;
    let secret = secret.trim().to_owned();
    if secret.is_empty() {
        return Err(CliError::Validation {
            field: "credentials".into(),
            reason: format!("{label} cannot be empty"),
        });
    }

    // 4. Storage
    let stores = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let store = Select::new()
        .with_prompt(format!("Where to store the {label}?"))
        .items(stores)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    let mut profile = Profile::new(api_base.trim());
    match (kind, store) {
        (0, 0) => ztbctl_config::store_api_key(&profile_name, &secret)?,
        (_, 0) => ztbctl_config::store_bearer(&profile_name, &secret)?,
        (0, _) => profile.api_key = Some(secret),
        _ => profile.bearer = Some(secret),
    }
    if store == 0 {
        eprintln!("   ✓ {label} stored in system keyring");
    }

    // 5. Write config
    cfg.profiles.insert(profile_name.clone(), profile);
    if cfg.profiles.len() == 1 || cfg.default_profile.is_none() {
        cfg.default_profile = Some(profile_name.clone());
    }
    let path = ztbctl_config::save_config(&cfg)?;

    eprintln!("\n✓ Configuration written to {}", path.display());
    eprintln!("  Profile: {profile_name}");
    eprintln!("\n  Test it: ztbctl templates --profile {profile_name}");
    Ok(())
}
