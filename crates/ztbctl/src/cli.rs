//! Clap derive structures for the `ztbctl` CLI.
//!
//! Defines the command tree, global flags, and shared output types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ztbctl -- declarative site provisioning for ZTB appliances
#[derive(Debug, Parser)]
#[command(
    name = "ztbctl",
    version,
    about = "Provision ZTB sites, gateways, and VLANs from a manifest",
    long_about = "Reads a declarative site manifest and drives each site through\n\
        creation, VLAN attachment, and HA (VRRP) setup against the\n\
        management API.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Tenant profile to use
    #[arg(long, short = 'p', env = "ZTB_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API base URL (overrides profile)
    #[arg(long, short = 'a', env = "ZTB_API_BASE", global = true)]
    pub api_base: Option<String>,

    /// API key, exchanged for a bearer token at login
    #[arg(long, env = "ZTB_API_KEY", global = true, hide_env = true)]
    pub api_key: Option<String>,

    /// Pre-issued bearer token
    #[arg(long, env = "ZTB_BEARER", global = true, hide_env = true)]
    pub bearer: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "ZTB_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "ZTB_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "ZTB_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Provision every post-flagged site in a manifest
    #[command(alias = "up")]
    Provision(ProvisionArgs),

    /// Validate a manifest without contacting the API
    #[command(alias = "check")]
    Validate(ManifestArgs),

    /// Show the documents a site would be created with
    Render(RenderArgs),

    /// List the tenant's template catalog
    #[command(alias = "tpl")]
    Templates(TemplatesArgs),

    /// List the tenant's provisioned sites
    Sites(SitesArgs),

    /// Capture a provisioned site as a manifest row and VLAN set
    Pull(PullArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Provisioning ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ManifestArgs {
    /// Site manifest (YAML, JSON, or TOML)
    pub manifest: PathBuf,
}

#[derive(Debug, Args)]
pub struct ProvisionArgs {
    /// Site manifest (YAML, JSON, or TOML)
    pub manifest: PathBuf,

    /// Record the documents that would be sent instead of sending them
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Sites provisioned concurrently (overrides profile)
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Build VRRP from the template layout only, skipping live interface discovery
    #[arg(long)]
    pub no_discovery: bool,
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Site manifest (YAML, JSON, or TOML)
    pub manifest: PathBuf,

    /// Only render this site (case-insensitive)
    #[arg(long, short = 's')]
    pub site: Option<String>,

    /// Use bare templates instead of fetching the catalog
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Args)]
pub struct TemplatesArgs {
    /// Only show templates whose name contains this text
    #[arg(long, short = 's')]
    pub search: Option<String>,
}

// ── Reference sites ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SitesArgs {
    /// Only show sites whose name matches this text
    #[arg(long, short = 's')]
    pub search: Option<String>,
}

#[derive(Debug, Args)]
pub struct PullArgs {
    /// Site name as listed by `ztbctl sites`
    pub site: String,

    /// Upsert the site row and VLAN set into this manifest instead of printing them
    #[arg(long)]
    pub into: Option<PathBuf>,

    /// VLAN set name (defaults to the site name, lower-cased and dashed)
    #[arg(long)]
    pub vlan_set: Option<String>,

    /// Keep WAN VLANs
    #[arg(long)]
    pub include_wan: bool,

    /// Keep HA-internal VLANs
    #[arg(long)]
    pub include_ha: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive configuration wizard
    Init,

    /// Show the active profile (secrets masked)
    Show,

    /// Store an API key for the active profile in the system keyring
    SetKey,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
