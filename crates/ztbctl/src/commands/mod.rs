//! Command dispatch: bridges CLI args -> core workflow -> output formatting.

pub mod config_cmd;
pub mod connector;
pub mod provision;
pub mod pull;
pub mod render;
pub mod sites;
pub mod templates;
pub mod util;
pub mod validate;

use crate::cli::{Command, GlobalOpts};
use crate::config::ResolvedProfile;
use crate::error::CliError;

/// Dispatch an API-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    resolved: &ResolvedProfile,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Provision(args) => provision::handle(&args, resolved, global).await,
        Command::Templates(args) => templates::handle(&args, resolved, global).await,
        Command::Sites(args) => sites::handle(&args, resolved, global).await,
        Command::Pull(args) => pull::handle(&args, resolved, global).await,
        // Handled before dispatch
        Command::Config(_)
        | Command::Validate(_)
        | Command::Render(_)
        | Command::Completions(_) => unreachable!(),
    }
}
