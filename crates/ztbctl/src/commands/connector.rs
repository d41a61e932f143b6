//! App-connector provisioning through an external command.
//!
//! The profile's `connector_command` runs through the shell with the site
//! described in `ZTB_SITE_*` environment variables and must print the
//! provision key on stdout.

use futures_util::future::BoxFuture;
use tokio::process::Command;

use ztbctl_core::{ConnectorHook, SiteRecord};

#[derive(Debug, Clone)]
pub struct ExecConnectorHook {
    command: String,
}

impl ExecConnectorHook {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn shell(&self) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C");
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c");
            cmd
        };
        cmd.arg(&self.command).kill_on_drop(true);
        cmd
    }

    async fn run(&self, site: &SiteRecord) -> Result<String, String> {
        let mut cmd = self.shell();
        cmd.env("ZTB_SITE_NAME", &site.name)
            .env("ZTB_SITE_GATEWAYS", site.gateways.names().join(","))
            .env("ZTB_SITE_CITY", site.city.as_deref().unwrap_or_default())
            .env("ZTB_SITE_COUNTRY", site.country.as_deref().unwrap_or_default());

        tracing::debug!(site = %site.name, command = %self.command, "running connector command");
        let output = cmd
            .output()
            .await
            .map_err(|e| format!("failed to run connector command: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "connector command exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let key = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if key.is_empty() {
            Err("connector command printed no provision key".into())
        } else {
            Ok(key)
        }
    }
}

impl ConnectorHook for ExecConnectorHook {
    fn provision<'a>(&'a self, site: &'a SiteRecord) -> BoxFuture<'a, Result<String, String>> {
        Box::pin(self.run(site))
    }
}
