//! `ztbctl sites`: list the tenant's provisioned sites.

use std::sync::Arc;

use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use ztbctl_api::types::SiteStatus;
use ztbctl_core::SiteDirectory;

use super::util;
use crate::cli::{GlobalOpts, SitesArgs};
use crate::config::ResolvedProfile;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct SiteRow {
    #[tabled(rename = "Site")]
    name: String,
    #[tabled(rename = "Site ID")]
    site_id: String,
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Gateways")]
    gateways: String,
    #[tabled(rename = "Template")]
    template: String,
}

impl From<&SiteStatus> for SiteRow {
    fn from(s: &SiteStatus) -> Self {
        let gateways = s
            .gateways
            .iter()
            .filter_map(|g| g.name.clone().or_else(|| g.gateway_id.clone()))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            name: s.display_name.clone(),
            site_id: s.site_id.clone().unwrap_or_default(),
            cluster: s.cluster_id.map(|c| c.to_string()).unwrap_or_default(),
            gateways,
            template: s.template_name.clone().unwrap_or_default(),
        }
    }
}

pub async fn handle(
    args: &SitesArgs,
    resolved: &ResolvedProfile,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let client = util::connect(resolved)?;
    let config = resolved.orchestrator_config();
    let directory =
        SiteDirectory::new(Arc::clone(&client)).with_retry(config.retry, CancellationToken::new());

    let mut sites = directory
        .list(args.search.as_deref().unwrap_or_default().trim())
        .await?;
    sites.sort_by_key(|s| s.display_name.to_lowercase());

    let out = output::render_list(&global.output, &sites, |s| SiteRow::from(s), |s| {
        s.display_name.clone()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn row_prefers_gateway_names() {
        let site = SiteStatus::from_row(&json!({
            "location_display_name": "Rotterdam",
            "template_name": "ZT800 Branch HA",
            "cluster_info": {
                "site_id": "s-4",
                "cluster_id": 12,
                "gateways": [
                    {"gateway_id": "g-1", "gateway_name": "rtm-a"},
                    {"gateway_id": "g-2"}
                ]
            }
        }));
        let row = SiteRow::from(&site);
        assert_eq!(row.site_id, "s-4");
        assert_eq!(row.cluster, "12");
        assert_eq!(row.gateways, "rtm-a, g-2");
        assert_eq!(row.template, "ZT800 Branch HA");
    }
}
