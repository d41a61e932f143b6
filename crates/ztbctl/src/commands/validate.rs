//! `ztbctl validate`: check a manifest offline.
//!
//! Relay-mode templates are only known from the catalog, so relay
//! addresses are checked here only for sites that ask for relay mode
//! explicitly. `provision` repeats the check with the catalog loaded.

use serde::Serialize;
use tabled::Tabled;

use ztbctl_core::{RowError, SiteRecord};

use super::util;
use crate::cli::{GlobalOpts, ManifestArgs};
use crate::error::CliError;
use crate::manifest;
use crate::output;

#[derive(Debug, Serialize)]
struct ValidatedSite {
    site: String,
    template: String,
    ha: bool,
    gateways: Vec<String>,
    vlans: usize,
    post: bool,
}

impl From<&SiteRecord> for ValidatedSite {
    fn from(site: &SiteRecord) -> Self {
        Self {
            site: site.name.clone(),
            template: site.template.to_string(),
            ha: site.is_ha(),
            gateways: site.gateways.names().into_iter().map(str::to_owned).collect(),
            vlans: site.vlans.len(),
            post: site.post,
        }
    }
}

#[derive(Debug, Serialize)]
struct ValidationReport {
    sites: Vec<ValidatedSite>,
    errors: Vec<RowError>,
}

#[derive(Tabled)]
struct SiteRow {
    #[tabled(rename = "Site")]
    site: String,
    #[tabled(rename = "Template")]
    template: String,
    #[tabled(rename = "Mode")]
    mode: &'static str,
    #[tabled(rename = "Gateways")]
    gateways: String,
    #[tabled(rename = "VLANs")]
    vlans: usize,
    #[tabled(rename = "Post")]
    post: &'static str,
}

fn site_row(s: &ValidatedSite) -> SiteRow {
    SiteRow {
        site: s.site.clone(),
        template: s.template.clone(),
        mode: if s.ha { "ha" } else { "standalone" },
        gateways: s.gateways.join(", "),
        vlans: s.vlans,
        post: if s.post { "yes" } else { "no" },
    }
}

pub fn handle(args: &ManifestArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let manifest = manifest::read(&args.manifest)?;
    let outcome = util::load_sites(&manifest, |_| false);

    let report = ValidationReport {
        sites: outcome.sites.iter().map(ValidatedSite::from).collect(),
        errors: outcome.errors.clone(),
    };
    let out = output::render_single(
        &global.output,
        &report,
        |r| output::render_list(&global.output, &r.sites, site_row, |s| s.site.clone()),
        |r| {
            r.sites
                .iter()
                .map(|s| s.site.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        },
    );
    output::print_output(&out, global.quiet);

    util::report_row_errors(&outcome.errors);
    util::invalid_rows(&outcome)
}
