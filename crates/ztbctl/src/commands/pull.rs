//! `ztbctl pull`: capture a provisioned site as manifest rows.
//!
//! Without `--into` the captured fragment is printed; with it the site
//! row and its VLAN set are upserted into that manifest.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use ztbctl_core::{CaptureOptions, RawRow, ReferenceSite, SiteDirectory};

use super::util;
use crate::cli::{GlobalOpts, OutputFormat, PullArgs};
use crate::config::ResolvedProfile;
use crate::error::CliError;
use crate::{manifest, output};

/// A manifest fragment holding one site and its VLAN set.
#[derive(Serialize)]
struct Fragment<'a> {
    sites: [&'a RawRow; 1],
    vlan_sets: BTreeMap<&'a str, &'a [RawRow]>,
}

impl<'a> From<&'a ReferenceSite> for Fragment<'a> {
    fn from(reference: &'a ReferenceSite) -> Self {
        Self {
            sites: [&reference.site],
            vlan_sets: [(reference.vlan_set.as_str(), reference.vlans.as_slice())].into(),
        }
    }
}

/// Fragments are meant to be pasted into a manifest, so table and plain
/// output fall back to YAML.
fn render_fragment(format: &OutputFormat, reference: &ReferenceSite) -> String {
    let format = match format {
        OutputFormat::Json | OutputFormat::JsonCompact => format,
        OutputFormat::Table | OutputFormat::Yaml | OutputFormat::Plain => &OutputFormat::Yaml,
    };
    output::render_single(
        format,
        &Fragment::from(reference),
        |_| String::new(),
        |_| String::new(),
    )
}

pub async fn handle(
    args: &PullArgs,
    resolved: &ResolvedProfile,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let client = util::connect(resolved)?;
    let config = resolved.orchestrator_config();
    let directory =
        SiteDirectory::new(Arc::clone(&client)).with_retry(config.retry, CancellationToken::new());

    let options = CaptureOptions {
        include_wan: args.include_wan,
        include_ha: args.include_ha,
    };
    let reference = directory
        .pull(args.site.trim(), args.vlan_set.as_deref(), options)
        .await?;
    if !reference.skipped.is_empty() {
        tracing::info!(skipped = ?reference.skipped, "left out WAN/HA VLANs");
    }

    match &args.into {
        Some(path) => {
            manifest::upsert_reference(path, &reference)?;
            if !global.quiet {
                eprintln!(
                    "Captured '{}' with {} VLAN(s) into {} (vlan set '{}')",
                    args.site,
                    reference.vlans.len(),
                    path.display(),
                    reference.vlan_set
                );
            }
        }
        None => output::print_output(&render_fragment(&global.output, &reference), global.quiet),
    }
    Ok(())
}
