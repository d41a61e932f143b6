//! `ztbctl render`: show the documents a site would be created with.
//!
//! Gateway and cluster ids only exist after creation, so VLAN documents
//! carry the gateway names and cluster 0 in their place.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use ztbctl_core::render::{VlanContext, render_vlan};
use ztbctl_core::{ResolvedTemplate, SiteRecord, TemplateRef, TemplateResolver};

use super::util;
use crate::cli::{GlobalOpts, OutputFormat, RenderArgs};
use crate::config;
use crate::error::CliError;
use crate::manifest::{self, Manifest};
use crate::output;

#[derive(Debug, Serialize)]
struct RenderedSite {
    site: String,
    template_id: String,
    document: Value,
    vlans: Vec<Value>,
}

fn render_site(site: &SiteRecord, template: &ResolvedTemplate) -> RenderedSite {
    let gateway_ids: Vec<String> = site.gateways.names().into_iter().map(str::to_owned).collect();
    let ctx = VlanContext::new(site, &gateway_ids, 0);
    RenderedSite {
        site: site.name.clone(),
        template_id: template.id.clone(),
        document: ztbctl_core::render(site, template),
        vlans: site.vlans.iter().map(|v| render_vlan(v, &ctx)).collect(),
    }
}

/// A template standing in for one that was never looked up.
fn offline_template(reference: &TemplateRef, manifest: &Manifest) -> ResolvedTemplate {
    let id = match reference {
        TemplateRef::Id(id) => id.clone(),
        TemplateRef::Name(name) => format!("<{name}>"),
    };
    ResolvedTemplate::bare(id, manifest.site_defaults.clone())
}

fn select<'a>(sites: &'a [SiteRecord], only: Option<&str>) -> Result<Vec<&'a SiteRecord>, CliError> {
    let Some(wanted) = only else {
        return Ok(sites.iter().collect());
    };
    let hits: Vec<&SiteRecord> = sites
        .iter()
        .filter(|s| s.name.eq_ignore_ascii_case(wanted.trim()))
        .collect();
    if hits.is_empty() {
        return Err(CliError::SiteNotFound {
            name: wanted.to_owned(),
        });
    }
    Ok(hits)
}

fn detail(rendered: &[RenderedSite]) -> String {
    rendered
        .iter()
        .map(|r| {
            let mut block = format!(
                "── {} · template {}\n{}",
                r.site,
                r.template_id,
                output::render_json_pretty(&r.document)
            );
            for vlan in &r.vlans {
                block.push_str("\n\n");
                block.push_str(&output::render_json_pretty(vlan));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub async fn handle(args: &RenderArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let manifest = manifest::read(&args.manifest)?;
    if args.offline {
        return handle_offline(args, &manifest, global);
    }

    let resolved = config::resolve(global)?;
    let client = util::connect(&resolved)?;
    let resolver = TemplateResolver::new(Arc::clone(&client))
        .with_baseline(manifest.site_defaults.clone())
        .with_retry(
            resolved.orchestrator_config().retry,
            tokio_util::sync::CancellationToken::new(),
        );
    util::prefetch_catalog(&resolver).await?;

    let outcome = util::load_sites(&manifest, |t| resolver.is_relay_template(t));
    util::report_row_errors(&outcome.errors);
    let mut rendered = Vec::new();
    for site in select(&outcome.sites, args.site.as_deref())? {
        let template = resolver.resolve(&site.template).await?;
        rendered.push(render_site(site, &template));
    }
    emit(&rendered, global);
    util::invalid_rows(&outcome)
}

fn handle_offline(args: &RenderArgs, manifest: &Manifest, global: &GlobalOpts) -> Result<(), CliError> {
    let outcome = util::load_sites(manifest, |_| false);
    util::report_row_errors(&outcome.errors);
    let rendered: Vec<RenderedSite> = select(&outcome.sites, args.site.as_deref())?
        .into_iter()
        .map(|site| render_site(site, &offline_template(&site.template, manifest)))
        .collect();
    emit(&rendered, global);
    util::invalid_rows(&outcome)
}

fn emit(rendered: &[RenderedSite], global: &GlobalOpts) {
    let out = match global.output {
        OutputFormat::Table | OutputFormat::Plain => detail(rendered),
        _ => output::render_single(&global.output, &rendered, |_| String::new(), |_| String::new()),
    };
    output::print_output(&out, global.quiet);
}
