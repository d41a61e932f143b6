//! `ztbctl provision`: run every post-flagged site through the workflow.

use std::sync::Arc;

use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use ztbctl_core::{Orchestrator, RunSummary, Runner, SiteSummary, TemplateResolver};

use super::connector::ExecConnectorHook;
use super::util;
use crate::cli::{GlobalOpts, OutputFormat, ProvisionArgs};
use crate::config::ResolvedProfile;
use crate::error::CliError;
use crate::manifest;
use crate::output;

// ── Table row ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct SiteRow {
    #[tabled(rename = "Site")]
    site: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Site ID")]
    site_id: String,
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "VLANs")]
    vlans: String,
    #[tabled(rename = "Warnings")]
    warnings: usize,
    #[tabled(rename = "Errors")]
    errors: String,
}

fn site_row(s: &SiteSummary, color: bool) -> SiteRow {
    let mut errors: Vec<String> = s
        .errors
        .iter()
        .map(|e| format!("{}: {}", e.resource, e.message))
        .collect();
    if let Some(failure) = &s.failure {
        let phase = s.failed_in.map(|p| p.to_string()).unwrap_or_default();
        errors.insert(0, format!("{phase}: {failure}"));
    }
    SiteRow {
        site: s.site.clone(),
        phase: output::phase_label(s.phase, color),
        site_id: s.site_id.clone().unwrap_or_else(|| "-".into()),
        cluster: s.cluster_id.map_or_else(|| "-".into(), |c| c.to_string()),
        vlans: s.vlan_ids.len().to_string(),
        warnings: s.warnings.len(),
        errors: errors.join("\n"),
    }
}

/// Dry-run documents, one block per request.
fn documents_detail(summary: &RunSummary) -> String {
    summary
        .documents()
        .map(|(site, doc)| {
            format!(
                "── {site} · {} · {} {}\n{}",
                doc.phase,
                doc.method,
                doc.path,
                output::render_json_pretty(&doc.body)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_summary(summary: &RunSummary, global: &GlobalOpts, dry_run: bool) -> String {
    let color = output::should_color(&global.color);
    match global.output {
        OutputFormat::Table => {
            let table = output::render_list(
                &global.output,
                &summary.sites,
                |s| site_row(s, color),
                |s| s.site.clone(),
            );
            if dry_run && summary.documents().next().is_some() {
                format!("{}\n\n{table}", documents_detail(summary))
            } else {
                table
            }
        }
        OutputFormat::Plain => summary
            .sites
            .iter()
            .map(|s| format!("{}\t{}", s.site, s.phase))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => output::render_single(&global.output, summary, |_| String::new(), |_| String::new()),
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(
    args: &ProvisionArgs,
    resolved: &ResolvedProfile,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let manifest = manifest::read(&args.manifest)?;
    let client = util::connect(resolved)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
        }
    });

    let mut config = resolved.orchestrator_config();
    config.dry_run = args.dry_run;
    config.discover_interfaces = !args.no_discovery;

    let resolver = Arc::new(
        TemplateResolver::new(Arc::clone(&client))
            .with_baseline(manifest.site_defaults.clone())
            .with_retry(config.retry, cancel.clone()),
    );
    util::prefetch_catalog(&resolver).await?;

    let outcome = util::load_sites(&manifest, |t| resolver.is_relay_template(t));
    util::report_row_errors(&outcome.errors);

    let mut orchestrator =
        Orchestrator::new(client, config, cancel.clone()).with_resolver(Arc::clone(&resolver));
    if let Some(command) = &resolved.profile.connector_command {
        orchestrator = orchestrator.with_connector(Arc::new(ExecConnectorHook::new(command.as_str())));
    }

    let workers = args.workers.unwrap_or(resolved.profile.workers);
    let runner = Runner::new(orchestrator, workers);
    let summary = runner.run(&outcome.sites).await;

    output::print_output(&render_summary(&summary, global, args.dry_run), global.quiet);

    if cancel.is_cancelled() {
        return Err(CliError::Interrupted);
    }
    if !summary.is_success() {
        return Err(CliError::SitesFailed {
            failed: summary.failed(),
            total: summary.sites.len(),
        });
    }
    util::invalid_rows(&outcome)
}
