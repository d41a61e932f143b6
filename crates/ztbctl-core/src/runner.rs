// ── Run-level fan-out ──
//
// Provisions every `post`-flagged site with a bounded number of sessions
// in flight, then folds the sessions into a summary sorted by site name.

use std::collections::BTreeMap;

use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;
use ztbctl_api::Transport;

use crate::error::ResourceError;
use crate::model::{SiteRecord, deployable};
use crate::orchestrator::{Orchestrator, Phase, RecordedDocument, Session};

/// Terminal state of one site.
#[derive(Debug, Clone, Serialize)]
pub struct SiteSummary {
    pub site: String,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub site_id: Option<String>,
    pub cluster_id: Option<u64>,
    pub gateway_ids: Vec<String>,
    pub vlan_ids: BTreeMap<u16, String>,
    pub warnings: Vec<String>,
    pub errors: Vec<ResourceError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<RecordedDocument>,
}

impl From<Session> for SiteSummary {
    fn from(session: Session) -> Self {
        Self {
            site: session.site,
            phase: session.phase,
            failed_in: session.failed_in,
            failure: session.failure,
            site_id: session.site_id,
            cluster_id: session.cluster_id,
            gateway_ids: session.gateway_ids,
            vlan_ids: session.vlan_ids,
            warnings: session.warnings,
            errors: session.errors,
            documents: session.documents,
        }
    }
}

impl SiteSummary {
    pub fn is_failed(&self) -> bool {
        self.phase == Phase::Failed
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub sites: Vec<SiteSummary>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.sites.iter().filter(|s| s.is_failed()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.sites.len() - self.failed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Every recorded document across all sites, in site order.
    pub fn documents(&self) -> impl Iterator<Item = (&str, &RecordedDocument)> {
        self.sites
            .iter()
            .flat_map(|s| s.documents.iter().map(move |d| (s.site.as_str(), d)))
    }
}

pub struct Runner<T> {
    orchestrator: Orchestrator<T>,
    workers: usize,
}

impl<T: Transport> Runner<T> {
    pub fn new(orchestrator: Orchestrator<T>, workers: usize) -> Self {
        Self {
            orchestrator,
            workers: workers.max(1),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator<T> {
        &self.orchestrator
    }

    pub async fn run(&self, sites: &[SiteRecord]) -> RunSummary {
        let selected: Vec<&SiteRecord> = deployable(sites).collect();
        tracing::info!(
            sites = selected.len(),
            skipped = sites.len() - selected.len(),
            workers = self.workers,
            dry_run = self.orchestrator.config().dry_run,
            "starting run"
        );

        let mut summaries: Vec<SiteSummary> = stream::iter(selected)
            .map(|site| async move { SiteSummary::from(self.orchestrator.provision(site).await) })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        summaries.sort_by_key(|s| s.site.to_lowercase());
        let summary = RunSummary { sites: summaries };
        tracing::info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "run finished"
        );
        summary
    }
}
