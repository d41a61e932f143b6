// ── Per-site provisioning session ──

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use strum::Display;
use ztbctl_api::Method;

use crate::error::{CoreError, ResourceError};

/// Workflow phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Pending,
    Creating,
    AwaitingReady,
    AttachingVlans,
    EnablingVlans,
    ApplyingVrrp,
    Patching,
    ProvisioningConnector,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// A mutating request captured instead of sent (dry-run).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedDocument {
    pub phase: Phase,
    pub method: String,
    pub path: String,
    pub body: Value,
}

/// State owned by one orchestrator invocation.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub site: String,
    pub phase: Phase,
    /// Phase that was running when the session failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub site_id: Option<String>,
    pub cluster_id: Option<u64>,
    pub gateway_ids: Vec<String>,
    /// Created VLAN ids keyed by tag.
    pub vlan_ids: BTreeMap<u16, String>,
    pub documents: Vec<RecordedDocument>,
    pub warnings: Vec<String>,
    pub errors: Vec<ResourceError>,
    /// Requests put on the wire per phase, retries included.
    pub attempts: BTreeMap<Phase, u32>,
}

impl Session {
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            phase: Phase::Pending,
            failed_in: None,
            failure: None,
            site_id: None,
            cluster_id: None,
            gateway_ids: Vec::new(),
            vlan_ids: BTreeMap::new(),
            documents: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            attempts: BTreeMap::new(),
        }
    }

    pub(crate) fn enter(&mut self, phase: Phase) {
        tracing::info!(site = %self.site, %phase, "entering phase");
        self.phase = phase;
    }

    pub(crate) fn fail(&mut self, err: &CoreError) {
        tracing::error!(site = %self.site, phase = %self.phase, error = %err, "provisioning failed");
        self.failed_in = Some(self.phase);
        self.failure = Some(err.to_string());
        self.phase = Phase::Failed;
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(site = %self.site, "{message}");
        self.warnings.push(message);
    }

    pub(crate) fn error(&mut self, resource: impl Into<String>, message: impl Into<String>) {
        let err = ResourceError::new(resource, message);
        tracing::warn!(site = %self.site, error = %err, "resource failed");
        self.errors.push(err);
    }

    pub(crate) fn count_attempts(&mut self, sent: u32) {
        if sent > 0 {
            *self.attempts.entry(self.phase).or_default() += sent;
        }
    }

    pub(crate) fn record(&mut self, method: &Method, path: &str, body: Value) {
        tracing::debug!(site = %self.site, %method, path, "dry-run: recording document");
        self.documents.push(RecordedDocument {
            phase: self.phase,
            method: method.to_string(),
            path: path.to_owned(),
            body,
        });
    }

    pub fn attempts_in(&self, phase: Phase) -> u32 {
        self.attempts.get(&phase).copied().unwrap_or(0)
    }

    pub fn is_failed(&self) -> bool {
        self.phase == Phase::Failed
    }

    /// Phases this session passed through, from the recorded documents
    /// and attempt counters.
    pub fn visited(&self, phase: Phase) -> bool {
        self.attempts.contains_key(&phase) || self.documents.iter().any(|d| d.phase == phase)
    }
}
