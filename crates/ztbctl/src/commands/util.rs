//! Shared helpers for command handlers.

use std::sync::Arc;

use ztbctl_api::ZtbClient;
use ztbctl_core::{CoreError, LoadOutcome, RowError, TemplateRef, TemplateResolver};

use crate::config::ResolvedProfile;
use crate::error::CliError;
use crate::manifest::Manifest;

/// Build the HTTP client for the resolved profile.
pub fn connect(resolved: &ResolvedProfile) -> Result<Arc<ZtbClient>, CliError> {
    let client = ZtbClient::new(resolved.client.clone()).map_err(CoreError::from)?;
    Ok(Arc::new(client))
}

/// Fetch the template catalog up front so relay-mode templates are known
/// while rows are validated. Only auth failures and cancellation abort;
/// anything else defers relay checks to provisioning time.
pub async fn prefetch_catalog(resolver: &TemplateResolver<ZtbClient>) -> Result<(), CliError> {
    match resolver.catalog().await {
        Ok(catalog) => {
            tracing::debug!(templates = catalog.len(), "catalog prefetched");
            Ok(())
        }
        Err(e @ (CoreError::AuthenticationFailed { .. } | CoreError::Cancelled)) => Err(e.into()),
        Err(e) => {
            tracing::warn!(error = %e, "template catalog unavailable, relay checks deferred");
            Ok(())
        }
    }
}

/// Validate manifest rows. `relay_hint` marks relay-mode templates.
pub fn load_sites(manifest: &Manifest, relay_hint: impl Fn(&TemplateRef) -> bool) -> LoadOutcome {
    let outcome = ztbctl_core::model::load(&manifest.sites, &manifest.vlan_sets, relay_hint);
    tracing::info!(
        valid = outcome.sites.len(),
        invalid_rows = outcome.errors.len(),
        "validated manifest"
    );
    outcome
}

/// Print row errors to stderr, one per line.
pub fn report_row_errors(errors: &[RowError]) {
    for err in errors {
        eprintln!("  ✗ {err}");
    }
}

/// Error for a run that had invalid rows, if any.
pub fn invalid_rows(outcome: &LoadOutcome) -> Result<(), CliError> {
    if outcome.is_clean() {
        Ok(())
    } else {
        Err(CliError::InvalidRows {
            count: outcome
                .errors
                .iter()
                .map(|e| e.row)
                .collect::<std::collections::BTreeSet<_>>()
                .len(),
        })
    }
}

