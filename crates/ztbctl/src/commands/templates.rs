//! `ztbctl templates`: list the tenant's template catalog.

use std::sync::Arc;

use tabled::Tabled;

use ztbctl_api::types::TemplateSummary;
use ztbctl_core::TemplateResolver;

use super::util;
use crate::cli::{GlobalOpts, TemplatesArgs};
use crate::config::ResolvedProfile;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct TemplateRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Deployment")]
    deployment: String,
    #[tabled(rename = "Platform")]
    platform: String,
}

impl From<&TemplateSummary> for TemplateRow {
    fn from(t: &TemplateSummary) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            deployment: t.deployment_type.clone().unwrap_or_default(),
            platform: t.platform_type.clone().unwrap_or_default(),
        }
    }
}

fn matches(template: &TemplateSummary, search: Option<&str>) -> bool {
    search.is_none_or(|needle| {
        template
            .name
            .to_lowercase()
            .contains(&needle.trim().to_lowercase())
    })
}

pub async fn handle(
    args: &TemplatesArgs,
    resolved: &ResolvedProfile,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let client = util::connect(resolved)?;
    let config = resolved.orchestrator_config();
    let resolver = TemplateResolver::new(Arc::clone(&client))
        .with_retry(config.retry, tokio_util::sync::CancellationToken::new());

    let mut templates: Vec<TemplateSummary> = resolver
        .catalog()
        .await?
        .iter()
        .filter(|t| matches(t, args.search.as_deref()))
        .cloned()
        .collect();
    templates.sort_by_key(|t| t.name.to_lowercase());

    let out = output::render_list(
        &global.output,
        &templates,
        |t| TemplateRow::from(t),
        |t| t.id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
