// ── Provisioning orchestrator ──
//
// Drives one site through the workflow:
//
//   CREATING → AWAITING_READY → ATTACHING_VLANS → ENABLING_VLANS
//     → [APPLYING_VRRP] → PATCHING → [PROVISIONING_CONNECTOR] → DONE
//
// Structural failures (site, readiness, VRRP) end the session as FAILED.
// Failures on independent resources (one VLAN, one patch) are recorded
// and the workflow moves on. Only cancellation interrupts those loops.

mod connector;
mod session;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use ztbctl_api::types::{
    GatewayInterfaces, NetworkSummary, SiteStatus, cluster_id_hint, created_id, site_id_hint,
};
use ztbctl_api::{ApiResponse, Method, Transport, endpoints};

pub use connector::{ConnectorHook, StaticKey};
pub use session::{Phase, RecordedDocument, Session};

use crate::config::OrchestratorConfig;
use crate::error::CoreError;
use crate::model::{SiteRecord, VlanRecord};
use crate::render::{self, VlanContext};
use crate::retry::{call_counting_attempts, cancellable_sleep};
use crate::template::{self, InterfaceLayout, ResolvedTemplate, TemplateResolver};
use crate::vrrp;

/// Key recorded in place of a real provision key during dry-run.
const DRY_RUN_PROVISION_KEY: &str = "<provision-key>";

fn body_mentions(resp: &ApiResponse, needles: &[&str]) -> bool {
    let text = match &resp.body {
        Value::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    };
    needles.iter().any(|n| text.contains(n))
}

fn is_duplicate_site(resp: &ApiResponse) -> bool {
    resp.status == 409
        || (resp.status == 400 && body_mentions(resp, &["already exist", "duplicate"]))
}

fn is_already_enabled(resp: &ApiResponse) -> bool {
    resp.status == 409 || body_mentions(resp, &["already enabled", "already provisioned"])
}

/// Split a call on an independent resource: transport failures are
/// recorded on the session, cancellation propagates.
fn settle(
    session: &mut Session,
    resource: &str,
    outcome: Result<ApiResponse, CoreError>,
) -> Result<Option<ApiResponse>, CoreError> {
    match outcome {
        Ok(resp) => Ok(Some(resp)),
        Err(CoreError::Cancelled) => Err(CoreError::Cancelled),
        Err(e) => {
            session.error(resource, e.to_string());
            Ok(None)
        }
    }
}

pub struct Orchestrator<T> {
    transport: Arc<T>,
    resolver: Arc<TemplateResolver<T>>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
    connector: Option<Arc<dyn ConnectorHook>>,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(transport: Arc<T>, config: OrchestratorConfig, cancel: CancellationToken) -> Self {
        let resolver = Arc::new(
            TemplateResolver::new(Arc::clone(&transport)).with_retry(config.retry, cancel.clone()),
        );
        Self {
            transport,
            resolver,
            config,
            cancel,
            connector: None,
        }
    }

    /// Share a resolver (and its catalog cache) with the caller.
    pub fn with_resolver(mut self, resolver: Arc<TemplateResolver<T>>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_connector(mut self, hook: Arc<dyn ConnectorHook>) -> Self {
        self.connector = Some(hook);
        self
    }

    pub fn resolver(&self) -> &Arc<TemplateResolver<T>> {
        &self.resolver
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the full workflow for one site. Never returns an error; the
    /// outcome is the terminal phase of the returned session.
    pub async fn provision(&self, site: &SiteRecord) -> Session {
        let mut session = Session::new(&site.name);
        match self.drive(site, &mut session).await {
            Ok(()) => session.enter(Phase::Done),
            Err(e) => session.fail(&e),
        }
        session
    }

    async fn drive(&self, site: &SiteRecord, session: &mut Session) -> Result<(), CoreError> {
        session.enter(Phase::Creating);
        let template = self.resolver.resolve(&site.template).await?;
        if template.relay_mode && site.dhcp_relay.is_none() {
            return Err(CoreError::Validation {
                message: format!(
                    "template {} runs DHCP relay but no dhcp_server_ip is set",
                    site.template
                ),
            });
        }
        if site.is_ha() && template.name.is_some() && !template.ha_supported {
            session.warn(format!("template {} is not marked HA-capable", site.template));
        }

        self.create_site(site, &template, session).await?;

        if self.config.dry_run {
            session.gateway_ids = site.gateways.names().into_iter().map(str::to_owned).collect();
            session.cluster_id = Some(0);
        } else {
            session.enter(Phase::AwaitingReady);
            self.await_ready(site, session).await?;
        }

        session.enter(Phase::AttachingVlans);
        self.attach_vlans(site, session).await?;

        session.enter(Phase::EnablingVlans);
        self.enable_vlans(site, session).await?;

        if site.is_ha() {
            session.enter(Phase::ApplyingVrrp);
            self.apply_vrrp(site, &template, session).await?;
        }

        session.enter(Phase::Patching);
        self.patch(site, session).await?;

        if site.connector {
            session.enter(Phase::ProvisioningConnector);
            self.provision_connector(site, session).await?;
        }
        Ok(())
    }

    // ── Calls ────────────────────────────────────────────────────────

    async fn call(
        &self,
        session: &mut Session,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, CoreError> {
        let mut sent = 0;
        let outcome = call_counting_attempts(
            self.transport.as_ref(),
            &self.config.retry,
            &self.cancel,
            method,
            path,
            body,
            &mut sent,
        )
        .await;
        session.count_attempts(sent);
        outcome
    }

    /// Mutating call; in dry-run the document is recorded and a bare 200
    /// stands in for the response.
    async fn send(
        &self,
        session: &mut Session,
        method: Method,
        path: &str,
        body: Value,
    ) -> Result<ApiResponse, CoreError> {
        if self.config.dry_run {
            session.record(&method, path, body);
            return Ok(ApiResponse {
                status: 200,
                body: Value::Null,
            });
        }
        self.call(session, method, path, Some(&body)).await
    }

    // ── Phases ───────────────────────────────────────────────────────

    async fn create_site(
        &self,
        site: &SiteRecord,
        template: &ResolvedTemplate,
        session: &mut Session,
    ) -> Result<(), CoreError> {
        let document = render::render(site, template);
        let path = endpoints::deploy_site(&template.id);
        let resp = self.send(session, Method::POST, &path, document).await?;

        if matches!(resp.status, 200..=202) {
            session.site_id = site_id_hint(&resp.body);
            session.cluster_id = cluster_id_hint(&resp.body);
            tracing::info!(site = %site.name, template_id = %template.id, "site created");
            Ok(())
        } else if is_duplicate_site(&resp) {
            session.warn(format!("site already exists, continuing ({})", resp.message()));
            Ok(())
        } else {
            Err(CoreError::rejected("site creation", resp.status, resp.message()))
        }
    }

    async fn await_ready(&self, site: &SiteRecord, session: &mut Session) -> Result<(), CoreError> {
        let policy = self.config.poll;
        let max_attempts = policy.max_attempts.max(1);
        let path = endpoints::gateway_search(&site.name);
        let expected_gateways = if site.is_ha() { 2 } else { 1 };
        let mut last_state = String::from("site not listed");

        for attempt in 1..=max_attempts {
            let resp = self.call(session, Method::GET, &path, None).await?;
            if !resp.is_success() {
                return Err(CoreError::rejected("status poll", resp.status, resp.message()));
            }

            if let Some(status) = SiteStatus::find(&resp.body, &site.name) {
                if status.site_id.is_some() {
                    session.site_id = status.site_id;
                }
                let cluster_id = status.cluster_id.or(session.cluster_id);
                if status.gateway_ids.len() >= expected_gateways && cluster_id.is_some() {
                    session.gateway_ids = status.gateway_ids;
                    session.cluster_id = cluster_id;
                    tracing::info!(site = %site.name, attempt, ?cluster_id, "site ready");
                    return Ok(());
                }
                last_state = format!(
                    "{} of {expected_gateways} gateway id(s), cluster {}",
                    status.gateway_ids.len(),
                    cluster_id.map_or_else(|| "pending".to_owned(), |c| c.to_string())
                );
            }

            tracing::debug!(site = %site.name, attempt, max_attempts, %last_state, "not ready");
            if attempt < max_attempts {
                cancellable_sleep(policy.interval, &self.cancel).await?;
            }
        }

        Err(CoreError::ProvisioningTimeout {
            attempts: max_attempts,
            last_state,
        })
    }

    async fn attach_vlans(&self, site: &SiteRecord, session: &mut Session) -> Result<(), CoreError> {
        let gateway_ids = session.gateway_ids.clone();
        let ctx = VlanContext::new(site, &gateway_ids, session.cluster_id.unwrap_or(0));
        let mut listing: Option<Vec<NetworkSummary>> = None;

        for vlan in &site.vlans {
            let label = vlan.label();
            let document = render::render_vlan(vlan, &ctx);
            let outcome = self
                .send(session, Method::POST, endpoints::NETWORKS, document)
                .await;
            let Some(resp) = settle(session, &label, outcome)? else {
                continue;
            };
            if !resp.is_success() {
                // The VLAN may already exist from an earlier run.
                session.error(&label, resp.message());
                if let Some(id) = self.lookup_vlan_id(vlan, session, &mut listing).await? {
                    tracing::info!(site = %site.name, tag = vlan.tag, %id, "adopting existing vlan");
                    session.vlan_ids.insert(vlan.tag, id);
                }
                continue;
            }

            let id = if self.config.dry_run {
                Some(format!("dry-run-{}", vlan.tag))
            } else if let Some(id) = created_id(&resp.body) {
                Some(id)
            } else {
                self.lookup_vlan_id(vlan, session, &mut listing).await?
            };

            match id {
                Some(id) => {
                    tracing::debug!(site = %site.name, tag = vlan.tag, %id, "vlan created");
                    session.vlan_ids.insert(vlan.tag, id);
                }
                None => session.warn(format!("{label} created but its id could not be found")),
            }
        }
        Ok(())
    }

    /// Find a VLAN id in the site's network list, fetched once per session.
    async fn lookup_vlan_id(
        &self,
        vlan: &VlanRecord,
        session: &mut Session,
        listing: &mut Option<Vec<NetworkSummary>>,
    ) -> Result<Option<String>, CoreError> {
        let Some(site_id) = session.site_id.clone() else {
            return Ok(None);
        };
        if listing.is_none() {
            let path = endpoints::site_networks(&site_id);
            let outcome = self.call(session, Method::GET, &path, None).await;
            let networks = match settle(session, "network list", outcome)? {
                Some(resp) if resp.is_success() => NetworkSummary::list(&resp.body),
                Some(resp) => {
                    session.error("network list", resp.message());
                    Vec::new()
                }
                None => Vec::new(),
            };
            *listing = Some(networks);
        }

        let tag = vlan.tag.to_string();
        let short: String = vlan.name.chars().take(16).collect();
        Ok(listing.as_deref().and_then(|networks| {
            networks
                .iter()
                .find(|n| {
                    n.tag == tag
                        && (n.name.eq_ignore_ascii_case(&vlan.name)
                            || n.name.eq_ignore_ascii_case(&short))
                })
                .map(|n| n.id.clone())
        }))
    }

    async fn enable_vlans(&self, site: &SiteRecord, session: &mut Session) -> Result<(), CoreError> {
        let dns = site.dns_list();
        for vlan in site.vlans.iter().filter(|v| v.enabled) {
            let Some(id) = session.vlan_ids.get(&vlan.tag).cloned() else {
                continue;
            };
            let label = vlan.label();
            let document = render::render_enable(vlan, &dns);
            let outcome = self
                .send(session, Method::PUT, &endpoints::network_update(&id), document)
                .await;
            match settle(session, &label, outcome)? {
                Some(resp) if resp.is_success() => {}
                Some(resp) if is_already_enabled(&resp) => {
                    tracing::debug!(site = %site.name, tag = vlan.tag, "vlan already enabled");
                }
                Some(resp) => session.error(&label, resp.message()),
                None => {}
            }
        }
        Ok(())
    }

    async fn discover_interfaces(
        &self,
        session: &mut Session,
    ) -> Result<Vec<GatewayInterfaces>, CoreError> {
        let Some(site_id) = session.site_id.clone() else {
            return Err(CoreError::Validation {
                message: "site id unknown".into(),
            });
        };
        let path = endpoints::gateway_interfaces(&site_id);
        let resp = self.call(session, Method::GET, &path, None).await?;
        if !resp.is_success() {
            return Err(CoreError::rejected("interface discovery", resp.status, resp.message()));
        }
        Ok(GatewayInterfaces::list(&resp.body))
    }

    async fn apply_vrrp(
        &self,
        site: &SiteRecord,
        template: &ResolvedTemplate,
        session: &mut Session,
    ) -> Result<(), CoreError> {
        let mut layout = template.layout.clone();
        let mut links = BTreeMap::new();

        if !self.config.dry_run && self.config.discover_interfaces {
            match self.discover_interfaces(session).await {
                Ok(inventory) => {
                    let live = InterfaceLayout::from_discovery(&inventory, &session.gateway_ids);
                    if live.is_empty() {
                        session.warn("interface discovery returned nothing, using template layout");
                    } else {
                        links = template::ha_links(&inventory);
                        links.retain(|id, _| session.gateway_ids.contains(id));
                        layout = live;
                    }
                }
                Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
                Err(e) => session.warn(format!(
                    "interface discovery failed, using template layout: {e}"
                )),
            }
        }

        let config = vrrp::infer(site, &site.vlans, &layout)?;
        if site.vrrp_link_interface.is_some() {
            links.clear();
        }
        let tracked: Vec<&str> = config.tracked().collect();
        tracing::info!(
            site = %site.name,
            ha_interface = %config.ha_interface,
            ?tracked,
            "applying VRRP"
        );

        let cluster_id = session.cluster_id.unwrap_or(0);
        let document = config.to_document(&session.gateway_ids, &links);
        let resp = self
            .send(session, Method::POST, &endpoints::vrrp_config(cluster_id), document)
            .await?;
        if !resp.is_success() {
            return Err(CoreError::rejected("VRRP configuration", resp.status, resp.message()));
        }
        Ok(())
    }

    async fn patch(&self, site: &SiteRecord, session: &mut Session) -> Result<(), CoreError> {
        let dns = site.dns_list();
        for vlan in &site.vlans {
            let Some(id) = session.vlan_ids.get(&vlan.tag).cloned() else {
                continue;
            };

            if vlan.share_over_vpn {
                let resource = format!("{} share-over-vpn", vlan.label());
                let document = render::render_share_over_vpn(&id);
                let outcome = self
                    .send(session, Method::PATCH, endpoints::SHARE_OVER_VPN, document)
                    .await;
                if let Some(resp) = settle(session, &resource, outcome)? {
                    if !resp.is_success() {
                        session.error(&resource, resp.message());
                    }
                }
            }

            if vlan.dhcp_service_explicit {
                let resource = format!("{} dhcp_service", vlan.label());
                let document = render::render_dhcp_service(vlan, &dns);
                let outcome = self
                    .send(session, Method::PUT, &endpoints::network_update(&id), document)
                    .await;
                if let Some(resp) = settle(session, &resource, outcome)? {
                    if !resp.is_success() {
                        session.error(&resource, resp.message());
                    }
                }
            }
        }
        Ok(())
    }

    async fn provision_connector(
        &self,
        site: &SiteRecord,
        session: &mut Session,
    ) -> Result<(), CoreError> {
        let cluster_id = session.cluster_id.unwrap_or(0);

        let key = if self.config.dry_run {
            DRY_RUN_PROVISION_KEY.to_owned()
        } else {
            let Some(hook) = self.connector.as_ref() else {
                session.warn("connector requested but no connector hook is configured");
                return Ok(());
            };
            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(CoreError::Cancelled),
                result = hook.provision(site) => result,
            };
            match outcome {
                Ok(key) => key,
                Err(message) => {
                    session.error("connector", message);
                    return Ok(());
                }
            }
        };

        let document = render::render_connector(cluster_id, site, &key);
        let outcome = self
            .send(session, Method::POST, endpoints::APP_CONNECTOR, document)
            .await;
        if let Some(resp) = settle(session, "connector", outcome)? {
            if !resp.is_success() {
                session.error("connector", resp.message());
            }
        }
        Ok(())
    }
}
