// ── Reference sites ──
//
// Captures an already-provisioned site as manifest rows: its VLANs become
// a reusable VLAN set and its gateway and WAN settings a site row with
// `post` off, ready to be edited and provisioned elsewhere.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use ztbctl_api::types::{NetworkSummary, SiteStatus};
use ztbctl_api::{Method, Transport, endpoints};

use crate::config::RetryPolicy;
use crate::error::CoreError;
use crate::model::RawRow;
use crate::retry::call_with_retry;

/// WAN interface written when the listing does not name one.
const DEFAULT_WAN_INTERFACE: &str = "ge5";

/// Which of the site's VLANs to keep.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureOptions {
    pub include_wan: bool,
    pub include_ha: bool,
}

/// A site captured as manifest rows.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceSite {
    pub site: RawRow,
    pub vlan_set: String,
    pub vlans: Vec<RawRow>,
    /// Names of the VLANs the WAN/HA filters dropped.
    pub skipped: Vec<String>,
}

pub fn is_wan_network(network: &NetworkSummary) -> bool {
    network.zone.trim().to_lowercase().starts_with("wan")
        || network.name.trim().to_lowercase().starts_with("wan")
}

/// HA-internal VLANs are created with the cluster and cannot be edited.
pub fn is_ha_internal_network(network: &NetworkSummary) -> bool {
    network.zone.trim().to_lowercase().starts_with("ha")
        || (network.name.trim().to_lowercase().starts_with("ha-") && network.tag.trim() == "1")
}

/// Default VLAN-set name for a site: lower-case, dashes for separators.
pub fn vlan_set_name(site_name: &str) -> String {
    site_name
        .trim()
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn put(row: &mut RawRow, key: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        row.insert(key.to_owned(), value.to_owned());
    }
}

fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// The manifest spelling of a listed DHCP mode.
fn dhcp_service_cell(raw: &str) -> String {
    match raw.trim().to_lowercase().as_str() {
        "inherit" => "on".to_owned(),
        "no_dhcp" => "off".to_owned(),
        other => other.to_owned(),
    }
}

pub fn vlan_row(network: &NetworkSummary) -> RawRow {
    let mut row = RawRow::new();
    let (start, end) = network
        .dhcp_range
        .as_ref()
        .map_or((None, None), |(s, e)| (Some(s.as_str()), Some(e.as_str())));
    let gateway = if network.default_gateway.trim().is_empty() {
        start
    } else {
        Some(network.default_gateway.as_str())
    };

    put(&mut row, "name", Some(&network.name));
    put(&mut row, "tag", Some(&network.tag));
    put(&mut row, "subnet", Some(&network.subnet));
    put(&mut row, "default_gateway", gateway);
    put(&mut row, "dhcp_start", start);
    put(&mut row, "dhcp_end", end);
    put(&mut row, "interface", Some(&network.interface));
    put(&mut row, "zone", Some(&network.zone));
    put(&mut row, "enabled", Some(flag(network.is_provisioned())));
    put(&mut row, "share_over_vpn", Some(flag(network.share_over_vpn)));
    put(
        &mut row,
        "dhcp_service",
        network.dhcp_service.as_deref().map(dhcp_service_cell).as_deref(),
    );
    row
}

/// Site row for a listed site. Template ids are tenant-specific, so only
/// the template name is carried over.
pub fn site_row(status: &SiteStatus, site_name: &str, vlan_set: &str) -> RawRow {
    let mut row = RawRow::new();
    let primary = status.gateways.first().cloned().unwrap_or_default();
    let secondary = status.gateways.get(1);

    let name = if status.display_name.is_empty() {
        site_name
    } else {
        status.display_name.as_str()
    };
    put(&mut row, "site_name", Some(name));
    put(&mut row, "template_name", status.template_name.as_deref());
    put(&mut row, "gateway_name", primary.name.as_deref());
    put(&mut row, "wan0_ip", primary.wan_ip.as_deref());
    put(&mut row, "wan0_mask", primary.wan_mask.as_deref());
    put(&mut row, "wan0_gw", primary.wan_gw.as_deref());
    put(
        &mut row,
        "wan_interface_name",
        Some(primary.wan_interface.as_deref().unwrap_or(DEFAULT_WAN_INTERFACE)),
    );
    if let Some(secondary) = secondary {
        put(&mut row, "gateway_name_b", secondary.name.as_deref());
        put(&mut row, "wan1_ip", secondary.wan_ip.as_deref());
        put(&mut row, "wan1_mask", secondary.wan_mask.as_deref());
        put(&mut row, "wan1_gw", secondary.wan_gw.as_deref());
        put(&mut row, "wan1_interface_name", secondary.wan_interface.as_deref());
    }
    put(&mut row, "city", status.city.as_deref());
    put(&mut row, "country", status.country.as_deref());
    put(&mut row, "location_name", status.location_name.as_deref());
    put(&mut row, "per_site_dns", status.dns.as_deref());
    put(&mut row, "dhcp_server_ip", status.dhcp_server_ip.as_deref());
    put(&mut row, "vlan_set", Some(vlan_set));
    put(&mut row, "post", Some(flag(false)));
    row
}

/// Build the manifest rows for a site from its listing and VLANs.
pub fn capture(
    status: &SiteStatus,
    networks: &[NetworkSummary],
    site_name: &str,
    vlan_set: Option<&str>,
    options: CaptureOptions,
) -> ReferenceSite {
    let vlan_set = vlan_set.map_or_else(|| vlan_set_name(site_name), str::to_owned);
    let mut vlans = Vec::new();
    let mut skipped = Vec::new();
    for network in networks {
        let skip = (!options.include_wan && is_wan_network(network))
            || (!options.include_ha && is_ha_internal_network(network));
        if skip {
            skipped.push(network.name.clone());
        } else {
            vlans.push(vlan_row(network));
        }
    }

    ReferenceSite {
        site: site_row(status, site_name, &vlan_set),
        vlan_set,
        vlans,
        skipped,
    }
}

// ── Remote lookups ──────────────────────────────────────────────────

/// Site listing and capture against the management API.
pub struct SiteDirectory<T> {
    transport: Arc<T>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl<T: Transport> SiteDirectory<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy, cancel: CancellationToken) -> Self {
        self.retry = retry;
        self.cancel = cancel;
        self
    }

    async fn get(&self, operation: &str, path: &str) -> Result<serde_json::Value, CoreError> {
        let resp = call_with_retry(
            self.transport.as_ref(),
            &self.retry,
            &self.cancel,
            Method::GET,
            path,
            None,
        )
        .await?;
        if !resp.is_success() {
            return Err(CoreError::rejected(operation, resp.status, resp.message()));
        }
        Ok(resp.body)
    }

    /// Sites whose name matches `search` (server-side; empty lists all).
    pub async fn list(&self, search: &str) -> Result<Vec<SiteStatus>, CoreError> {
        let body = self.get("site listing", &endpoints::gateway_search(search)).await?;
        let sites = SiteStatus::list(&body);
        tracing::debug!(count = sites.len(), search, "listed sites");
        Ok(sites)
    }

    /// Capture `site_name` as a site row plus a VLAN set.
    pub async fn pull(
        &self,
        site_name: &str,
        vlan_set: Option<&str>,
        options: CaptureOptions,
    ) -> Result<ReferenceSite, CoreError> {
        let body = self.get("site listing", &endpoints::gateway_search(site_name)).await?;
        let status = SiteStatus::find(&body, site_name).ok_or_else(|| CoreError::SiteNotFound {
            name: site_name.to_owned(),
        })?;
        let Some(site_id) = status.site_id.clone() else {
            return Err(CoreError::Validation {
                message: format!("site '{site_name}' is listed without a site id"),
            });
        };

        let networks = NetworkSummary::list(
            &self
                .get("network listing", &endpoints::site_networks(&site_id))
                .await?,
        );
        let captured = capture(&status, &networks, site_name, vlan_set, options);
        tracing::info!(
            site = %site_name,
            %site_id,
            vlans = captured.vlans.len(),
            skipped = captured.skipped.len(),
            "captured reference site"
        );
        Ok(captured)
    }
}
