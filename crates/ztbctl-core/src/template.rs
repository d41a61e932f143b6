// ── Template resolution ──
//
// Maps a site's template reference to a backend template id plus the
// metadata the renderer and VRRP inference need. The catalog is fetched
// at most once per run no matter how many sites resolve concurrently;
// resolved entries are cached by reference.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use strum::{Display, EnumString};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use ztbctl_api::types::{GatewayInterfaces, TemplateSummary};
use ztbctl_api::{Method, Transport, endpoints};

use crate::config::RetryPolicy;
use crate::error::CoreError;
use crate::model::TemplateRef;
use crate::model::load::clean_interface;
use crate::retry::call_with_retry;

// ── Interface layout ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum InterfaceRole {
    Wan,
    Lan,
    Ha,
    #[strum(serialize = "management", serialize = "mgmt")]
    Management,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutInterface {
    pub name: String,
    pub role: InterfaceRole,
}

/// Interface roles exposed by a template or by live gateways.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceLayout {
    pub interfaces: Vec<LayoutInterface>,
    /// Names that may be tracked by VRRP. `None` means unrestricted;
    /// live discovery narrows it to LAN/WAN ports present on every peer.
    pub trackable: Option<BTreeSet<String>>,
}

impl InterfaceLayout {
    /// Parse an `interfaces: [{name, interface_type}]` list.
    pub fn from_value(value: &Value) -> Self {
        let interfaces = value
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|entry| {
                        let name = entry.get("name").and_then(Value::as_str)?;
                        let role = ["interface_type", "role", "type"]
                            .iter()
                            .find_map(|k| entry.get(*k).and_then(Value::as_str))?
                            .parse()
                            .ok()?;
                        Some(LayoutInterface {
                            name: clean_interface(name),
                            role,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            interfaces,
            trackable: None,
        }
    }

    /// Build a layout from the live interface inventory of `gateway_ids`.
    pub fn from_discovery(inventory: &[GatewayInterfaces], gateway_ids: &[String]) -> Self {
        let mut interfaces: Vec<LayoutInterface> = Vec::new();
        let mut per_peer: Vec<BTreeSet<String>> = Vec::new();

        for gateway in inventory.iter().filter(|g| gateway_ids.contains(&g.gateway_id)) {
            let mut trackable = BTreeSet::new();
            for entry in &gateway.interfaces {
                let name = clean_interface(&entry.name);
                let Ok(role) = entry.interface_type.parse::<InterfaceRole>() else {
                    continue;
                };
                if name.is_empty() {
                    continue;
                }
                if matches!(role, InterfaceRole::Lan | InterfaceRole::Wan) {
                    trackable.insert(name.clone());
                }
                if !interfaces.iter().any(|i| i.name == name && i.role == role) {
                    interfaces.push(LayoutInterface { name, role });
                }
            }
            per_peer.push(trackable);
        }

        let trackable = per_peer
            .into_iter()
            .reduce(|common, peer| common.intersection(&peer).cloned().collect());

        Self {
            interfaces,
            trackable,
        }
    }

    pub fn names_with_role(&self, role: InterfaceRole) -> impl Iterator<Item = &str> {
        self.interfaces
            .iter()
            .filter(move |i| i.role == role)
            .map(|i| i.name.as_str())
    }

    pub fn ha_link(&self) -> Option<&str> {
        self.names_with_role(InterfaceRole::Ha).next()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

// ── Resolved template ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTemplate {
    pub id: String,
    pub name: Option<String>,
    pub layout: InterfaceLayout,
    pub ha_supported: bool,
    /// The template runs site DHCP in relay mode.
    pub relay_mode: bool,
    /// Default site-document fields, lowest override layer.
    pub baseline: Map<String, Value>,
}

impl ResolvedTemplate {
    /// A template known only by id.
    pub fn bare(id: impl Into<String>, baseline: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: None,
            layout: InterfaceLayout::default(),
            ha_supported: false,
            relay_mode: false,
            baseline,
        }
    }

    fn from_summary(summary: &TemplateSummary, defaults: &Map<String, Value>) -> Self {
        let raw = &summary.raw;
        let mut baseline = defaults.clone();
        if let Some(Value::Object(site_defaults)) = raw.get("site_defaults") {
            baseline.extend(site_defaults.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let ha_supported = raw
            .get("ha_supported")
            .and_then(Value::as_bool)
            .unwrap_or_else(|| summary.deployment_type.as_deref().is_some_and(is_ha_deployment));
        let relay_mode = raw.get("dhcp_service").and_then(Value::as_str) == Some("relay")
            || raw.get("dhcp_relay").and_then(Value::as_bool) == Some(true);

        Self {
            id: summary.id.clone(),
            name: Some(summary.name.clone()),
            layout: raw
                .get("interfaces")
                .map(InterfaceLayout::from_value)
                .unwrap_or_default(),
            ha_supported,
            relay_mode,
            baseline,
        }
    }
}

// ── Resolver ────────────────────────────────────────────────────────

fn cache_key(reference: &TemplateRef) -> String {
    match reference {
        TemplateRef::Id(id) => format!("id:{id}"),
        TemplateRef::Name(name) => format!("name:{}", name.trim().to_lowercase()),
    }
}

/// Template name → id resolution with a run-wide cache.
pub struct TemplateResolver<T> {
    transport: Arc<T>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    baseline: Map<String, Value>,
    catalog: OnceCell<Vec<TemplateSummary>>,
    cache: DashMap<String, ResolvedTemplate>,
}

impl<T: Transport> TemplateResolver<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            baseline: Map::new(),
            catalog: OnceCell::new(),
            cache: DashMap::new(),
        }
    }

    /// Site-document defaults applied beneath every template.
    pub fn with_baseline(mut self, baseline: Map<String, Value>) -> Self {
        self.baseline = baseline;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy, cancel: CancellationToken) -> Self {
        self.retry = retry;
        self.cancel = cancel;
        self
    }

    /// The full template catalog, fetched on first use.
    pub async fn catalog(&self) -> Result<&[TemplateSummary], CoreError> {
        let list = self
            .catalog
            .get_or_try_init(|| async {
                tracing::debug!("fetching template catalog");
                let resp = call_with_retry(
                    self.transport.as_ref(),
                    &self.retry,
                    &self.cancel,
                    Method::GET,
                    endpoints::TEMPLATES,
                    None,
                )
                .await?;
                if !resp.is_success() {
                    return Err(CoreError::rejected(
                        "template catalog",
                        resp.status,
                        resp.message(),
                    ));
                }
                let list = TemplateSummary::list(&resp.body);
                tracing::info!(count = list.len(), "loaded template catalog");
                Ok::<_, CoreError>(list)
            })
            .await?;
        Ok(list.as_slice())
    }

    /// Whether an already-fetched catalog marks this template as DHCP
    /// relay-mode. Never touches the network; `false` before `catalog()`.
    pub fn is_relay_template(&self, reference: &TemplateRef) -> bool {
        let Some(catalog) = self.catalog.get() else {
            return false;
        };
        catalog
            .iter()
            .find(|t| match reference {
                TemplateRef::Id(id) => t.id == *id,
                TemplateRef::Name(name) => t.name.trim().eq_ignore_ascii_case(name.trim()),
            })
            .is_some_and(|t| ResolvedTemplate::from_summary(t, &Map::new()).relay_mode)
    }

    pub async fn resolve(&self, reference: &TemplateRef) -> Result<ResolvedTemplate, CoreError> {
        let key = cache_key(reference);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.value().clone());
        }

        let resolved = match reference {
            TemplateRef::Id(id) => self.resolve_id(id).await?,
            TemplateRef::Name(name) => self.resolve_name(name).await?,
        };
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    async fn resolve_id(&self, id: &str) -> Result<ResolvedTemplate, CoreError> {
        // An explicit id never fails resolution; the catalog only adds metadata.
        let catalog: &[TemplateSummary] = match self.catalog().await {
            Ok(catalog) => catalog,
            Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
            Err(e) => {
                tracing::warn!(template_id = id, error = %e, "catalog unavailable, using bare template");
                &[]
            }
        };
        Ok(catalog
            .iter()
            .find(|t| t.id == id)
            .map_or_else(
                || ResolvedTemplate::bare(id, self.baseline.clone()),
                |t| ResolvedTemplate::from_summary(t, &self.baseline),
            ))
    }

    async fn resolve_name(&self, name: &str) -> Result<ResolvedTemplate, CoreError> {
        let wanted = name.trim().to_lowercase();
        let catalog = self.catalog().await?;
        let hits: Vec<&TemplateSummary> = catalog
            .iter()
            .filter(|t| t.name.trim().to_lowercase() == wanted)
            .collect();

        match hits.as_slice() {
            [single] => {
                tracing::debug!(template = name, id = %single.id, "resolved template");
                Ok(ResolvedTemplate::from_summary(single, &self.baseline))
            }
            [] => {
                let available: BTreeSet<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
                Err(CoreError::TemplateNotFound {
                    name: name.to_owned(),
                    available: available.into_iter().collect::<Vec<_>>().join(", "),
                })
            }
            many => Err(CoreError::AmbiguousTemplate {
                name: name.to_owned(),
                count: many.len(),
            }),
        }
    }
}

/// HA link per gateway id, from live discovery.
pub fn ha_links(inventory: &[GatewayInterfaces]) -> BTreeMap<String, String> {
    inventory
        .iter()
        .filter_map(|g| {
            g.interfaces
                .iter()
                .find(|i| i.interface_type.eq_ignore_ascii_case("ha"))
                .map(|i| (g.gateway_id.clone(), clean_interface(&i.name)))
        })
        .collect()
}

/// `HA`, `ha-pair`, `Active/Standby HA`: an `ha` word in the deployment type.
fn is_ha_deployment(deployment_type: &str) -> bool {
    deployment_type
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case("ha"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use ztbctl_api::types::InterfaceEntry;

    use super::*;

    fn gateway(id: &str, entries: &[(&str, &str)]) -> GatewayInterfaces {
        GatewayInterfaces {
            gateway_id: id.into(),
            gateway_name: String::new(),
            interfaces: entries
                .iter()
                .map(|(name, kind)| InterfaceEntry {
                    name: (*name).into(),
                    interface_type: (*kind).into(),
                })
                .collect(),
        }
    }

    #[test]
    fn layout_from_catalog_value() {
        let layout = InterfaceLayout::from_value(&json!([
            { "name": "ge1", "interface_type": "management" },
            { "name": "GE7", "interface_type": "ha" },
            { "name": "ge3", "role": "wan" },
            { "name": "ge9", "interface_type": "bogus" }
        ]));
        assert_eq!(layout.interfaces.len(), 3);
        assert_eq!(layout.ha_link(), Some("ge7"));
        assert_eq!(
            layout.names_with_role(InterfaceRole::Management).collect::<Vec<_>>(),
            vec!["ge1"]
        );
        assert!(layout.trackable.is_none());
    }

    #[test]
    fn discovery_intersects_trackables_across_peers() {
        let inventory = vec![
            gateway("a", &[("ge7", "ha"), ("ge3", "wan"), ("ge5", "lan"), ("ge6", "lan")]),
            gateway("b", &[("ge7", "ha"), ("ge3", "wan"), ("ge5", "lan")]),
            gateway("other", &[("ge8", "lan")]),
        ];
        let layout = InterfaceLayout::from_discovery(&inventory, &["a".into(), "b".into()]);
        assert_eq!(layout.ha_link(), Some("ge7"));
        let trackable: Vec<_> = layout.trackable.unwrap().into_iter().collect();
        assert_eq!(trackable, vec!["ge3", "ge5"]);

        let links = ha_links(&inventory);
        assert_eq!(links.get("a").map(String::as_str), Some("ge7"));
        assert!(!links.contains_key("other"));
    }

    #[test]
    fn ha_deployment_matches_whole_words() {
        assert!(is_ha_deployment("HA"));
        assert!(is_ha_deployment("ha-pair"));
        assert!(is_ha_deployment("Active/Standby HA"));
        assert!(!is_ha_deployment("shared"));
        assert!(!is_ha_deployment("chassis"));
        assert!(!is_ha_deployment("standalone"));
    }

    #[test]
    fn summary_metadata_and_baseline_layers() {
        let row = json!({
            "id": 9,
            "name": "ZT800 HA",
            "deployment_type": "HA",
            "dhcp_service": "relay",
            "site_defaults": { "timezone": "Europe/Amsterdam" }
        });
        let summary = TemplateSummary::from_row(&row).unwrap();
        let mut defaults = Map::new();
        defaults.insert("timezone".into(), json!("UTC"));
        defaults.insert("ntp".into(), json!("pool.ntp.org"));

        let resolved = ResolvedTemplate::from_summary(&summary, &defaults);
        assert_eq!(resolved.id, "9");
        assert!(resolved.ha_supported);
        assert!(resolved.relay_mode);
        assert_eq!(resolved.baseline["timezone"], json!("Europe/Amsterdam"));
        assert_eq!(resolved.baseline["ntp"], json!("pool.ntp.org"));
    }
}
