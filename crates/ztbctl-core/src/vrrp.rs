// ── VRRP inference ──
//
// Derives the HA link and the tracked interface lists for an HA pair
// from the site's uplinks, its VLANs, and the interface layout. Pure:
// the orchestrator supplies the layout (template or live discovery).

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::error::CoreError;
use crate::model::load::clean_interface;
use crate::model::{SiteRecord, VlanRecord};
use crate::template::{InterfaceLayout, InterfaceRole};

/// Every HA cluster is provisioned with this router id.
pub const VIRTUAL_ROUTER_ID: u8 = 16;

const ADVERT_INT: u32 = 10;
const PRIORITY: u32 = 254;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VrrpError {
    #[error("No HA link interface defined for site '{site}'")]
    NoHaLinkDefined { site: String },

    #[error("VRRP track list is empty for site '{site}' after exclusions")]
    EmptyTrackList { site: String },
}

impl From<VrrpError> for CoreError {
    fn from(err: VrrpError) -> Self {
        match err {
            VrrpError::NoHaLinkDefined { site } => CoreError::NoHaLinkDefined { site },
            VrrpError::EmptyTrackList { site } => CoreError::EmptyTrackList { site },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VrrpConfiguration {
    pub ha_interface: String,
    pub virtual_router_id: u8,
    pub tracked_wan: Vec<String>,
    pub tracked_lan: Vec<String>,
}

impl VrrpConfiguration {
    /// Tracked interfaces, WAN first.
    pub fn tracked(&self) -> impl Iterator<Item = &str> {
        self.tracked_wan
            .iter()
            .chain(&self.tracked_lan)
            .map(String::as_str)
    }

    /// `POST /api/v3/vrrp/config/{cluster}` body.
    ///
    /// `ha_links` maps gateway id to its discovered HA port; gateways
    /// missing from it use `ha_interface`.
    pub fn to_document(&self, gateway_ids: &[String], ha_links: &BTreeMap<String, String>) -> Value {
        let tracked = self.tracked().collect::<Vec<_>>().join(",");
        let mut track_interface = Map::new();
        let mut vrrp_interface = Map::new();
        for id in gateway_ids {
            track_interface.insert(id.clone(), json!(tracked));
            let link = ha_links.get(id).unwrap_or(&self.ha_interface);
            vrrp_interface.insert(id.clone(), json!(link));
        }

        json!({
            "virtual_router_id": self.virtual_router_id.to_string(),
            "advert_int": ADVERT_INT,
            "priority": PRIORITY,
            "vip": "0.0.0.0",
            "authentication_password": "",
            "track_interface": track_interface,
            "vrrp_interface": vrrp_interface,
        })
    }
}

fn push_unique(list: &mut Vec<String>, name: String) {
    if !list.contains(&name) {
        list.push(name);
    }
}

/// Build the VRRP configuration for an HA site.
pub fn infer(
    site: &SiteRecord,
    vlans: &[VlanRecord],
    layout: &InterfaceLayout,
) -> Result<VrrpConfiguration, VrrpError> {
    let ha_interface = site
        .vrrp_link_interface
        .clone()
        .or_else(|| layout.ha_link().map(str::to_owned))
        .ok_or_else(|| VrrpError::NoHaLinkDefined {
            site: site.name.clone(),
        })?;

    let management: BTreeSet<&str> = layout.names_with_role(InterfaceRole::Management).collect();
    let trackable = |name: &str| {
        !name.is_empty()
            && name != ha_interface
            && name != "mgmt"
            && !management.contains(name)
            && layout.trackable.as_ref().is_none_or(|t| t.contains(name))
    };

    let mut wan_names: Vec<String> = site
        .wan
        .iter()
        .filter_map(|uplink| uplink.interface.as_deref())
        .map(clean_interface)
        .collect();
    if wan_names.is_empty() {
        wan_names = layout
            .names_with_role(InterfaceRole::Wan)
            .map(str::to_owned)
            .collect();
    }

    let mut tracked_wan = Vec::new();
    for name in wan_names.into_iter().filter(|n| trackable(n.as_str())) {
        push_unique(&mut tracked_wan, name);
    }

    let mut tracked_lan = Vec::new();
    for name in vlans
        .iter()
        .map(|v| clean_interface(&v.interface))
        .filter(|n| trackable(n.as_str()))
    {
        if !tracked_wan.contains(&name) {
            push_unique(&mut tracked_lan, name);
        }
    }

    for extra in &site.vrrp_track_extra {
        if !tracked_wan.contains(extra) {
            push_unique(&mut tracked_lan, extra.clone());
        }
    }

    if tracked_wan.is_empty() && tracked_lan.is_empty() {
        return Err(VrrpError::EmptyTrackList {
            site: site.name.clone(),
        });
    }

    Ok(VrrpConfiguration {
        ha_interface,
        virtual_router_id: VIRTUAL_ROUTER_ID,
        tracked_wan,
        tracked_lan,
    })
}
