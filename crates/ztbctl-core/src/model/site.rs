// ── Site domain types ──

use std::net::{IpAddr, Ipv4Addr};

use serde::Serialize;
use strum::{Display, EnumString};

use super::vlan::VlanRecord;

/// How a site names its template. An explicit id always wins over a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum TemplateRef {
    Id(String),
    Name(String),
}

impl std::fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// One or two gateways. HA pairs are joined into a cluster by VRRP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Gateways {
    Standalone { name: String },
    Ha { primary: String, secondary: String },
}

impl Gateways {
    pub fn is_ha(&self) -> bool {
        matches!(self, Self::Ha { .. })
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Standalone { name } => vec![name.as_str()],
            Self::Ha { primary, secondary } => vec![primary.as_str(), secondary.as_str()],
        }
    }
}

/// A WAN uplink on one gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WanUplink {
    pub interface: Option<String>,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

/// Site-level DHCP handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DhcpMode {
    #[default]
    Inherit,
    Server,
    Relay,
}

/// A validated site ready for provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteRecord {
    pub name: String,
    pub template: TemplateRef,
    pub gateways: Gateways,
    pub wan: Vec<WanUplink>,
    pub dhcp_mode: DhcpMode,
    pub dhcp_relay: Option<Ipv4Addr>,
    pub dns: Vec<IpAddr>,
    pub vlan_set: Option<String>,
    pub vlans: Vec<VlanRecord>,
    /// Only `post`-flagged sites are sent to the API.
    pub post: bool,
    pub connector: bool,
    pub city: Option<String>,
    pub country: Option<String>,
    pub location_name: Option<String>,
    pub vrrp_link_interface: Option<String>,
    pub vrrp_track_extra: Vec<String>,
}

impl SiteRecord {
    pub fn is_ha(&self) -> bool {
        self.gateways.is_ha()
    }

    /// DNS servers in the comma-joined form the network API expects.
    pub fn dns_list(&self) -> String {
        self.dns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}
