// ── VLAN domain types ──

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::Serialize;
use strum::{Display, EnumString};

/// Per-VLAN DHCP behaviour as the backend names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DhcpService {
    Inherit,
    Server,
    Relay,
    NonAirgapped,
    NoDhcp,
}

impl DhcpService {
    /// Parse user input, accepting the `on`/`off` and dashed spellings
    /// that VLAN exports use.
    pub fn parse_input(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "on" => Some(Self::Inherit),
            "off" => Some(Self::NoDhcp),
            other => other.parse().ok(),
        }
    }

    /// Default when the row leaves the mode blank.
    pub fn implied(has_range: bool) -> Self {
        if has_range { Self::Inherit } else { Self::NoDhcp }
    }
}

/// Inclusive DHCP pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DhcpRange {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

impl std::fmt::Display for DhcpRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A validated VLAN belonging to one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VlanRecord {
    pub name: String,
    pub tag: u16,
    /// Network form (host bits cleared).
    pub subnet: Ipv4Net,
    pub default_gateway: Ipv4Addr,
    pub dhcp_range: Option<DhcpRange>,
    pub interface: String,
    pub zone: String,
    pub enabled: bool,
    pub share_over_vpn: bool,
    pub dhcp_service: DhcpService,
    /// Whether the row named a mode rather than relying on the default.
    /// Only explicit modes are re-applied after creation.
    pub dhcp_service_explicit: bool,
}

impl VlanRecord {
    /// Human label used in logs and accumulated errors.
    pub fn label(&self) -> String {
        format!("vlan {} ({})", self.tag, self.name)
    }
}
