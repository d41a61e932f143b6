// ── Raw row → validated record ──
//
// Input arrives as loosely-typed string maps (one per spreadsheet row).
// `load` validates every row and collects every problem it finds; a bad
// row never stops validation of the rows after it. Pure: no I/O.

use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv4Net;
use serde::Serialize;

use super::site::{DhcpMode, Gateways, SiteRecord, TemplateRef, WanUplink};
use super::vlan::{DhcpRange, DhcpService, VlanRecord};

/// One input row: column name → cell text.
pub type RawRow = BTreeMap<String, String>;

const DEFAULT_ZONE: &str = "LAN Zone";
const WAN0_INTERFACE_KEYS: &[&str] = &[
    "wan_interface_name",
    "wan0_interface_name",
    "wan0_interface",
    "wan_interface",
];
const WAN1_INTERFACE_KEYS: &[&str] = &["wan1_interface_name", "wan1_interface"];

/// A validation failure tied to a site row (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: usize,
    pub site: Option<String>,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.site {
            Some(site) => write!(f, "row {} ({site}): {}", self.row, self.message),
            None => write!(f, "row {}: {}", self.row, self.message),
        }
    }
}

/// Result of validating a whole input set.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub sites: Vec<SiteRecord>,
    pub errors: Vec<RowError>,
}

impl LoadOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate site rows and their VLAN sets.
///
/// `relay_hint` reports whether a template is known to run in DHCP relay
/// mode; such sites must carry a relay address unless they explicitly
/// choose another mode.
pub fn load<F>(
    site_rows: &[RawRow],
    vlan_sets: &BTreeMap<String, Vec<RawRow>>,
    relay_hint: F,
) -> LoadOutcome
where
    F: Fn(&TemplateRef) -> bool,
{
    let mut outcome = LoadOutcome::default();
    let mut seen = HashSet::new();

    for (idx, raw) in site_rows.iter().enumerate() {
        let mut row = Row::new(raw);
        let site = parse_site(&mut row, vlan_sets, &relay_hint);

        if let Some(name) = row.text("site_name") {
            if !seen.insert(name.to_lowercase()) {
                row.fail(format!("duplicate site name '{name}'"));
            }
        }

        let name = row.text("site_name").map(str::to_owned);
        if row.errors.is_empty() {
            if let Some(site) = site {
                outcome.sites.push(site);
            }
        } else {
            outcome
                .errors
                .extend(row.errors.into_iter().map(|message| RowError {
                    row: idx + 1,
                    site: name.clone(),
                    message,
                }));
        }
    }

    outcome
}

/// Sites flagged for deployment.
pub fn deployable(sites: &[SiteRecord]) -> impl Iterator<Item = &SiteRecord> {
    sites.iter().filter(|s| s.post)
}

// ── Row access ──────────────────────────────────────────────────────

struct Row<'a> {
    raw: &'a RawRow,
    errors: Vec<String>,
}

impl<'a> Row<'a> {
    fn new(raw: &'a RawRow) -> Self {
        Self {
            raw,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn text(&self, key: &str) -> Option<&'a str> {
        self.raw
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn first_text(&self, keys: &[&str]) -> Option<&'a str> {
        keys.iter().find_map(|k| self.text(k))
    }

    fn require(&mut self, key: &str) -> Option<&'a str> {
        let value = self.text(key);
        if value.is_none() {
            self.fail(format!("missing {key}"));
        }
        value
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.text(key).map_or(default, parse_flag)
    }

    fn ipv4(&mut self, key: &str) -> Option<Ipv4Addr> {
        let text = self.text(key)?;
        match text.parse() {
            Ok(ip) => Some(ip),
            Err(_) => {
                self.fail(format!("invalid {key} '{text}'"));
                None
            }
        }
    }

    fn require_ipv4(&mut self, key: &str) -> Option<Ipv4Addr> {
        if self.text(key).is_none() {
            self.fail(format!("missing {key}"));
            return None;
        }
        self.ipv4(key)
    }

    fn list(&self, key: &str) -> Vec<&'a str> {
        self.text(key)
            .map(|v| {
                v.split([',', ';', ' '])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "y")
}

/// Accept a dotted netmask (`255.255.255.0`) or a prefix length (`24`).
fn parse_mask(raw: &str) -> Option<Ipv4Addr> {
    if raw.contains('.') {
        let mask: Ipv4Addr = raw.parse().ok()?;
        ipnet::ipv4_mask_to_prefix(mask).ok()?;
        Some(mask)
    } else {
        let prefix: u8 = raw.trim_start_matches('/').parse().ok()?;
        Ipv4Net::new(Ipv4Addr::UNSPECIFIED, prefix)
            .ok()
            .map(|n| n.netmask())
    }
}

/// Lower-case, first entry of a comma list, sub-interface suffix removed.
pub(crate) fn clean_interface(raw: &str) -> String {
    let first = raw.split(',').next().unwrap_or_default().trim().to_lowercase();
    match first.split_once('.') {
        Some((parent, _)) => parent.to_owned(),
        None => first,
    }
}

// ── Site parsing ────────────────────────────────────────────────────

fn parse_site<F>(
    row: &mut Row<'_>,
    vlan_sets: &BTreeMap<String, Vec<RawRow>>,
    relay_hint: &F,
) -> Option<SiteRecord>
where
    F: Fn(&TemplateRef) -> bool,
{
    let name = row.require("site_name");

    let template = if let Some(id) = row.text("template_id") {
        Some(TemplateRef::Id(id.to_owned()))
    } else if let Some(name) = row.text("template_name") {
        Some(TemplateRef::Name(name.to_owned()))
    } else {
        row.fail("missing template_id and template_name");
        None
    };

    let gateways = parse_gateways(row);
    let wan = parse_wan(row);
    let (dhcp_mode, dhcp_relay) = parse_dhcp(row, template.as_ref(), relay_hint);

    let mut dns = Vec::new();
    for entry in row.list("per_site_dns") {
        match entry.parse::<IpAddr>() {
            Ok(ip) => dns.push(ip),
            Err(_) => row.fail(format!("invalid per_site_dns entry '{entry}'")),
        }
    }

    let vlan_set = row.first_text(&["vlan_set", "vlans_file"]);
    let vlans = match vlan_set {
        Some(set) => match vlan_sets.get(set) {
            Some(rows) => parse_vlans(row, set, rows),
            None => {
                row.fail(format!("unknown VLAN set '{set}'"));
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let site = SiteRecord {
        name: name?.to_owned(),
        template: template?,
        gateways: gateways?,
        wan,
        dhcp_mode,
        dhcp_relay,
        dns,
        vlan_set: vlan_set.map(str::to_owned),
        vlans,
        post: row.flag("post", false),
        connector: row.flag("connector", false),
        city: row.text("city").map(str::to_owned),
        country: row.text("country").map(str::to_owned),
        location_name: row
            .first_text(&["location_name", "zia_location_name"])
            .map(str::to_owned),
        vrrp_link_interface: row.text("vrrp_link_interface").map(clean_interface),
        vrrp_track_extra: row
            .list("vrrp_track_extra")
            .into_iter()
            .map(clean_interface)
            .collect(),
    };
    Some(site)
}

fn parse_gateways(row: &mut Row<'_>) -> Option<Gateways> {
    let primary = row.require("gateway_name");
    let secondary = row.text("gateway_name_b");

    let wan1_keys = ["wan1_ip", "wan1_mask", "wan1_gw"];
    let wan1_present = wan1_keys.iter().filter(|k| row.text(k).is_some()).count()
        + usize::from(row.first_text(WAN1_INTERFACE_KEYS).is_some());

    match secondary {
        None if wan1_present > 0 => {
            row.fail("WAN1 values present but gateway_name_b is empty");
        }
        Some(_) if wan1_present < wan1_keys.len() + 1 => {
            row.fail("HA site requires wan1_ip, wan1_mask, wan1_gw and wan1_interface_name");
        }
        _ => {}
    }

    let primary = primary?.to_owned();
    Some(match secondary {
        Some(secondary) => Gateways::Ha {
            primary,
            secondary: secondary.to_owned(),
        },
        None => Gateways::Standalone { name: primary },
    })
}

fn parse_uplink(
    row: &mut Row<'_>,
    prefix: &str,
    interface_keys: &[&str],
) -> Option<WanUplink> {
    let ip = row.require_ipv4(&format!("{prefix}_ip"));
    let gateway = row.require_ipv4(&format!("{prefix}_gw"));
    let mask_key = format!("{prefix}_mask");
    let mask = match row.require(&mask_key) {
        Some(text) => {
            let mask = parse_mask(text);
            if mask.is_none() {
                row.fail(format!("invalid {mask_key} '{text}'"));
            }
            mask
        }
        None => None,
    };

    let (ip, gateway, mask) = (ip?, gateway?, mask?);
    let prefix_len = ipnet::ipv4_mask_to_prefix(mask).ok()?;
    let net = Ipv4Net::new(ip, prefix_len).ok()?.trunc();
    if !net.contains(&gateway) {
        row.fail(format!("{prefix}_gw {gateway} is outside {net}"));
    }

    Some(WanUplink {
        interface: row.first_text(interface_keys).map(clean_interface),
        ip,
        mask,
        gateway,
    })
}

fn parse_wan(row: &mut Row<'_>) -> Vec<WanUplink> {
    let mut wan = Vec::new();
    wan.extend(parse_uplink(row, "wan0", WAN0_INTERFACE_KEYS));
    if row.text("gateway_name_b").is_some() {
        wan.extend(parse_uplink(row, "wan1", WAN1_INTERFACE_KEYS));
    }
    wan
}

fn parse_dhcp<F>(
    row: &mut Row<'_>,
    template: Option<&TemplateRef>,
    relay_hint: &F,
) -> (DhcpMode, Option<Ipv4Addr>)
where
    F: Fn(&TemplateRef) -> bool,
{
    let relay_ip = row.ipv4("dhcp_server_ip");
    let relay_given = row.text("dhcp_server_ip").is_some();

    let explicit = match row.text("dhcp_service_mode") {
        Some(text) => match text.parse::<DhcpMode>() {
            Ok(mode) => Some(mode),
            Err(_) => {
                row.fail(format!(
                    "invalid dhcp_service_mode '{text}' (expected inherit, server or relay)"
                ));
                None
            }
        },
        None => None,
    };

    let template_relays = template.is_some_and(relay_hint);
    let mode = match explicit {
        Some(mode) => mode,
        None if relay_given || template_relays => DhcpMode::Relay,
        None => DhcpMode::Inherit,
    };

    if mode == DhcpMode::Relay && !relay_given {
        row.fail("DHCP relay mode requires dhcp_server_ip");
    }

    (mode, relay_ip)
}

// ── VLAN parsing ────────────────────────────────────────────────────

fn parse_vlans(site_row: &mut Row<'_>, set: &str, rows: &[RawRow]) -> Vec<VlanRecord> {
    let mut vlans: Vec<VlanRecord> = Vec::new();
    let mut tags = HashSet::new();

    for (idx, raw) in rows.iter().enumerate() {
        let mut row = Row::new(raw);
        let vlan = parse_vlan(&mut row);

        if let Some(vlan) = &vlan {
            if !tags.insert(vlan.tag) {
                row.fail(format!("duplicate VLAN tag {}", vlan.tag));
            }
        }

        if row.errors.is_empty() {
            vlans.extend(vlan);
        } else {
            for message in row.errors {
                site_row.fail(format!("VLAN set '{set}' row {}: {message}", idx + 1));
            }
        }
    }

    vlans
}

fn parse_vlan(row: &mut Row<'_>) -> Option<VlanRecord> {
    let name = row.require("name");

    let tag = row.require("tag").and_then(|text| match text.parse::<u16>() {
        Ok(tag) if (1..=4094).contains(&tag) => Some(tag),
        _ => {
            row.fail(format!("tag '{text}' is not a VLAN id (1-4094)"));
            None
        }
    });

    let gateway = row.require_ipv4("default_gateway");
    let subnet = row.require("subnet").and_then(|text| {
        let net = if text.contains('/') {
            text.parse::<Ipv4Net>().ok()
        } else {
            // Bare prefix length, anchored on the gateway address.
            let prefix = text.parse::<u8>().ok();
            gateway.zip(prefix).and_then(|(gw, p)| Ipv4Net::new(gw, p).ok())
        };
        if net.is_none() {
            row.fail(format!("invalid subnet '{text}'"));
        }
        net.map(|n| n.trunc())
    });

    let dhcp_range = parse_dhcp_range(row);
    let interface = row.require("interface").map(str::to_owned);

    let (dhcp_service, dhcp_service_explicit) = match row.text("dhcp_service") {
        Some(text) => match DhcpService::parse_input(text) {
            Some(service) => (service, true),
            None => {
                row.fail(format!("invalid dhcp_service '{text}'"));
                (DhcpService::implied(dhcp_range.is_some()), false)
            }
        },
        None => (DhcpService::implied(dhcp_range.is_some()), false),
    };

    let (subnet, gateway) = (subnet?, gateway?);
    if !subnet.contains(&gateway) {
        row.fail(format!("default_gateway {gateway} is outside {subnet}"));
    }
    if let Some(range) = dhcp_range {
        if range.start > range.end {
            row.fail(format!("DHCP range {range} starts after it ends"));
        }
        if !subnet.contains(&range.start) || !subnet.contains(&range.end) {
            row.fail(format!("DHCP range {range} is outside {subnet}"));
        }
    }

    Some(VlanRecord {
        name: name?.to_owned(),
        tag: tag?,
        subnet,
        default_gateway: gateway,
        dhcp_range,
        interface: interface?,
        zone: row.text("zone").unwrap_or(DEFAULT_ZONE).to_owned(),
        enabled: row.flag("enabled", true),
        share_over_vpn: row.flag("share_over_vpn", false),
        dhcp_service,
        dhcp_service_explicit,
    })
}

fn parse_dhcp_range(row: &mut Row<'_>) -> Option<DhcpRange> {
    let (start, end) = match (row.text("dhcp_start"), row.text("dhcp_end")) {
        (Some(start), Some(end)) => (start, end),
        (None, None) => row.text("dhcp_range")?.split_once('-').or_else(|| {
            row.fail("dhcp_range must look like <start>-<end>");
            None
        })?,
        _ => {
            row.fail("dhcp_start and dhcp_end must be given together");
            return None;
        }
    };

    match (start.trim().parse(), end.trim().parse()) {
        (Ok(start), Ok(end)) => Some(DhcpRange { start, end }),
        _ => {
            row.fail(format!("invalid DHCP range '{start}-{end}'"));
            None
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
