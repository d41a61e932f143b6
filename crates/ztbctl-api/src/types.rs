// Wire shapes returned by the management API.
//
// The backend is inconsistent about envelopes: the same list may come
// back bare, under `rows`, under `result`, or under `result.rows`, and
// identifiers are sometimes strings and sometimes numbers. These helpers
// normalize that once so callers can work with typed values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Envelope helpers ────────────────────────────────────────────────

/// Locate the row list inside any of the envelope shapes the API uses.
pub fn rows(body: &Value) -> &[Value] {
    if let Some(list) = body.as_array() {
        return list;
    }
    let candidates = [
        body.get("rows"),
        body.get("result"),
        body.get("result").and_then(|r| r.get("rows")),
        body.get("data"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Read an identifier that may be encoded as a string or a number.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a numeric identifier that may be encoded as a string.
pub fn id_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn first_field<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn str_field(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}

// ── Templates ───────────────────────────────────────────────────────

/// One entry of `GET /api/v3/templates`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub deployment_type: Option<String>,
    pub platform_type: Option<String>,
    /// The full catalog row, for fields only some tenants expose.
    #[serde(skip)]
    pub raw: Value,
}

impl TemplateSummary {
    pub fn from_row(row: &Value) -> Option<Self> {
        let id = row.get("id").and_then(id_string)?;
        let name = str_field(row, &["name"])?;
        Some(Self {
            id,
            name,
            deployment_type: str_field(row, &["deployment_type", "deploymentType"]),
            platform_type: str_field(row, &["platform_type", "platformType"]),
            raw: row.clone(),
        })
    }

    pub fn list(body: &Value) -> Vec<Self> {
        rows(body).iter().filter_map(Self::from_row).collect()
    }
}

// ── Site status (gateway list) ──────────────────────────────────────

/// Text that may arrive as a string, a number, or a list of either.
fn text_field(obj: &Value, keys: &[&str]) -> Option<String> {
    let value = first_field(obj, keys)?;
    match value {
        Value::Array(items) => {
            let joined = items.iter().filter_map(id_string).collect::<Vec<_>>().join(",");
            (!joined.is_empty()).then_some(joined)
        }
        other => id_string(other),
    }
}

/// One gateway of a site row, with its WAN addressing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GatewayStatus {
    pub gateway_id: Option<String>,
    pub name: Option<String>,
    pub wan_ip: Option<String>,
    pub wan_mask: Option<String>,
    pub wan_gw: Option<String>,
    pub wan_interface: Option<String>,
}

impl GatewayStatus {
    pub fn from_row(row: &Value) -> Self {
        Self {
            gateway_id: row.get("gateway_id").and_then(id_string),
            name: str_field(row, &["gateway_name", "name"]),
            wan_ip: text_field(row, &["wan_ip_address"]),
            wan_mask: text_field(row, &["wan_subnet_mask"]),
            wan_gw: text_field(row, &["default_gw_ip"]),
            wan_interface: str_field(row, &["wan_interface"]),
        }
    }
}

/// One row of the `GET /api/v3/Gateway` site listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SiteStatus {
    pub display_name: String,
    pub site_id: Option<String>,
    pub cluster_id: Option<u64>,
    pub gateway_ids: Vec<String>,
    pub gateways: Vec<GatewayStatus>,
    pub template_name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub location_name: Option<String>,
    pub dhcp_server_ip: Option<String>,
    pub dns: Option<String>,
}

impl SiteStatus {
    pub fn from_row(row: &Value) -> Self {
        let cluster_info = row.get("cluster_info").cloned().unwrap_or(Value::Null);
        let mut gateways: Vec<GatewayStatus> = row
            .get("gateways")
            .or_else(|| cluster_info.get("gateways"))
            .and_then(Value::as_array)
            .map(|gws| gws.iter().map(GatewayStatus::from_row).collect())
            .unwrap_or_default();
        if let Some(first) = gateways.first_mut() {
            if let Some(name) = str_field(row, &["gateway_name"]) {
                first.name = Some(name);
            }
        }
        let gateway_ids = gateways.iter().filter_map(|g| g.gateway_id.clone()).collect();

        // `location` is either the display name or an address object.
        let location = row.get("location").filter(|l| l.is_object());
        let address = |key: &str| {
            location
                .and_then(|l| str_field(l, &[key]))
                .or_else(|| str_field(row, &[key]))
        };

        let display_name =
            str_field(row, &["location_display_name", "site_name", "location"]).unwrap_or_default();
        Self {
            site_id: first_field(&cluster_info, &["site_id"])
                .or_else(|| first_field(row, &["site_id", "id"]))
                .and_then(id_string),
            cluster_id: cluster_info.get("cluster_id").and_then(id_u64),
            gateway_ids,
            gateways,
            template_name: str_field(row, &["template_name"])
                .or_else(|| str_field(&cluster_info, &["template_name"])),
            city: address("city"),
            country: address("country"),
            location_name: str_field(row, &["zia_location_name"]),
            dhcp_server_ip: text_field(&cluster_info, &["dhcp_server_ip"])
                .or_else(|| text_field(row, &["dhcp_server_ip"])),
            dns: text_field(&cluster_info, &["per_site_dns"])
                .or_else(|| text_field(row, &["per_site_dns"])),
            display_name,
        }
    }

    pub fn list(body: &Value) -> Vec<Self> {
        rows(body).iter().map(Self::from_row).collect()
    }

    /// Find the row for `site_name` (case-insensitive) in a gateway listing.
    pub fn find(body: &Value, site_name: &str) -> Option<Self> {
        let wanted = site_name.trim().to_lowercase();
        rows(body)
            .iter()
            .map(Self::from_row)
            .find(|s| s.display_name.to_lowercase() == wanted)
    }
}

/// Pull a cluster id out of a site-creation response, if present.
pub fn cluster_id_hint(body: &Value) -> Option<u64> {
    let keys = ["cluster_id", "clusterId"];
    first_field(body, &keys)
        .or_else(|| body.get("result").and_then(|r| first_field(r, &keys)))
        .or_else(|| body.get("data").and_then(|r| first_field(r, &keys)))
        .and_then(id_u64)
}

/// Pull a site id out of a site-creation response, if present.
pub fn site_id_hint(body: &Value) -> Option<String> {
    let keys = ["site_id", "siteId"];
    first_field(body, &keys)
        .or_else(|| body.get("result").and_then(|r| first_field(r, &keys)))
        .or_else(|| body.get("data").and_then(|r| first_field(r, &keys)))
        .and_then(id_string)
}

// ── Gateway interfaces ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InterfaceEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub interface_type: String,
}

/// One gateway in `GET /api/v2/Gateway/interfaces`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GatewayInterfaces {
    pub gateway_id: String,
    #[serde(default)]
    pub gateway_name: String,
    #[serde(default)]
    pub interfaces: Vec<InterfaceEntry>,
}

impl GatewayInterfaces {
    pub fn list(body: &Value) -> Vec<Self> {
        rows(body)
            .iter()
            .filter_map(|row| serde_json::from_value(row.clone()).ok())
            .collect()
    }
}

// ── Networks (VLANs) ────────────────────────────────────────────────

/// A VLAN as listed by `GET /api/v2/Network/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
    pub tag: String,
    pub interface: String,
    pub default_gateway: String,
    pub subnet: String,
    pub zone: String,
    pub status: String,
    pub share_over_vpn: bool,
    pub dhcp_service: Option<String>,
    /// First DHCP pool, from `range_list` or a `start-end` string.
    pub dhcp_range: Option<(String, String)>,
}

fn dhcp_pool(row: &Value) -> Option<(String, String)> {
    if let Some(first) = row
        .get("range_list")
        .and_then(Value::as_array)
        .and_then(|ranges| ranges.first())
        .and_then(Value::as_array)
    {
        if let [start, end] = first.as_slice() {
            let start = start.as_str().unwrap_or_default().trim().to_owned();
            let end = end.as_str().unwrap_or_default().trim().to_owned();
            return Some((start, end));
        }
    }
    let (start, end) = str_field(row, &["dhcp_range"])?
        .split_once('-')
        .map(|(a, b)| (a.trim().to_owned(), b.trim().to_owned()))?;
    Some((start, end))
}

impl NetworkSummary {
    pub fn from_row(row: &Value) -> Option<Self> {
        Some(Self {
            id: row.get("id").and_then(id_string)?,
            name: str_field(row, &["display_name", "name"]).unwrap_or_default(),
            tag: row.get("tag").and_then(id_string).unwrap_or_default(),
            interface: str_field(row, &["interface"]).unwrap_or_default(),
            default_gateway: str_field(row, &["default_gateway", "start_ip"]).unwrap_or_default(),
            subnet: text_field(row, &["subnet"]).unwrap_or_default(),
            zone: str_field(row, &["zone"]).unwrap_or_default(),
            status: str_field(row, &["status"]).unwrap_or_default(),
            share_over_vpn: row
                .get("share_over_vpn")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            dhcp_service: str_field(row, &["dhcp_service"]),
            dhcp_range: dhcp_pool(row),
        })
    }

    pub fn list(body: &Value) -> Vec<Self> {
        rows(body).iter().filter_map(Self::from_row).collect()
    }

    pub fn is_provisioned(&self) -> bool {
        self.status.eq_ignore_ascii_case("provisioned")
    }
}

/// Pull a created resource id out of a POST response.
pub fn created_id(body: &Value) -> Option<String> {
    body.get("id")
        .or_else(|| body.get("result").and_then(|r| r.get("id")))
        .or_else(|| body.get("data").and_then(|r| r.get("id")))
        .and_then(id_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rows_accepts_every_envelope() {
        let item = json!({ "id": 1, "name": "a" });
        for body in [
            json!([item]),
            json!({ "rows": [item] }),
            json!({ "result": [item] }),
            json!({ "result": { "rows": [item] } }),
        ] {
            assert_eq!(rows(&body).len(), 1, "{body}");
        }
        assert!(rows(&json!({ "result": "nope" })).is_empty());
    }

    #[test]
    fn site_status_reads_nested_identifiers() {
        let body = json!({
            "result": { "rows": [
                { "location_display_name": "Other", "gateways": [] },
                {
                    "location_display_name": "Amsterdam",
                    "gateways": [ { "gateway_id": "gw-a" }, { "gateway_id": "gw-b" } ],
                    "cluster_info": { "cluster_id": "991", "site_id": 17 }
                }
            ]}
        });
        let status = SiteStatus::find(&body, "amsterdam").unwrap();
        assert_eq!(status.gateway_ids, vec!["gw-a", "gw-b"]);
        assert_eq!(status.cluster_id, Some(991));
        assert_eq!(status.site_id.as_deref(), Some("17"));
        assert!(SiteStatus::find(&body, "Utrecht").is_none());
    }

    #[test]
    fn cluster_hint_in_any_position() {
        assert_eq!(cluster_id_hint(&json!({ "cluster_id": 5 })), Some(5));
        assert_eq!(cluster_id_hint(&json!({ "result": { "clusterId": "6" } })), Some(6));
        assert_eq!(cluster_id_hint(&json!({ "data": { "cluster_id": 7 } })), Some(7));
        assert_eq!(cluster_id_hint(&json!({ "ok": true })), None);
    }

    #[test]
    fn gateway_interfaces_parse() {
        let body = json!([
            { "gateway_id": "gw-a", "gateway_name": "ams-a", "interfaces": [
                { "name": "ge7", "interface_type": "ha" },
                { "name": "ge1", "interface_type": "management" }
            ]}
        ]);
        let list = GatewayInterfaces::list(&body);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].interfaces[0].interface_type, "ha");
    }

    #[test]
    fn site_status_reads_gateway_wan_and_location() {
        let row = json!({
            "location_display_name": "Utrecht-Branch",
            "gateway_name": "utr-a",
            "template_name": "ZT800 HA",
            "zia_location_name": "UTR",
            "location": { "city": "Utrecht", "country": "NL" },
            "cluster_info": {
                "site_id": 31,
                "per_site_dns": ["1.1.1.1", "8.8.8.8"],
                "gateways": [
                    { "gateway_id": "g-1", "gateway_name": "ignored", "wan_ip_address": "203.0.113.10",
                      "wan_subnet_mask": "255.255.255.0", "default_gw_ip": "203.0.113.1",
                      "wan_interface": "ge3" },
                    { "gateway_id": "g-2", "gateway_name": "utr-b", "wan_ip_address": "203.0.113.11",
                      "wan_subnet_mask": 24, "default_gw_ip": "203.0.113.1" }
                ]
            }
        });
        let status = SiteStatus::from_row(&row);
        assert_eq!(status.gateway_ids, vec!["g-1", "g-2"]);
        assert_eq!(status.gateways[0].name.as_deref(), Some("utr-a"));
        assert_eq!(status.gateways[0].wan_interface.as_deref(), Some("ge3"));
        assert_eq!(status.gateways[1].wan_mask.as_deref(), Some("24"));
        assert_eq!(status.city.as_deref(), Some("Utrecht"));
        assert_eq!(status.country.as_deref(), Some("NL"));
        assert_eq!(status.dns.as_deref(), Some("1.1.1.1,8.8.8.8"));
        assert_eq!(status.template_name.as_deref(), Some("ZT800 HA"));
        assert_eq!(status.location_name.as_deref(), Some("UTR"));
    }

    #[test]
    fn network_summary_reads_pool_and_status() {
        let listed = json!({
            "id": "n-1", "name": "users", "tag": 10, "subnet": "10.0.10.0/24",
            "zone": "LAN Zone", "status": "Provisioned", "share_over_vpn": true,
            "dhcp_service": "inherit", "range_list": [["10.0.10.100", "10.0.10.200"]]
        });
        let net = NetworkSummary::from_row(&listed).unwrap();
        assert!(net.is_provisioned());
        assert!(net.share_over_vpn);
        assert_eq!(
            net.dhcp_range,
            Some(("10.0.10.100".to_owned(), "10.0.10.200".to_owned()))
        );

        let dashed = json!({ "id": 2, "dhcp_range": "10.0.20.10 - 10.0.20.20" });
        let net = NetworkSummary::from_row(&dashed).unwrap();
        assert_eq!(net.dhcp_range.as_ref().unwrap().1, "10.0.20.20");
        assert!(!net.is_provisioned());
    }

    #[test]
    fn network_summary_uses_display_name() {
        let row = json!({ "id": 44, "display_name": "Users", "name": "users", "tag": 10 });
        let net = NetworkSummary::from_row(&row).unwrap();
        assert_eq!(net.id, "44");
        assert_eq!(net.name, "Users");
        assert_eq!(net.tag, "10");
    }
}
