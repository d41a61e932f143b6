// ── Payload rendering ──
//
// Turns validated records into the JSON documents the API accepts.
// Every function here is pure; the same inputs produce byte-identical
// output because `serde_json::Map` preserves insertion order.
//
// Site document layers, lowest to highest:
//   1. template baseline
//   2. identity (template_id, site_name, name)
//   3. values the site record sets; unset values keep the baseline

use serde_json::{Map, Value, json};

use crate::model::{DhcpMode, Gateways, SiteRecord, VlanRecord};
use crate::template::ResolvedTemplate;

/// Longest VLAN name the network API accepts.
const VLAN_NAME_MAX: usize = 16;
const AIRGAP_PLUS_MASK: u8 = 30;

// ── Site ────────────────────────────────────────────────────────────

pub fn render(site: &SiteRecord, template: &ResolvedTemplate) -> Value {
    let mut doc = template.baseline.clone();

    doc.insert("template_id".into(), json!(template.id));
    doc.insert("site_name".into(), json!(site.name));
    doc.insert("name".into(), json!(site.name));

    match &site.gateways {
        Gateways::Standalone { name } => {
            doc.insert("gateway_name".into(), json!(name));
            doc.insert("ha".into(), json!(false));
        }
        Gateways::Ha { primary, secondary } => {
            doc.insert("gateway_name".into(), json!(primary));
            doc.insert("gateway_name_b".into(), json!(secondary));
            doc.insert("ha".into(), json!(true));
        }
    }

    let gateway_names = site.gateways.names();
    let uplinks: Vec<Value> = site
        .wan
        .iter()
        .zip(gateway_names.iter().chain(gateway_names.last()))
        .map(|(uplink, gateway)| {
            let mut entry = Map::new();
            entry.insert("gateway".into(), json!(gateway));
            if let Some(interface) = &uplink.interface {
                entry.insert("interface".into(), json!(interface));
            }
            entry.insert("ip".into(), json!(uplink.ip.to_string()));
            entry.insert("netmask".into(), json!(uplink.mask.to_string()));
            entry.insert("default_gateway".into(), json!(uplink.gateway.to_string()));
            Value::Object(entry)
        })
        .collect();
    doc.insert("wan".into(), Value::Array(uplinks));

    if !site.dns.is_empty() {
        let dns: Vec<String> = site.dns.iter().map(ToString::to_string).collect();
        doc.insert("per_site_dns".into(), json!(dns));
    }

    match site.dhcp_mode {
        DhcpMode::Relay => {
            doc.insert("dhcp_service".into(), json!("relay"));
            if let Some(relay) = site.dhcp_relay {
                doc.insert("dhcp_server_ip".into(), json!(relay.to_string()));
            }
        }
        DhcpMode::Server => {
            doc.insert("dhcp_service".into(), json!("server"));
            doc.remove("dhcp_server_ip");
        }
        DhcpMode::Inherit => {}
    }

    let optional = [
        ("city", &site.city),
        ("country", &site.country),
        ("location_name", &site.location_name),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            doc.insert(key.into(), json!(value));
        }
    }

    Value::Object(doc)
}

// ── VLANs ───────────────────────────────────────────────────────────

/// Site-level values every VLAN document repeats.
#[derive(Debug, Clone)]
pub struct VlanContext<'a> {
    pub gateway_ids: &'a [String],
    pub cluster_id: u64,
    pub per_network_dns: String,
    pub ha: bool,
}

impl<'a> VlanContext<'a> {
    pub fn new(site: &SiteRecord, gateway_ids: &'a [String], cluster_id: u64) -> Self {
        Self {
            gateway_ids,
            cluster_id,
            per_network_dns: site.dns_list(),
            ha: site.is_ha(),
        }
    }
}

fn short_name(name: &str) -> String {
    name.trim().chars().take(VLAN_NAME_MAX).collect()
}

/// Subnet as the network API spells it: the prefix length alone.
fn subnet_bits(vlan: &VlanRecord) -> String {
    vlan.subnet.prefix_len().to_string()
}

/// `POST /api/v2/Network/` body.
pub fn render_vlan(vlan: &VlanRecord, ctx: &VlanContext<'_>) -> Value {
    let interface = if ctx.ha && !vlan.interface.contains(',') {
        format!("{0},{0}", vlan.interface)
    } else {
        vlan.interface.clone()
    };

    json!({
        "subnet": subnet_bits(vlan),
        "tag": vlan.tag.to_string(),
        "display_name": vlan.name,
        "ip_range": vlan.subnet.network().to_string(),
        "zone": vlan.zone,
        "per_network_dns": ctx.per_network_dns,
        "dns_forwarding": false,
        "dhcp_range": vlan.dhcp_range.map(|r| r.to_string()).unwrap_or_default(),
        "slash30_range": "",
        "airgap_plus_mask": AIRGAP_PLUS_MASK,
        "default_gateway": vlan.default_gateway.to_string(),
        "gateways": ctx.gateway_ids.join(","),
        "interface": interface,
        "name": short_name(&vlan.name),
        "cluster_id": ctx.cluster_id,
        "event_type": "addnetwork",
        "dhcp_service": vlan.dhcp_service.to_string(),
        "share_over_vpn": vlan.share_over_vpn,
    })
}

/// `PUT /api/v2/Network/update/{id}` body that provisions a VLAN.
pub fn render_enable(vlan: &VlanRecord, per_network_dns: &str) -> Value {
    json!({
        "name": vlan.name,
        "subnet": subnet_bits(vlan),
        "per_network_dns": per_network_dns,
        "status": "provisioned",
    })
}

/// `PATCH /api/v2/Network/share-over-vpn` body.
pub fn render_share_over_vpn(network_id: &str) -> Value {
    json!({ "id": network_id, "share_over_vpn": true })
}

/// `PUT /api/v2/Network/update/{id}` body that re-applies the DHCP mode.
pub fn render_dhcp_service(vlan: &VlanRecord, per_network_dns: &str) -> Value {
    json!({
        "name": vlan.name,
        "subnet": subnet_bits(vlan),
        "per_network_dns": per_network_dns,
        "dhcp_service": vlan.dhcp_service.to_string(),
    })
}

/// `POST /api/v3/appconnector/config` body.
pub fn render_connector(cluster_id: u64, site: &SiteRecord, provision_key: &str) -> Value {
    json!({
        "cluster_id": cluster_id,
        "name": site.name,
        "provision_key": provision_key,
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{DhcpRange, DhcpService, TemplateRef, WanUplink};

    fn site(gateways: Gateways) -> SiteRecord {
        SiteRecord {
            name: "Amsterdam".into(),
            template: TemplateRef::Name("ZT800".into()),
            gateways,
            wan: vec![WanUplink {
                interface: Some("ge3".into()),
                ip: Ipv4Addr::new(203, 0, 113, 10),
                mask: Ipv4Addr::new(255, 255, 255, 0),
                gateway: Ipv4Addr::new(203, 0, 113, 1),
            }],
            dhcp_mode: DhcpMode::Inherit,
            dhcp_relay: None,
            dns: vec!["9.9.9.9".parse().unwrap(), "1.1.1.1".parse().unwrap()],
            vlan_set: None,
            vlans: Vec::new(),
            post: true,
            connector: false,
            city: Some("Amsterdam".into()),
            country: None,
            location_name: None,
            vrrp_link_interface: None,
            vrrp_track_extra: Vec::new(),
        }
    }

    fn template() -> ResolvedTemplate {
        let mut baseline = Map::new();
        baseline.insert("timezone".into(), json!("UTC"));
        baseline.insert("country".into(), json!("NL"));
        baseline.insert("dhcp_server_ip".into(), json!("10.0.0.1"));
        ResolvedTemplate::bare("42", baseline)
    }

    fn vlan() -> VlanRecord {
        VlanRecord {
            name: "corporate-users-main".into(),
            tag: 10,
            subnet: "10.1.10.0/24".parse().unwrap(),
            default_gateway: Ipv4Addr::new(10, 1, 10, 1),
            dhcp_range: Some(DhcpRange {
                start: Ipv4Addr::new(10, 1, 10, 100),
                end: Ipv4Addr::new(10, 1, 10, 200),
            }),
            interface: "ge5".into(),
            zone: "LAN Zone".into(),
            enabled: true,
            share_over_vpn: false,
            dhcp_service: DhcpService::Inherit,
            dhcp_service_explicit: false,
        }
    }

    #[test]
    fn render_is_byte_identical_across_calls() {
        let site = site(Gateways::Standalone { name: "gw-a".into() });
        let a = serde_json::to_string(&render(&site, &template())).unwrap();
        let b = serde_json::to_string(&render(&site, &template())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn site_values_override_baseline_and_unset_values_keep_it() {
        let doc = render(&site(Gateways::Standalone { name: "gw-a".into() }), &template());
        assert_eq!(doc["template_id"], json!("42"));
        assert_eq!(doc["timezone"], json!("UTC"));
        assert_eq!(doc["country"], json!("NL"));
        assert_eq!(doc["city"], json!("Amsterdam"));
        assert_eq!(doc["per_site_dns"], json!(["9.9.9.9", "1.1.1.1"]));
        assert_eq!(doc["wan"][0]["gateway"], json!("gw-a"));
        assert_eq!(doc["wan"][0]["netmask"], json!("255.255.255.0"));

        let keys: Vec<&str> = doc.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(&keys[..4], &["timezone", "country", "dhcp_server_ip", "template_id"]);
    }

    #[test]
    fn dhcp_mode_controls_relay_fields() {
        let mut relay = site(Gateways::Standalone { name: "gw-a".into() });
        relay.dhcp_mode = DhcpMode::Relay;
        relay.dhcp_relay = Some(Ipv4Addr::new(10, 9, 9, 53));
        let doc = render(&relay, &template());
        assert_eq!(doc["dhcp_service"], json!("relay"));
        assert_eq!(doc["dhcp_server_ip"], json!("10.9.9.53"));

        let mut server = relay.clone();
        server.dhcp_mode = DhcpMode::Server;
        let doc = render(&server, &template());
        assert_eq!(doc["dhcp_service"], json!("server"));
        assert!(doc.get("dhcp_server_ip").is_none());
    }

    #[test]
    fn ha_uplinks_are_attributed_per_gateway() {
        let mut ha = site(Gateways::Ha {
            primary: "gw-a".into(),
            secondary: "gw-b".into(),
        });
        let mut second = ha.wan[0].clone();
        second.interface = Some("ge4".into());
        ha.wan.push(second);

        let doc = render(&ha, &template());
        assert_eq!(doc["ha"], json!(true));
        assert_eq!(doc["gateway_name_b"], json!("gw-b"));
        assert_eq!(doc["wan"][1]["gateway"], json!("gw-b"));
        assert_eq!(doc["wan"][1]["interface"], json!("ge4"));
    }

    #[test]
    fn vlan_document_for_ha_site() {
        let site = site(Gateways::Ha {
            primary: "gw-a".into(),
            secondary: "gw-b".into(),
        });
        let ids = vec!["uuid-a".to_owned(), "uuid-b".to_owned()];
        let ctx = VlanContext::new(&site, &ids, 991);
        let doc = render_vlan(&vlan(), &ctx);

        assert_eq!(doc["name"], json!("corporate-users-"));
        assert_eq!(doc["display_name"], json!("corporate-users-main"));
        assert_eq!(doc["interface"], json!("ge5,ge5"));
        assert_eq!(doc["gateways"], json!("uuid-a,uuid-b"));
        assert_eq!(doc["subnet"], json!("24"));
        assert_eq!(doc["ip_range"], json!("10.1.10.0"));
        assert_eq!(doc["dhcp_range"], json!("10.1.10.100-10.1.10.200"));
        assert_eq!(doc["per_network_dns"], json!("9.9.9.9,1.1.1.1"));
        assert_eq!(doc["cluster_id"], json!(991));
        assert_eq!(doc["tag"], json!("10"));
    }

    #[test]
    fn patch_documents() {
        let v = vlan();
        assert_eq!(render_enable(&v, "")["status"], json!("provisioned"));
        assert_eq!(
            render_share_over_vpn("n-1"),
            json!({ "id": "n-1", "share_over_vpn": true })
        );
        assert_eq!(render_dhcp_service(&v, "")["dhcp_service"], json!("inherit"));
    }
}
