// Path builders for the management API.
//
// All paths are relative to the tenant root. The client appends
// `refresh_token=enabled` to every one of them.

use url::form_urlencoded;

pub const LOGIN: &str = "/api/v3/api-key-auth/login";
pub const TEMPLATES: &str = "/api/v3/templates";
pub const NETWORKS: &str = "/api/v2/Network/";
pub const SHARE_OVER_VPN: &str = "/api/v2/Network/share-over-vpn";
pub const APP_CONNECTOR: &str = "/api/v3/appconnector/config";

fn segment(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

fn with_query(path: &str, params: &[(&str, &str)]) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{path}?{query}")
}

/// POST target for creating a site from a template.
pub fn deploy_site(template_id: &str) -> String {
    format!("/api/v3/templates/{}/deploy_site", segment(template_id))
}

/// Gateway list filtered to one site, polled for readiness.
pub fn gateway_search(site_name: &str) -> String {
    with_query(
        "/api/v3/Gateway",
        &[
            ("gateway_type", "isolation"),
            ("sort", "location"),
            ("sortdir", "asc"),
            ("search", site_name),
            ("page", "0"),
            ("limit", "100"),
        ],
    )
}

/// Live interface inventory for every gateway in a site.
pub fn gateway_interfaces(site_id: &str) -> String {
    with_query("/api/v2/Gateway/interfaces", &[("siteID", site_id)])
}

/// VLANs currently defined for a site.
pub fn site_networks(site_id: &str) -> String {
    with_query(NETWORKS, &[("siteId", site_id)])
}

pub fn network_update(network_id: &str) -> String {
    format!("/api/v2/Network/update/{}", segment(network_id))
}

pub fn vrrp_config(cluster_id: u64) -> String {
    format!("/api/v3/vrrp/config/{cluster_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_search_encodes_site_name() {
        let path = gateway_search("Amsterdam Branch");
        assert!(path.starts_with("/api/v3/Gateway?gateway_type=isolation&"));
        assert!(path.contains("search=Amsterdam+Branch"));
        assert!(path.ends_with("&page=0&limit=100"));
    }

    #[test]
    fn resource_paths() {
        assert_eq!(deploy_site("42"), "/api/v3/templates/42/deploy_site");
        assert_eq!(network_update("n-7"), "/api/v2/Network/update/n-7");
        assert_eq!(vrrp_config(991), "/api/v3/vrrp/config/991");
        assert_eq!(site_networks("17"), "/api/v2/Network/?siteId=17");
        assert_eq!(gateway_interfaces("17"), "/api/v2/Gateway/interfaces?siteID=17");
    }
}
