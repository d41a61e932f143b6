#![allow(clippy::unwrap_used)]
// Workflow tests for `Orchestrator` and `Runner` against a wiremock API.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ztbctl_api::{Credentials, ZtbClient};
use ztbctl_core::{
    CoreError, DhcpMode, DhcpService, Gateways, OrchestratorConfig, Orchestrator, Phase,
    PollPolicy, RetryPolicy, Runner, SiteRecord, StaticKey, TemplateRef, TemplateResolver,
    VlanRecord, WanUplink,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, Arc<ZtbClient>) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let credentials = Credentials::Bearer {
        token: "tok".to_string().into(),
    };
    let client = ZtbClient::with_client(reqwest::Client::new(), base_url, &credentials);
    (server, Arc::new(client))
}

fn fast_config(poll_attempts: u32) -> OrchestratorConfig {
    OrchestratorConfig {
        poll: PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts: poll_attempts,
        },
        retry: RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
        dry_run: false,
        discover_interfaces: true,
    }
}

fn uplink(interface: &str) -> WanUplink {
    WanUplink {
        interface: Some(interface.into()),
        ip: Ipv4Addr::new(203, 0, 113, 10),
        mask: Ipv4Addr::new(255, 255, 255, 0),
        gateway: Ipv4Addr::new(203, 0, 113, 1),
    }
}

fn vlan(name: &str, tag: u16, interface: &str) -> VlanRecord {
    let octet = u8::try_from(tag).unwrap();
    VlanRecord {
        name: name.into(),
        tag,
        subnet: format!("10.0.{octet}.0/24").parse().unwrap(),
        default_gateway: Ipv4Addr::new(10, 0, octet, 1),
        dhcp_range: None,
        interface: interface.into(),
        zone: "LAN Zone".into(),
        enabled: true,
        share_over_vpn: false,
        dhcp_service: DhcpService::NoDhcp,
        dhcp_service_explicit: false,
    }
}

fn standalone(name: &str, vlans: Vec<VlanRecord>) -> SiteRecord {
    SiteRecord {
        name: name.into(),
        template: TemplateRef::Name("Branch".into()),
        gateways: Gateways::Standalone {
            name: format!("{}-gw", name.to_lowercase()),
        },
        wan: vec![uplink("ge3")],
        dhcp_mode: DhcpMode::Inherit,
        dhcp_relay: None,
        dns: Vec::new(),
        vlan_set: Some("branch".into()),
        vlans,
        post: true,
        connector: false,
        city: None,
        country: None,
        location_name: None,
        vrrp_link_interface: None,
        vrrp_track_extra: Vec::new(),
    }
}

async fn mount_catalog(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/api/v3/templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [
                { "id": 7, "name": "Branch", "deployment_type": "standalone" },
                { "id": 8, "name": "Branch HA", "deployment_type": "HA" },
                { "id": 9, "name": "Relay Branch", "dhcp_service": "relay" }
            ]
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_deploy(server: &MockServer, template_id: u32, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(format!("/api/v3/templates/{template_id}/deploy_site")))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

fn gateway_row(site: &str, gateway_ids: &[&str], cluster_id: Option<u64>) -> Value {
    json!({
        "location_display_name": site,
        "cluster_info": { "cluster_id": cluster_id, "site_id": "s-9" },
        "gateways": gateway_ids.iter().map(|id| json!({ "gateway_id": id })).collect::<Vec<_>>()
    })
}

async fn mount_ready(server: &MockServer, site: &str, gateway_ids: &[&str], cluster_id: u64) {
    Mock::given(method("GET"))
        .and(path("/api/v3/Gateway"))
        .and(query_param("search", site))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "rows": [gateway_row(site, gateway_ids, Some(cluster_id))] }
        })))
        .mount(server)
        .await;
}

// ── Create ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_duplicate_site_rerun_reaches_enable() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;
    mount_deploy(
        &server,
        7,
        ResponseTemplate::new(409).set_body_json(json!({ "message": "Site already exists" })),
    )
    .await;
    mount_ready(&server, "Lisbon", &["g-1"], 55).await;

    Mock::given(method("POST"))
        .and(path("/api/v2/Network/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "n-10" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v2/Network/update/n-10"))
        .and(body_partial_json(json!({ "status": "provisioned" })))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = Orchestrator::new(client, fast_config(3), CancellationToken::new());
    let session = orchestrator
        .provision(&standalone("Lisbon", vec![vlan("users", 10, "ge5")]))
        .await;

    assert_eq!(session.phase, Phase::Done, "{:?}", session.failure);
    assert_eq!(session.warnings.len(), 1);
    assert!(session.errors.is_empty(), "{:?}", session.errors);
    assert_eq!(session.cluster_id, Some(55));
    assert_eq!(session.gateway_ids, vec!["g-1"]);
    assert_eq!(session.vlan_ids.get(&10).map(String::as_str), Some("n-10"));
}

#[tokio::test]
async fn test_rerun_adopts_existing_vlan_ids() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;
    mount_deploy(
        &server,
        7,
        ResponseTemplate::new(409).set_body_json(json!({ "message": "Site already exists" })),
    )
    .await;
    mount_ready(&server, "Lisbon", &["g-1"], 55).await;

    Mock::given(method("POST"))
        .and(path("/api/v2/Network/"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "message": "VLAN tag 10 already exists" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/Network/"))
        .and(query_param("siteId", "s-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "n-10", "display_name": "users", "tag": 10 }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v2/Network/update/n-10"))
        .and(body_partial_json(json!({ "status": "provisioned" })))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "already provisioned" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/Network/share-over-vpn"))
        .and(body_partial_json(json!({ "id": "n-10" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut users = vlan("users", 10, "ge5");
    users.share_over_vpn = true;
    let orchestrator = Orchestrator::new(client, fast_config(3), CancellationToken::new());
    let session = orchestrator.provision(&standalone("Lisbon", vec![users])).await;

    assert_eq!(session.phase, Phase::Done, "{:?}", session.failure);
    assert_eq!(session.vlan_ids.get(&10).map(String::as_str), Some("n-10"));
    assert_eq!(session.errors.len(), 1, "{:?}", session.errors);
    assert!(session.errors[0].message.contains("already exists"));
}

#[tokio::test]
async fn test_relay_template_without_relay_ip_fails_before_create() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let mut site = standalone("Porto", Vec::new());
    site.template = TemplateRef::Name("Relay Branch".into());

    let orchestrator = Orchestrator::new(client, fast_config(3), CancellationToken::new());
    let session = orchestrator.provision(&site).await;

    assert_eq!(session.phase, Phase::Failed);
    assert_eq!(session.failed_in, Some(Phase::Creating));
    assert!(session.failure.unwrap().contains("relay"));
}

// ── Readiness ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_poll_ceiling_is_hit_exactly() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;
    mount_deploy(&server, 7, ResponseTemplate::new(201)).await;

    Mock::given(method("GET"))
        .and(path("/api/v3/Gateway"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "rows": [gateway_row("Faro", &[], None)] }
        })))
        .expect(4)
        .mount(&server)
        .await;

    let orchestrator = Orchestrator::new(client, fast_config(4), CancellationToken::new());
    let session = orchestrator.provision(&standalone("Faro", Vec::new())).await;

    assert_eq!(session.phase, Phase::Failed);
    assert_eq!(session.failed_in, Some(Phase::AwaitingReady));
    assert_eq!(session.attempts_in(Phase::AwaitingReady), 4);
    let failure = session.failure.unwrap();
    assert!(failure.contains("after 4 polls"), "{failure}");
}

#[tokio::test]
async fn test_ha_site_waits_for_both_gateways() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;
    mount_deploy(&server, 8, ResponseTemplate::new(201)).await;
    Mock::given(method("GET"))
        .and(path("/api/v3/Gateway"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "rows": [gateway_row("Delft", &["g-1"], Some(80))] }
        })))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/Network/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut site = standalone("Delft", vec![vlan("users", 10, "ge5")]);
    site.template = TemplateRef::Name("Branch HA".into());
    site.gateways = Gateways::Ha {
        primary: "dft-a".into(),
        secondary: "dft-b".into(),
    };
    site.wan = vec![uplink("ge3"), uplink("ge4")];

    let orchestrator = Orchestrator::new(client, fast_config(3), CancellationToken::new());
    let session = orchestrator.provision(&site).await;

    assert_eq!(session.failed_in, Some(Phase::AwaitingReady));
    assert!(session.gateway_ids.is_empty());
    let failure = session.failure.unwrap();
    assert!(failure.contains("1 of 2 gateway id(s)"), "{failure}");
}

#[tokio::test]
async fn test_cancellation_aborts_poll_promptly() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;
    mount_deploy(&server, 7, ResponseTemplate::new(201)).await;
    Mock::given(method("GET"))
        .and(path("/api/v3/Gateway"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
        .mount(&server)
        .await;

    let mut config = fast_config(12);
    config.poll.interval = Duration::from_secs(60);
    let cancel = CancellationToken::new();
    let orchestrator = Orchestrator::new(client, config, cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let site = standalone("Braga", Vec::new());
    let session = tokio::time::timeout(Duration::from_secs(5), orchestrator.provision(&site))
        .await
        .expect("cancellation should end the poll well before the interval");

    assert_eq!(session.failed_in, Some(Phase::AwaitingReady));
    assert_eq!(session.failure, Some(CoreError::Cancelled.to_string()));
}

// ── VLANs ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_vlan_failure_does_not_abort_siblings() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;
    mount_deploy(&server, 7, ResponseTemplate::new(201)).await;
    mount_ready(&server, "Coimbra", &["g-1"], 12).await;

    Mock::given(method("POST"))
        .and(path("/api/v2/Network/"))
        .and(body_partial_json(json!({ "tag": "10" })))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "tag already in use" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/Network/"))
        .and(body_partial_json(json!({ "tag": "20" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "result": { "id": 2020 } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v2/Network/update/2020"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/Network/"))
        .and(query_param("siteId", "s-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut guest = vlan("guest", 20, "ge6");
    guest.share_over_vpn = true;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/Network/share-over-vpn"))
        .and(body_partial_json(json!({ "id": "2020", "share_over_vpn": true })))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let site = standalone("Coimbra", vec![vlan("users", 10, "ge5"), guest]);
    let orchestrator = Orchestrator::new(client, fast_config(3), CancellationToken::new());
    let session = orchestrator.provision(&site).await;

    assert_eq!(session.phase, Phase::Done);
    assert_eq!(session.vlan_ids.len(), 1);
    assert_eq!(session.errors.len(), 2, "{:?}", session.errors);
    assert!(session.errors[0].resource.contains("vlan 10"));
    assert!(session.errors[1].resource.contains("share-over-vpn"));
}

// ── HA ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ha_site_applies_vrrp_from_live_interfaces() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;
    mount_deploy(&server, 8, ResponseTemplate::new(202)).await;
    mount_ready(&server, "Amsterdam", &["g-1", "g-2"], 77).await;

    Mock::given(method("POST"))
        .and(path("/api/v2/Network/"))
        .and(body_partial_json(json!({ "tag": "10", "interface": "ge5,ge5", "gateways": "g-1,g-2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "n-10" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/Network/"))
        .and(body_partial_json(json!({ "tag": "20" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/Network/"))
        .and(query_param("siteId", "s-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "n-20", "name": "guest", "tag": 20 }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let interfaces = json!([
        { "name": "ge7", "interface_type": "ha" },
        { "name": "ge1", "interface_type": "management" },
        { "name": "ge3", "interface_type": "wan" },
        { "name": "ge4", "interface_type": "wan" },
        { "name": "ge5", "interface_type": "lan" },
        { "name": "ge6", "interface_type": "lan" }
    ]);
    Mock::given(method("GET"))
        .and(path("/api/v2/Gateway/interfaces"))
        .and(query_param("siteID", "s-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [
            { "gateway_id": "g-1", "interfaces": interfaces },
            { "gateway_id": "g-2", "interfaces": interfaces }
        ] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/vrrp/config/77"))
        .and(body_partial_json(json!({
            "virtual_router_id": "16",
            "track_interface": { "g-1": "ge3,ge4,ge5,ge6", "g-2": "ge3,ge4,ge5,ge6" },
            "vrrp_interface": { "g-1": "ge7", "g-2": "ge7" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut site = standalone("Amsterdam", vec![vlan("users", 10, "ge5"), vlan("guest", 20, "ge6")]);
    site.template = TemplateRef::Name("branch ha".into());
    site.gateways = Gateways::Ha {
        primary: "ams-a".into(),
        secondary: "ams-b".into(),
    };
    site.wan = vec![uplink("ge3"), uplink("ge4")];

    let orchestrator = Orchestrator::new(client, fast_config(3), CancellationToken::new());
    let session = orchestrator.provision(&site).await;

    assert_eq!(session.phase, Phase::Done, "{:?}", session.failure);
    assert!(session.errors.is_empty(), "{:?}", session.errors);
    assert_eq!(session.vlan_ids.get(&20).map(String::as_str), Some("n-20"));
    assert_eq!(session.attempts_in(Phase::ApplyingVrrp), 2);
}

#[tokio::test]
async fn test_ha_site_without_link_fails_in_vrrp() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;
    mount_deploy(&server, 8, ResponseTemplate::new(201)).await;
    mount_ready(&server, "Utrecht", &["g-1", "g-2"], 78).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/Gateway/interfaces"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/vrrp/config/78"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut site = standalone("Utrecht", Vec::new());
    site.template = TemplateRef::Id("8".into());
    site.gateways = Gateways::Ha {
        primary: "utr-a".into(),
        secondary: "utr-b".into(),
    };

    let orchestrator = Orchestrator::new(client, fast_config(3), CancellationToken::new());
    let session = orchestrator.provision(&site).await;

    assert_eq!(session.failed_in, Some(Phase::ApplyingVrrp));
    assert_eq!(session.warnings.len(), 1, "{:?}", session.warnings);
    assert!(session.failure.as_ref().unwrap().contains("No HA link"));
    // the 503 on discovery was retried once
    assert_eq!(session.attempts_in(Phase::ApplyingVrrp), 2);
}

// ── Dry-run ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_standalone_dry_run_sends_nothing_mutating() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;

    let mut config = fast_config(3);
    config.dry_run = true;
    let mut site = standalone("Evora", vec![vlan("users", 10, "ge5"), vlan("guest", 20, "ge6")]);
    site.connector = true;

    let orchestrator = Orchestrator::new(client, config, CancellationToken::new())
        .with_connector(Arc::new(StaticKey("never-used".into())));
    let session = orchestrator.provision(&site).await;

    assert_eq!(session.phase, Phase::Done, "{:?}", session.failure);
    assert!(!session.visited(Phase::ApplyingVrrp));
    assert!(!session.visited(Phase::AwaitingReady));
    assert_eq!(session.vlan_ids.get(&10).map(String::as_str), Some("dry-run-10"));

    let paths: Vec<&str> = session.documents.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "/api/v3/templates/7/deploy_site",
            "/api/v2/Network/",
            "/api/v2/Network/",
            "/api/v2/Network/update/dry-run-10",
            "/api/v2/Network/update/dry-run-20",
            "/api/v3/appconnector/config",
        ]
    );
    assert_eq!(session.documents[1].body["gateways"], json!("evora-gw"));
    assert_eq!(session.documents[1].body["cluster_id"], json!(0));
    assert_eq!(session.documents[5].body["provision_key"], json!("<provision-key>"));

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.as_str() == "GET"));
}

// ── Shared state ────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_catalog_fetch_under_concurrent_resolves() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;

    let resolver = TemplateResolver::new(client);
    let names = ["Branch", "branch", "Branch HA", "BRANCH HA", "Relay Branch", "Branch"];
    let results = join_all(names.iter().map(|n| {
        let reference = TemplateRef::Name((*n).to_string());
        let resolver = &resolver;
        async move { resolver.resolve(&reference).await }
    }))
    .await;

    let ids: Vec<String> = results.into_iter().map(|r| r.unwrap().id).collect();
    assert_eq!(ids, vec!["7", "7", "8", "8", "9", "7"]);
}

#[tokio::test]
async fn test_unknown_template_lists_available_names() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;

    let resolver = TemplateResolver::new(client);
    let err = resolver
        .resolve(&TemplateRef::Name("Campus".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::TemplateNotFound { .. }));
    assert!(err.to_string().contains("Branch, Branch HA, Relay Branch"));
}

#[tokio::test]
async fn test_runner_sorts_and_skips_unposted_sites() {
    let (server, client) = setup().await;
    mount_catalog(&server, 1).await;

    let mut config = fast_config(3);
    config.dry_run = true;
    let mut hidden = standalone("Aveiro", Vec::new());
    hidden.post = false;
    let sites = vec![
        standalone("zagreb", Vec::new()),
        hidden,
        standalone("Bern", Vec::new()),
    ];

    let orchestrator = Orchestrator::new(client, config, CancellationToken::new());
    let summary = Runner::new(orchestrator, 4).run(&sites).await;

    let names: Vec<&str> = summary.sites.iter().map(|s| s.site.as_str()).collect();
    assert_eq!(names, vec!["Bern", "zagreb"]);
    assert!(summary.is_success());
    assert_eq!(summary.documents().count(), 2);
}
