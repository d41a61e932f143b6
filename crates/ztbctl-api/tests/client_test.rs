#![allow(clippy::unwrap_used)]
// Integration tests for `ZtbClient` using wiremock.

use futures_util::future::join_all;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ztbctl_api::{
    ClientConfig, Credentials, Error, Method, Transport, TransportConfig, ZtbClient, endpoints,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(credentials: Credentials) -> (MockServer, ZtbClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = ZtbClient::with_client(reqwest::Client::new(), base_url, &credentials);
    (server, client)
}

fn api_key() -> Credentials {
    Credentials::ApiKey {
        key: "k-123".to_string().into(),
    }
}

fn stale_bearer_with_key() -> Credentials {
    Credentials::BearerWithApiKey {
        token: "stale".to_string().into(),
        key: "k-123".to_string().into(),
    }
}

async fn mount_login(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(endpoints::LOGIN))
        .and(body_json(json!({ "api_key": "k-123" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "result": { "delegate_token": token, "expires_in": 3600 } })),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

// ── Request shape ───────────────────────────────────────────────────

#[tokio::test]
async fn test_call_sends_bearer_and_refresh_flag() {
    let (server, client) = setup(Credentials::Bearer {
        token: "tok".to_string().into(),
    })
    .await;

    Mock::given(method("GET"))
        .and(path("/api/v3/templates"))
        .and(query_param("refresh_token", "enabled"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client
        .call(Method::GET, endpoints::TEMPLATES, None)
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, json!({ "result": [] }));
}

#[tokio::test]
async fn test_origin_headers_from_config() {
    let server = MockServer::start().await;
    let client = ZtbClient::new(ClientConfig {
        base_url: format!("{}/api/v3/", server.uri()),
        credentials: Credentials::Bearer {
            token: "tok".to_string().into(),
        },
        transport: TransportConfig::default(),
    })
    .unwrap();

    Mock::given(method("POST"))
        .and(path("/api/v2/Network/"))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .and(header("origin", server.uri().as_str()))
        .and(body_json(json!({ "tag": "10" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "n-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client
        .call(Method::POST, endpoints::NETWORKS, Some(&json!({ "tag": "10" })))
        .await
        .unwrap();
    assert_eq!(resp.status, 201);
}

#[tokio::test]
async fn test_non_success_status_is_returned_not_raised() {
    let (server, client) = setup(Credentials::Bearer {
        token: "tok".to_string().into(),
    })
    .await;

    Mock::given(method("POST"))
        .and(path("/api/v3/templates/9/deploy_site"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Site already exists"))
        .mount(&server)
        .await;

    let resp = client
        .call(Method::POST, &endpoints::deploy_site("9"), Some(&json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status, 400);
    assert_eq!(resp.body, json!("Site already exists"));
    assert!(!resp.is_success());
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn test_api_key_logs_in_before_first_call() {
    let (server, client) = setup(api_key()).await;
    mount_login(&server, "fresh", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v3/templates"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    client.call(Method::GET, endpoints::TEMPLATES, None).await.unwrap();
    client.call(Method::GET, endpoints::TEMPLATES, None).await.unwrap();
    assert_eq!(client.tokens().generation().await, 1);
}

#[tokio::test]
async fn test_401_refreshes_and_retries_once() {
    let (server, client) = setup(stale_bearer_with_key()).await;
    mount_login(&server, "fresh", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v3/Gateway"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/Gateway"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rows": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client
        .call(Method::GET, &endpoints::gateway_search("Amsterdam"), None)
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn test_concurrent_401s_trigger_single_login() {
    let (server, client) = setup(stale_bearer_with_key()).await;
    mount_login(&server, "fresh", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/Network/"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/Network/"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(8)
        .mount(&server)
        .await;

    let calls = (0..8).map(|i| {
        let path = endpoints::site_networks(&i.to_string());
        let client = &client;
        async move { client.call(Method::GET, &path, None).await }
    });
    for result in join_all(calls).await {
        assert_eq!(result.unwrap().status, 200);
    }
    assert_eq!(client.tokens().generation().await, 1);
}

#[tokio::test]
async fn test_401_without_api_key_is_not_refreshable() {
    let (server, client) = setup(Credentials::Bearer {
        token: "stale".to_string().into(),
    })
    .await;

    Mock::given(method("GET"))
        .and(path("/api/v3/templates"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.call(Method::GET, endpoints::TEMPLATES, None).await;
    assert!(
        matches!(result, Err(Error::NotRefreshable)),
        "expected NotRefreshable, got: {result:?}"
    );
}

#[tokio::test]
async fn test_second_401_is_session_expired() {
    let (server, client) = setup(stale_bearer_with_key()).await;
    mount_login(&server, "also-rejected", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v3/templates"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let result = client.call(Method::GET, endpoints::TEMPLATES, None).await;
    assert!(
        matches!(result, Err(Error::SessionExpired)),
        "expected SessionExpired, got: {result:?}"
    );
}

#[tokio::test]
async fn test_login_failure_is_authentication_error() {
    let (server, client) = setup(api_key()).await;

    Mock::given(method("POST"))
        .and(path(endpoints::LOGIN))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let result = client.call(Method::GET, endpoints::TEMPLATES, None).await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}
