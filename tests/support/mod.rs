//! Shared fixtures for the integration tests: a wiremock stand-in for a
//! remote federated host, and an app wired to talk to it over plain HTTP.
#![allow(dead_code)]

use std::sync::Arc;

use fedlogin::client::HostClient;
use fedlogin::config::{Protocol, SiteConfig};
use fedlogin::store::MemoryStore;
use fedlogin::web::AppState;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SITE_HOSTNAME: &str = "social.example";

/// Hostname (with port) under which the mock server is addressable.
pub fn remote_hostname(server: &MockServer) -> String {
    server
        .uri()
        .trim_start_matches("http://")
        .to_string()
}

pub fn site_config() -> SiteConfig {
    SiteConfig::new(SITE_HOSTNAME)
        .with_name("Test widget")
        .with_session_secret("test-secret")
}

pub fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// A host client pointed at mock servers over plain HTTP.
pub fn host_client(store: &Arc<MemoryStore>) -> Arc<HostClient> {
    Arc::new(
        HostClient::new(
            site_config(),
            store.clone(),
            store.clone(),
            store.clone(),
        )
        .with_remote_protocol(Protocol::Http),
    )
}

pub fn app_state(store: &Arc<MemoryStore>) -> Arc<AppState> {
    AppState::new(
        site_config(),
        host_client(store),
        store.clone(),
        store.clone(),
        store.clone(),
    )
}

/// Host metadata advertising every endpoint, registration included.
pub async fn mount_host_meta(server: &MockServer) {
    mount_host_meta_links(server, true).await;
}

/// Host metadata document body for a host rooted at `base`.
pub fn host_meta_json(base: &str, with_registration: bool) -> serde_json::Value {
    let mut links = vec![
        json!({"rel": "http://apinamespace.org/oauth/request_token",
               "href": format!("{base}/oauth/request_token")}),
        json!({"rel": "http://apinamespace.org/oauth/authorize",
               "href": format!("{base}/oauth/authorize")}),
        json!({"rel": "http://apinamespace.org/oauth/access_token",
               "href": format!("{base}/oauth/access_token")}),
        json!({"rel": "http://apinamespace.org/activitypub/whoami",
               "href": format!("{base}/api/whoami")}),
        json!({"rel": "dialback", "href": format!("{base}/api/dialback")}),
    ];
    if with_registration {
        links.push(json!({"rel": "registration_endpoint",
                          "href": format!("{base}/api/client/register")}));
    }
    json!({"links": links})
}

pub async fn mount_host_meta_links(server: &MockServer, with_registration: bool) {
    let body = host_meta_json(&server.uri(), with_registration);
    Mock::given(method("GET"))
        .and(path("/.well-known/host-meta.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Client registration endpoint; requires the dialback Authorization header.
pub async fn mount_registration(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/client/register"))
        .and(header_exists("Authorization"))
        .and(header_exists("Date"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "client_id": "test-client-id",
            "client_secret": "test-client-secret",
        })))
        .mount(server)
        .await;
}

pub async fn mount_request_token(server: &MockServer, token: &str, secret: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .and(header_exists("Authorization"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("oauth_token={token}&oauth_token_secret={secret}")),
        )
        .mount(server)
        .await;
}

pub async fn mount_access_token(server: &MockServer, token: &str, secret: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .and(header_exists("Authorization"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("oauth_token={token}&oauth_token_secret={secret}")),
        )
        .mount(server)
        .await;
}

pub fn person_json(id: &str, base: &str) -> serde_json::Value {
    json!({
        "id": format!("acct:{id}"),
        "displayName": "Alice",
        "url": format!("{base}/alice"),
        "links": {
            "activity-inbox": {"href": format!("{base}/api/user/alice/inbox")},
            "activity-outbox": {"href": format!("{base}/api/user/alice/feed")},
        },
        "followers": {"url": format!("{base}/api/user/alice/followers")},
    })
}

pub async fn mount_whoami(server: &MockServer, person: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/whoami"))
        .and(header_exists("Authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(person))
        .mount(server)
        .await;
}

/// Mount the whole happy-path remote host and return its hostname and the
/// webfinger address of the user it will report.
pub async fn mount_remote_host(server: &MockServer) -> (String, String) {
    let hostname = remote_hostname(server);
    let webfinger = format!("alice@{hostname}");
    mount_host_meta(server).await;
    mount_registration(server).await;
    mount_request_token(server, "rt-1", "rts-1").await;
    mount_access_token(server, "at-1", "ats-1").await;
    mount_whoami(server, person_json(&webfinger, &server.uri())).await;
    (hostname, webfinger)
}
