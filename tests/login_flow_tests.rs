//! End-to-end login handshake tests against a mock remote host.

mod support;

use fedlogin::error::FedError;
use fedlogin::login::LoginService;
use fedlogin::store::{HostStore, TokenStore, UserStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use fedlogin::user::{Activity, ActivityVerb, LocalUser};
use wiremock::matchers::{header, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn login_service(store: &std::sync::Arc<fedlogin::MemoryStore>) -> LoginService {
    LoginService::new(support::host_client(store), store.clone(), store.clone())
}

#[tokio::test]
async fn full_handshake_creates_a_local_user() {
    let server = MockServer::start().await;
    let (hostname, webfinger) = support::mount_remote_host(&server).await;
    let store = support::store();
    let login = login_service(&store);

    let authorize_url = login.begin(&webfinger).await.unwrap();
    assert_eq!(
        authorize_url,
        format!("{}/oauth/authorize?oauth_token=rt-1", server.uri()),
    );

    // The handshake-in-progress token is recorded under (hostname, token).
    assert!(store
        .get_request_token(&hostname, "rt-1")
        .await
        .unwrap()
        .is_some());

    let outcome = login
        .complete(&hostname, "rt-1", "verifier-1", true)
        .await
        .unwrap();
    assert!(outcome.is_new);
    assert_eq!(outcome.user.id, webfinger);
    assert_eq!(outcome.user.name.as_deref(), Some("Alice"));
    assert_eq!(outcome.user.token, "at-1");
    assert_eq!(outcome.user.secret, "ats-1");

    let remembered = outcome.rememberme.unwrap();
    assert_eq!(remembered.user, webfinger);
    assert!(store
        .get_rememberme(&remembered.uuid)
        .await
        .unwrap()
        .is_some());

    let stored = store.get_user(&webfinger).await.unwrap().unwrap();
    assert_eq!(stored, outcome.user);
}

#[tokio::test]
async fn callback_replay_is_rejected() {
    let server = MockServer::start().await;
    let (hostname, webfinger) = support::mount_remote_host(&server).await;
    let store = support::store();
    let login = login_service(&store);

    login.begin(&webfinger).await.unwrap();
    login
        .complete(&hostname, "rt-1", "verifier-1", false)
        .await
        .unwrap();

    let replay = login.complete(&hostname, "rt-1", "verifier-1", false).await;
    assert!(matches!(replay, Err(FedError::NotFound { .. })));
}

#[tokio::test]
async fn unreachable_host_meta_is_a_discovery_error() {
    let server = MockServer::start().await;
    // Nothing mounted: the metadata fetch answers 404.
    let store = support::store();
    let login = login_service(&store);

    let webfinger = format!("alice@{}", support::remote_hostname(&server));
    let result = login.begin(&webfinger).await;
    assert!(matches!(result, Err(FedError::Discovery(_))));
}

#[tokio::test]
async fn host_meta_missing_links_is_a_discovery_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/host-meta.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "links": [{"rel": "dialback", "href": format!("{}/api/dialback", server.uri())}]
        })))
        .mount(&server)
        .await;
    let store = support::store();
    let login = login_service(&store);

    let webfinger = format!("alice@{}", support::remote_hostname(&server));
    let result = login.begin(&webfinger).await;
    assert!(matches!(result, Err(FedError::Discovery(_))));
}

#[tokio::test]
async fn failed_request_token_exchange_is_a_handshake_error() {
    let server = MockServer::start().await;
    support::mount_host_meta(&server).await;
    support::mount_registration(&server).await;
    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let store = support::store();
    let login = login_service(&store);

    let webfinger = format!("alice@{}", support::remote_hostname(&server));
    let result = login.begin(&webfinger).await;
    assert!(matches!(result, Err(FedError::Handshake(_))));
}

#[tokio::test]
async fn failed_access_token_exchange_is_a_handshake_error() {
    let server = MockServer::start().await;
    let hostname = support::remote_hostname(&server);
    support::mount_host_meta(&server).await;
    support::mount_registration(&server).await;
    support::mount_request_token(&server, "rt-1", "rts-1").await;
    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let store = support::store();
    let login = login_service(&store);

    login.begin(&format!("alice@{hostname}")).await.unwrap();
    let result = login.complete(&hostname, "rt-1", "verifier-1", false).await;
    assert!(matches!(result, Err(FedError::Handshake(_))));
}

#[tokio::test]
async fn unfederated_profile_is_rejected_without_creating_a_user() {
    let server = MockServer::start().await;
    let hostname = support::remote_hostname(&server);
    let webfinger = format!("alice@{hostname}");
    support::mount_host_meta(&server).await;
    support::mount_registration(&server).await;
    support::mount_request_token(&server, "rt-1", "rts-1").await;
    support::mount_access_token(&server, "at-1", "ats-1").await;
    // Profile with no followers collection.
    let mut person = support::person_json(&webfinger, &server.uri());
    person.as_object_mut().unwrap().remove("followers");
    support::mount_whoami(&server, person).await;

    let store = support::store();
    let login = login_service(&store);
    login.begin(&webfinger).await.unwrap();
    let result = login.complete(&hostname, "rt-1", "verifier-1", false).await;

    assert!(matches!(result, Err(FedError::Identity(_))));
    assert!(store.get_user(&webfinger).await.unwrap().is_none());
}

#[tokio::test]
async fn host_without_registration_uses_dialback_identity() {
    let server = MockServer::start().await;
    let hostname = support::remote_hostname(&server);
    support::mount_host_meta_links(&server, false).await;

    let store = support::store();
    let client = support::host_client(&store);
    let host = client.ensure(&hostname).await.unwrap();

    assert_eq!(host.consumer_key, support::SITE_HOSTNAME);
    assert_eq!(host.consumer_secret, "");
    assert!(host.registration_endpoint.is_none());
}

#[tokio::test]
async fn discovered_host_is_cached() {
    let server = MockServer::start().await;
    let hostname = support::remote_hostname(&server);
    support::mount_host_meta(&server).await;
    support::mount_registration(&server).await;

    let store = support::store();
    let client = support::host_client(&store);
    let first = client.ensure(&hostname).await.unwrap();
    assert_eq!(first.consumer_key, "test-client-id");

    // Remote goes dark; the cached record still answers.
    server.reset().await;
    let second = client.ensure(&hostname).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(
        store.get_host(&hostname).await.unwrap().unwrap().consumer_key,
        "test-client-id"
    );
}

#[tokio::test]
async fn discovery_sends_the_site_user_agent() {
    let server = MockServer::start().await;
    let hostname = support::remote_hostname(&server);
    let user_agent = format!("fedlogin/{}", env!("CARGO_PKG_VERSION"));
    // The mock only answers when the site User-Agent header is present.
    Mock::given(method("GET"))
        .and(path("/.well-known/host-meta.json"))
        .and(header("user-agent", user_agent.as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(support::host_meta_json(&server.uri(), false)),
        )
        .mount(&server)
        .await;

    let store = support::store();
    let client = support::host_client(&store);
    let host = client.ensure(&hostname).await.unwrap();
    assert_eq!(host.hostname, hostname);
}

/// Log in against the mock host and return the resulting local user, whose
/// outbox points back at the mock server.
async fn logged_in_user(
    server: &MockServer,
    store: &std::sync::Arc<fedlogin::MemoryStore>,
) -> LocalUser {
    let (hostname, _) = support::mount_remote_host(server).await;
    let login = login_service(store);
    login.begin(&format!("alice@{hostname}")).await.unwrap();
    login
        .complete(&hostname, "rt-1", "verifier-1", false)
        .await
        .unwrap()
        .user
}

#[tokio::test]
async fn activity_posts_signed_json_to_the_outbox() {
    let server = MockServer::start().await;
    let store = support::store();
    let user = logged_in_user(&server, &store).await;

    Mock::given(method("POST"))
        .and(path("/api/user/alice/feed"))
        .and(header_regex("Authorization", "^OAuth .*oauth_signature="))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "activity-1",
            "verb": "like",
        })))
        .mount(&server)
        .await;

    let client = support::host_client(&store);
    let activity = Activity::new(
        ActivityVerb::Like,
        json!({"id": "https://remote.example/note/1"}),
    );
    let posted = client.post_activity(&user, &activity).await.unwrap();
    assert_eq!(posted["id"], "activity-1");
}

#[tokio::test]
async fn failed_outbox_post_is_a_handshake_error() {
    let server = MockServer::start().await;
    let store = support::store();
    let user = logged_in_user(&server, &store).await;

    Mock::given(method("POST"))
        .and(path("/api/user/alice/feed"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = support::host_client(&store);
    let activity = Activity::new(ActivityVerb::Post, json!({"content": "hi"}));
    let result = client.post_activity(&user, &activity).await;
    assert!(matches!(result, Err(FedError::Handshake(_))));
}

#[tokio::test]
async fn non_json_outbox_response_is_rejected() {
    let server = MockServer::start().await;
    let store = support::store();
    let user = logged_in_user(&server, &store).await;

    Mock::given(method("POST"))
        .and(path("/api/user/alice/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let client = support::host_client(&store);
    let activity = Activity::new(ActivityVerb::Share, json!({"id": "x"}));
    let result = client.post_activity(&user, &activity).await;
    assert!(matches!(result, Err(FedError::Handshake(_))));
}

#[tokio::test]
async fn bad_webfinger_is_a_validation_error() {
    let store = support::store();
    let login = login_service(&store);
    let result = login.begin("not-a-webfinger").await;
    assert!(matches!(result, Err(FedError::Validation(_))));
}
