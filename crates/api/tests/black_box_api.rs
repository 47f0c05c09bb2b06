//! Black-box tests against the real router on an ephemeral port.
//!
//! Only flows that stay inside the process are exercised here; anything that
//! would reach the identity provider or the management API lives behind the
//! trait seams and is covered by the `cloudgate-access` unit tests.

use std::sync::Arc;

use cloudgate_identity::AzureAdSettings;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory stores, ephemeral port.
        let app = cloudgate_api::app::build_app(Arc::new(test_settings()))
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn test_settings() -> AzureAdSettings {
    AzureAdSettings {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: "http://localhost:8080/auth/callback".to_string(),
        authority_template: "https://login.example.com/{directory}/".to_string(),
        resource_manager_identifier: "https://management.core.windows.net/".to_string(),
        resource_manager_url: "https://management.azure.com".to_string(),
        graph_api_identifier: "https://graph.windows.net/".to_string(),
        graph_api_version: "1.6".to_string(),
        required_arm_role: "Contributor".to_string(),
        trusted_issuer_prefix: "https://sts.windows.net/".to_string(),
        permissions_api_version: "2014-07-01-preview".to_string(),
        role_assignments_api_version: "2014-10-01-preview".to_string(),
        role_definitions_api_version: "2014-07-01-preview".to_string(),
        http_timeout_secs: 5,
    }
}

/// Mint an id token with the given issuer. The middleware only decodes
/// claims (signature verification belongs to the handshake), so an HS256
/// token works fine here.
fn mint_id_token(issuer: &str) -> String {
    let claims = json!({
        "iss": issuer,
        "tid": "f5cbbf24-6fa8-4b64-9a02-7d105d106d63",
        "upn": "live.com#alice@outlook.com",
    });
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"test-only"),
    )
    .expect("failed to encode token")
}

fn trusted_id_token() -> String {
    mint_id_token("https://sts.windows.net/f5cbbf24-6fa8-4b64-9a02-7d105d106d63/")
}

#[tokio::test]
async fn request_without_bearer_is_unauthorized() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/subscriptions", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_bearer_is_unauthorized() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/subscriptions", server.base_url))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn untrusted_issuer_is_rejected() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/subscriptions", server.base_url))
        .bearer_auth(mint_id_token("https://evil.example.com/tenant/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn fresh_user_has_no_connected_subscriptions() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/subscriptions", server.base_url))
        .bearer_auth(trusted_id_token())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn malformed_subscription_id_is_a_bad_request() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/subscriptions/not-a-guid/access", server.base_url))
        .bearer_auth(trusted_id_token())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_with_untrusted_issuer_is_rejected_before_any_redemption() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/auth/callback", server.base_url))
        .json(&json!({
            "code": "auth-code",
            "id_token": mint_id_token("https://evil.example.com/tenant/"),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
