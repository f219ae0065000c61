use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde_json::json;

use stratus_auth::{KeySet, SigningKey, State};
use stratus_core::TenantId;
use stratus_gateway::app::services::{GatewayServices, build_services};
use stratus_gateway::app::{build_app, dto::LoginResponse};
use stratus_gateway::auth::AuthService;
use stratus_gateway::bootstrap::bootstrap_admin;
use stratus_gateway::client::{ClientError, GatewayClient};
use stratus_gateway::oidc::{OidcError, OidcProvider, UpstreamClaims, UpstreamTokens};
use stratus_infra::{CommandEnvelope, ComponentInformation, ControlPlaneCommand};
use stratus_tenants::{CreateTenant, TenantCommand};

const ISSUER: &str = "https://gateway.test";
const ADMIN: &str = "root@example.com";

/// Identity provider stand-in. A code is `"<email>|<nonce>"`; the id token
/// equals the code, and refresh tokens are `"rt|<email>"`. Addresses starting
/// with `unverified` are reported as not verified.
struct FakeProvider;

fn claims_for(id_token: &str) -> Result<UpstreamClaims, OidcError> {
    let (email, nonce) = id_token.split_once('|').ok_or(OidcError::KeyNotFound)?;
    Ok(UpstreamClaims {
        issuer: "https://idp.test".to_string(),
        subject: format!("idp|{email}"),
        name: email.split('@').next().unwrap_or_default().to_string(),
        email: email.to_string(),
        email_verified: !email.starts_with("unverified"),
        nonce: (!nonce.is_empty()).then(|| nonce.to_string()),
    })
}

#[async_trait]
impl OidcProvider for FakeProvider {
    fn authorization_url(&self, state: &str, nonce: &str) -> String {
        format!("https://idp.test/auth?state={state}&nonce={nonce}")
    }

    async fn exchange(&self, code: &str) -> Result<UpstreamTokens, OidcError> {
        let claims = claims_for(code).map_err(|_| OidcError::Exchange("invalid_grant".into()))?;
        Ok(UpstreamTokens {
            id_token: code.to_string(),
            access_token: "at".to_string(),
            refresh_token: Some(format!("rt|{}", claims.email)),
            expiry: None,
        })
    }

    async fn verify(&self, id_token: &str) -> Result<UpstreamClaims, OidcError> {
        claims_for(id_token)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<UpstreamTokens, OidcError> {
        let email = refresh_token
            .strip_prefix("rt|")
            .ok_or_else(|| OidcError::Refresh("invalid_grant".into()))?;
        Ok(UpstreamTokens {
            id_token: format!("{email}|"),
            access_token: "at".to_string(),
            refresh_token: None,
            expiry: None,
        })
    }
}

struct TestServer {
    base_url: String,
    services: Arc<GatewayServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let keys = KeySet::new(SigningKey::from_seed("test-1", [5u8; 32]));
        let auth = AuthService::new(
            Arc::new(FakeProvider),
            &keys,
            ISSUER,
            Duration::minutes(15),
            Duration::hours(8),
        )
        .expect("failed to build auth service");
        let services = Arc::new(build_services(
            Arc::new(auth),
            ComponentInformation {
                name: "stratus-gateway".to_string(),
                version: "test".to_string(),
                commit: "abc123".to_string(),
            },
        ));
        bootstrap_admin(&services, ADMIN)
            .await
            .expect("failed to bootstrap admin");

        // Build app (same router as prod), but bind to an ephemeral port.
        let app = build_app(Arc::clone(&services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            handle,
        }
    }

    /// Logs `email` in directly against the auth service, as of `at`.
    async fn token_at(&self, email: &str, at: chrono::DateTime<Utc>) -> String {
        let state = State::new("http://localhost/cb").encode().unwrap();
        self.services
            .auth
            .complete_login(&format!("{email}|n"), &state, "n", at)
            .await
            .expect("login failed")
            .session
            .token
            .token
    }

    async fn token(&self, email: &str) -> String {
        self.token_at(email, Utc::now()).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn create_tenant(name: &str) -> CommandEnvelope {
    let cmd: ControlPlaneCommand = TenantCommand::Create(CreateTenant {
        tenant_id: TenantId::new(),
        name: name.to_string(),
        display_name: name.to_uppercase(),
        occurred_at: Utc::now(),
    })
    .into();
    CommandEnvelope::from_command(&cmd).unwrap()
}

fn create_user(email: &str) -> serde_json::Value {
    let user_id = stratus_core::UserId::new();
    json!({
        "aggregate_id": user_id,
        "aggregate_type": "user",
        "command_type": "user.create",
        "payload": { "user_id": user_id, "email": email, "name": "New User" },
    })
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let jwks = srv.services.auth.jwks();
    assert_eq!(jwks.keys[0].kid, "test-1");
    assert_eq!(jwks.keys[0].crv, "Ed25519");
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    for path in ["/commands", "/auth/api-tokens"] {
        let res = client
            .post(format!("{}{}", srv.base_url, path))
            .header("authorization", "Basic cm9vdDpyb290")
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{path}");
    }
}

#[tokio::test]
async fn login_flow_issues_token_with_identity() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let login: LoginResponse = client
        .get(format!("{}/auth/login", srv.base_url))
        .query(&[("callback", "http://127.0.0.1:5555/cb")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(login.authorization_url.contains(&login.nonce));

    let res = client
        .post(format!("{}/auth/callback", srv.base_url))
        .json(&json!({
            "code": format!("{ADMIN}|{}", login.nonce),
            "state": login.state,
            "nonce": login.nonce,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let session: serde_json::Value = res.json().await.unwrap();
    assert_eq!(session["callback"], "http://127.0.0.1:5555/cb");
    assert_eq!(session["refresh_token"], format!("rt|{ADMIN}"));

    let whoami: serde_json::Value = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(session["token"].as_str().unwrap())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(whoami["email"], ADMIN);
    assert_eq!(whoami["issuer"], "https://idp.test");
    assert!(whoami["user_id"].is_string());
    assert_eq!(whoami["role_bindings"][0]["role"], "admin");
}

#[tokio::test]
async fn login_rejects_replayed_nonce_and_unverified_email() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let state = State::new("http://localhost/cb").encode().unwrap();

    let res = client
        .post(format!("{}/auth/callback", srv.base_url))
        .json(&json!({ "code": format!("{ADMIN}|old"), "state": state, "nonce": "new" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "nonce_mismatch");

    let res = client
        .post(format!("{}/auth/callback", srv.base_url))
        .json(&json!({ "code": "unverified@example.com|n", "state": state, "nonce": "n" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "email_not_verified");

    let res = client
        .post(format!("{}/auth/callback", srv.base_url))
        .json(&json!({ "code": format!("{ADMIN}|n"), "state": "%%%", "nonce": "n" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn kubernetes_token_is_rejected_with_audience_mismatch() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = srv.token(ADMIN).await;

    let res = client
        .post(format!("{}/auth/api-tokens", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "kind": "kubernetes" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let issued: serde_json::Value = res.json().await.unwrap();
    assert_eq!(issued["audience"], "stratus-kubernetes");

    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(issued["token"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "audience_mismatch");
}

#[tokio::test]
async fn scoped_tokens_cannot_mint_further_tokens() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = srv.token(ADMIN).await;

    let scoped: serde_json::Value = client
        .post(format!("{}/auth/api-tokens", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "kind": "scoped", "scopes": ["clusters:read"], "validity_secs": 3600 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(scoped["audience"], "stratus-api");

    let res = client
        .post(format!("{}/auth/api-tokens", srv.base_url))
        .bearer_auth(scoped["token"].as_str().unwrap())
        .json(&json!({ "kind": "kubernetes" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(format!("{}/auth/api-tokens", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "kind": "scoped", "scopes": [], "validity_secs": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expired_token_is_distinguished_and_refreshable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let expired = srv.token_at(ADMIN, Utc::now() - Duration::hours(1)).await;

    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(&expired)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "expired");

    let res = client
        .post(format!("{}/auth/refresh", srv.base_url))
        .json(&json!({ "token": expired, "refresh_token": format!("rt|{ADMIN}") }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let session: serde_json::Value = res.json().await.unwrap();

    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(session["token"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Another principal's refresh token does not extend this session.
    let res = client
        .post(format!("{}/auth/refresh", srv.base_url))
        .json(&json!({ "token": expired, "refresh_token": "rt|mallory@example.com" }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "refresh_failed");
}

#[tokio::test]
async fn admin_executes_commands_and_others_are_denied() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = srv.token(ADMIN).await;

    let res = client
        .post(format!("{}/commands", srv.base_url))
        .bearer_auth(&admin)
        .json(&create_tenant("acme"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let reply: serde_json::Value = res.json().await.unwrap();
    assert_eq!(reply["events"], json!(["tenant.created"]));
    assert_eq!(reply["version"], 1);

    // Known to the directory but without bindings.
    let res = client
        .post(format!("{}/commands", srv.base_url))
        .bearer_auth(&admin)
        .json(&create_user("bob@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bob = srv.token("bob@example.com").await;
    let res = client
        .post(format!("{}/commands", srv.base_url))
        .bearer_auth(&bob)
        .json(&create_tenant("globex"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Not in the directory at all: same answer.
    let dave = srv.token("dave@example.com").await;
    let res = client
        .post(format!("{}/commands", srv.base_url))
        .bearer_auth(&dave)
        .json(&create_user("dave@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn malformed_commands_are_rejected_before_authorization() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let dave = srv.token("dave@example.com").await;

    let mut unknown = create_tenant("acme");
    unknown.command_type = "tenant.explode".to_string();
    let res = client
        .post(format!("{}/commands", srv.base_url))
        .bearer_auth(&dave)
        .json(&unknown)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("{}/commands", srv.base_url))
        .bearer_auth(&dave)
        .json(&create_user("not-an-email"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn client_logs_in_and_executes_commands() {
    let srv = TestServer::spawn().await;
    let mut client = GatewayClient::new(srv.base_url.clone());

    assert!(matches!(client.whoami().await, Err(ClientError::NotLoggedIn)));

    let login = client.start_login("http://127.0.0.1:5555/cb").await.unwrap();
    client
        .complete_login(&format!("{ADMIN}|{}", login.nonce), &login.state, &login.nonce)
        .await
        .unwrap();
    assert_eq!(client.whoami().await.unwrap().email, ADMIN);

    let cmd: ControlPlaneCommand = TenantCommand::Create(CreateTenant {
        tenant_id: TenantId::new(),
        name: "initech".to_string(),
        display_name: "Initech".to_string(),
        occurred_at: Utc::now(),
    })
    .into();
    let reply = client.execute(&cmd).await.unwrap();
    assert_eq!(reply.events, ["tenant.created"]);

    let err = client.execute(&cmd).await.unwrap_err();
    assert!(!err.requires_login());
    assert!(matches!(err, ClientError::Api { status, .. } if status == StatusCode::CONFLICT));
}

#[tokio::test]
async fn bootstrap_admin_is_idempotent() {
    let srv = TestServer::spawn().await;
    let first = srv.services.users.get_by_email(ADMIN).unwrap();

    let again = bootstrap_admin(&srv.services, ADMIN).await.unwrap();
    assert_eq!(again, first.user_id);
    assert_eq!(srv.services.users.get_by_email(ADMIN).unwrap().version, first.version);
}
