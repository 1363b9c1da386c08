//! Authentication middleware integration tests.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::from_fn_with_state,
    routing::get,
    Extension, Router,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use token_auth::auth::trust::{ServiceFamily, TrustConfiguration, TrustSettings};
use token_auth::middleware::{require_auth, AuthState};
use token_auth::{AuthConfig, DecodedToken, SecurityContext, TokenAuthenticator};
use token_auth_test_utils::*;

async fn whoami(
    Extension(token): Extension<Arc<DecodedToken>>,
    Extension(context): Extension<Arc<SecurityContext>>,
) -> String {
    let held = context
        .token()
        .map(|held| Arc::ptr_eq(&held, &token))
        .unwrap_or(false);
    format!(
        "{}:{}",
        token.claims().subject().unwrap_or_default(),
        held
    )
}

fn auth_state(server: &MockJwksServer) -> Arc<AuthState> {
    let trust = TrustConfiguration::try_from(TrustSettings {
        family: ServiceFamily::Legacy,
        client_id: TEST_CLIENT_ID.to_string(),
        issuer_domain: TEST_DOMAIN.to_string(),
        application_id: None,
        zone_id: None,
        jwks_url: Some(server.jwks_url()),
    })
    .unwrap();

    let config = AuthConfig {
        trust_configurations: vec![trust],
        ..AuthConfig::default()
    };
    Arc::new(AuthState {
        authenticator: Arc::new(TokenAuthenticator::from_config(&config).unwrap()),
    })
}

fn app(server: &MockJwksServer) -> Router {
    Router::new()
        .route("/whoami", get(whoami))
        .layer(from_fn_with_state(auth_state(server), require_auth))
}

async fn body_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_valid_token_reaches_handler() -> Result<()> {
    let key = TestSigningKey::rsa(TEST_KEY_ID_1);
    let server = MockJwksServer::start(&[&key]).await;
    let token = key.sign(&TestTokenBuilder::legacy().build());

    let response = tower::ServiceExt::oneshot(
        app(&server),
        Request::builder()
            .uri("/whoami")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())?,
    )
    .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response.into_body()).await, "alice:true");

    Ok(())
}

#[tokio::test]
async fn test_context_cleared_after_handler_returns() -> Result<()> {
    let key = TestSigningKey::rsa(TEST_KEY_ID_1);
    let server = MockJwksServer::start(&[&key]).await;
    let token = key.sign(&TestTokenBuilder::legacy().build());

    let (tx, mut rx) = mpsc::unbounded_channel::<Arc<SecurityContext>>();
    let app = Router::new()
        .route(
            "/leak",
            get(move |Extension(context): Extension<Arc<SecurityContext>>| async move {
                let held = context.is_authenticated();
                tx.send(context).unwrap();
                held.to_string()
            }),
        )
        .layer(from_fn_with_state(auth_state(&server), require_auth));

    let response = tower::ServiceExt::oneshot(
        app,
        Request::builder()
            .uri("/leak")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())?,
    )
    .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response.into_body()).await, "true");

    let context = rx.recv().await.expect("handler should hand out its context");
    assert!(context.token().is_none());
    assert!(!context.is_authenticated());

    Ok(())
}

#[tokio::test]
async fn test_missing_header_is_401() -> Result<()> {
    let server = MockJwksServer::builder().expect(0).start().await;

    let response = tower::ServiceExt::oneshot(
        app(&server),
        Request::builder().uri("/whoami").body(Body::empty())?,
    )
    .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("www-authenticate").unwrap().to_str()?,
        "Bearer"
    );

    let body: serde_json::Value = serde_json::from_str(&body_string(response.into_body()).await)?;
    assert_eq!(body["error"]["code"], "MISSING_TOKEN");
    assert_eq!(body["error"]["message"], "Authorization header is missing");

    Ok(())
}

#[tokio::test]
async fn test_invalid_token_is_401() -> Result<()> {
    let server = MockJwksServer::builder().expect(0).start().await;

    let response = tower::ServiceExt::oneshot(
        app(&server),
        Request::builder()
            .uri("/whoami")
            .header("Authorization", "Bearer invalid")
            .body(Body::empty())?,
    )
    .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response
        .headers()
        .get("www-authenticate")
        .unwrap()
        .to_str()?
        .contains("invalid_token"));

    let body: serde_json::Value = serde_json::from_str(&body_string(response.into_body()).await)?;
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");

    Ok(())
}

#[tokio::test]
async fn test_expired_token_is_401() -> Result<()> {
    let key = TestSigningKey::ed25519(2, TEST_KEY_ID_1);
    let server = MockJwksServer::start(&[&key]).await;
    let token = key.sign(&TestTokenBuilder::legacy().expires_in(-10).build());

    let response = tower::ServiceExt::oneshot(
        app(&server),
        Request::builder()
            .uri("/whoami")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())?,
    )
    .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}
