//! Integration tests using WireMock
//!
//! Exercise the reqwest transport end to end: headers, status mapping and
//! retry on throttling.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use edupulse_session::error::NetworkError;
use edupulse_session::{
    session_config, AuthClient, LoginRequest, RegisterRequest, RequestOptions, Role,
    SessionError, SessionStatus,
};

fn user_body() -> serde_json::Value {
    json!({"_id": "u1", "name": "Noor", "email": "noor@example.com", "role": "student"})
}

fn client_for(server: &MockServer, max_retries: u32) -> AuthClient {
    let config = session_config()
        .base_url(server.uri())
        .max_retries(max_retries)
        .retry_base_delay(Duration::from_millis(10))
        .max_jitter(Duration::ZERO)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    AuthClient::new(config).unwrap()
}

#[tokio::test]
async fn test_login_then_bearer_on_current_user() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"email": "noor@example.com", "password": "pw"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"token": "abc", "user": user_body()})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": user_body()})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 0);
    client
        .login(LoginRequest::new("noor@example.com", "pw"), RequestOptions::default())
        .await
        .unwrap();
    let user = client
        .get_current_user(RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(user.id, "u1");
    assert_eq!(user.role, Role::Student);
    assert_eq!(client.status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn test_throttled_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "slow down"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "abc"})))
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let session = client
        .login(LoginRequest::new("noor@example.com", "pw"), RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(session.access_token.as_deref(), Some("abc"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_retry_after_is_preserved() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
        .mount(&server)
        .await;

    let client = client_for(&server, 0);
    let result = client
        .register(
            RegisterRequest::new("Noor", "noor@example.com", "pw", Role::Educator),
            RequestOptions::default(),
        )
        .await;

    let error = result.unwrap_err();
    assert!(error.is_throttling());
    assert_eq!(error.retry_after(), Some(Duration::from_secs(3)));
}

#[tokio::test]
async fn test_error_message_is_extracted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Email already registered"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let result = client
        .register(
            RegisterRequest::new("Noor", "noor@example.com", "pw", Role::Student),
            RequestOptions::default(),
        )
        .await;

    match result {
        Err(SessionError::Api { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Email already registered");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let config = session_config()
        .base_url("http://127.0.0.1:1")
        .build()
        .unwrap();
    let client = AuthClient::new(config).unwrap();

    let result = client
        .login(LoginRequest::new("a@b.c", "pw"), RequestOptions::default())
        .await;

    assert!(matches!(
        result,
        Err(SessionError::Network(NetworkError::ConnectionFailed { .. }))
    ));
    assert_eq!(client.status(), SessionStatus::Anonymous);
}
