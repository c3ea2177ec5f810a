//! Authentication, token lifecycle and request plumbing.

#![allow(clippy::unwrap_used)]

use axum::{
    body::Body,
    http::{Method, StatusCode, header},
};
use serde_json::json;

use ecommerce_api::config::AuthConfig;
use ecommerce_api_core::AccountId;
use ecommerce_api_integration_tests::{PASSWORD, TestApp, test_config};

// =============================================================================
// Health and plumbing
// =============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();

    let live = app.get("/health", None).await;
    assert_eq!(live.status, StatusCode::OK);
    assert_eq!(live.text, "ok");

    let ready = app.get("/health/ready", None).await;
    assert_eq!(ready.status, StatusCode::OK);
}

#[tokio::test]
async fn test_every_response_carries_request_id() {
    let app = TestApp::new();

    let generated = app.get("/health", None).await;
    assert!(generated.headers.contains_key("x-request-id"));

    let request = app
        .request(Method::GET, "/cart", None)
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let echoed = app.send(request).await;
    assert_eq!(echoed.status, StatusCode::UNAUTHORIZED);
    assert_eq!(echoed.headers["x-request-id"], "req-123");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = TestApp::new();

    for path in ["/cart", "/orders", "/addresses", "/auth/profile", "/auth/validate-token"] {
        let response = app.get(path, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(response.json["success"], false);
        assert_eq!(response.code(), "unauthenticated");
    }

    let bogus = app.get("/cart", Some("not-a-real-token")).await;
    assert_eq!(bogus.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let app = TestApp::new();
    let request = app
        .request(Method::POST, "/auth/login", None)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), "validation_error");
}

// =============================================================================
// Login and registration
// =============================================================================

#[tokio::test]
async fn test_register_then_login_by_username_or_email() {
    let app = TestApp::new();
    app.register("alice").await;

    let by_name = app.login("alice").await;
    let by_email = app.login("alice@example.com").await;
    assert_ne!(by_name, by_email);

    let session = app.get("/auth/validate-token", Some(&by_email)).await;
    assert_eq!(session.status, StatusCode::OK);
    assert_eq!(session.data()["valid"], true);
    assert_eq!(session.data()["username"], "alice");
}

#[tokio::test]
async fn test_register_returns_account_and_token() {
    let app = TestApp::new();
    let response = app
        .json(
            Method::POST,
            "/auth/register",
            None,
            &json!({
                "username": "grace",
                "email": "grace@example.com",
                "password": PASSWORD,
                "first_name": "Grace",
                "last_name": "Hopper",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.json["success"], true);
    assert_eq!(response.data()["account"]["display_name"], "Grace Hopper");
    assert_eq!(response.data()["token"].as_str().unwrap().len(), 64);
    assert!(response.data()["account"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let app = TestApp::new();
    app.register("bob").await;

    let response = app
        .json(
            Method::POST,
            "/auth/login",
            None,
            &json!({ "username": "bob", "password": "wrong password" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "invalid_credentials");

    let unknown = app
        .json(
            Method::POST,
            "/auth/login",
            None,
            &json!({ "username": "nobody", "password": PASSWORD }),
        )
        .await;
    assert_eq!(unknown.code(), "invalid_credentials");
    assert_eq!(unknown.json["message"], response.json["message"]);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = TestApp::new();
    app.register("carol").await;

    let response = app
        .json(
            Method::POST,
            "/auth/register",
            None,
            &json!({
                "username": "carol2",
                "email": "carol@example.com",
                "password": PASSWORD,
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.code(), "duplicate_identifier");
}

#[tokio::test]
async fn test_register_validates_input() {
    let app = TestApp::new();
    let response = app
        .json(
            Method::POST,
            "/auth/register",
            None,
            &json!({ "username": "dave", "email": "dave@example.com", "password": "short" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), "validation_error");
}

// =============================================================================
// Token lifecycle
// =============================================================================

#[tokio::test]
async fn test_sixth_login_evicts_the_oldest_token() {
    let app = TestApp::new();
    let registered = app
        .json(
            Method::POST,
            "/auth/register",
            None,
            &json!({ "username": "erin", "email": "erin@example.com", "password": PASSWORD }),
        )
        .await;
    let account = AccountId::new(registered.data()["account"]["id"].as_i64().unwrap());

    let mut tokens = Vec::new();
    for _ in 0..6 {
        tokens.push(app.login("erin").await);
    }

    assert_eq!(app.state.tokens().live_count(account), 5);

    let first = app.get("/auth/validate-token", Some(&tokens[0])).await;
    assert_eq!(first.status, StatusCode::UNAUTHORIZED);
    for token in &tokens[1..] {
        let response = app.get("/auth/validate-token", Some(token)).await;
        assert_eq!(response.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = TestApp::new();
    let token = app.register("frank").await;

    app.clock.advance(chrono::Duration::days(29));
    assert_eq!(app.get("/cart", Some(&token)).await.status, StatusCode::OK);

    // Use does not extend the lifetime
    app.clock.advance(chrono::Duration::days(2));
    assert_eq!(
        app.get("/cart", Some(&token)).await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_logout_revokes_only_that_token() {
    let app = TestApp::new();
    let first = app.register("gina").await;
    let second = app.login("gina").await;

    let response = app
        .json(Method::POST, "/auth/logout", Some(&first), &json!({}))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    assert_eq!(
        app.get("/cart", Some(&first)).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(app.get("/cart", Some(&second)).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_password_change_ends_every_session() {
    let app = TestApp::new();
    let first = app.register("hank").await;
    let second = app.login("hank").await;

    let response = app
        .json(
            Method::PUT,
            "/auth/profile",
            Some(&first),
            &json!({ "password": "a brand new secret", "current_password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);

    for token in [&first, &second] {
        assert_eq!(
            app.get("/cart", Some(token)).await.status,
            StatusCode::UNAUTHORIZED
        );
    }
}

// =============================================================================
// Token sources
// =============================================================================

#[tokio::test]
async fn test_bearer_beats_header_beats_query() {
    let app = TestApp::new();
    let good = app.register("ivy").await;
    let bad = "0".repeat(64);

    // Bearer wins over X-Auth-Token
    let request = app
        .request(Method::GET, "/cart/count", Some(&good))
        .header("x-auth-token", &bad)
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(request).await.status, StatusCode::OK);

    let request = app
        .request(Method::GET, "/cart/count", Some(&bad))
        .header("x-auth-token", &good)
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(request).await.status, StatusCode::UNAUTHORIZED);

    // X-Auth-Token wins over the query parameter
    let request = app
        .request(Method::GET, &format!("/cart/count?token={bad}"), None)
        .header("x-auth-token", &good)
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(request).await.status, StatusCode::OK);

    // Query parameter alone
    let response = app.get(&format!("/cart/count?token={good}"), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["count"], 0);
}

#[tokio::test]
async fn test_token_in_json_body() {
    let app = TestApp::new();
    let token = app.register("jack").await;

    let response = app
        .json(
            Method::POST,
            "/cart/add",
            None,
            &json!({ "token": token, "product_id": 1, "quantity": 1 }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.data()["quantity"], 1);
}

#[tokio::test]
async fn test_token_in_form_body() {
    let app = TestApp::new();
    let token = app.register("kate").await;

    let request = app
        .request(Method::POST, "/auth/logout", None)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("token={token}")))
        .unwrap();
    assert_eq!(app.send(request).await.status, StatusCode::OK);
    assert_eq!(
        app.get("/cart", Some(&token)).await.status,
        StatusCode::UNAUTHORIZED
    );
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn test_rate_limit_per_account() {
    let mut config = test_config();
    config.auth = AuthConfig {
        rate_limit_per_hour: 3,
        ..config.auth
    };
    let app = TestApp::with_config(config);
    let limited = app.register("lena").await;
    let other = app.register("mike").await;

    for _ in 0..3 {
        assert_eq!(app.get("/cart/count", Some(&limited)).await.status, StatusCode::OK);
    }
    let response = app.get("/cart/count", Some(&limited)).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.code(), "rate_limited");
    assert!(response.headers.contains_key(header::RETRY_AFTER));

    assert_eq!(app.get("/cart/count", Some(&other)).await.status, StatusCode::OK);
}
