//! Address book and profile.

#![allow(clippy::unwrap_used)]

use axum::http::{Method, StatusCode};
use serde_json::json;

use ecommerce_api_integration_tests::{TestApp, billing};

#[tokio::test]
async fn test_address_book_lifecycle() {
    let app = TestApp::new();
    let token = app.register("alma").await;

    let empty = app.get("/addresses", Some(&token)).await;
    assert_eq!(empty.status, StatusCode::OK);
    assert_eq!(empty.data()["billing"]["address_1"], "");
    assert_eq!(empty.data()["billing"]["is_default"], false);

    let saved = app
        .json(
            Method::PUT,
            "/addresses/billing",
            Some(&token),
            &billing("alma@example.com"),
        )
        .await;
    assert_eq!(saved.status, StatusCode::OK, "{}", saved.text);
    assert_eq!(saved.data()["city"], "London");

    let defaulted = app
        .json(Method::POST, "/addresses/billing/default", Some(&token), &json!({}))
        .await;
    assert_eq!(defaulted.status, StatusCode::OK);
    assert_eq!(defaulted.data()["billing"]["is_default"], true);
    assert_eq!(defaulted.data()["shipping"]["is_default"], false);

    // Reads see the write, not a stale cached copy
    let listed = app.get("/addresses", Some(&token)).await;
    assert_eq!(listed.data()["billing"]["postcode"], "N1 9GU");
    let profile = app.get("/auth/profile", Some(&token)).await;
    assert_eq!(profile.data()["billing"]["postcode"], "N1 9GU");

    let deleted = app
        .json(Method::DELETE, "/addresses/billing", Some(&token), &json!({}))
        .await;
    assert_eq!(deleted.status, StatusCode::OK);

    let again = app
        .json(Method::DELETE, "/addresses/billing", Some(&token), &json!({}))
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
    assert_eq!(again.code(), "address_not_found");
}

#[tokio::test]
async fn test_default_requires_an_address() {
    let app = TestApp::new();
    let token = app.register("bram").await;

    let response = app
        .json(Method::POST, "/addresses/shipping/default", Some(&token), &json!({}))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_address_validation() {
    let app = TestApp::new();
    let token = app.register("cato").await;

    let unknown_type = app
        .json(Method::PUT, "/addresses/office", Some(&token), &billing("c@example.com"))
        .await;
    assert_eq!(unknown_type.status, StatusCode::BAD_REQUEST);

    let incomplete = app
        .json(
            Method::PUT,
            "/addresses/shipping",
            Some(&token),
            &json!({ "first_name": "Cato" }),
        )
        .await;
    assert_eq!(incomplete.status, StatusCode::BAD_REQUEST);
    assert_eq!(incomplete.code(), "validation_error");
}

#[tokio::test]
async fn test_profile_update() {
    let app = TestApp::new();
    let token = app.register("dina").await;

    let before = app.get("/auth/profile", Some(&token)).await;
    assert_eq!(before.data()["username"], "dina");

    let updated = app
        .json(
            Method::PUT,
            "/auth/profile",
            Some(&token),
            &json!({ "first_name": "Dina", "last_name": "Kim", "display_name": "DK" }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.data()["display_name"], "DK");

    let after = app.get("/auth/profile", Some(&token)).await;
    assert_eq!(after.data()["last_name"], "Kim");

    app.register("emil").await;
    let taken = app
        .json(
            Method::PUT,
            "/auth/profile",
            Some(&token),
            &json!({ "email": "emil@example.com" }),
        )
        .await;
    assert_eq!(taken.status, StatusCode::CONFLICT);
}
