//! Cart mutations, order placement and cancellation over HTTP.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::{Value, json};
use tokio::task::JoinSet;

use ecommerce_api::models::{Product, ProductKind, Stock};
use ecommerce_api_core::{Money, OrderId, OrderStatus, ProductId};
use ecommerce_api_integration_tests::{TestApp, billing};

async fn place_order(app: &TestApp, token: &str, email: &str) -> Value {
    let response = app
        .json(
            Method::POST,
            "/orders/create",
            Some(token),
            &json!({ "billing": billing(email), "payment_method": "cod" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
    response.data().clone()
}

fn order_id(order: &Value) -> i64 {
    order["id"].as_i64().unwrap()
}

// =============================================================================
// Full flow
// =============================================================================

#[tokio::test]
async fn test_login_cart_order_cancel_flow() {
    let app = TestApp::new();
    app.register("alice").await;
    let token = app.login("alice").await;

    let key = app.add_to_cart(&token, 1, 2).await;
    let cart = app.get("/cart", Some(&token)).await;
    assert_eq!(cart.data()["totals"]["subtotal"], "20.00");
    assert_eq!(cart.data()["items"][0]["key"], key.as_str());

    let updated = app
        .json(
            Method::PUT,
            "/cart/update",
            Some(&token),
            &json!({ "cart_item_key": key, "quantity": 5 }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.data()["totals"]["subtotal"], "50.00");

    let order = place_order(&app, &token, "alice@example.com").await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["totals"]["total"], "50.00");
    assert_eq!(order["lines"][0]["unit_price"], "10.00");
    assert_eq!(order["lines"][0]["quantity"], 5);
    assert_eq!(order["shipping"]["address_1"], "12 Analytical Way");
    assert_eq!(app.store.product_stock(ProductId::new(1)), Some(20));

    let count = app.get("/cart/count", Some(&token)).await;
    assert_eq!(count.data()["count"], 0);
    assert_eq!(count.data()["is_empty"], true);

    let cancelled = app
        .json(
            Method::PUT,
            "/orders/cancel",
            Some(&token),
            &json!({ "order_id": order_id(&order) }),
        )
        .await;
    assert_eq!(cancelled.status, StatusCode::OK, "{}", cancelled.text);
    assert_eq!(cancelled.data()["status"], "cancelled");
    assert_eq!(app.store.product_stock(ProductId::new(1)), Some(25));

    let fetched = app
        .get(&format!("/orders/{}", order_id(&order)), Some(&token))
        .await;
    assert_eq!(fetched.data()["status"], "cancelled");
}

// =============================================================================
// Cart
// =============================================================================

#[tokio::test]
async fn test_adding_same_product_merges_lines() {
    let app = TestApp::new();
    let token = app.register("bea").await;

    let first = app.add_to_cart(&token, 1, 2).await;
    let second = app.add_to_cart(&token, 1, 3).await;
    assert_eq!(first, second);

    let cart = app.get("/cart", Some(&token)).await;
    assert_eq!(cart.data()["items"].as_array().unwrap().len(), 1);
    assert_eq!(cart.data()["items"][0]["quantity"], 5);
    assert_eq!(cart.data()["item_count"], 5);
}

#[tokio::test]
async fn test_update_to_zero_empties_cart() {
    let app = TestApp::new();
    let token = app.register("cleo").await;
    let key = app.add_to_cart(&token, 1, 2).await;

    let response = app
        .json(
            Method::PUT,
            "/cart/update",
            Some(&token),
            &json!({ "cart_item_key": key, "quantity": 0 }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let cart = response.data();
    assert_eq!(cart["is_empty"], true);
    for field in ["subtotal", "discount", "tax", "shipping", "total"] {
        assert_eq!(cart["totals"][field], "0.00", "{field}");
    }
}

#[tokio::test]
async fn test_add_item_rejections() {
    let app = TestApp::new();
    let token = app.register("dora").await;

    let cases = [
        (json!({ "product_id": 1, "quantity": 0 }), StatusCode::BAD_REQUEST, "validation_error"),
        (json!({ "product_id": 99 }), StatusCode::NOT_FOUND, "product_not_found"),
        (json!({ "product_id": 4 }), StatusCode::BAD_REQUEST, "not_purchasable"),
        (json!({ "product_id": 2 }), StatusCode::BAD_REQUEST, "variation_required"),
        (
            json!({ "product_id": 1, "variation_id": 21 }),
            StatusCode::BAD_REQUEST,
            "invalid_variation",
        ),
        (
            json!({ "product_id": 3, "quantity": 2 }),
            StatusCode::BAD_REQUEST,
            "insufficient_stock",
        ),
    ];

    for (body, status, code) in cases {
        let response = app.json(Method::POST, "/cart/add", Some(&token), &body).await;
        assert_eq!(response.status, status, "{body}");
        assert_eq!(response.code(), code, "{body}");
    }

    let count = app.get("/cart/count", Some(&token)).await;
    assert_eq!(count.data()["count"], 0);
}

#[tokio::test]
async fn test_variation_price_is_captured() {
    let app = TestApp::new();
    let token = app.register("edna").await;

    let response = app
        .json(
            Method::POST,
            "/cart/add",
            Some(&token),
            &json!({ "product_id": 2, "variation_id": 22, "variation": { "size": "l" } }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.data()["unit_price"], "47.50");
    assert_eq!(response.data()["options"]["size"], "l");
}

#[tokio::test]
async fn test_remove_by_query_and_by_body() {
    let app = TestApp::new();
    let token = app.register("fern").await;
    let tee = app.add_to_cart(&token, 1, 1).await;
    let print = app.add_to_cart(&token, 3, 1).await;

    let request = app
        .request(
            Method::DELETE,
            &format!("/cart/remove?cart_item_key={tee}"),
            Some(&token),
        )
        .body(axum::body::Body::empty())
        .unwrap();
    let removed = app.send(request).await;
    assert_eq!(removed.status, StatusCode::OK, "{}", removed.text);
    assert_eq!(removed.data()["removed_item"]["key"], tee.as_str());
    assert_eq!(removed.data()["cart_summary"]["previous_count"], 2);
    assert_eq!(removed.data()["cart_summary"]["current_count"], 1);

    let removed = app
        .json(
            Method::POST,
            "/cart/remove",
            Some(&token),
            &json!({ "cart_item_key": print }),
        )
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.data()["cart_summary"]["is_empty"], true);

    let again = app
        .json(
            Method::POST,
            "/cart/remove",
            Some(&token),
            &json!({ "cart_item_key": print }),
        )
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
    assert_eq!(again.code(), "cart_item_not_found");
}

#[tokio::test]
async fn test_clear_cart() {
    let app = TestApp::new();
    let token = app.register("gale").await;
    app.add_to_cart(&token, 1, 3).await;

    let response = app
        .json(Method::DELETE, "/cart/clear", Some(&token), &json!({}))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["cleared_items"], 3);

    let cart = app.get("/cart", Some(&token)).await;
    assert_eq!(cart.data()["is_empty"], true);
}

#[tokio::test]
async fn test_coupon_lifecycle() {
    let app = TestApp::new();
    let token = app.register("hope").await;
    app.add_to_cart(&token, 1, 2).await;

    let applied = app
        .json(
            Method::POST,
            "/cart/apply-coupon",
            Some(&token),
            &json!({ "coupon_code": "save10" }),
        )
        .await;
    assert_eq!(applied.status, StatusCode::OK, "{}", applied.text);
    assert_eq!(applied.data()["totals"]["discount"], "2.00");
    assert_eq!(applied.data()["totals"]["total"], "18.00");

    let twice = app
        .json(
            Method::POST,
            "/cart/apply-coupon",
            Some(&token),
            &json!({ "coupon_code": "SAVE10" }),
        )
        .await;
    assert_eq!(twice.code(), "validation_error");

    let unknown = app
        .json(
            Method::POST,
            "/cart/apply-coupon",
            Some(&token),
            &json!({ "coupon_code": "FREEBIE" }),
        )
        .await;
    assert_eq!(unknown.code(), "invalid_coupon");

    let removed = app
        .json(
            Method::DELETE,
            "/cart/remove-coupon",
            Some(&token),
            &json!({ "coupon_code": "SAVE10" }),
        )
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.data()["totals"]["total"], "20.00");

    let not_applied = app
        .json(
            Method::DELETE,
            "/cart/remove-coupon",
            Some(&token),
            &json!({ "coupon_code": "SAVE10" }),
        )
        .await;
    assert_eq!(not_applied.code(), "validation_error");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_keep_every_unit() {
    let app = Arc::new(TestApp::new());
    let token = app.register("iris").await;

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let app = app.clone();
        let token = token.clone();
        tasks.spawn(async move { app.add_to_cart(&token, 1, 1).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    let count = app.get("/cart/count", Some(&token)).await;
    assert_eq!(count.data()["count"], 10);
}

// =============================================================================
// Orders
// =============================================================================

#[tokio::test]
async fn test_order_on_empty_cart_fails() {
    let app = TestApp::new();
    let token = app.register("jade").await;

    let response = app
        .json(
            Method::POST,
            "/orders/create",
            Some(&token),
            &json!({ "billing": billing("jade@example.com"), "payment_method": "cod" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), "empty_cart");
    assert_eq!(app.store.order_count(), 0);
}

#[tokio::test]
async fn test_order_requires_billing_fields() {
    let app = TestApp::new();
    let token = app.register("kira").await;
    app.add_to_cart(&token, 1, 1).await;

    let response = app
        .json(
            Method::POST,
            "/orders/create",
            Some(&token),
            &json!({ "billing": { "first_name": "Kira" }, "payment_method": "cod" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), "validation_error");
    assert_eq!(app.store.order_count(), 0);
}

#[tokio::test]
async fn test_cart_totals_use_live_prices() {
    let app = TestApp::new();
    let token = app.register("nell").await;
    app.add_to_cart(&token, 1, 2).await;

    app.store.put_product(Product {
        id: ProductId::new(1),
        name: "Cotton Tee".to_owned(),
        sku: String::new(),
        price: Money::from_cents(1200),
        kind: ProductKind::Simple,
        purchasable: true,
        stock: Stock {
            quantity: Some(25),
            in_stock: true,
            backorders: false,
        },
    });

    let cart = app.get("/cart", Some(&token)).await;
    assert_eq!(cart.data()["items"][0]["price"], "10.00");
    assert_eq!(cart.data()["items"][0]["current_price"], "12.00");
    assert_eq!(cart.data()["items"][0]["price_changed"], true);
    assert_eq!(cart.data()["totals"]["subtotal"], "24.00");

    // The order keeps the price captured when the line was added
    let order = place_order(&app, &token, "nell@example.com").await;
    assert_eq!(order["totals"]["total"], "20.00");
}

#[tokio::test]
async fn test_failed_order_changes_nothing() {
    let app = TestApp::new();
    let token = app.register("lola").await;
    app.add_to_cart(&token, 1, 2).await;
    app.add_to_cart(&token, 3, 1).await;

    // The last print sells elsewhere before checkout
    app.store.put_product(Product {
        id: ProductId::new(3),
        name: "Limited Print".to_owned(),
        sku: String::new(),
        price: Money::from_cents(500),
        kind: ProductKind::Simple,
        purchasable: true,
        stock: Stock {
            quantity: Some(0),
            in_stock: false,
            backorders: false,
        },
    });

    let response = app
        .json(
            Method::POST,
            "/orders/create",
            Some(&token),
            &json!({ "billing": billing("lola@example.com"), "payment_method": "cod" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", response.text);
    assert_eq!(response.code(), "insufficient_stock");

    assert_eq!(app.store.order_count(), 0);
    assert_eq!(app.store.product_stock(ProductId::new(1)), Some(25));
    let count = app.get("/cart/count", Some(&token)).await;
    assert_eq!(count.data()["count"], 3);
}

#[tokio::test]
async fn test_completed_order_is_not_cancellable() {
    let app = TestApp::new();
    let token = app.register("mona").await;
    app.add_to_cart(&token, 1, 1).await;
    let order = place_order(&app, &token, "mona@example.com").await;
    let id = OrderId::new(order_id(&order));

    app.store.set_order_status(id, OrderStatus::Processing).unwrap();
    app.store.set_order_status(id, OrderStatus::Completed).unwrap();

    let response = app
        .json(
            Method::PUT,
            "/orders/cancel",
            Some(&token),
            &json!({ "order_id": id.get() }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), "not_cancellable");
    assert_eq!(app.store.product_stock(ProductId::new(1)), Some(24));
}

#[tokio::test]
async fn test_orders_are_private() {
    let app = TestApp::new();
    let owner = app.register("nina").await;
    let other = app.register("otto").await;
    app.add_to_cart(&owner, 1, 1).await;
    let order = place_order(&app, &owner, "nina@example.com").await;
    let path = format!("/orders/{}", order_id(&order));

    assert_eq!(app.get(&path, Some(&owner)).await.status, StatusCode::OK);

    let response = app.get(&path, Some(&other)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.code(), "order_not_found");

    let cancel = app
        .json(
            Method::PUT,
            "/orders/cancel",
            Some(&other),
            &json!({ "order_id": order_id(&order) }),
        )
        .await;
    assert_eq!(cancel.status, StatusCode::NOT_FOUND);

    let listing = app.get("/orders", Some(&other)).await;
    assert_eq!(listing.data()["pagination"]["total_orders"], 0);
}

#[tokio::test]
async fn test_order_listing_pages_newest_first() {
    let app = TestApp::new();
    let token = app.register("pia").await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        app.add_to_cart(&token, 1, 1).await;
        let order = place_order(&app, &token, "pia@example.com").await;
        ids.push(order_id(&order));
        app.clock.advance(chrono::Duration::seconds(1));
    }

    let first = app.get("/orders?per_page=2", Some(&token)).await;
    assert_eq!(first.status, StatusCode::OK);
    let page = first.data();
    assert_eq!(page["pagination"]["total_orders"], 3);
    assert_eq!(page["pagination"]["total_pages"], 2);
    assert_eq!(page["orders"][0]["id"], ids[2]);
    assert_eq!(page["orders"][1]["id"], ids[1]);

    let second = app.get("/orders?per_page=2&page=2", Some(&token)).await;
    assert_eq!(second.data()["orders"][0]["id"], ids[0]);

    // A cancellation shows up in a filtered listing straight away
    app.json(
        Method::PUT,
        "/orders/cancel",
        Some(&token),
        &json!({ "order_id": ids[0] }),
    )
    .await;
    let cancelled = app.get("/orders?status=cancelled", Some(&token)).await;
    assert_eq!(cancelled.data()["pagination"]["total_orders"], 1);

    let bad = app.get("/orders?status=shipped", Some(&token)).await;
    assert_eq!(bad.code(), "validation_error");
}

#[tokio::test]
async fn test_statuses_have_labels() {
    let app = TestApp::new();
    let token = app.register("quin").await;

    let response = app.get("/orders/statuses", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    let statuses = response.data().as_array().unwrap();
    assert_eq!(statuses.len(), 7);
    assert!(
        statuses
            .iter()
            .any(|s| s["slug"] == "on-hold" && s["label"] == "On hold")
    );
}
