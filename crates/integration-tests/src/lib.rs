//! Integration tests for the ecommerce API.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests against the in-memory store
//! cargo test -p ecommerce-api-integration-tests
//!
//! # Live-server tests (server running on API_URL, default http://127.0.0.1:3000)
//! cargo test -p ecommerce-api-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `auth_flow` - Login, registration, token limits and precedence
//! - `cart_orders` - Cart mutations, order placement and cancellation
//! - `addresses` - Address book
//! - `live_server` - Smoke tests over HTTP with `reqwest`
//!
//! [`TestApp`] drives the real router with `tower::ServiceExt::oneshot`
//! over a seeded in-memory store and a manual clock.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use ecommerce_api::clock::ManualClock;
use ecommerce_api::config::{ApiConfig, AuthConfig};
use ecommerce_api::db::{Stores, memory::MemoryStore, seed::CatalogSeed};
use ecommerce_api::{AppState, app};

/// Catalog every test app starts with.
///
/// - 1: simple, 10.00, 25 in stock
/// - 2: variable hoodie with variations 21 (m) and 22 (l)
/// - 3: simple, 5.00, 1 in stock
/// - 4: not purchasable
pub const CATALOG: &str = r#"
products:
  - id: 1
    name: Cotton Tee
    price: "10.00"
    stock: { quantity: 25 }
  - id: 2
    name: Hoodie
    price: "45.00"
    kind: variable
  - id: 3
    name: Limited Print
    price: "5.00"
    stock: { quantity: 1 }
  - id: 4
    name: Archived Mug
    price: "8.00"
    purchasable: false
variations:
  - id: 21
    product_id: 2
    price: "45.00"
    stock: { quantity: 10 }
    attributes: { size: m }
  - id: 22
    product_id: 2
    price: "47.50"
    attributes: { size: l }
coupons:
  - code: SAVE10
    kind: percent
    amount: 10
"#;

/// Default password used by [`TestApp::register`].
pub const PASSWORD: &str = "correct horse battery";

/// Configuration with cheap password hashing and no rate limit.
#[must_use]
pub fn test_config() -> ApiConfig {
    ApiConfig {
        auth: AuthConfig {
            argon2_memory_kib: 8,
            argon2_iterations: 1,
            argon2_parallelism: 1,
            rate_limit_per_hour: 0,
            ..AuthConfig::default()
        },
        ..ApiConfig::default()
    }
}

/// A response with its body decoded.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Parsed JSON body, `Null` when the body is not JSON.
    pub json: Value,
    pub text: String,
}

impl TestResponse {
    /// `data` of the response envelope.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.json["data"]
    }

    /// Error `code` of the response envelope.
    #[must_use]
    pub fn code(&self) -> &str {
        self.json["code"].as_str().unwrap_or_default()
    }
}

/// An in-process API over a seeded memory store.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    router: Router,
    base_path: String,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// # Panics
    ///
    /// Panics if the built-in catalog or the configuration is invalid.
    #[must_use]
    pub fn with_config(config: ApiConfig) -> Self {
        let seed = CatalogSeed::parse(CATALOG).expect("test catalog is valid");
        let store = Arc::new(MemoryStore::from_seed(seed));
        let clock = Arc::new(ManualClock::default());
        let base_path = config.base_path.clone();

        let state = AppState::new(config, Stores::memory(store.clone()), clock.clone())
            .expect("test state builds");
        let router = app(state.clone());

        Self {
            state,
            store,
            clock,
            router,
            base_path,
        }
    }

    /// Full path of an API route.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_path)
    }

    /// Send a prepared request.
    ///
    /// # Panics
    ///
    /// Panics if the router fails, which it never should.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body is readable");
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            json,
            text,
        }
    }

    /// Request builder for `path` with an optional bearer token.
    #[must_use]
    pub fn request(&self, method: Method, path: &str, token: Option<&str>) -> axum::http::request::Builder {
        let mut builder = Request::builder().method(method).uri(self.url(path));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
    }

    /// # Panics
    ///
    /// Panics if the request cannot be built.
    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        let request = self
            .request(Method::GET, path, token)
            .body(Body::empty())
            .expect("valid request");
        self.send(request).await
    }

    /// Send `body` as JSON.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built.
    pub async fn json(&self, method: Method, path: &str, token: Option<&str>, body: &Value) -> TestResponse {
        let request = self
            .request(method, path, token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request");
        self.send(request).await
    }

    /// Register `username` and return its token.
    ///
    /// # Panics
    ///
    /// Panics if registration fails.
    pub async fn register(&self, username: &str) -> String {
        let response = self
            .json(
                Method::POST,
                "/auth/register",
                None,
                &json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                    "first_name": "Test",
                    "last_name": username,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
        token_of(&response)
    }

    /// Log in as `identifier` and return the token.
    ///
    /// # Panics
    ///
    /// Panics if login fails.
    pub async fn login(&self, identifier: &str) -> String {
        let response = self
            .json(
                Method::POST,
                "/auth/login",
                None,
                &json!({ "username": identifier, "password": PASSWORD }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text);
        token_of(&response)
    }

    /// Add `quantity` of `product_id` and return the line key.
    ///
    /// # Panics
    ///
    /// Panics if the product cannot be added.
    pub async fn add_to_cart(&self, token: &str, product_id: i64, quantity: i64) -> String {
        let response = self
            .json(
                Method::POST,
                "/cart/add",
                Some(token),
                &json!({ "product_id": product_id, "quantity": quantity }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text);
        response.data()["key"]
            .as_str()
            .expect("line key")
            .to_owned()
    }
}

/// A complete billing address.
#[must_use]
pub fn billing(email: &str) -> Value {
    json!({
        "first_name": "Ada",
        "last_name": "Lovelace",
        "address_1": "12 Analytical Way",
        "city": "London",
        "postcode": "N1 9GU",
        "country": "GB",
        "email": email,
    })
}

fn token_of(response: &TestResponse) -> String {
    response.data()["token"]
        .as_str()
        .expect("token in response")
        .to_owned()
}
