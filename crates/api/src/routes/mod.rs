//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! Every route is nested under the configured base path
//! (default `/ecommerce-api/v1`).
//!
//! ```text
//! GET    /health                    - Liveness
//! GET    /health/ready              - Store readiness
//!
//! # Auth
//! POST   /auth/login                - Login, returns a token
//! POST   /auth/register             - Create account, returns a token
//! POST   /auth/logout               - Revoke the current token
//! GET    /auth/validate-token       - Echo the session
//! GET    /auth/profile              - Current profile
//! PUT    /auth/profile              - Update profile
//!
//! # Cart
//! GET    /cart                      - Cart with totals
//! GET    /cart/count                - Item count
//! POST   /cart/add                  - Add product
//! PUT    /cart/update               - Change line quantity
//! DELETE /cart/remove               - Remove line (query parameter)
//! POST   /cart/remove               - Remove line (JSON body)
//! DELETE /cart/clear                - Empty the cart
//! POST   /cart/apply-coupon         - Apply coupon
//! DELETE /cart/remove-coupon        - Remove coupon
//!
//! # Orders
//! POST   /orders/create             - Place order from cart
//! GET    /orders                    - Paginated order list
//! GET    /orders/statuses           - Status enumeration
//! GET    /orders/{id}               - Single order
//! PUT    /orders/cancel             - Cancel order
//!
//! # Addresses
//! GET    /addresses                 - Billing and shipping
//! PUT    /addresses/{type}          - Create or replace
//! DELETE /addresses/{type}          - Delete
//! POST   /addresses/{type}/default  - Mark default
//! ```
//!
//! Everything except health, login and register requires a session token.

pub mod addresses;
pub mod auth;
pub mod cart;
pub mod health;
pub mod orders;

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::middleware::{request_id_middleware, require_auth};
use crate::state::AppState;

/// Routes reachable without a token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
}

/// Create the session and profile routes router.
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/validate-token", get(auth::validate_token))
        .route("/auth/profile", get(auth::profile).put(auth::update_profile))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/count", get(cart::count))
        .route("/add", post(cart::add))
        .route("/update", put(cart::update))
        .route(
            "/remove",
            delete(cart::remove_by_query).post(cart::remove_by_body),
        )
        .route("/clear", delete(cart::clear))
        .route("/apply-coupon", post(cart::apply_coupon))
        .route("/remove-coupon", delete(cart::remove_coupon))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list))
        .route("/create", post(orders::create))
        .route("/statuses", get(orders::statuses))
        .route("/cancel", put(orders::cancel))
        .route("/{id}", get(orders::show))
}

/// Create the address routes router.
pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(addresses::index))
        .route(
            "/{type}",
            put(addresses::upsert).delete(addresses::delete),
        )
        .route("/{type}/default", post(addresses::set_default))
}

/// Create all API routes, relative to the base path.
pub fn routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .merge(session_routes())
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
        .nest("/addresses", address_routes())
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new().merge(public_routes()).merge(protected)
}

/// Build the complete application: routes under the base path plus the
/// middleware stack.
pub fn app(state: AppState) -> Router {
    let api = routes(&state);
    let base_path = state.config().base_path.clone();
    let router = if base_path.is_empty() {
        api
    } else {
        Router::new().nest(&base_path, api)
    };

    let cors = cors_layer(&state.config().cors_origins);

    router
        .with_state(state)
        .layer(cors)
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            // Path only; the query string may carry a token
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = tracing::field::Empty,
                account_id = tracing::field::Empty,
            )
        }))
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
        .layer(sentry_tower::NewSentryLayer::new_from_top())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
