//! Cart handlers.
//!
//! Every mutation answers with fresh data; cached views are dropped by the
//! cart manager itself.

use axum::extract::State;
use serde::{Deserialize, Serialize};

use ecommerce_api_core::{AccountId, LineKey};

use crate::error::{ApiError, ApiJson, ApiQuery, Result};
use crate::middleware::Authenticated;
use crate::models::{CartLine, CartView, RemovedLineSummary};
use crate::response::ApiResponse;
use crate::services::{AddItem, CartCount};
use crate::state::AppState;

/// Quantity change for one line.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    #[serde(default)]
    pub cart_item_key: String,
    pub quantity: i64,
}

/// Line to remove, from the query string or a JSON body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RemoveItemRequest {
    pub cart_item_key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CouponRequest {
    pub coupon_code: String,
}

#[derive(Debug, Serialize)]
pub struct ClearedCart {
    pub cleared_items: u64,
    pub is_empty: bool,
}

fn line_key(raw: &str) -> Result<LineKey> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::Validation("cart_item_key is required".to_owned()));
    }
    Ok(LineKey::from_client(raw))
}

pub async fn show(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
) -> Result<ApiResponse<CartView>> {
    let cart = state.carts().get_cart(auth.account_id).await?;
    Ok(ApiResponse::ok("Cart retrieved", cart))
}

pub async fn count(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
) -> Result<ApiResponse<CartCount>> {
    let count = state.carts().count(auth.account_id).await?;
    Ok(ApiResponse::ok("Cart count retrieved", count))
}

#[tracing::instrument(skip(state, auth, item), fields(account_id = %auth.account_id, product_id = %item.product_id))]
pub async fn add(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    ApiJson(item): ApiJson<AddItem>,
) -> Result<ApiResponse<CartLine>> {
    let line = state.carts().add_item(auth.account_id, item).await?;
    Ok(ApiResponse::ok("Product added to cart", line))
}

pub async fn update(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    ApiJson(request): ApiJson<UpdateItemRequest>,
) -> Result<ApiResponse<CartView>> {
    let key = line_key(&request.cart_item_key)?;
    let cart = state
        .carts()
        .update_quantity(auth.account_id, &key, request.quantity)
        .await?;
    Ok(ApiResponse::ok("Cart updated", cart))
}

/// `DELETE /cart/remove?cart_item_key=...`
pub async fn remove_by_query(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    ApiQuery(request): ApiQuery<RemoveItemRequest>,
) -> Result<ApiResponse<RemovedLineSummary>> {
    remove(&state, auth.account_id, &request.cart_item_key).await
}

/// `POST /cart/remove` with `{"cart_item_key": ...}`
pub async fn remove_by_body(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    ApiJson(request): ApiJson<RemoveItemRequest>,
) -> Result<ApiResponse<RemovedLineSummary>> {
    remove(&state, auth.account_id, &request.cart_item_key).await
}

async fn remove(
    state: &AppState,
    account: AccountId,
    raw_key: &str,
) -> Result<ApiResponse<RemovedLineSummary>> {
    let key = line_key(raw_key)?;
    let summary = state.carts().remove_item(account, &key).await?;
    Ok(ApiResponse::ok("Item removed from cart", summary))
}

pub async fn clear(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
) -> Result<ApiResponse<ClearedCart>> {
    let cleared_items = state.carts().clear(auth.account_id).await?;
    Ok(ApiResponse::ok(
        "Cart cleared",
        ClearedCart {
            cleared_items,
            is_empty: true,
        },
    ))
}

pub async fn apply_coupon(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    ApiJson(request): ApiJson<CouponRequest>,
) -> Result<ApiResponse<CartView>> {
    let cart = state
        .carts()
        .apply_coupon(auth.account_id, &request.coupon_code)
        .await?;
    Ok(ApiResponse::ok("Coupon applied", cart))
}

pub async fn remove_coupon(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    ApiJson(request): ApiJson<CouponRequest>,
) -> Result<ApiResponse<CartView>> {
    let cart = state
        .carts()
        .remove_coupon(auth.account_id, &request.coupon_code)
        .await?;
    Ok(ApiResponse::ok("Coupon removed", cart))
}
