//! Order handlers.

use axum::extract::{Path, State};
use serde::Deserialize;

use ecommerce_api_core::{OrderId, OrderStatus};

use crate::error::{ApiError, ApiJson, ApiQuery, Result};
use crate::middleware::Authenticated;
use crate::models::{Order, OrderOwner, OrderPage, PageRequest};
use crate::response::ApiResponse;
use crate::services::{CreateOrder, StatusEntry};
use crate::state::AppState;

/// Listing filters. `status` accepts a slug or `any`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListOrdersQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub order_id: OrderId,
}

fn status_filter(raw: Option<&str>) -> Result<Option<OrderStatus>> {
    match raw.map(str::trim) {
        None | Some("" | "any" | "all") => Ok(None),
        Some(slug) => slug.parse().map(Some).map_err(ApiError::Validation),
    }
}

#[tracing::instrument(skip(state, auth, request), fields(account_id = %auth.account_id))]
pub async fn create(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    ApiJson(request): ApiJson<CreateOrder>,
) -> Result<ApiResponse<Order>> {
    let order = state.orders().create_order(auth.account_id, request).await?;
    Ok(ApiResponse::created("Order created", order))
}

pub async fn list(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    ApiQuery(query): ApiQuery<ListOrdersQuery>,
) -> Result<ApiResponse<OrderPage>> {
    let status = status_filter(query.status.as_deref())?;
    let page = PageRequest::new(query.page, query.per_page);
    let orders = state
        .orders()
        .list_orders(&OrderOwner::from(&auth), page, status)
        .await?;
    Ok(ApiResponse::ok("Orders retrieved", orders))
}

pub async fn statuses(State(state): State<AppState>) -> ApiResponse<Vec<StatusEntry>> {
    ApiResponse::ok("Order statuses retrieved", state.orders().statuses().await)
}

pub async fn show(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    Path(raw_id): Path<String>,
) -> Result<ApiResponse<Order>> {
    let id: OrderId = raw_id
        .parse()
        .map_err(|_| ApiError::Validation(format!("invalid order id: {raw_id}")))?;
    let order = state
        .orders()
        .get_order(&OrderOwner::from(&auth), id)
        .await?;
    Ok(ApiResponse::ok("Order retrieved", order))
}

#[tracing::instrument(skip(state, auth, request), fields(account_id = %auth.account_id, order_id = %request.order_id))]
pub async fn cancel(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    ApiJson(request): ApiJson<CancelOrderRequest>,
) -> Result<ApiResponse<Order>> {
    let order = state
        .orders()
        .cancel_order(&OrderOwner::from(&auth), request.order_id)
        .await?;
    Ok(ApiResponse::ok("Order cancelled", order))
}
