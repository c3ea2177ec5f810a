//! Address book handlers.

use axum::extract::{Path, State};

use ecommerce_api_core::AddressType;

use crate::error::{ApiError, ApiJson, Result};
use crate::middleware::Authenticated;
use crate::models::Address;
use crate::response::ApiResponse;
use crate::services::{AddressBookView, AddressEntry};
use crate::state::AppState;

fn address_type(raw: &str) -> Result<AddressType> {
    raw.trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(ApiError::Validation)
}

pub async fn index(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
) -> Result<ApiResponse<AddressBookView>> {
    let addresses = state.addresses().list(auth.account_id).await?;
    Ok(ApiResponse::ok("Addresses retrieved", addresses))
}

pub async fn upsert(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    Path(kind): Path<String>,
    ApiJson(address): ApiJson<Address>,
) -> Result<ApiResponse<AddressEntry>> {
    let kind = address_type(&kind)?;
    let entry = state.addresses().put(auth.account_id, kind, address).await?;
    Ok(ApiResponse::ok(format!("{kind} address saved"), entry))
}

pub async fn delete(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    Path(kind): Path<String>,
) -> Result<ApiResponse<()>> {
    let kind = address_type(&kind)?;
    state.addresses().delete(auth.account_id, kind).await?;
    Ok(ApiResponse::ok(format!("{kind} address deleted"), ()))
}

pub async fn set_default(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    Path(kind): Path<String>,
) -> Result<ApiResponse<AddressBookView>> {
    let kind = address_type(&kind)?;
    let addresses = state.addresses().set_default(auth.account_id, kind).await?;
    Ok(ApiResponse::ok(format!("{kind} address set as default"), addresses))
}
