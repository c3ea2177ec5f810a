//! Login, registration, session and profile handlers.

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecommerce_api_core::AccountId;

use crate::error::{ApiJson, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::Authenticated;
use crate::models::{Account, AccountView, IssuedToken, Profile};
use crate::response::ApiResponse;
use crate::services::{ProfileUpdate, Registration};
use crate::state::AppState;

/// Login form data. `username` also accepts an email address.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "login")]
    pub username: String,
    pub password: String,
}

/// A freshly issued token with the account it belongs to.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub account: AccountView,
}

impl TokenResponse {
    fn new(account: &Account, issued: &IssuedToken) -> Self {
        Self {
            token: issued.token.expose().to_owned(),
            expires_at: issued.expires_at,
            account: AccountView::from(account),
        }
    }
}

/// Echo of a valid session.
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub valid: bool,
    pub account_id: AccountId,
    pub username: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// Handle login.
#[tracing::instrument(skip(state, request), fields(identifier = %request.username))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<ApiResponse<TokenResponse>> {
    let (account, issued) = state
        .auth()
        .login(&request.username, &request.password)
        .await?;

    set_sentry_user(&account.id, Some(account.username.as_str()));
    Ok(ApiResponse::ok(
        "Login successful",
        TokenResponse::new(&account, &issued),
    ))
}

/// Handle registration; the new account is logged in straight away.
#[tracing::instrument(skip(state, registration), fields(username = %registration.username))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(registration): ApiJson<Registration>,
) -> Result<ApiResponse<TokenResponse>> {
    let (account, issued) = state.auth().register(registration).await?;

    set_sentry_user(&account.id, Some(account.username.as_str()));
    Ok(ApiResponse::created(
        "Registration successful",
        TokenResponse::new(&account, &issued),
    ))
}

/// Revoke the token this request authenticated with.
pub async fn logout(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
) -> Result<ApiResponse<()>> {
    state.auth().logout(&auth).await?;
    clear_sentry_user();
    Ok(ApiResponse::ok("Logged out", ()))
}

pub async fn validate_token(Authenticated(auth): Authenticated) -> ApiResponse<SessionInfo> {
    ApiResponse::ok(
        "Token is valid",
        SessionInfo {
            valid: true,
            account_id: auth.account_id,
            username: auth.username.to_string(),
            email: auth.email.to_string(),
            expires_at: auth.expires_at,
        },
    )
}

pub async fn profile(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
) -> Result<ApiResponse<Profile>> {
    let profile = state.auth().profile(auth.account_id).await?;
    Ok(ApiResponse::ok("Profile retrieved", profile))
}

/// Apply profile changes. Changing the password ends every session.
pub async fn update_profile(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    ApiJson(changes): ApiJson<ProfileUpdate>,
) -> Result<ApiResponse<Profile>> {
    let profile = state.auth().update_profile(auth.account_id, changes).await?;
    Ok(ApiResponse::ok("Profile updated", profile))
}
