//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, ApiError>`. Server-class errors are
//! captured to Sentry before the client gets a generic message; everything
//! else is reported as-is in the JSON envelope with a snake_case `code`.

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Query, Request,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::response::ErrorBody;
use crate::services::{AddressError, AuthError, CartError, OrderError};

/// Boundary error type for the API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Store operation failed.
    #[error("Store error: {0}")]
    Repository(#[from] RepositoryError),

    /// Authentication or profile operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Order operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Address operation failed.
    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    /// Bad request from client.
    #[error("{0}")]
    Validation(String),

    /// No valid session token.
    #[error("Authentication required")]
    Unauthenticated,

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Per-account request budget exhausted.
    #[error("Rate limited")]
    RateLimited { retry_after_secs: u64 },

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for `ApiError`.
pub type Result<T> = std::result::Result<T, ApiError>;

const STORE_DOWN: (StatusCode, &str) = (StatusCode::SERVICE_UNAVAILABLE, "unavailable");
const INTERNAL: (StatusCode, &str) = (StatusCode::INTERNAL_SERVER_ERROR, "internal_error");
const VALIDATION: (StatusCode, &str) = (StatusCode::BAD_REQUEST, "validation_error");

fn classify_repository(err: &RepositoryError) -> (StatusCode, &'static str) {
    match err {
        RepositoryError::Database(_) | RepositoryError::Unavailable(_) => STORE_DOWN,
        RepositoryError::DataCorruption(_) => INTERNAL,
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        RepositoryError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        RepositoryError::InsufficientStock { .. } => (StatusCode::BAD_REQUEST, "insufficient_stock"),
    }
}

fn classify_cart(err: &CartError) -> (StatusCode, &'static str) {
    match err {
        CartError::Validation(_) => VALIDATION,
        CartError::ProductNotFound(_) => (StatusCode::NOT_FOUND, "product_not_found"),
        CartError::NotPurchasable(_) => (StatusCode::BAD_REQUEST, "not_purchasable"),
        CartError::VariationRequired => (StatusCode::BAD_REQUEST, "variation_required"),
        CartError::InvalidVariation => (StatusCode::BAD_REQUEST, "invalid_variation"),
        CartError::InsufficientStock { .. } => (StatusCode::BAD_REQUEST, "insufficient_stock"),
        CartError::LineNotFound => (StatusCode::NOT_FOUND, "cart_item_not_found"),
        CartError::InvalidCoupon(_) => (StatusCode::BAD_REQUEST, "invalid_coupon"),
        CartError::Repository(e) => classify_repository(e),
    }
}

impl ApiError {
    /// HTTP status and machine-readable code.
    #[must_use]
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Repository(e) => classify_repository(e),
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_)
                | AuthError::InvalidUsername(_)
                | AuthError::WeakPassword(_)
                | AuthError::Validation(_) => VALIDATION,
                AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
                AuthError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
                AuthError::DuplicateIdentifier(_) => (StatusCode::CONFLICT, "duplicate_identifier"),
                AuthError::Repository(e) => classify_repository(e),
                AuthError::PasswordHash => INTERNAL,
            },
            Self::Cart(e) => classify_cart(e),
            Self::Order(err) => match err {
                OrderError::Validation(_) => VALIDATION,
                OrderError::EmptyCart => (StatusCode::BAD_REQUEST, "empty_cart"),
                OrderError::NotFound => (StatusCode::NOT_FOUND, "order_not_found"),
                OrderError::NotCancellable(_) => (StatusCode::BAD_REQUEST, "not_cancellable"),
                OrderError::InsufficientStock { .. } => {
                    (StatusCode::BAD_REQUEST, "insufficient_stock")
                }
                OrderError::Cart(e) => classify_cart(e),
                OrderError::Repository(e) => classify_repository(e),
            },
            Self::Address(err) => match err {
                AddressError::Validation(_) => VALIDATION,
                AddressError::NotFound(_) => (StatusCode::NOT_FOUND, "address_not_found"),
                AddressError::AccountNotFound => (StatusCode::UNAUTHORIZED, "unauthenticated"),
                AddressError::Repository(e) => classify_repository(e),
            },
            Self::Validation(_) => VALIDATION,
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            Self::Internal(_) => INTERNAL,
        }
    }

    /// Message shown to the client.
    fn client_message(&self, status: StatusCode) -> String {
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return "Service temporarily unavailable, please retry".to_owned();
        }
        if status.is_server_error() {
            return "Internal server error".to_owned();
        }
        match self {
            Self::Auth(AuthError::InvalidCredentials) => "Invalid username or password".to_owned(),
            Self::Auth(AuthError::InvalidEmail(_)) => "Invalid email address".to_owned(),
            Self::Auth(AuthError::Unauthenticated) | Self::Unauthenticated => {
                "Authentication required".to_owned()
            }
            Self::Auth(AuthError::DuplicateIdentifier(field)) => {
                format!("An account with this {field} already exists")
            }
            Self::Auth(err) => err.to_string(),
            Self::Cart(err) | Self::Order(OrderError::Cart(err)) => err.to_string(),
            Self::Order(err) => err.to_string(),
            Self::Address(err) => err.to_string(),
            Self::Repository(RepositoryError::Conflict(field)) => format!("{field} already exists"),
            Self::RateLimited { .. } => "Too many requests, slow down".to_owned(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = ErrorBody::new(self.client_message(status), code, status);
        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited { retry_after_secs } = self
            && let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }

        response
    }
}

/// JSON body extractor whose rejections become `ApiError::Validation`.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ApiError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Query string extractor whose rejections become `ApiError::Validation`.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| ApiError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Set the Sentry user context from an account.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(account_id: &impl ToString, username: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(account_id.to_string()),
            username: username.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for customer actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ecommerce_api_core::{OrderStatus, ProductId};

    use super::*;

    fn get_status(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::NotFound("order 7".to_string());
        assert_eq!(err.to_string(), "Not found: order 7");

        let err = ApiError::Validation("invalid input".to_string());
        assert_eq!(err.to_string(), "invalid input");
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(get_status(ApiError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(get_status(ApiError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(get_status(ApiError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(get_status(ApiError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            get_status(ApiError::RateLimited { retry_after_secs: 3 }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(ApiError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_domain_errors_map_to_codes() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (
                AuthError::DuplicateIdentifier("email".into()).into(),
                StatusCode::CONFLICT,
                "duplicate_identifier",
            ),
            (AuthError::InvalidCredentials.into(), StatusCode::UNAUTHORIZED, "invalid_credentials"),
            (
                CartError::InsufficientStock { available: 2 }.into(),
                StatusCode::BAD_REQUEST,
                "insufficient_stock",
            ),
            (
                CartError::ProductNotFound(ProductId::new(1)).into(),
                StatusCode::NOT_FOUND,
                "product_not_found",
            ),
            (CartError::LineNotFound.into(), StatusCode::NOT_FOUND, "cart_item_not_found"),
            (OrderError::EmptyCart.into(), StatusCode::BAD_REQUEST, "empty_cart"),
            (
                OrderError::NotCancellable(OrderStatus::Completed).into(),
                StatusCode::BAD_REQUEST,
                "not_cancellable",
            ),
            (OrderError::NotFound.into(), StatusCode::NOT_FOUND, "order_not_found"),
            (
                RepositoryError::Unavailable("timeout".into()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.classify(), (status, code), "{err}");
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited { retry_after_secs: 7 }.into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "7");
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = ApiError::Repository(RepositoryError::DataCorruption("secret detail".into()));
        let (status, _) = err.classify();
        assert_eq!(err.client_message(status), "Internal server error");
    }
}
