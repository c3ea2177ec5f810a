//! JSON response envelope.
//!
//! Every response body is `{success, message, data}`; errors add `code`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// A successful response.
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    message: String,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// `200 OK` with `data`.
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::OK,
            message: message.into(),
            data,
        }
    }

    /// `201 Created` with `data`.
    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            message: message.into(),
            data,
        }
    }
}

#[derive(Serialize)]
struct Envelope<T> {
    success: bool,
    message: String,
    data: T,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = Envelope {
            success: true,
            message: self.message,
            data: self.data,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    success: bool,
    message: String,
    code: &'static str,
    data: ErrorData,
}

#[derive(Debug, Serialize)]
struct ErrorData {
    status: u16,
}

impl ErrorBody {
    #[must_use]
    pub fn new(message: String, code: &'static str, status: StatusCode) -> Self {
        Self {
            success: false,
            message,
            code,
            data: ErrorData {
                status: status.as_u16(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let body = serde_json::to_value(Envelope {
            success: true,
            message: "Cart retrieved".to_owned(),
            data: serde_json::json!({"count": 2}),
        })
        .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["count"], 2);
    }

    #[test]
    fn test_error_envelope_carries_code_and_status() {
        let body = serde_json::to_value(ErrorBody::new(
            "cart is empty".to_owned(),
            "empty_cart",
            StatusCode::BAD_REQUEST,
        ))
        .unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "empty_cart");
        assert_eq!(body["data"]["status"], 400);
    }

    #[test]
    fn test_created_status() {
        let response = ApiResponse::created("Order created", ()).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
