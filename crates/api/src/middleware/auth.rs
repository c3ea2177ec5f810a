//! Session token authentication.
//!
//! [`require_auth`] guards every protected route: it finds the token, asks
//! the authenticator for an [`AuthContext`], spends one request of the
//! account's rate budget and stores the context in request extensions.
//! Handlers pick it up with the [`Authenticated`] extractor.

use axum::{
    body::{Body, Bytes},
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::error::{ApiError, set_sentry_user};
use crate::middleware::rate_limit::check_account;
use crate::models::{AuthContext, SessionToken};
use crate::state::AppState;

/// Header carrying a raw token for clients that cannot send `Authorization`.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Name of the query parameter and body field that may carry the token.
const TOKEN_FIELD: &str = "token";

/// Largest body buffered while looking for a `token` field.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

/// Find the session token of a request.
///
/// Sources in order: `Authorization: Bearer`, `X-Auth-Token`, the `token`
/// query parameter, then the `token` field of a JSON or form body. The first
/// non-empty value wins. Reading the body consumes it, so the request is
/// handed back rebuilt around the buffered bytes.
///
/// # Errors
///
/// Returns `ApiError::Validation` if the body cannot be read.
pub async fn extract_token(request: Request) -> Result<(Option<SessionToken>, Request), ApiError> {
    if let Some(token) = token_from_parts(request.headers(), request.uri().query()) {
        return Ok((Some(SessionToken::new(token)), request));
    }

    let Some(kind) = body_kind(request.headers()) else {
        return Ok((None, request));
    };

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::Validation(format!("Failed to read request body: {e}")))?;
    let token = token_from_body(kind, &bytes).map(SessionToken::new);

    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}

/// Middleware that rejects requests without a valid session token.
///
/// # Errors
///
/// Returns 401 when no token is present or it does not validate, and 429
/// when the account has spent its hourly budget.
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (token, mut request) = extract_token(request).await?;
    let token = token.ok_or(ApiError::Unauthenticated)?;
    let context = state.auth().validate(token).await?;

    tracing::Span::current().record("account_id", tracing::field::display(context.account_id));
    set_sentry_user(&context.account_id, Some(context.username.as_str()));

    if let Some(limiter) = state.rate_limiter() {
        check_account(limiter, context.account_id)?;
    }

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Extractor for the identity [`require_auth`] attached to the request.
///
/// ```rust,ignore
/// async fn handler(Authenticated(auth): Authenticated) -> impl IntoResponse {
///     auth.account_id.to_string()
/// }
/// ```
pub struct Authenticated(pub AuthContext);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(Self)
            .ok_or(ApiError::Unauthenticated)
    }
}

fn token_from_parts(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    bearer_token(headers)
        .or_else(|| header_str(headers, AUTH_TOKEN_HEADER))
        .map(str::to_owned)
        .or_else(|| query.and_then(|q| form_field(q.as_bytes())))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = header_str(headers, header::AUTHORIZATION.as_str())?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    non_empty(token)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(non_empty)
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn body_kind(headers: &HeaderMap) -> Option<BodyKind> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime == "application/json" || mime.ends_with("+json") {
        Some(BodyKind::Json)
    } else if mime == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else {
        None
    }
}

fn token_from_body(kind: BodyKind, bytes: &Bytes) -> Option<String> {
    match kind {
        BodyKind::Json => {
            let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
            value
                .get(TOKEN_FIELD)
                .and_then(serde_json::Value::as_str)
                .and_then(non_empty)
                .map(str::to_owned)
        }
        BodyKind::Form => form_field(bytes),
    }
}

fn form_field(input: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(input)
        .filter(|(key, _)| key == TOKEN_FIELD)
        .find_map(|(_, value)| non_empty(&value).map(str::to_owned))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Method};

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_bearer_beats_header_and_query() {
        let map = headers(&[("authorization", "Bearer aaa"), (AUTH_TOKEN_HEADER, "bbb")]);
        assert_eq!(token_from_parts(&map, Some("token=ccc")).as_deref(), Some("aaa"));
    }

    #[test]
    fn test_header_beats_query() {
        let map = headers(&[(AUTH_TOKEN_HEADER, "bbb")]);
        assert_eq!(token_from_parts(&map, Some("token=ccc")).as_deref(), Some("bbb"));
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        let map = headers(&[("authorization", "bEaReR   aaa ")]);
        assert_eq!(token_from_parts(&map, None).as_deref(), Some("aaa"));
    }

    #[test]
    fn test_empty_sources_fall_through() {
        let map = headers(&[("authorization", "Bearer "), (AUTH_TOKEN_HEADER, " ")]);
        assert_eq!(
            token_from_parts(&map, Some("page=2&token=ccc")).as_deref(),
            Some("ccc")
        );
    }

    #[test]
    fn test_other_schemes_are_ignored() {
        let map = headers(&[("authorization", "Basic dXNlcjpwYXNz")]);
        assert!(token_from_parts(&map, Some("token=")).is_none());
    }

    #[test]
    fn test_token_from_json_and_form_bodies() {
        let json = Bytes::from_static(br#"{"token":"ddd","product_id":1}"#);
        assert_eq!(token_from_body(BodyKind::Json, &json).as_deref(), Some("ddd"));

        let form = Bytes::from_static(b"quantity=1&token=eee");
        assert_eq!(token_from_body(BodyKind::Form, &form).as_deref(), Some("eee"));

        let garbage = Bytes::from_static(b"not json");
        assert!(token_from_body(BodyKind::Json, &garbage).is_none());
    }

    #[test]
    fn test_body_kind() {
        let json = headers(&[("content-type", "application/json; charset=utf-8")]);
        assert_eq!(body_kind(&json), Some(BodyKind::Json));
        let form = headers(&[("content-type", "application/x-www-form-urlencoded")]);
        assert_eq!(body_kind(&form), Some(BodyKind::Form));
        assert_eq!(body_kind(&headers(&[("content-type", "text/plain")])), None);
    }

    #[tokio::test]
    async fn test_extract_token_rebuilds_body() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/cart/add")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"token":"fff","quantity":2}"#))
            .unwrap();

        let (token, request) = extract_token(request).await.unwrap();
        assert_eq!(token.unwrap().expose(), "fff");

        let body = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"token":"fff","quantity":2}"#);
    }
}
