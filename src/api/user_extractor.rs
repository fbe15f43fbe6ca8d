use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use crate::model::UserContext;

/// Axum extractor for UserContext from request headers
///
/// Callers are authorised before they reach this service; the headers only name them:
/// - X-User-Id: user identifier, recorded as the author of new versions
/// - X-User-Name: Optional user display name
///
/// Requests without headers run as the system user.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        match extract_header_value(headers, "x-user-id") {
            Some(user_id) => Ok(UserContext::with_name(
                user_id,
                extract_header_value(headers, "x-user-name"),
            )),
            None => Ok(UserContext::system()),
        }
    }
}

/// Extract header value as string, ignoring blank values
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
