//! Caller identity from request headers. Authentication happens upstream; these headers are trusted.

use crate::action::CallerIdentity;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const USER_REFERENCE_HEADER: &str = "X-User-Reference-Id";
/// Comma separated group reference ids.
pub const USER_GROUPS_HEADER: &str = "X-User-Groups";

/// Guest when `X-User-Reference-Id` is absent or blank.
#[derive(Clone, Debug)]
pub struct Caller(pub CallerIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let user_reference_id = header(USER_REFERENCE_HEADER);
        let groups = header(USER_GROUPS_HEADER)
            .map(|g| {
                g.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Caller(CallerIdentity {
            user_reference_id,
            groups,
        }))
    }
}
