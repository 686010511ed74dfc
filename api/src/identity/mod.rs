use axum::http::{HeaderMap, header, request::Parts};

use crate::{App, error::AppError};

pub mod provider;
pub mod routes;

/// The authenticated subject behind a request: the provider's stable id for
/// the account plus the email it verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub subject_id: String,
    pub email: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("Authentication required, but no bearer token was sent with the request.")]
    NoBearer,

    #[error(
        "Unauthorized, please check if you're signed in by refreshing the \
         page. This could be due to an expired session or a revoked token."
    )]
    Unauthorized,
}

/// Pulls the token out of `Authorization: Bearer <token>`. Empty or
/// whitespace-only tokens count as absent.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Extractor for routes that behave differently for signed-in visitors but
/// still serve anonymous ones. Holds the authentication failure so handlers
/// can decide whether it matters.
pub struct MaybeAuthUser(pub Result<SessionIdentity, AuthenticationError>);

impl axum::extract::FromRequestParts<App> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &App) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(MaybeAuthUser(Err(AuthenticationError::NoBearer)));
        };

        // Without a configured provider no token can be honored.
        let Some(provider) = &state.identity_provider else {
            return Ok(MaybeAuthUser(Err(AuthenticationError::Unauthorized)));
        };

        // A provider outage is a server fault, not an anonymous visitor.
        let identity = provider.resolve_token(token).await?;

        Ok(MaybeAuthUser(
            identity.ok_or(AuthenticationError::Unauthorized),
        ))
    }
}

/// Extractor for routes that require a signed-in visitor outright.
pub struct AuthUser(pub SessionIdentity);

impl axum::extract::FromRequestParts<App> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &App) -> Result<Self, Self::Rejection> {
        let MaybeAuthUser(identity) = MaybeAuthUser::from_request_parts(parts, state).await?;

        Ok(AuthUser(identity?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn bearer_token_strips_scheme() {
        assert_eq!(bearer_token(&headers_with("Bearer tok-123")), Some("tok-123"));
    }

    #[test]
    fn bearer_token_ignores_other_schemes() {
        assert_eq!(bearer_token(&headers_with("Basic dXNlcjpwYXNz")), None);
    }

    #[test]
    fn bearer_token_rejects_empty_token() {
        assert_eq!(bearer_token(&headers_with("Bearer   ")), None);
    }

    #[test]
    fn bearer_token_absent_header() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
