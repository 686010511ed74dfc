use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    App,
    error::{ApiRequestError, AppError, CommentError},
    real_ip::{ClientIp, ip_hash},
};

use super::{AuthenticationError, MaybeAuthUser, provider::ProviderError};

pub fn route() -> Router<App> {
    Router::<App>::new()
        .route("/link", post(request_link))
        .route("/callback", post(exchange_callback))
        .route("/me", get(handle_whoami))
}

impl ApiRequestError for AuthenticationError {
    fn status_code(&self) -> axum::http::StatusCode {
        match self {
            AuthenticationError::NoBearer => axum::http::StatusCode::UNAUTHORIZED,
            AuthenticationError::Unauthorized => axum::http::StatusCode::UNAUTHORIZED,
        }
    }
}

#[derive(Deserialize)]
struct LinkRequest {
    email: String,
    /// Path on the site to land on after the callback completes.
    next: Option<String>,
}

#[derive(Serialize)]
struct LinkAck {
    ok: bool,
}

/// Loose shape check only; the provider is the authority on deliverability.
fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

#[axum::debug_handler]
async fn request_link(
    State(ctx): State<App>,
    ClientIp(ip): ClientIp,
    crate::json::Json(payload): crate::json::Json<LinkRequest>,
) -> Result<Json<LinkAck>, AppError> {
    let Some(provider) = &ctx.identity_provider else {
        return Err(("Sign-in is not configured.", StatusCode::SERVICE_UNAVAILABLE).into());
    };

    let email = payload.email.trim().to_lowercase();
    if !looks_like_email(&email) {
        return Err(("A valid email is required.", StatusCode::BAD_REQUEST).into());
    }

    // One link per minute per mailbox and per source address. Each issued
    // email costs provider quota, so the slot is spent on the attempt.
    let per_email = ctx.limiter.check_and_record(&format!("link:email:{email}"));
    let per_ip = ctx.limiter.check_and_record(&format!("link:ip:{}", ip_hash(&ip)));
    if !(per_email && per_ip) {
        return Err(CommentError::RateLimited.into());
    }

    let callback = format!("{}/auth/callback", ctx.config.site_url);
    let redirect_to = match payload.next.as_deref().filter(|next| next.starts_with('/')) {
        Some(next) => reqwest::Url::parse_with_params(&callback, [("next", next)])
            .map_err(|e| format!("Failed to parse url: {}", e))?
            .to_string(),
        None => callback,
    };

    provider.issue_link(&email, &redirect_to).await?;

    Ok(Json(LinkAck { ok: true }))
}

#[derive(Deserialize)]
struct CallbackRequest {
    code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_token: String,
    expires_in: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,

    user: SessionUser,
}

#[derive(Serialize)]
struct SessionUser {
    id: String,
    email: String,
}

#[axum::debug_handler]
async fn exchange_callback(
    State(ctx): State<App>,
    crate::json::Json(payload): crate::json::Json<CallbackRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let Some(provider) = &ctx.identity_provider else {
        return Err(("Sign-in is not configured.", StatusCode::SERVICE_UNAVAILABLE).into());
    };

    let code = payload.code.trim();
    if code.is_empty() {
        return Err(("A sign-in code is required.", StatusCode::BAD_REQUEST).into());
    }

    let session = provider.exchange_code(code).await.map_err(|e| match e {
        ProviderError::CodeRejected => AppError::from((
            "That sign-in link is invalid or has expired. Request a new one.",
            StatusCode::BAD_REQUEST,
        )),
        other => AppError::from(other),
    })?;

    Ok(Json(SessionResponse {
        access_token: session.access_token,
        expires_in: session.expires_in,
        refresh_token: session.refresh_token,
        user: SessionUser {
            id: session.identity.subject_id,
            email: session.identity.email,
        },
    }))
}

#[derive(Serialize)]
pub struct WhoamiResponse {
    id: String,
    email: String,
}

async fn handle_whoami(
    MaybeAuthUser(identity): MaybeAuthUser,
) -> Result<Json<WhoamiResponse>, AppError> {
    let identity = identity?;

    Ok(Json(WhoamiResponse {
        id: identity.subject_id,
        email: identity.email,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_check() {
        assert!(looks_like_email("ada@example.com"));
        assert!(looks_like_email("a.b+tag@sub.example.co"));
        assert!(!looks_like_email("ada"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("ada@nodot"));
        assert!(!looks_like_email("ada@example."));
    }

    #[test]
    fn session_response_wire_shape() {
        let session = SessionResponse {
            access_token: "tok".into(),
            expires_in: 3600,
            refresh_token: None,
            user: SessionUser {
                id: "user-1".into(),
                email: "ada@example.com".into(),
            },
        };

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["accessToken"], "tok");
        assert_eq!(value["expiresIn"], 3600);
        assert!(value.get("refreshToken").is_none());
        assert_eq!(value["user"]["id"], "user-1");
    }
}
