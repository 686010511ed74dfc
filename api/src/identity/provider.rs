//! Magic-link identity provider. The blog never stores credentials; sign-in
//! is delegated to a hosted auth service that emails one-time links and
//! issues bearer tokens we verify on every request.

use async_trait::async_trait;
use serde_json::json;

use super::SessionIdentity;

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("could not build identity provider url: {0}")]
    BadUrl(String),

    #[error("sign-in code was rejected")]
    CodeRejected,

    #[error("identity provider returned an unexpected shape: {0}")]
    Shape(&'static str),
}

/// A freshly exchanged session, handed back to the client so it can
/// authenticate subsequent requests.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub access_token: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub identity: SessionIdentity,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Emails a one-time sign-in link. The link lands on `redirect_to` with a
    /// code the client posts back to the callback endpoint.
    async fn issue_link(&self, email: &str, redirect_to: &str) -> Result<(), ProviderError>;

    /// Exchanges a sign-in code for a session. Rejected or expired codes
    /// surface as [`ProviderError::CodeRejected`].
    async fn exchange_code(&self, code: &str) -> Result<ProviderSession, ProviderError>;

    /// Resolves a bearer token to its identity. `None` when the token is
    /// missing from the provider's view: expired, revoked, or never issued.
    async fn resolve_token(&self, token: &str) -> Result<Option<SessionIdentity>, ProviderError>;
}

pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

#[derive(serde::Deserialize)]
struct VerifyResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
    user: ProviderUser,
}

#[derive(serde::Deserialize)]
struct ProviderUser {
    id: String,
    email: Option<String>,
}

impl AuthClient {
    pub fn new(http: reqwest::Client, config: &crate::config::AuthConfig) -> Self {
        AuthClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for AuthClient {
    async fn issue_link(&self, email: &str, redirect_to: &str) -> Result<(), ProviderError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/otp", self.base_url),
            [("redirect_to", redirect_to)],
        )
        .map_err(|e| ProviderError::BadUrl(e.to_string()))?;

        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "create_user": true }))
            .send()
            .await?;
        read_provider_error(response).await?;

        Ok(())
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderSession, ProviderError> {
        let response = self
            .http
            .post(format!("{}/verify", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&json!({ "type": "magiclink", "token_hash": code }))
            .send()
            .await?;

        if response.status().is_client_error() {
            return Err(ProviderError::CodeRejected);
        }
        let response = read_provider_error(response).await?;

        let verified = response.json::<VerifyResponse>().await?;
        let email = verified
            .user
            .email
            .ok_or(ProviderError::Shape("verified user has no email"))?;

        Ok(ProviderSession {
            access_token: verified.access_token,
            expires_in: verified.expires_in,
            refresh_token: verified.refresh_token,
            identity: SessionIdentity {
                subject_id: verified.user.id,
                email,
            },
        })
    }

    async fn resolve_token(&self, token: &str) -> Result<Option<SessionIdentity>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        // The provider answers 401/403 for tokens it no longer recognizes.
        if response.status().is_client_error() {
            return Ok(None);
        }
        let response = read_provider_error(response).await?;

        let user = response.json::<ProviderUser>().await?;
        let Some(email) = user.email else {
            return Ok(None);
        };

        Ok(Some(SessionIdentity {
            subject_id: user.id,
            email,
        }))
    }
}

async fn read_provider_error(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            ["/msg", "/error_description", "/message"]
                .iter()
                .find_map(|p| v.pointer(p).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or(body);

    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}
