//! Comment service for the blog: threaded comments stored as CMS documents,
//! passwordless sign-in through a hosted identity provider, and the
//! client-side thread state machine that drives the widget.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::comments::limiter::{RateLimiter, SUBMIT_WINDOW};
use crate::comments::store::{CmsCommentStore, CommentStore};
use crate::config::ServerConfig;
use crate::identity::provider::{AuthClient, IdentityProvider};

pub mod cms;
pub mod comments;
pub mod config;
pub mod error;
pub mod identity;
pub mod json;
pub mod real_ip;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct App {
    pub config: Arc<ServerConfig>,
    pub http: reqwest::Client,
    /// Comment persistence, absent when the CMS credentials are not set.
    pub store: Option<Arc<dyn CommentStore>>,
    /// Passwordless sign-in service, absent when auth is not configured.
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,
    pub limiter: Arc<RateLimiter>,
}

impl App {
    pub fn from_config(config: ServerConfig) -> Self {
        let http = reqwest::Client::new();

        let store = config.cms.as_ref().map(|cms_config| {
            Arc::new(CmsCommentStore::new(cms::Client::new(
                http.clone(),
                cms_config,
            ))) as Arc<dyn CommentStore>
        });

        let identity_provider = config.auth.as_ref().map(|auth_config| {
            Arc::new(AuthClient::new(http.clone(), auth_config)) as Arc<dyn IdentityProvider>
        });

        App {
            config: Arc::new(config),
            http,
            store,
            identity_provider,
            limiter: Arc::new(RateLimiter::new(SUBMIT_WINDOW)),
        }
    }
}

pub fn router(app: App) -> eyre::Result<Router> {
    // The widget is served from the site origin only; everything else gets
    // no CORS grant.
    let cors = CorsLayer::new()
        .allow_origin(app.config.site_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Ok(Router::new()
        .nest("/api", comments::routes::route())
        .nest("/api/auth", identity::routes::route())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app))
}
