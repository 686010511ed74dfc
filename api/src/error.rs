use std::collections::HashMap;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;

use crate::{cms::CmsError, comments::store::StoreError, identity::provider::ProviderError};

/// Maps a domain error onto the status code its endpoint answers with.
pub trait ApiRequestError {
    fn status_code(&self) -> StatusCode;
}

/// Caller-facing comment failures. The client renders these as returned and
/// never re-derives the decision locally.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommentError {
    #[error("{0}")]
    Validation(String),

    #[error("Sign in required.")]
    SignInRequired,

    #[error("Forbidden.")]
    Forbidden,

    #[error("Not found.")]
    NotFound,

    #[error("You are doing that too often. Please wait a minute and try again.")]
    RateLimited,

    #[error("Comments are not configured.")]
    StoreUnavailable,
}

impl CommentError {
    pub fn validation(message: impl Into<String>) -> Self {
        CommentError::Validation(message.into())
    }
}

impl ApiRequestError for CommentError {
    fn status_code(&self) -> StatusCode {
        match self {
            CommentError::Validation(_) => StatusCode::BAD_REQUEST,
            CommentError::SignInRequired => StatusCode::UNAUTHORIZED,
            CommentError::Forbidden => StatusCode::FORBIDDEN,
            CommentError::NotFound => StatusCode::NOT_FOUND,
            CommentError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            CommentError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug)]
pub enum ServerError {
    Store(StoreError),
    AuthService(ProviderError),
    Http(reqwest::Error),
}

impl Serialize for ServerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        use serde::ser::SerializeMap;
        let message = match self {
            ServerError::Store(e) => e.to_string(),
            ServerError::AuthService(e) => e.to_string(),
            ServerError::Http(e) => e.to_string(),
        };
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("message", &message)?;
        map.end()
    }
}

#[derive(Debug)]
pub enum AppError {
    Comment(CommentError),
    Auth(crate::identity::AuthenticationError),
    Request {
        message: String,
        status: StatusCode,
    },
    Server {
        error: ServerError,

        #[cfg(debug_assertions)]
        backtrace: Option<backtrace::Backtrace>,
    },
    Unhandled(String),
}

impl AppError {
    fn server(error: ServerError) -> Self {
        AppError::Server {
            error,

            #[cfg(debug_assertions)]
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }

    /// The status the error will be rendered with. Mostly useful in tests.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Comment(e) => e.status_code(),
            AppError::Auth(e) => e.status_code(),
            AppError::Request { status, .. } => *status,
            AppError::Server { .. } | AppError::Unhandled(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,

    #[cfg(debug_assertions)]
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_info: Option<HashMap<&'static str, Value>>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),

            #[cfg(debug_assertions)]
            debug_info: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status_code, error_response) = match self {
            AppError::Comment(e) => (e.status_code(), ErrorResponse::new(e.to_string())),
            AppError::Auth(e) => (e.status_code(), ErrorResponse::new(e.to_string())),
            AppError::Request { message, status } => (status, ErrorResponse::new(message)),
            AppError::Server {
                error,
                #[cfg(debug_assertions)]
                backtrace,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                #[cfg(debug_assertions)]
                {
                    let frames_info = backtrace.as_ref().map(filter_backtrace).unwrap_or_default();
                    ErrorResponse {
                        error: "Internal server error".into(),
                        debug_info: Some(HashMap::from([
                            ("backtrace", serde_json::to_value(&frames_info).unwrap()),
                            ("error", serde_json::to_value(&error).unwrap()),
                        ])),
                    }
                },
                #[cfg(not(debug_assertions))]
                {
                    let _ = error;
                    ErrorResponse::new("Internal server error")
                },
            ),
            AppError::Unhandled(e) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new(e)),
        };

        (status_code, Json(error_response)).into_response()
    }
}

impl From<CommentError> for AppError {
    fn from(e: CommentError) -> Self {
        AppError::Comment(e)
    }
}

impl From<crate::identity::AuthenticationError> for AppError {
    fn from(e: crate::identity::AuthenticationError) -> Self {
        AppError::Auth(e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::server(ServerError::Store(e))
    }
}

impl From<CmsError> for AppError {
    fn from(e: CmsError) -> Self {
        AppError::server(ServerError::Store(StoreError::from(e)))
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        AppError::server(ServerError::AuthService(e))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::server(ServerError::Http(e))
    }
}

impl From<&'static str> for AppError {
    fn from(e: &'static str) -> Self {
        AppError::Unhandled(e.into())
    }
}

impl From<String> for AppError {
    fn from(e: String) -> Self {
        AppError::Unhandled(e)
    }
}

impl From<(&'static str, StatusCode)> for AppError {
    fn from((message, status): (&'static str, StatusCode)) -> Self {
        AppError::Request {
            message: message.into(),
            status,
        }
    }
}

impl From<(String, StatusCode)> for AppError {
    fn from((message, status): (String, StatusCode)) -> Self {
        AppError::Request { message, status }
    }
}

#[derive(Serialize, Debug)]
struct FrameInfo {
    name: String,
    loc: String,
}

fn filter_backtrace(backtrace: &backtrace::Backtrace) -> Vec<FrameInfo> {
    const MODULE_PREFIX: &str = concat!(env!("CARGO_PKG_NAME"), "::");
    let mut frames_info: Vec<FrameInfo> = Vec::new();

    for frame in backtrace.frames() {
        for symbol in frame.symbols() {
            if let (Some(name), Some(filename), Some(lineno)) = (
                symbol.name().map(|n| n.to_string()),
                symbol.filename().map(|f| f.to_owned()),
                symbol.lineno(),
            ) {
                if name.contains(MODULE_PREFIX) {
                    frames_info.push(FrameInfo {
                        name,
                        loc: format!("{}:{}", filename.display(), lineno),
                    });
                }
            }
        }
    }

    frames_info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_error_status_mapping() {
        assert_eq!(
            CommentError::validation("Missing fields.").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CommentError::SignInRequired.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(CommentError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(CommentError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            CommentError::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            CommentError::StoreUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn rate_limited_message_is_distinct() {
        // The throttle message must be tellable apart from a generic failure.
        let rate_limited = CommentError::RateLimited.to_string();
        assert_ne!(rate_limited, CommentError::Forbidden.to_string());
        assert!(rate_limited.contains("wait"));
    }
}
