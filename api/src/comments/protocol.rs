//! The submission protocol shared by the HTTP handlers and the thread
//! controller: payload shapes, acknowledgements, local validation, and the
//! client-side lifecycle of one in-flight submission. Keeping both sides on
//! one definition is what stops the composer and the API from drifting apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CommentError;

pub const MAX_COMMENT_LENGTH: usize = 2000;

/// Body of `POST /comments`. `website` is a honeypot: the form never shows
/// it, so anything filling it in is automation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentPayload {
    #[serde(default)]
    pub post_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub body: String,

    /// Accepted for older clients that still send it; the stored email is
    /// always the verified session email, never this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl CommentPayload {
    pub fn is_honeypot_tripped(&self) -> bool {
        self.website.as_deref().is_some_and(|w| !w.is_empty())
    }

    /// Field checks applied identically in the composer and on the server.
    /// Empty means the field was omitted or sent as `""`; a body of pure
    /// whitespace passes the presence check but fails the content one.
    pub fn validate(&self) -> Result<(), CommentError> {
        if self.name.is_empty() || self.body.is_empty() || self.post_id.is_empty() {
            return Err(CommentError::Validation("Missing fields.".into()));
        }
        if self.body.chars().count() > MAX_COMMENT_LENGTH {
            return Err(CommentError::Validation("Comment is too long.".into()));
        }
        if self.body.trim().is_empty() {
            return Err(CommentError::Validation("Comment is required.".into()));
        }

        Ok(())
    }
}

/// Body of `PATCH /comments/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EditPayload {
    #[serde(default)]
    pub body: String,
}

impl EditPayload {
    pub fn validate(&self) -> Result<(), CommentError> {
        if self.body.trim().is_empty() {
            return Err(CommentError::Validation("Comment is required.".into()));
        }
        if self.body.chars().count() > MAX_COMMENT_LENGTH {
            return Err(CommentError::Validation("Comment is too long.".into()));
        }

        Ok(())
    }
}

/// Every mutation answers `{"ok": true}`; creation additionally echoes the
/// stored comment so the client can splice it into the thread without a
/// refetch. The honeypot path answers the bare ack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentAck {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<CreatedComment>,
}

impl CommentAck {
    pub fn ok() -> Self {
        CommentAck {
            ok: true,
            comment: None,
        }
    }

    pub fn created(comment: CreatedComment) -> Self {
        CommentAck {
            ok: true,
            comment: Some(comment),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedComment {
    pub id: String,
    pub name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_staff: bool,
}

/// Lifecycle of the one submission a client may have in flight. Terminal
/// states stick around for display and reset to `Idle` on the next action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmissionStatus {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed(String),
}

impl SubmissionStatus {
    pub fn is_submitting(&self) -> bool {
        matches!(self, SubmissionStatus::Submitting)
    }
}
