use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    App,
    error::{AppError, CommentError},
    identity::{MaybeAuthUser, SessionIdentity},
};

use super::ownership::{Ownership, can_mutate};
use super::store::CommentRecord;
use super::tree::{CommentForest, FlatComment, ThreadedComment};

/// Approved comments for a post as a nested thread. `isOwner` is computed
/// here against the viewer's session; the ownership fields themselves stay
/// on the server.
pub async fn get_comments(
    State(ctx): State<App>,
    Path(post_id): Path<String>,
    MaybeAuthUser(auth_user): MaybeAuthUser,
) -> Result<Json<Vec<ThreadedComment>>, AppError> {
    let Some(store) = &ctx.store else {
        return Err(CommentError::StoreUnavailable.into());
    };

    let viewer = auth_user.ok();
    let records = store.comments_for_post(&post_id).await?;

    let flat = records
        .into_iter()
        .map(|record| to_flat(record, viewer.as_ref()))
        .collect();

    Ok(Json(CommentForest::build(flat).to_nested()))
}

fn to_flat(record: CommentRecord, viewer: Option<&SessionIdentity>) -> FlatComment {
    let is_owner = can_mutate(
        Ownership::of(record.user_id.as_deref(), record.email.as_deref()),
        viewer,
    );
    let body = record.display_body().to_string();

    FlatComment {
        id: record.id,
        parent_id: record.parent_id,
        name: record.name,
        body,
        created_at: record.created_at,
        edited_at: record.edited_at,
        deleted_at: record.deleted_at,
        is_staff: record.is_staff,
        is_owner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use crate::comments::testing::{MockStore, identity, test_app};
    use crate::identity::AuthenticationError;

    fn record(
        id: &str,
        parent_id: Option<&str>,
        user_id: Option<&str>,
        email: Option<&str>,
    ) -> CommentRecord {
        CommentRecord {
            id: id.to_string(),
            name: format!("Author {id}"),
            email: email.map(str::to_string),
            user_id: user_id.map(str::to_string),
            body: format!("Body {id}"),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
            edited_at: None,
            deleted_at: None,
            is_staff: false,
            staff_author_id: None,
            parent_id: parent_id.map(str::to_string),
        }
    }

    async fn list(
        app: &App,
        auth: Result<SessionIdentity, AuthenticationError>,
    ) -> Result<Json<Vec<ThreadedComment>>, AppError> {
        get_comments(
            State(app.clone()),
            Path("post-1".to_string()),
            MaybeAuthUser(auth),
        )
        .await
    }

    #[tokio::test]
    async fn unconfigured_store_is_unavailable() {
        let app = test_app(None);
        let err = list(&app, Err(AuthenticationError::NoBearer)).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn threads_replies_and_hides_private_fields() {
        let store = Arc::new(MockStore {
            records: vec![
                record("c1", None, Some("u1"), Some("ada@example.com")),
                record("c2", Some("c1"), None, None),
            ],
            ..Default::default()
        });
        let app = test_app(Some(store));

        let Json(thread) = list(&app, Err(AuthenticationError::NoBearer)).await.unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].replies[0].id, "c2");

        let wire = serde_json::to_string(&thread).unwrap();
        assert!(!wire.contains("email"), "emails must not reach the wire");
        assert!(!wire.contains("userId"));
        assert!(!wire.contains("ada@example.com"));
    }

    #[tokio::test]
    async fn owner_flag_follows_the_viewer() {
        let store = Arc::new(MockStore {
            records: vec![
                record("mine", None, Some("u1"), Some("ada@example.com")),
                record("claimable", None, None, Some("ada@example.com")),
                record("theirs", None, Some("u2"), None),
            ],
            ..Default::default()
        });
        let app = test_app(Some(store));

        let Json(thread) = list(&app, Ok(identity("u1", "ada@example.com")))
            .await
            .unwrap();
        let owned: Vec<_> = thread.iter().map(|c| (c.id.as_str(), c.is_owner)).collect();
        assert_eq!(
            owned,
            vec![("mine", true), ("claimable", true), ("theirs", false)]
        );
    }

    #[tokio::test]
    async fn anonymous_viewer_owns_nothing() {
        let store = Arc::new(MockStore {
            records: vec![record("c1", None, Some("u1"), Some("ada@example.com"))],
            ..Default::default()
        });
        let app = test_app(Some(store));

        let Json(thread) = list(&app, Err(AuthenticationError::NoBearer)).await.unwrap();
        assert!(!thread[0].is_owner);
    }

    #[tokio::test]
    async fn deleted_comment_is_blank_but_keeps_replies() {
        let mut deleted = record("c1", None, Some("u1"), None);
        deleted.deleted_at = Some(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());
        // Body left non-empty on purpose; the tombstone must win.

        let store = Arc::new(MockStore {
            records: vec![deleted, record("c2", Some("c1"), None, None)],
            ..Default::default()
        });
        let app = test_app(Some(store));

        let Json(thread) = list(&app, Err(AuthenticationError::NoBearer)).await.unwrap();
        assert_eq!(thread[0].body, "");
        assert!(thread[0].deleted_at.is_some());
        assert_eq!(thread[0].replies.len(), 1);
    }
}
