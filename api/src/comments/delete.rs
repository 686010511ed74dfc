use axum::{
    Json, debug_handler,
    extract::{Path, State},
};

use crate::{
    App,
    error::{AppError, CommentError},
    identity::MaybeAuthUser,
};

use super::ownership::{Ownership, can_mutate};
use super::protocol::CommentAck;
use super::store::OwnerClaim;

/// Soft delete. The document stays so replies keep their anchor; only the
/// body is cleared and `deletedAt` stamped.
#[debug_handler]
pub async fn delete_comment(
    State(ctx): State<App>,
    Path(id): Path<String>,
    MaybeAuthUser(auth_user): MaybeAuthUser,
) -> Result<Json<CommentAck>, AppError> {
    let Some(store) = &ctx.store else {
        return Err(CommentError::StoreUnavailable.into());
    };
    let identity = auth_user.map_err(|_| CommentError::SignInRequired)?;

    let Some(doc) = store.get_comment(&id).await?.filter(|d| d.is_comment()) else {
        return Err(CommentError::NotFound.into());
    };

    if !can_mutate(
        Ownership::of(doc.user_id.as_deref(), doc.email.as_deref()),
        Some(&identity),
    ) {
        return Err(CommentError::Forbidden.into());
    }

    // Deleting twice is fine and changes nothing.
    if doc.deleted_at.is_some() {
        return Ok(Json(CommentAck::ok()));
    }

    let claim = OwnerClaim {
        user_id: identity.subject_id,
        email: identity.email,
    };
    store.mark_deleted(&doc, &claim).await?;

    Ok(Json(CommentAck::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use crate::comments::testing::{MockStore, document, identity, test_app};
    use crate::identity::{AuthenticationError, SessionIdentity};

    async fn remove(
        app: &App,
        auth: Result<SessionIdentity, AuthenticationError>,
        id: &str,
    ) -> Result<Json<CommentAck>, AppError> {
        delete_comment(State(app.clone()), Path(id.to_string()), MaybeAuthUser(auth)).await
    }

    #[tokio::test]
    async fn anonymous_delete_is_unauthorized() {
        let app = test_app(Some(Arc::new(MockStore::default())));

        let err = remove(&app, Err(AuthenticationError::NoBearer), "c1")
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let app = test_app(Some(Arc::new(MockStore::default())));

        let err = remove(&app, Ok(identity("u1", "a@example.com")), "nope")
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_owner_is_forbidden() {
        let mut mock = MockStore::default();
        mock.documents
            .insert("c1".to_string(), document("c1", Some("u2"), Some("a@example.com")));
        let app = test_app(Some(Arc::new(mock)));

        // Email matches but the comment is bound to another subject.
        let err = remove(&app, Ok(identity("u1", "a@example.com")), "c1")
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn owner_delete_tombstones_with_claim() {
        let mut mock = MockStore::default();
        mock.documents
            .insert("c1".to_string(), document("c1", Some("u1"), None));
        let store = Arc::new(mock);
        let app = test_app(Some(store.clone()));

        let Json(ack) = remove(&app, Ok(identity("u1", "ada@example.com")), "c1")
            .await
            .unwrap();
        assert!(ack.ok);

        let deletes = store.deletes.lock().unwrap();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].0, "c1");
        assert_eq!(deletes[0].1.user_id, "u1");
    }

    #[tokio::test]
    async fn deleting_twice_is_a_noop() {
        let mut doc = document("c1", Some("u1"), None);
        doc.deleted_at = Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());

        let mut mock = MockStore::default();
        mock.documents.insert("c1".to_string(), doc);
        let store = Arc::new(mock);
        let app = test_app(Some(store.clone()));

        let Json(ack) = remove(&app, Ok(identity("u1", "ada@example.com")), "c1")
            .await
            .unwrap();
        assert!(ack.ok);
        assert!(store.deletes.lock().unwrap().is_empty(), "no second patch");
    }
}
