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
use super::protocol::{CommentAck, EditPayload};
use super::store::OwnerClaim;

#[debug_handler]
pub async fn patch_comment(
    State(ctx): State<App>,
    Path(id): Path<String>,
    MaybeAuthUser(auth_user): MaybeAuthUser,
    crate::json::Json(payload): crate::json::Json<EditPayload>,
) -> Result<Json<CommentAck>, AppError> {
    let Some(store) = &ctx.store else {
        return Err(CommentError::StoreUnavailable.into());
    };
    let identity = auth_user.map_err(|_| CommentError::SignInRequired)?;

    payload.validate()?;

    // Wrong document type answers the same 404 as a missing one, so ids of
    // other document kinds cannot be probed.
    let Some(doc) = store.get_comment(&id).await?.filter(|d| d.is_comment()) else {
        return Err(CommentError::NotFound.into());
    };

    if !can_mutate(
        Ownership::of(doc.user_id.as_deref(), doc.email.as_deref()),
        Some(&identity),
    ) {
        return Err(CommentError::Forbidden.into());
    }

    let claim = OwnerClaim {
        user_id: identity.subject_id,
        email: identity.email,
    };
    store.mark_edited(&doc, &payload.body, &claim).await?;

    Ok(Json(CommentAck::ok()))
}
