use std::sync::LazyLock;

use axum::{Json, debug_handler, extract::State, http::HeaderMap};
use regex::Regex;

use crate::{
    App,
    error::{AppError, CommentError},
    identity::MaybeAuthUser,
    real_ip::{ClientIp, ip_hash},
};

use super::ownership::verified_author;
use super::protocol::{CommentAck, CommentPayload, CreatedComment};
use super::store::NewComment;

static LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bhttps?://|\bwww\.").unwrap());

fn link_count(body: &str) -> usize {
    LINK_PATTERN.find_iter(body).count()
}

/// Gate order is deliberate: availability, bot filtering, field validation,
/// identity, throttling, then persistence. A bot should learn nothing and a
/// visitor should not burn a rate-limit slot on a typo.
#[debug_handler]
pub async fn create_comment(
    State(ctx): State<App>,
    ClientIp(ip): ClientIp,
    MaybeAuthUser(auth_user): MaybeAuthUser,
    headers: HeaderMap,
    crate::json::Json(payload): crate::json::Json<CommentPayload>,
) -> Result<Json<CommentAck>, AppError> {
    let Some(store) = &ctx.store else {
        return Err(CommentError::StoreUnavailable.into());
    };

    // Bots that fill the hidden field get a convincing yes and no comment.
    if payload.is_honeypot_tripped() {
        tracing::debug!(post_id = %payload.post_id, "honeypot tripped, dropping submission");
        return Ok(Json(CommentAck::ok()));
    }

    payload.validate()?;

    if link_count(&payload.body) > 1 {
        return Err(CommentError::Validation("Too many links.".into()).into());
    }

    let identity = auth_user.map_err(|_| CommentError::SignInRequired)?;

    // Both windows are consumed on the attempt: one per account, one per
    // source address so a signed-out-and-back-in visitor stays throttled.
    let ip_hash = ip_hash(&ip);
    let per_user = ctx
        .limiter
        .check_and_record(&format!("user:{}", identity.subject_id));
    let per_ip = ctx.limiter.check_and_record(&format!("ip:{ip_hash}"));
    if !(per_user && per_ip) {
        return Err(CommentError::RateLimited.into());
    }

    // A commenter whose verified email is the post author's publishes under
    // the author's canonical byline.
    let author = store.post_author(&payload.post_id).await?;
    let staff = verified_author(author.as_ref(), &identity.email);

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let name = match &staff {
        Some(author) => author.name.clone(),
        None => payload.name.clone(),
    };

    let record = store
        .create_comment(NewComment {
            post_id: payload.post_id.clone(),
            parent_id: payload.parent_id.clone(),
            name,
            email: Some(identity.email.clone()),
            user_id: Some(identity.subject_id.clone()),
            body: payload.body.clone(),
            is_staff: staff.is_some(),
            staff_author_id: staff.map(|a| a.id),
            ip_hash,
            user_agent,
        })
        .await?;

    Ok(Json(CommentAck::created(CreatedComment {
        id: record.id,
        name: record.name,
        body: record.body,
        created_at: record.created_at,
        parent_id: record.parent_id,
        is_staff: record.is_staff,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    use crate::comments::store::PostAuthor;
    use crate::comments::testing::{MockStore, identity, test_app};
    use crate::identity::AuthenticationError;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9))
    }

    fn payload(name: &str, body: &str) -> CommentPayload {
        CommentPayload {
            post_id: "post-1".to_string(),
            name: name.to_string(),
            body: body.to_string(),
            email: None,
            parent_id: None,
            website: None,
        }
    }

    async fn submit(
        app: &App,
        auth: Result<crate::identity::SessionIdentity, AuthenticationError>,
        payload: CommentPayload,
    ) -> Result<Json<CommentAck>, AppError> {
        create_comment(
            State(app.clone()),
            ClientIp(ip()),
            MaybeAuthUser(auth),
            HeaderMap::new(),
            crate::json::Json(payload),
        )
        .await
    }

    #[tokio::test]
    async fn unconfigured_store_is_unavailable() {
        let app = test_app(None);

        let err = submit(&app, Ok(identity("u1", "a@example.com")), payload("Ada", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn honeypot_acks_without_persisting() {
        let store = Arc::new(MockStore::default());
        let app = test_app(Some(store.clone()));

        let mut p = payload("Ada", "hi");
        p.website = Some("https://spam.example".to_string());

        let Json(ack) = submit(&app, Ok(identity("u1", "a@example.com")), p)
            .await
            .unwrap();
        assert!(ack.ok);
        assert!(ack.comment.is_none());
        assert!(store.created.lock().unwrap().is_empty(), "nothing stored");
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let app = test_app(Some(Arc::new(MockStore::default())));

        let err = submit(&app, Ok(identity("u1", "a@example.com")), payload("", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(matches!(
            err,
            AppError::Comment(CommentError::Validation(ref m)) if m == "Missing fields."
        ));
    }

    #[tokio::test]
    async fn second_link_is_spam() {
        let app = test_app(Some(Arc::new(MockStore::default())));
        let auth = Ok(identity("u1", "a@example.com"));

        let one = payload("Ada", "see https://example.com/a");
        assert!(submit(&app, auth.clone(), one).await.is_ok());

        let two = payload("Ada", "see https://example.com/a and WWW.example.org");
        let err = submit(&app, auth, two).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Comment(CommentError::Validation(ref m)) if m == "Too many links."
        ));
    }

    #[tokio::test]
    async fn anonymous_submission_requires_sign_in() {
        let app = test_app(Some(Arc::new(MockStore::default())));

        let err = submit(&app, Err(AuthenticationError::NoBearer), payload("Ada", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
        assert!(matches!(err, AppError::Comment(CommentError::SignInRequired)));
    }

    #[tokio::test]
    async fn same_user_is_throttled_within_window() {
        let app = test_app(Some(Arc::new(MockStore::default())));
        let auth = Ok(identity("u1", "a@example.com"));

        assert!(submit(&app, auth.clone(), payload("Ada", "one")).await.is_ok());

        let err = submit(&app, auth, payload("Ada", "two")).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn same_address_is_throttled_across_accounts() {
        let app = test_app(Some(Arc::new(MockStore::default())));

        assert!(
            submit(&app, Ok(identity("u1", "a@example.com")), payload("Ada", "one"))
                .await
                .is_ok()
        );

        // Fresh account, same source address.
        let err = submit(&app, Ok(identity("u2", "b@example.com")), payload("Eve", "two"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn stores_identity_alongside_the_comment() {
        let store = Arc::new(MockStore::default());
        let app = test_app(Some(store.clone()));

        let mut p = payload("Ada", "hello there");
        p.parent_id = Some("c-parent".to_string());

        let Json(ack) = submit(&app, Ok(identity("u1", "ada@example.com")), p)
            .await
            .unwrap();

        let created = store.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].user_id.as_deref(), Some("u1"));
        assert_eq!(created[0].email.as_deref(), Some("ada@example.com"));
        assert_eq!(created[0].name, "Ada");
        assert!(!created[0].is_staff);
        assert!(!created[0].ip_hash.is_empty());

        let comment = ack.comment.unwrap();
        assert_eq!(comment.parent_id.as_deref(), Some("c-parent"));
    }

    #[tokio::test]
    async fn post_author_gets_the_canonical_byline() {
        let store = Arc::new(MockStore {
            author: Some(PostAuthor {
                id: "author-1".to_string(),
                name: "Site Author".to_string(),
                email: Some("author@example.com".to_string()),
            }),
            ..Default::default()
        });
        let app = test_app(Some(store.clone()));

        let Json(ack) = submit(
            &app,
            Ok(identity("u1", "Author@Example.com")),
            payload("whatever i typed", "welcome!"),
        )
        .await
        .unwrap();

        let created = store.created.lock().unwrap();
        assert!(created[0].is_staff);
        assert_eq!(created[0].name, "Site Author");
        assert_eq!(created[0].staff_author_id.as_deref(), Some("author-1"));

        let comment = ack.comment.unwrap();
        assert!(comment.is_staff);
        assert_eq!(comment.name, "Site Author");
    }

    #[tokio::test]
    async fn captures_the_user_agent_when_present() {
        let store = Arc::new(MockStore::default());
        let app = test_app(Some(store.clone()));

        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::USER_AGENT, "Mozilla/5.0".parse().unwrap());

        create_comment(
            State(app.clone()),
            ClientIp(ip()),
            MaybeAuthUser(Ok(identity("u1", "a@example.com"))),
            headers,
            crate::json::Json(payload("Ada", "hi")),
        )
        .await
        .unwrap();

        let created = store.created.lock().unwrap();
        assert_eq!(created[0].user_agent.as_deref(), Some("Mozilla/5.0"));
    }
}
