//! Comment persistence against the headless CMS. Comments are ordinary CMS
//! documents: created pre-approved, moderated by flipping `status` in the
//! studio, and soft-deleted by blanking the body so replies keep their
//! anchor. Everything the handlers need goes through [`CommentStore`], which
//! keeps the HTTP layer testable without a CMS.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use const_format::concatcp;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::cms::{self, CmsError};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Cms(#[from] CmsError),

    #[error("comment store backend error: {0}")]
    Backend(String),
}

/// One comment as the list query projects it. Carries the private ownership
/// fields; they feed authorization and never reach the wire.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub staff_author_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl CommentRecord {
    /// Deleted comments render as tombstones no matter what the stored body
    /// says; a studio edit must not resurrect the text.
    pub fn display_body(&self) -> &str {
        if self.deleted_at.is_some() {
            ""
        } else {
            &self.body
        }
    }
}

/// The raw document behind one comment, fetched when gating a mutation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_type")]
    pub doc_type: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CommentDocument {
    pub fn is_comment(&self) -> bool {
        self.doc_type == "comment"
    }
}

/// Everything the create handler resolved about a submission.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub body: String,
    pub is_staff: bool,
    pub staff_author_id: Option<String>,
    pub ip_hash: String,
    pub user_agent: Option<String>,
}

/// The identity performing a mutation, used to backfill ownership onto
/// documents created before accounts carried a subject id.
#[derive(Debug, Clone)]
pub struct OwnerClaim {
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostAuthor {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Approved comments for a post, oldest first.
    async fn comments_for_post(&self, post_id: &str) -> Result<Vec<CommentRecord>, StoreError>;

    async fn create_comment(&self, comment: NewComment) -> Result<CommentRecord, StoreError>;

    async fn get_comment(&self, id: &str) -> Result<Option<CommentDocument>, StoreError>;

    async fn mark_edited(
        &self,
        doc: &CommentDocument,
        body: &str,
        claim: &OwnerClaim,
    ) -> Result<(), StoreError>;

    async fn mark_deleted(&self, doc: &CommentDocument, claim: &OwnerClaim)
    -> Result<(), StoreError>;

    async fn post_author(&self, post_id: &str) -> Result<Option<PostAuthor>, StoreError>;
}

// `coalesce` pins the two fields older documents may carry as null.
const COMMENT_PROJECTION: &str = "{\
_id, name, email, userId, \
\"body\": coalesce(body, \"\"), \
createdAt, editedAt, deletedAt, \
\"isStaff\": coalesce(isStaff, false), \
\"staffAuthorId\": staffAuthor._ref, \
\"parentId\": parent._ref\
}";

pub(crate) const COMMENTS_FOR_POST_QUERY: &str = concatcp!(
    "*[_type == \"comment\" && post._ref == $postId && status == \"approved\"] \
     | order(createdAt asc) ",
    COMMENT_PROJECTION
);

const POST_AUTHOR_QUERY: &str =
    "*[_type == \"post\" && _id == $postId][0]{\"author\": author->{_id, name, email}}";

pub struct CmsCommentStore {
    cms: cms::Client,
}

impl CmsCommentStore {
    pub fn new(cms: cms::Client) -> Self {
        CmsCommentStore { cms }
    }
}

fn reference(id: &str) -> Value {
    json!({ "_type": "reference", "_ref": id })
}

/// The document a submission becomes. Optional fields stay off the document
/// entirely instead of being stored as null.
fn new_comment_document(comment: &NewComment, created_at: DateTime<Utc>) -> Value {
    let mut document = json!({
        "_type": "comment",
        "post": reference(&comment.post_id),
        "name": comment.name,
        "body": comment.body,
        "status": "approved",
        "createdAt": created_at,
        "ipHash": comment.ip_hash,
    });

    if let Some(parent_id) = &comment.parent_id {
        document["parent"] = reference(parent_id);
    }
    if let Some(email) = &comment.email {
        document["email"] = json!(email);
    }
    if let Some(user_id) = &comment.user_id {
        document["userId"] = json!(user_id);
    }
    if comment.is_staff {
        document["isStaff"] = json!(true);
        if let Some(author_id) = &comment.staff_author_id {
            document["staffAuthor"] = reference(author_id);
        }
    }
    if let Some(user_agent) = &comment.user_agent {
        document["userAgent"] = json!(user_agent);
    }

    document
}

/// Patch fields for an edit. Ownership backfill is one-way: fields already
/// on the document are kept, absent ones are claimed by the editor.
fn edit_fields(
    doc: &CommentDocument,
    body: &str,
    claim: &OwnerClaim,
    edited_at: DateTime<Utc>,
) -> Value {
    json!({
        "body": body,
        "editedAt": edited_at,
        "userId": doc.user_id.as_deref().unwrap_or(&claim.user_id),
        "email": doc.email.as_deref().unwrap_or(&claim.email),
    })
}

/// Patch fields for a soft delete: blank body, deletion timestamp, and the
/// same one-way ownership backfill as edits.
fn delete_fields(doc: &CommentDocument, claim: &OwnerClaim, deleted_at: DateTime<Utc>) -> Value {
    json!({
        "body": "",
        "deletedAt": deleted_at,
        "userId": doc.user_id.as_deref().unwrap_or(&claim.user_id),
        "email": doc.email.as_deref().unwrap_or(&claim.email),
    })
}

#[derive(Deserialize)]
struct AuthorEnvelope {
    #[serde(default)]
    author: Option<RawAuthor>,
}

#[derive(Deserialize)]
struct RawAuthor {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(default)]
    email: Option<String>,
}

/// A created document as the mutation API returns it, with the parent still
/// a reference object rather than the query-time `parentId` alias.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCommentDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    body: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    is_staff: bool,
    #[serde(default)]
    staff_author: Option<RawReference>,
    #[serde(default)]
    parent: Option<RawReference>,
}

#[derive(Deserialize)]
struct RawReference {
    #[serde(rename = "_ref")]
    target: String,
}

impl From<RawCommentDocument> for CommentRecord {
    fn from(raw: RawCommentDocument) -> Self {
        CommentRecord {
            id: raw.id,
            name: raw.name,
            email: raw.email,
            user_id: raw.user_id,
            body: raw.body,
            created_at: raw.created_at,
            edited_at: None,
            deleted_at: None,
            is_staff: raw.is_staff,
            staff_author_id: raw.staff_author.map(|r| r.target),
            parent_id: raw.parent.map(|r| r.target),
        }
    }
}

#[async_trait]
impl CommentStore for CmsCommentStore {
    async fn comments_for_post(&self, post_id: &str) -> Result<Vec<CommentRecord>, StoreError> {
        Ok(self
            .cms
            .query(COMMENTS_FOR_POST_QUERY, &[("postId", json!(post_id))])
            .await?)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<CommentRecord, StoreError> {
        let document = new_comment_document(&comment, Utc::now());
        let created: RawCommentDocument = self.cms.create(document).await?;

        Ok(created.into())
    }

    async fn get_comment(&self, id: &str) -> Result<Option<CommentDocument>, StoreError> {
        Ok(self.cms.get_document(id).await?)
    }

    async fn mark_edited(
        &self,
        doc: &CommentDocument,
        body: &str,
        claim: &OwnerClaim,
    ) -> Result<(), StoreError> {
        self.cms
            .patch(&doc.id)
            .set(edit_fields(doc, body, claim, Utc::now()))
            .commit()
            .await?;

        Ok(())
    }

    async fn mark_deleted(
        &self,
        doc: &CommentDocument,
        claim: &OwnerClaim,
    ) -> Result<(), StoreError> {
        self.cms
            .patch(&doc.id)
            .set(delete_fields(doc, claim, Utc::now()))
            .commit()
            .await?;

        Ok(())
    }

    async fn post_author(&self, post_id: &str) -> Result<Option<PostAuthor>, StoreError> {
        let envelope: Option<AuthorEnvelope> = self
            .cms
            .query(POST_AUTHOR_QUERY, &[("postId", json!(post_id))])
            .await?;

        Ok(envelope.and_then(|e| e.author).map(|a| PostAuthor {
            id: a.id,
            name: a.name,
            email: a.email,
        }))
    }
}
