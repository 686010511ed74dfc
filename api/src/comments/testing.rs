//! In-memory store and app fixtures for handler tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::{
    App,
    config::{Env, ServerConfig},
    identity::SessionIdentity,
};

use super::limiter::RateLimiter;
use super::store::{
    CommentDocument, CommentRecord, CommentStore, NewComment, OwnerClaim, PostAuthor, StoreError,
};

#[derive(Default)]
pub struct MockStore {
    pub records: Vec<CommentRecord>,
    pub documents: HashMap<String, CommentDocument>,
    pub author: Option<PostAuthor>,
    pub created: Mutex<Vec<NewComment>>,
    pub edits: Mutex<Vec<(String, String, OwnerClaim)>>,
    pub deletes: Mutex<Vec<(String, OwnerClaim)>>,
}

#[async_trait]
impl CommentStore for MockStore {
    async fn comments_for_post(&self, _post_id: &str) -> Result<Vec<CommentRecord>, StoreError> {
        Ok(self.records.clone())
    }

    async fn create_comment(&self, comment: NewComment) -> Result<CommentRecord, StoreError> {
        let record = CommentRecord {
            id: format!("mock-{}", self.created.lock().unwrap().len() + 1),
            name: comment.name.clone(),
            email: comment.email.clone(),
            user_id: comment.user_id.clone(),
            body: comment.body.clone(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            edited_at: None,
            deleted_at: None,
            is_staff: comment.is_staff,
            staff_author_id: comment.staff_author_id.clone(),
            parent_id: comment.parent_id.clone(),
        };
        self.created.lock().unwrap().push(comment);

        Ok(record)
    }

    async fn get_comment(&self, id: &str) -> Result<Option<CommentDocument>, StoreError> {
        Ok(self.documents.get(id).cloned())
    }

    async fn mark_edited(
        &self,
        doc: &CommentDocument,
        body: &str,
        claim: &OwnerClaim,
    ) -> Result<(), StoreError> {
        self.edits
            .lock()
            .unwrap()
            .push((doc.id.clone(), body.to_string(), claim.clone()));

        Ok(())
    }

    async fn mark_deleted(
        &self,
        doc: &CommentDocument,
        claim: &OwnerClaim,
    ) -> Result<(), StoreError> {
        self.deletes
            .lock()
            .unwrap()
            .push((doc.id.clone(), claim.clone()));

        Ok(())
    }

    async fn post_author(&self, _post_id: &str) -> Result<Option<PostAuthor>, StoreError> {
        Ok(self.author.clone())
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        env: Env::Dev,
        port: 3000,
        site_url: "http://localhost:3000".to_string(),
        cms: None,
        auth: None,
        trusted_proxies: vec![],
    }
}

pub fn test_app(store: Option<Arc<dyn CommentStore>>) -> App {
    App {
        config: Arc::new(test_config()),
        http: reqwest::Client::new(),
        store,
        identity_provider: None,
        limiter: Arc::new(RateLimiter::new(Duration::from_secs(60))),
    }
}

pub fn identity(subject_id: &str, email: &str) -> SessionIdentity {
    SessionIdentity {
        subject_id: subject_id.to_string(),
        email: email.to_string(),
    }
}

pub fn document(id: &str, user_id: Option<&str>, email: Option<&str>) -> CommentDocument {
    CommentDocument {
        id: id.to_string(),
        doc_type: "comment".to_string(),
        email: email.map(str::to_string),
        user_id: user_id.map(str::to_string),
        deleted_at: None,
    }
}
