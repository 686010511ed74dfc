//! Client-side thread state machine. The controller owns the live forest a
//! reader sees under a post and everything around it: which reply composer
//! is open, which reply lists are expanded, the in-place edit buffer, the
//! delete confirmation, the sign-in prompt, and the single in-flight
//! submission.
//!
//! It is deliberately runtime-free: user events go in through [`apply`],
//! which may hand back a [`Command`] for the host to run against the API,
//! and the host feeds the outcome back through [`resolve`]. All timestamps
//! arrive from outside, so the controller never reads a clock and every
//! transition is reproducible in tests.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::identity::SessionIdentity;

use super::protocol::{CommentPayload, CreatedComment, EditPayload, SubmissionStatus};
use super::tree::{CommentForest, CommentNode, FlatComment, ThreadedComment};

/// A user event. Anything that needs the network comes back out as a
/// [`Command`]; everything else settles locally.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open the reply composer under a comment.
    OpenReply(String),
    CancelReply,
    /// Expand or collapse a comment's reply list.
    ToggleReplies(String),
    /// Submit the open composer: a reply when one is targeted, a top-level
    /// comment otherwise.
    Submit { name: String, body: String },
    /// Start editing an owned comment in place.
    BeginEdit(String),
    UpdateEditDraft(String),
    CancelEdit,
    SubmitEdit,
    /// Ask for delete confirmation on an owned comment.
    RequestDelete(String),
    CancelDelete,
    ConfirmDelete,
    DismissSignIn,
}

/// A network call the host must perform on the controller's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SubmitComment(CommentPayload),
    SubmitEdit { id: String, payload: EditPayload },
    SubmitDelete { id: String },
}

/// The outcome of a [`Command`], fed back by the host. Timestamps for edits
/// and deletes come from the host because the server acks those without a
/// body.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Created(CreatedComment),
    Edited {
        id: String,
        body: String,
        edited_at: DateTime<Utc>,
    },
    Deleted {
        id: String,
        deleted_at: DateTime<Utc>,
    },
    Failed(String),
}

#[derive(Debug, Clone)]
struct EditBuffer {
    id: String,
    draft: String,
}

pub struct ThreadController {
    post_id: String,
    forest: CommentForest,
    identity: Option<SessionIdentity>,
    reply_target: Option<String>,
    expanded: HashSet<String>,
    edit: Option<EditBuffer>,
    pending_delete: Option<String>,
    sign_in_prompt: bool,
    status: SubmissionStatus,
}

impl ThreadController {
    pub fn new(
        post_id: String,
        forest: CommentForest,
        identity: Option<SessionIdentity>,
    ) -> Self {
        ThreadController {
            post_id,
            forest,
            identity,
            reply_target: None,
            expanded: HashSet::new(),
            edit: None,
            pending_delete: None,
            sign_in_prompt: false,
            status: SubmissionStatus::Idle,
        }
    }

    /// Builds a controller straight from the listing endpoint's nested
    /// response.
    pub fn hydrate(
        post_id: String,
        thread: Vec<ThreadedComment>,
        identity: Option<SessionIdentity>,
    ) -> Self {
        let mut flat = Vec::new();
        let mut stack: Vec<(ThreadedComment, Option<String>)> =
            thread.into_iter().rev().map(|c| (c, None)).collect();

        while let Some((comment, parent_id)) = stack.pop() {
            let ThreadedComment {
                id,
                name,
                body,
                created_at,
                edited_at,
                deleted_at,
                is_staff,
                is_owner,
                replies,
            } = comment;

            for reply in replies.into_iter().rev() {
                stack.push((reply, Some(id.clone())));
            }

            flat.push(FlatComment {
                id,
                parent_id,
                name,
                body,
                created_at,
                edited_at,
                deleted_at,
                is_staff,
                is_owner,
            });
        }

        ThreadController::new(post_id, CommentForest::build(flat), identity)
    }

    /// Feeds one user event through the machine. A leftover success or
    /// failure banner clears first; a submission already in flight swallows
    /// further submit events.
    pub fn apply(&mut self, action: Action) -> Option<Command> {
        if matches!(
            self.status,
            SubmissionStatus::Succeeded | SubmissionStatus::Failed(_)
        ) {
            self.status = SubmissionStatus::Idle;
        }

        match action {
            Action::OpenReply(id) => {
                if self.identity.is_none() {
                    self.sign_in_prompt = true;
                    return None;
                }
                if self.forest.get(&id).is_some() {
                    self.reply_target = Some(id);
                }
                None
            }
            Action::CancelReply => {
                self.reply_target = None;
                None
            }
            Action::ToggleReplies(id) => {
                let Some(node) = self.forest.get(&id) else {
                    return None;
                };
                // Top-level reply lists are always visible; only deeper ones
                // toggle.
                if node.parent.is_none() || node.replies.is_empty() {
                    return None;
                }
                if !self.expanded.insert(id.clone()) {
                    self.expanded.remove(&id);
                }
                None
            }
            Action::Submit { name, body } => {
                if self.status.is_submitting() {
                    return None;
                }
                if self.identity.is_none() {
                    self.sign_in_prompt = true;
                    return None;
                }

                let payload = CommentPayload {
                    post_id: self.post_id.clone(),
                    name,
                    body,
                    email: None,
                    parent_id: self.reply_target.clone(),
                    website: None,
                };
                if let Err(e) = payload.validate() {
                    self.status = SubmissionStatus::Failed(e.to_string());
                    return None;
                }

                self.status = SubmissionStatus::Submitting;
                Some(Command::SubmitComment(payload))
            }
            Action::BeginEdit(id) => {
                let Some(node) = self.forest.get(&id) else {
                    return None;
                };
                if !node.comment.is_owner || node.is_tombstone() {
                    return None;
                }
                self.edit = Some(EditBuffer {
                    id,
                    draft: node.comment.body.clone(),
                });
                None
            }
            Action::UpdateEditDraft(draft) => {
                if let Some(edit) = &mut self.edit {
                    edit.draft = draft;
                }
                None
            }
            Action::CancelEdit => {
                self.edit = None;
                None
            }
            Action::SubmitEdit => {
                if self.status.is_submitting() {
                    return None;
                }
                let Some(edit) = &self.edit else {
                    return None;
                };

                let payload = EditPayload {
                    body: edit.draft.clone(),
                };
                if let Err(e) = payload.validate() {
                    self.status = SubmissionStatus::Failed(e.to_string());
                    return None;
                }

                self.status = SubmissionStatus::Submitting;
                Some(Command::SubmitEdit {
                    id: edit.id.clone(),
                    payload,
                })
            }
            Action::RequestDelete(id) => {
                let Some(node) = self.forest.get(&id) else {
                    return None;
                };
                if !node.comment.is_owner || node.is_tombstone() {
                    return None;
                }
                self.pending_delete = Some(id);
                None
            }
            Action::CancelDelete => {
                self.pending_delete = None;
                None
            }
            Action::ConfirmDelete => {
                if self.status.is_submitting() {
                    return None;
                }
                let id = self.pending_delete.clone()?;

                self.status = SubmissionStatus::Submitting;
                Some(Command::SubmitDelete { id })
            }
            Action::DismissSignIn => {
                self.sign_in_prompt = false;
                None
            }
        }
    }

    /// Applies a command's outcome. Success patches the forest in one step;
    /// failure records the message and touches nothing else, so the view the
    /// user had stays intact.
    pub fn resolve(&mut self, update: Update) {
        match update {
            Update::Created(comment) => {
                let parent_id = comment.parent_id.clone();

                self.forest.insert(FlatComment {
                    id: comment.id,
                    parent_id: comment.parent_id,
                    name: comment.name,
                    body: comment.body,
                    created_at: comment.created_at,
                    edited_at: None,
                    deleted_at: None,
                    is_staff: comment.is_staff,
                    is_owner: true,
                });

                // The new reply must be on screen without another click.
                if let Some(parent_id) = parent_id {
                    self.expanded.insert(parent_id);
                }
                self.reply_target = None;
                self.status = SubmissionStatus::Succeeded;
            }
            Update::Edited {
                id,
                body,
                edited_at,
            } => {
                self.forest.apply_edit(&id, &body, edited_at);
                self.edit = None;
                self.status = SubmissionStatus::Succeeded;
            }
            Update::Deleted { id, deleted_at } => {
                self.forest.tombstone(&id, deleted_at);
                self.pending_delete = None;
                self.status = SubmissionStatus::Succeeded;
            }
            Update::Failed(message) => {
                self.status = SubmissionStatus::Failed(message);
            }
        }
    }

    pub fn forest(&self) -> &CommentForest {
        &self.forest
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    /// Swaps the signed-in identity, e.g. after the magic-link callback
    /// lands. Ownership flags on already-hydrated comments are the server's
    /// call and refresh on the next hydration.
    pub fn set_identity(&mut self, identity: Option<SessionIdentity>) {
        if identity.is_some() {
            self.sign_in_prompt = false;
        } else {
            self.reply_target = None;
            self.edit = None;
            self.pending_delete = None;
        }
        self.identity = identity;
    }

    pub fn can_act(&self) -> bool {
        self.identity.is_some()
    }

    pub fn status(&self) -> &SubmissionStatus {
        &self.status
    }

    pub fn sign_in_prompt(&self) -> bool {
        self.sign_in_prompt
    }

    pub fn reply_target(&self) -> Option<&str> {
        self.reply_target.as_deref()
    }

    pub fn editing(&self) -> Option<(&str, &str)> {
        self.edit.as_ref().map(|e| (e.id.as_str(), e.draft.as_str()))
    }

    pub fn pending_delete(&self) -> Option<&str> {
        self.pending_delete.as_deref()
    }

    fn replies_visible(&self, node: &CommentNode) -> bool {
        node.parent.is_none() || self.expanded.contains(&node.comment.id)
    }

    /// Whether a comment's replies are currently on screen.
    pub fn is_expanded(&self, id: &str) -> bool {
        self.forest
            .get(id)
            .is_some_and(|node| self.replies_visible(node))
    }

    /// How many replies hide behind the "show replies" affordance.
    pub fn hidden_reply_count(&self, id: &str) -> usize {
        match self.forest.get(id) {
            Some(node) if !self.replies_visible(node) => node.replies.len(),
            _ => 0,
        }
    }

    /// The render list: every comment currently on screen with its depth,
    /// in display order. Collapsed subtrees are skipped whole.
    pub fn visible_comments(&self) -> Vec<(&CommentNode, usize)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, usize)> = self
            .forest
            .roots()
            .iter()
            .rev()
            .map(|&root| (root, 0))
            .collect();

        while let Some((idx, depth)) = stack.pop() {
            let node = self.forest.node(idx);
            out.push((node, depth));

            if self.replies_visible(node) {
                for &reply in node.replies.iter().rev() {
                    stack.push((reply, depth + 1));
                }
            }
        }

        out
    }
}
