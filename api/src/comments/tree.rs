//! Flat-to-threaded comment assembly. The store hands back comments in
//! `created_at` order with only a parent reference; this module turns them
//! into a forest without losing rows whose parent is missing, moderated
//! away, or nonsensical.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One comment as the store returns it, plus the per-viewer flags the
/// handlers compute before building the thread.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatComment {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub is_staff: bool,
    pub is_owner: bool,
}

#[derive(Debug, Clone)]
pub struct CommentNode {
    pub comment: FlatComment,
    pub parent: Option<usize>,
    pub replies: Vec<usize>,
}

impl CommentNode {
    /// Deleted comments stay in the thread to anchor their replies; only
    /// their body is gone. An empty body renders the same placeholder even
    /// without a deletion stamp.
    pub fn is_tombstone(&self) -> bool {
        self.comment.deleted_at.is_some() || self.comment.body.is_empty()
    }
}

/// Index-based comment forest. Nodes live in one arena and refer to each
/// other by index, so reparenting and traversal never chase pointers and the
/// whole structure is plain data.
#[derive(Debug, Clone, Default)]
pub struct CommentForest {
    nodes: Vec<CommentNode>,
    index: HashMap<String, usize>,
    roots: Vec<usize>,
}

/// The nested shape the client renders. Replies are embedded in display
/// order; viewer-independent of everything except `is_owner`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadedComment {
    pub id: String,
    pub name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_staff: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_owner: bool,

    #[serde(default)]
    pub replies: Vec<ThreadedComment>,
}

impl CommentForest {
    /// Builds the forest in two phases: index every comment first, then
    /// attach each one to its parent. Order independent, so a reply that
    /// arrives before its parent in the input still finds it.
    ///
    /// A comment whose parent is unknown, itself, or an ancestor loop is
    /// promoted to a root rather than dropped.
    pub fn build(comments: Vec<FlatComment>) -> CommentForest {
        let mut forest = CommentForest {
            nodes: Vec::with_capacity(comments.len()),
            index: HashMap::with_capacity(comments.len()),
            roots: Vec::new(),
        };

        for comment in comments {
            let idx = forest.nodes.len();
            forest.index.insert(comment.id.clone(), idx);
            forest.nodes.push(CommentNode {
                comment,
                parent: None,
                replies: Vec::new(),
            });
        }

        for idx in 0..forest.nodes.len() {
            let target = forest.nodes[idx]
                .comment
                .parent_id
                .as_ref()
                .and_then(|parent_id| forest.index.get(parent_id).copied());

            match target {
                Some(parent) if parent != idx && !forest.creates_cycle(idx, parent) => {
                    forest.nodes[idx].parent = Some(parent);
                    forest.nodes[parent].replies.push(idx);
                }
                _ => forest.roots.push(idx),
            }
        }

        forest
    }

    /// True when `parent`'s ancestor chain already contains `child`.
    fn creates_cycle(&self, child: usize, parent: usize) -> bool {
        let mut cursor = Some(parent);
        let mut steps = 0;

        while let Some(at) = cursor {
            if at == child {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return true;
            }
            cursor = self.nodes[at].parent;
        }

        false
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn node(&self, idx: usize) -> &CommentNode {
        &self.nodes[idx]
    }

    pub fn get(&self, id: &str) -> Option<&CommentNode> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Inserts one comment after the fact, attaching it under its parent or
    /// as a root. Re-inserting an id the forest already holds replaces that
    /// comment in place, keeping its position and replies.
    pub fn insert(&mut self, comment: FlatComment) -> usize {
        if let Some(&existing) = self.index.get(&comment.id) {
            self.nodes[existing].comment = comment;
            return existing;
        }

        let idx = self.nodes.len();
        let parent = comment
            .parent_id
            .as_ref()
            .and_then(|parent_id| self.index.get(parent_id).copied());

        self.index.insert(comment.id.clone(), idx);
        self.nodes.push(CommentNode {
            comment,
            parent,
            replies: Vec::new(),
        });

        match parent {
            Some(parent) => self.nodes[parent].replies.push(idx),
            None => self.roots.push(idx),
        }

        idx
    }

    /// Rewrites a comment's body in place. Thread position, replies, and
    /// sibling order are untouched. `false` when the id is unknown.
    pub fn apply_edit(&mut self, id: &str, body: &str, edited_at: DateTime<Utc>) -> bool {
        let Some(&idx) = self.index.get(id) else {
            return false;
        };

        let comment = &mut self.nodes[idx].comment;
        comment.body = body.to_string();
        comment.edited_at = Some(edited_at);

        true
    }

    /// Turns a comment into a tombstone: body cleared, deletion recorded.
    /// Replies stay attached underneath it.
    pub fn tombstone(&mut self, id: &str, deleted_at: DateTime<Utc>) -> bool {
        let Some(&idx) = self.index.get(id) else {
            return false;
        };

        let comment = &mut self.nodes[idx].comment;
        comment.body = String::new();
        comment.deleted_at = Some(deleted_at);

        true
    }

    /// Display order: every node index paired with its depth, parents before
    /// replies, siblings in insertion order. Uses an explicit stack so thread
    /// depth never grows the call stack.
    pub fn pre_order(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&r| (r, 0)).collect();

        while let Some((idx, depth)) = stack.pop() {
            out.push((idx, depth));
            for &reply in self.nodes[idx].replies.iter().rev() {
                stack.push((reply, depth + 1));
            }
        }

        out
    }

    pub fn walk(&self, mut visit: impl FnMut(&CommentNode, usize)) {
        for (idx, depth) in self.pre_order() {
            visit(&self.nodes[idx], depth);
        }
    }

    /// Assembles the nested client shape. Children are built before their
    /// parent by consuming the pre-order sequence back to front.
    pub fn to_nested(&self) -> Vec<ThreadedComment> {
        let order = self.pre_order();
        let mut built: Vec<Option<ThreadedComment>> = vec![None; self.nodes.len()];

        for &(idx, _) in order.iter().rev() {
            let node = &self.nodes[idx];
            let replies = node
                .replies
                .iter()
                .filter_map(|&reply| built[reply].take())
                .collect();

            let c = &node.comment;
            built[idx] = Some(ThreadedComment {
                id: c.id.clone(),
                name: c.name.clone(),
                body: c.body.clone(),
                created_at: c.created_at,
                edited_at: c.edited_at,
                deleted_at: c.deleted_at,
                is_staff: c.is_staff,
                is_owner: c.is_owner,
                replies,
            });
        }

        self.roots
            .iter()
            .filter_map(|&root| built[root].take())
            .collect()
    }
}
