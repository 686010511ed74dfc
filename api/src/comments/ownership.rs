//! Who may edit or delete a comment. Comments written before sign-in was
//! mandatory carry only an email; comments written by a signed-in visitor are
//! bound to their subject id. A bound comment never falls back to email
//! matching.

use crate::identity::SessionIdentity;

use super::store::PostAuthor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Tied to a provider account. Only that subject may mutate it.
    Bound { subject_id: String },
    /// Legacy claim by verified email, case-insensitive.
    Claimable { email: String },
}

impl Ownership {
    /// Derives ownership from the stored fields. `None` when the document
    /// carries neither a subject id nor an email; such comments are frozen.
    pub fn of(user_id: Option<&str>, email: Option<&str>) -> Option<Ownership> {
        if let Some(subject_id) = user_id {
            return Some(Ownership::Bound {
                subject_id: subject_id.to_string(),
            });
        }
        email.map(|email| Ownership::Claimable {
            email: email.to_string(),
        })
    }

    pub fn allows(&self, identity: &SessionIdentity) -> bool {
        match self {
            Ownership::Bound { subject_id } => *subject_id == identity.subject_id,
            Ownership::Claimable { email } => emails_match(email, &identity.email),
        }
    }
}

/// The single mutation gate used by edit, delete, and the owner flag on
/// reads, so the three can never disagree.
pub fn can_mutate(ownership: Option<Ownership>, identity: Option<&SessionIdentity>) -> bool {
    match (ownership, identity) {
        (Some(ownership), Some(identity)) => ownership.allows(identity),
        _ => false,
    }
}

pub fn emails_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// A post author the commenter turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRef {
    pub id: String,
    pub name: String,
}

/// Matches a verified commenter email against the post's author. On a match
/// the comment is published under the author's canonical byline instead of
/// whatever name was typed into the form.
pub fn verified_author(author: Option<&PostAuthor>, email: &str) -> Option<AuthorRef> {
    let author = author?;
    let author_email = author.email.as_deref()?;

    if !emails_match(author_email, email) {
        return None;
    }

    Some(AuthorRef {
        id: author.id.clone(),
        name: author.name.clone(),
    })
}
