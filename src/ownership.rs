//! Capability check for mutating authored resources.

use crate::models::{Comment, Id, Post};

/// Anything with a recorded author.
pub trait Authored {
    fn author_id(&self) -> Id;
}

impl Authored for Post {
    fn author_id(&self) -> Id {
        self.author_id
    }
}

impl Authored for Comment {
    fn author_id(&self) -> Id {
        self.author_id
    }
}

/// Only the recorded author may update or delete a resource.
pub fn can_mutate<R: Authored + ?Sized>(resource: &R, identity: Id) -> bool {
    resource.author_id() == identity
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn only_author_may_mutate_comment() {
        let c = Comment { id: 1, text: "hi".into(), post_id: 2, author_id: 3, created_at: Utc::now() };
        assert!(can_mutate(&c, 3));
        assert!(!can_mutate(&c, 4));
    }
}
