//! Which posts a viewer may see.
//!
//! A post is publicly visible when it is published, its `pub_date` has
//! passed and its category (if any) is published. Authors always see their
//! own posts. Everything here is pure; callers pass `now` explicitly.

use chrono::{DateTime, Utc};

use crate::models::{Category, Id, Post, PostRecord};

/// Who is looking at a collection of posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Anonymous, or a listing that ignores who is asking.
    Public,
    /// A logged-in identity; their own posts bypass the public rule.
    Viewer(Id),
}

impl Audience {
    pub fn for_viewer(viewer: Option<Id>) -> Self {
        viewer.map_or(Audience::Public, Audience::Viewer)
    }

    pub fn admits(&self, post: &Post, category: Option<&Category>, now: DateTime<Utc>) -> bool {
        match self {
            Audience::Viewer(id) if *id == post.author_id => true,
            _ => is_public(post, category, now),
        }
    }

    pub fn admits_record(&self, record: &PostRecord, now: DateTime<Utc>) -> bool {
        self.admits(&record.post, record.category.as_ref(), now)
    }
}

pub fn is_public(post: &Post, category: Option<&Category>, now: DateTime<Utc>) -> bool {
    post.is_published && post.pub_date <= now && category.map_or(true, |c| c.is_published)
}

/// Narrow any base collection (all posts, one category, one author) to
/// what `audience` may see. Relative order is preserved.
pub fn narrow<I>(records: I, audience: Audience, now: DateTime<Utc>) -> Vec<PostRecord>
where
    I: IntoIterator<Item = PostRecord>,
{
    records
        .into_iter()
        .filter(|r| audience.admits_record(r, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn post(author_id: Id, is_published: bool, pub_date: DateTime<Utc>, category_id: Option<Id>) -> Post {
        Post {
            id: 1,
            title: "t".into(),
            text: "x".into(),
            pub_date,
            image: None,
            is_published,
            created_at: pub_date,
            author_id,
            category_id,
            location_id: None,
        }
    }

    fn category(is_published: bool) -> Category {
        Category {
            id: 7,
            title: "c".into(),
            description: String::new(),
            slug: "c".into(),
            is_published,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn public_rule_matches_every_combination() {
        let now = Utc::now();
        for published in [true, false] {
            for past in [true, false] {
                for cat in [None, Some(true), Some(false)] {
                    let when = if past { now - Duration::hours(1) } else { now + Duration::hours(1) };
                    let c = cat.map(category);
                    let p = post(1, published, when, c.as_ref().map(|c| c.id));
                    let expected = published && past && cat.unwrap_or(true);
                    assert_eq!(is_public(&p, c.as_ref(), now), expected, "published={published} past={past} cat={cat:?}");
                }
            }
        }
    }

    #[test]
    fn pub_date_equal_to_now_is_visible() {
        let now = Utc::now();
        assert!(is_public(&post(1, true, now, None), None, now));
    }

    #[test]
    fn author_sees_own_hidden_post() {
        let now = Utc::now();
        let hidden = category(false);
        let p = post(5, false, now + Duration::days(3), Some(hidden.id));
        assert!(Audience::Viewer(5).admits(&p, Some(&hidden), now));
        assert!(!Audience::Viewer(6).admits(&p, Some(&hidden), now));
        assert!(!Audience::Public.admits(&p, Some(&hidden), now));
    }

    #[test]
    fn narrow_keeps_order() {
        let now = Utc::now();
        let mk = |id: Id, published: bool| PostRecord {
            post: Post { id, ..post(1, published, now - Duration::minutes(id), None) },
            category: None,
        };
        let out = narrow(vec![mk(3, true), mk(2, false), mk(1, true)], Audience::Public, now);
        let ids: Vec<Id> = out.iter().map(|r| r.post.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }
}
