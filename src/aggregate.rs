//! Prepares post collections for display.
//!
//! Relations are loaded in one batch per relation (authors, locations,
//! comment counts) regardless of how many posts are on the page.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use crate::models::{AuthorRef, Comment, CommentView, Id, PostCard, PostRecord};
use crate::repo::{Repo, RepoError, RepoResult};

/// Newest `pub_date` first; equal dates keep id (insertion) order.
pub fn order_for_listing(records: &mut [PostRecord]) {
    records.sort_by_key(|r| (Reverse(r.post.pub_date), r.post.id));
}

/// Attach author, location and comment count to each record, keeping the
/// input order.
pub async fn annotate(repo: &dyn Repo, records: Vec<PostRecord>) -> RepoResult<Vec<PostCard>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let post_ids: Vec<Id> = records.iter().map(|r| r.post.id).collect();
    let author_ids: Vec<Id> = records
        .iter()
        .map(|r| r.post.author_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let location_ids: Vec<Id> = records
        .iter()
        .filter_map(|r| r.post.location_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let counts = repo.comment_counts(&post_ids).await?;
    let authors: HashMap<Id, AuthorRef> = repo
        .users_by_ids(&author_ids)
        .await?
        .into_iter()
        .map(|u| (u.id, AuthorRef { id: u.id, username: u.username }))
        .collect();
    let locations: HashMap<Id, _> = if location_ids.is_empty() {
        HashMap::new()
    } else {
        repo.locations_by_ids(&location_ids)
            .await?
            .into_iter()
            .map(|l| (l.id, l))
            .collect()
    };

    records
        .into_iter()
        .map(|PostRecord { post, category }| -> RepoResult<PostCard> {
            // author rows cascade with their posts, so a miss means a torn read
            let author = authors.get(&post.author_id).cloned().ok_or_else(|| {
                RepoError::Internal(format!("author {} of post {} missing", post.author_id, post.id))
            })?;
            Ok(PostCard {
                id: post.id,
                comment_count: counts.get(&post.id).copied().unwrap_or(0),
                location: post.location_id.and_then(|l| locations.get(&l).cloned()),
                title: post.title,
                text: post.text,
                pub_date: post.pub_date,
                image: post.image,
                is_published: post.is_published,
                created_at: post.created_at,
                author,
                category,
            })
        })
        .collect()
}

/// Comments with their authors' usernames, order preserved.
pub async fn comment_views(repo: &dyn Repo, comments: Vec<Comment>) -> RepoResult<Vec<CommentView>> {
    let ids: Vec<Id> = comments
        .iter()
        .map(|c| c.author_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let authors: HashMap<Id, String> = repo
        .users_by_ids(&ids)
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();
    comments
        .into_iter()
        .map(|c| -> RepoResult<CommentView> {
            // comments cascade with their author, as posts do
            let username = authors.get(&c.author_id).cloned().ok_or_else(|| {
                RepoError::Internal(format!("author {} of comment {} missing", c.author_id, c.id))
            })?;
            Ok(CommentView {
                id: c.id,
                text: c.text,
                post_id: c.post_id,
                author: AuthorRef { id: c.author_id, username },
                created_at: c.created_at,
            })
        })
        .collect()
}

#[cfg(all(test, feature = "inmem-store"))]
mod tests {
    use super::*;
    use crate::models::{NewComment, NewPost, NewUser};
    use crate::repo::inmem::InMemRepo;
    use crate::repo::{CommentRepo, PostListing, PostRepo, PostScope, UserRepo};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn orders_and_counts() {
        let repo = InMemRepo::new();
        let u = repo
            .create_user(NewUser {
                username: "ivan".into(),
                password_hash: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                email: String::new(),
            })
            .await
            .unwrap();
        let same = Utc::now() - Duration::hours(2);
        let mut ids = Vec::new();
        for (i, when) in [same, Utc::now() - Duration::minutes(5), same].into_iter().enumerate() {
            let p = repo
                .create_post(NewPost {
                    title: format!("p{i}"),
                    text: "t".into(),
                    pub_date: when,
                    image: None,
                    is_published: true,
                    author_id: u.id,
                    category_id: None,
                    location_id: None,
                })
                .await
                .unwrap();
            ids.push(p.id);
        }
        for _ in 0..3 {
            repo.create_comment(NewComment { text: "c".into(), post_id: ids[0], author_id: u.id })
                .await
                .unwrap();
        }

        let listing = PostListing { scope: PostScope::All, audience: None, now: Utc::now() };
        let records = repo.list_posts(listing, 0, 10).await.unwrap();
        let cards = annotate(&repo, records).await.unwrap();
        let order: Vec<Id> = cards.iter().map(|c| c.id).collect();
        assert_eq!(order, vec![ids[1], ids[0], ids[2]]);
        assert_eq!(cards[1].comment_count, 3);
        assert_eq!(cards[0].comment_count, 0);
        assert_eq!(cards[0].author.username, "ivan");
    }

    #[tokio::test]
    async fn comment_without_author_is_an_error() {
        let repo = InMemRepo::new();
        let orphan = Comment { id: 1, text: "c".into(), post_id: 1, author_id: 99, created_at: Utc::now() };
        assert!(matches!(comment_views(&repo, vec![orphan]).await, Err(RepoError::Internal(_))));
    }
}
