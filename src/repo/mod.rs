use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;
use crate::visibility::Audience;

#[cfg(feature = "inmem-store")]
pub mod inmem;
#[cfg(feature = "postgres-store")]
pub mod pg;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    /// A value the store cannot hold, named by field where known.
    #[error("invalid: {0}")] Invalid(String),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Base collection a post listing starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScope {
    All,
    Category(Id),
    Author(Id),
}

/// A post listing: the base collection and who is looking at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostListing {
    pub scope: PostScope,
    /// `None` lists every post in the scope (an owner's own profile).
    pub audience: Option<Audience>,
    pub now: DateTime<Utc>,
}

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn get_category(&self, id: Id) -> RepoResult<Category>;
    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Category>;
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category>;
    async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category>;
    /// Posts in the category keep existing with no category.
    async fn delete_category(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait LocationRepo: Send + Sync {
    async fn list_locations(&self) -> RepoResult<Vec<Location>>;
    async fn get_location(&self, id: Id) -> RepoResult<Location>;
    async fn locations_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<Location>>;
    async fn create_location(&self, new: NewLocation) -> RepoResult<Location>;
    async fn update_location(&self, id: Id, upd: UpdateLocation) -> RepoResult<Location>;
    /// Posts at the location keep existing with no location.
    async fn delete_location(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn count_posts(&self, listing: PostListing) -> RepoResult<usize>;
    /// One window of a listing with categories attached, newest `pub_date`
    /// first and ties in id order.
    async fn list_posts(&self, listing: PostListing, offset: usize, limit: usize) -> RepoResult<Vec<PostRecord>>;
    async fn get_post(&self, id: Id) -> RepoResult<PostRecord>;
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    /// Removes the post's comments as well.
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Oldest first.
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn update_comment(&self, id: Id, text: String) -> RepoResult<Comment>;
    async fn delete_comment(&self, id: Id) -> RepoResult<()>;
    /// Posts without comments are absent from the map.
    async fn comment_counts(&self, post_ids: &[Id]) -> RepoResult<HashMap<Id, i64>>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<User>;
    async fn users_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<User>>;
    async fn update_profile(&self, id: Id, upd: ProfileUpdate) -> RepoResult<User>;
    /// Cascades to the user's posts, comments on those posts, and the
    /// user's own comments.
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
    async fn list_user_summaries(&self) -> RepoResult<Vec<UserSummary>>;
}

pub trait Repo: CategoryRepo + LocationRepo + PostRepo + CommentRepo + UserRepo {}

impl<T> Repo for T where T: CategoryRepo + LocationRepo + PostRepo + CommentRepo + UserRepo {}
