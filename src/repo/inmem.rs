use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::*;
use crate::aggregate::order_for_listing;
use crate::visibility::narrow;

// BTreeMap keeps id (= insertion) order for every listing.
#[derive(Default, Serialize, Deserialize)]
struct State {
    users: BTreeMap<Id, User>,
    categories: BTreeMap<Id, Category>,
    locations: BTreeMap<Id, Location>,
    posts: BTreeMap<Id, Post>,
    comments: BTreeMap<Id, Comment>,
    next_id: Id,
    /// Bumped by every committed write; orders snapshots.
    #[serde(skip)]
    generation: u64,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn record(&self, post: &Post) -> PostRecord {
        PostRecord {
            post: post.clone(),
            category: post.category_id.and_then(|c| self.categories.get(&c).cloned()),
        }
    }

    /// The whole listing in display order.
    fn listing(&self, listing: &PostListing) -> Vec<PostRecord> {
        let scoped = self
            .posts
            .values()
            .filter(|p| match listing.scope {
                PostScope::All => true,
                PostScope::Category(c) => p.category_id == Some(c),
                PostScope::Author(a) => p.author_id == a,
            })
            .map(|p| self.record(p));
        let mut records = match listing.audience {
            Some(audience) => narrow(scoped, audience, listing.now),
            None => scoped.collect(),
        };
        order_for_listing(&mut records);
        records
    }

    fn slug_taken(&self, slug: &str, except: Option<Id>) -> bool {
        self.categories.values().any(|c| c.slug == slug && Some(c.id) != except)
    }
}

/// On-disk mirror of the state. Writers take turns, and a snapshot older
/// than the one already on disk is dropped.
struct Snapshot {
    path: PathBuf,
    written: Mutex<u64>,
}

impl Snapshot {
    async fn store(&self, generation: u64, bytes: Vec<u8>) {
        let mut written = self.written.lock().await;
        if *written >= generation {
            return;
        }
        let path = self.path.clone();
        match tokio::task::spawn_blocking(move || replace_file(&path, &bytes)).await {
            Ok(Ok(())) => *written = generation,
            Ok(Err(e)) => warn!("failed to write snapshot '{}': {e}", self.path.display()),
            Err(e) => warn!("snapshot writer task failed: {e}"),
        }
    }
}

/// Write next to `path`, then rename over it, so the file is always either
/// the previous snapshot or the new one.
fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

/// Process-local store, optionally mirrored to a JSON snapshot after every
/// write.
#[derive(Clone, Default)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot: Option<Arc<Snapshot>>,
}

impl InMemRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` if it exists and persist every write back to it.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load_state_from(&path);
        Self {
            state: Arc::new(RwLock::new(state)),
            snapshot: Some(Arc::new(Snapshot { path, written: Mutex::new(0) })),
        }
    }

    fn load_state_from(path: &Path) -> State {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    info!("loaded snapshot '{}'", path.display());
                    s
                }
                Err(e) => {
                    warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                    State::default()
                }
            },
            Err(e) => {
                info!("no snapshot at '{}' ({e}); starting empty", path.display());
                State::default()
            }
        }
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    /// Apply one write under the lock. The snapshot bytes are taken before
    /// the lock is released, so each one is a consistent state.
    async fn mutate<T, F>(&self, apply: F) -> RepoResult<T>
    where
        F: FnOnce(&mut State) -> RepoResult<T> + Send,
        T: Send,
    {
        let (out, pending) = {
            let mut s = self.write()?;
            let out = apply(&mut s)?;
            s.generation += 1;
            let pending = match &self.snapshot {
                Some(_) => match serde_json::to_vec_pretty(&*s) {
                    Ok(bytes) => Some((s.generation, bytes)),
                    Err(e) => {
                        warn!("failed to serialize snapshot: {e}");
                        None
                    }
                },
                None => None,
            };
            (out, pending)
        };
        if let (Some(snapshot), Some((generation, bytes))) = (self.snapshot.as_deref(), pending) {
            snapshot.store(generation, bytes).await;
        }
        Ok(out)
    }
}

#[async_trait]
impl CategoryRepo for InMemRepo {
    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        Ok(self.read()?.categories.values().cloned().collect())
    }

    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        self.read()?.categories.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Category> {
        self.read()?
            .categories
            .values()
            .find(|c| c.slug == slug)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
        self.mutate(move |s| {
            if s.slug_taken(&new.slug, None) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let category = Category {
                id,
                title: new.title,
                description: new.description,
                slug: new.slug,
                is_published: new.is_published,
                created_at: Utc::now(),
            };
            s.categories.insert(id, category.clone());
            Ok(category)
        })
        .await
    }

    async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category> {
        self.mutate(move |s| {
            if let Some(ref slug) = upd.slug {
                if s.slug_taken(slug, Some(id)) {
                    return Err(RepoError::Conflict);
                }
            }
            let category = s.categories.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title { category.title = title; }
            if let Some(description) = upd.description { category.description = description; }
            if let Some(slug) = upd.slug { category.slug = slug; }
            if let Some(p) = upd.is_published { category.is_published = p; }
            Ok(category.clone())
        })
        .await
    }

    async fn delete_category(&self, id: Id) -> RepoResult<()> {
        self.mutate(move |s| {
            s.categories.remove(&id).ok_or(RepoError::NotFound)?;
            for post in s.posts.values_mut().filter(|p| p.category_id == Some(id)) {
                post.category_id = None;
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl LocationRepo for InMemRepo {
    async fn list_locations(&self) -> RepoResult<Vec<Location>> {
        Ok(self.read()?.locations.values().cloned().collect())
    }

    async fn get_location(&self, id: Id) -> RepoResult<Location> {
        self.read()?.locations.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn locations_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<Location>> {
        let s = self.read()?;
        Ok(ids.iter().filter_map(|id| s.locations.get(id).cloned()).collect())
    }

    async fn create_location(&self, new: NewLocation) -> RepoResult<Location> {
        self.mutate(move |s| {
            let id = s.next_id();
            let location = Location { id, name: new.name, is_published: new.is_published, created_at: Utc::now() };
            s.locations.insert(id, location.clone());
            Ok(location)
        })
        .await
    }

    async fn update_location(&self, id: Id, upd: UpdateLocation) -> RepoResult<Location> {
        self.mutate(move |s| {
            let location = s.locations.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(name) = upd.name { location.name = name; }
            if let Some(p) = upd.is_published { location.is_published = p; }
            Ok(location.clone())
        })
        .await
    }

    async fn delete_location(&self, id: Id) -> RepoResult<()> {
        self.mutate(move |s| {
            s.locations.remove(&id).ok_or(RepoError::NotFound)?;
            for post in s.posts.values_mut().filter(|p| p.location_id == Some(id)) {
                post.location_id = None;
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PostRepo for InMemRepo {
    async fn count_posts(&self, listing: PostListing) -> RepoResult<usize> {
        Ok(self.read()?.listing(&listing).len())
    }

    async fn list_posts(&self, listing: PostListing, offset: usize, limit: usize) -> RepoResult<Vec<PostRecord>> {
        Ok(self.read()?.listing(&listing).into_iter().skip(offset).take(limit).collect())
    }

    async fn get_post(&self, id: Id) -> RepoResult<PostRecord> {
        let s = self.read()?;
        s.posts.get(&id).map(|p| s.record(p)).ok_or(RepoError::NotFound)
    }

    async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
        self.mutate(move |s| {
            if !s.users.contains_key(&new.author_id) { return Err(RepoError::NotFound); }
            if new.category_id.is_some_and(|c| !s.categories.contains_key(&c)) { return Err(RepoError::NotFound); }
            if new.location_id.is_some_and(|l| !s.locations.contains_key(&l)) { return Err(RepoError::NotFound); }
            let id = s.next_id();
            let post = Post {
                id,
                title: new.title,
                text: new.text,
                pub_date: new.pub_date,
                image: new.image,
                is_published: new.is_published,
                created_at: Utc::now(),
                author_id: new.author_id,
                category_id: new.category_id,
                location_id: new.location_id,
            };
            s.posts.insert(id, post.clone());
            Ok(post)
        })
        .await
    }

    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
        self.mutate(move |s| {
            if upd.category_id.is_some_and(|c| !s.categories.contains_key(&c)) { return Err(RepoError::NotFound); }
            if upd.location_id.flatten().is_some_and(|l| !s.locations.contains_key(&l)) { return Err(RepoError::NotFound); }
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title { post.title = title; }
            if let Some(text) = upd.text { post.text = text; }
            if let Some(pub_date) = upd.pub_date { post.pub_date = pub_date; }
            if let Some(image) = upd.image { post.image = image; }
            if let Some(p) = upd.is_published { post.is_published = p; }
            if let Some(c) = upd.category_id { post.category_id = Some(c); }
            if let Some(l) = upd.location_id { post.location_id = l; }
            Ok(post.clone())
        })
        .await
    }

    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        self.mutate(move |s| {
            s.posts.remove(&id).ok_or(RepoError::NotFound)?;
            s.comments.retain(|_, c| c.post_id != id);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CommentRepo for InMemRepo {
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.comments.values().filter(|c| c.post_id == post_id).cloned().collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        self.read()?.comments.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        self.mutate(move |s| {
            if !s.posts.contains_key(&new.post_id) || !s.users.contains_key(&new.author_id) {
                return Err(RepoError::NotFound);
            }
            let id = s.next_id();
            let comment = Comment {
                id,
                text: new.text,
                post_id: new.post_id,
                author_id: new.author_id,
                created_at: Utc::now(),
            };
            s.comments.insert(id, comment.clone());
            Ok(comment)
        })
        .await
    }

    async fn update_comment(&self, id: Id, text: String) -> RepoResult<Comment> {
        self.mutate(move |s| {
            let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
            comment.text = text;
            Ok(comment.clone())
        })
        .await
    }

    async fn delete_comment(&self, id: Id) -> RepoResult<()> {
        self.mutate(move |s| {
            s.comments.remove(&id).ok_or(RepoError::NotFound)?;
            Ok(())
        })
        .await
    }

    async fn comment_counts(&self, post_ids: &[Id]) -> RepoResult<HashMap<Id, i64>> {
        let s = self.read()?;
        let wanted: HashSet<Id> = post_ids.iter().copied().collect();
        let mut counts = HashMap::new();
        for c in s.comments.values().filter(|c| wanted.contains(&c.post_id)) {
            *counts.entry(c.post_id).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        self.mutate(move |s| {
            if s.users.values().any(|u| u.username == new.username) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let user = User {
                id,
                username: new.username,
                first_name: new.first_name,
                last_name: new.last_name,
                email: new.email,
                password_hash: new.password_hash,
                date_joined: Utc::now(),
            };
            s.users.insert(id, user.clone());
            Ok(user)
        })
        .await
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
        self.read()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn users_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<User>> {
        let s = self.read()?;
        Ok(ids.iter().filter_map(|id| s.users.get(id).cloned()).collect())
    }

    async fn update_profile(&self, id: Id, upd: ProfileUpdate) -> RepoResult<User> {
        self.mutate(move |s| {
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(first_name) = upd.first_name { user.first_name = first_name; }
            if let Some(last_name) = upd.last_name { user.last_name = last_name; }
            if let Some(email) = upd.email { user.email = email; }
            Ok(user.clone())
        })
        .await
    }

    async fn delete_user(&self, id: Id) -> RepoResult<()> {
        self.mutate(move |s| {
            s.users.remove(&id).ok_or(RepoError::NotFound)?;
            let mut removed_posts = HashSet::new();
            s.posts.retain(|pid, p| {
                if p.author_id == id {
                    removed_posts.insert(*pid);
                    false
                } else {
                    true
                }
            });
            s.comments.retain(|_, c| c.author_id != id && !removed_posts.contains(&c.post_id));
            Ok(())
        })
        .await
    }

    async fn list_user_summaries(&self) -> RepoResult<Vec<UserSummary>> {
        let s = self.read()?;
        let mut counts: HashMap<Id, i64> = HashMap::new();
        for p in s.posts.values() {
            *counts.entry(p.author_id).or_insert(0) += 1;
        }
        Ok(s.users
            .values()
            .map(|u| UserSummary {
                id: u.id,
                username: u.username.clone(),
                email: u.email.clone(),
                first_name: u.first_name.clone(),
                last_name: u.last_name.clone(),
                posts_count: counts.get(&u.id).copied().unwrap_or(0),
            })
            .collect())
    }
}
