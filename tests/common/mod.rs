#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use blogicum::auth::{create_jwt, Role};
use blogicum::models::*;
use blogicum::repo::inmem::InMemRepo;
use blogicum::repo::{CategoryRepo, LocationRepo, PostListing, PostRepo, PostScope, UserRepo};
use blogicum::storage::{ImageStore, ImageStoreError};
use blogicum::AppState;
use chrono::{DateTime, Duration, Utc};

// ---------------- In-memory Mock ImageStore (tests only) ----------------
#[derive(Default)]
pub struct MockImageStore {
    inner: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

#[async_trait::async_trait]
impl ImageStore for MockImageStore {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(hash) {
            return Err(ImageStoreError::Duplicate);
        }
        map.insert(hash.to_string(), (bytes.to_vec(), mime.to_string()));
        Ok(())
    }
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError> {
        let map = self.inner.lock().unwrap();
        map.get(hash).cloned().ok_or(ImageStoreError::NotFound)
    }
}

// Helper that guarantees a sufficiently long secret for tests.
pub fn set_secret() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
}

pub fn state(repo: &InMemRepo) -> AppState {
    set_secret();
    AppState::new(Arc::new(repo.clone()), Arc::new(MockImageStore::default()))
}

pub fn token(user: &User) -> String {
    set_secret();
    create_jwt(user.id, &user.username, vec![Role::User]).unwrap()
}

pub fn admin_token(user: &User) -> String {
    set_secret();
    create_jwt(user.id, &user.username, vec![Role::User, Role::Admin]).unwrap()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

pub async fn seed_user(repo: &InMemRepo, username: &str) -> User {
    repo.create_user(NewUser {
        username: username.into(),
        password_hash: String::new(),
        first_name: "First".into(),
        last_name: "Last".into(),
        email: format!("{username}@example.com"),
    })
    .await
    .unwrap()
}

pub async fn seed_category(repo: &InMemRepo, slug: &str, is_published: bool) -> Category {
    repo.create_category(NewCategory {
        title: slug.to_uppercase(),
        description: format!("about {slug}"),
        slug: slug.into(),
        is_published,
    })
    .await
    .unwrap()
}

pub async fn seed_location(repo: &InMemRepo, name: &str) -> Location {
    repo.create_location(NewLocation { name: name.into(), is_published: true }).await.unwrap()
}

pub fn an_hour_ago() -> DateTime<Utc> {
    Utc::now() - Duration::hours(1)
}

pub fn tomorrow() -> DateTime<Utc> {
    Utc::now() + Duration::days(1)
}

pub async fn seed_post(
    repo: &InMemRepo,
    author: &User,
    category: Option<&Category>,
    is_published: bool,
    pub_date: DateTime<Utc>,
) -> Post {
    repo.create_post(NewPost {
        title: "A post".into(),
        text: "Body".into(),
        pub_date,
        image: None,
        is_published,
        author_id: author.id,
        category_id: category.map(|c| c.id),
        location_id: None,
    })
    .await
    .unwrap()
}

pub fn ids(page: &serde_json::Value) -> Vec<i64> {
    page["posts"].as_array().unwrap().iter().map(|p| p["id"].as_i64().unwrap()).collect()
}

/// Every stored post, hidden ones included.
pub async fn all_posts(repo: &InMemRepo) -> Vec<PostRecord> {
    let listing = PostListing { scope: PostScope::All, audience: None, now: Utc::now() };
    repo.list_posts(listing, 0, usize::MAX).await.unwrap()
}
