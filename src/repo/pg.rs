use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use super::*;
use crate::visibility::Audience;

const POST_COLUMNS: &str =
    "id, title, text, pub_date, image, is_published, created_at, author_id, category_id, location_id";
const USER_COLUMNS: &str = "id, username, first_name, last_name, email, password_hash, date_joined";

const POST_WITH_CATEGORY: &str = r#"
    SELECT p.id, p.title, p.text, p.pub_date, p.image, p.is_published, p.created_at,
           p.author_id, p.category_id, p.location_id,
           c.title AS c_title, c.description AS c_description, c.slug AS c_slug,
           c.is_published AS c_is_published, c.created_at AS c_created_at
    FROM posts p
    LEFT JOIN categories c ON c.id = p.category_id
"#;

/// Map driver errors onto the repository taxonomy. Unique violations become
/// conflicts, foreign-key violations mean a referenced row is missing, and
/// values longer than their column are invalid input.
fn map_err(e: sqlx::Error) -> RepoError {
    match &e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") => RepoError::Conflict,
            Some("23503") => RepoError::NotFound,
            Some("22001") => RepoError::Invalid(db.message().to_string()),
            _ => RepoError::Internal(e.to_string()),
        },
        _ => RepoError::Internal(e.to_string()),
    }
}

fn expect_affected(rows: u64) -> RepoResult<()> {
    if rows == 0 { Err(RepoError::NotFound) } else { Ok(()) }
}

/// A bind argument for a listing query.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ListingArg {
    Id(Id),
    At(DateTime<Utc>),
}

/// `WHERE` clause for a listing over `posts p LEFT JOIN categories c`, with
/// its arguments in `$n` order. The public rule matches
/// `visibility::is_public`; a viewer also sees their own posts.
fn listing_filter(listing: &PostListing) -> (String, Vec<ListingArg>) {
    let mut conds = Vec::new();
    let mut args = Vec::new();
    match listing.scope {
        PostScope::All => {}
        PostScope::Category(id) => {
            args.push(ListingArg::Id(id));
            conds.push(format!("p.category_id = ${}", args.len()));
        }
        PostScope::Author(id) => {
            args.push(ListingArg::Id(id));
            conds.push(format!("p.author_id = ${}", args.len()));
        }
    }
    if let Some(audience) = listing.audience {
        args.push(ListingArg::At(listing.now));
        let public = format!(
            "(p.is_published AND p.pub_date <= ${} AND (c.id IS NULL OR c.is_published))",
            args.len()
        );
        match audience {
            Audience::Public => conds.push(public),
            Audience::Viewer(id) => {
                args.push(ListingArg::Id(id));
                conds.push(format!("(p.author_id = ${} OR {public})", args.len()));
            }
        }
    }
    if conds.is_empty() {
        (String::new(), args)
    } else {
        (format!("WHERE {}", conds.join(" AND ")), args)
    }
}

fn to_sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Id,
    title: String,
    text: String,
    pub_date: DateTime<Utc>,
    image: Option<String>,
    is_published: bool,
    created_at: DateTime<Utc>,
    author_id: Id,
    category_id: Option<Id>,
    location_id: Option<Id>,
    c_title: Option<String>,
    c_description: Option<String>,
    c_slug: Option<String>,
    c_is_published: Option<bool>,
    c_created_at: Option<DateTime<Utc>>,
}

impl From<PostRow> for PostRecord {
    fn from(r: PostRow) -> Self {
        let category = match (r.category_id, r.c_title, r.c_description, r.c_slug, r.c_is_published, r.c_created_at) {
            (Some(id), Some(title), Some(description), Some(slug), Some(is_published), Some(created_at)) => {
                Some(Category { id, title, description, slug, is_published, created_at })
            }
            _ => None,
        };
        PostRecord {
            post: Post {
                id: r.id,
                title: r.title,
                text: r.text,
                pub_date: r.pub_date,
                image: r.image,
                is_published: r.is_published,
                created_at: r.created_at,
                author_id: r.author_id,
                category_id: r.category_id,
                location_id: r.location_id,
            },
            category,
        }
    }
}

#[derive(Clone)]
pub struct PgRepo { pool: Pool<Postgres> }

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

    /// Apply the bundled schema.
    pub async fn migrate(&self) -> RepoResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepoError::Internal(e.to_string()))
    }
}

#[async_trait]
impl CategoryRepo for PgRepo {
    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        sqlx::query_as::<_, Category>("SELECT id, title, description, slug, is_published, created_at FROM categories ORDER BY id")
            .fetch_all(&self.pool).await.map_err(map_err)
    }
    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        sqlx::query_as::<_, Category>("SELECT id, title, description, slug, is_published, created_at FROM categories WHERE id=$1")
            .bind(id)
            .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Category> {
        sqlx::query_as::<_, Category>("SELECT id, title, description, slug, is_published, created_at FROM categories WHERE slug=$1")
            .bind(slug)
            .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (title, description, slug, is_published) VALUES ($1,$2,$3,$4) \
             RETURNING id, title, description, slug, is_published, created_at"
        )
        .bind(&new.title).bind(&new.description).bind(&new.slug).bind(new.is_published)
        .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category> {
        sqlx::query_as::<_, Category>(
            "UPDATE categories SET title = COALESCE($2, title), description = COALESCE($3, description), \
             slug = COALESCE($4, slug), is_published = COALESCE($5, is_published) WHERE id=$1 \
             RETURNING id, title, description, slug, is_published, created_at"
        )
        .bind(id)
        .bind(upd.title.as_ref())
        .bind(upd.description.as_ref())
        .bind(upd.slug.as_ref())
        .bind(upd.is_published)
        .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn delete_category(&self, id: Id) -> RepoResult<()> {
        // posts.category_id is ON DELETE SET NULL
        let res = sqlx::query("DELETE FROM categories WHERE id=$1")
            .bind(id)
            .execute(&self.pool).await.map_err(map_err)?;
        expect_affected(res.rows_affected())
    }
}

#[async_trait]
impl LocationRepo for PgRepo {
    async fn list_locations(&self) -> RepoResult<Vec<Location>> {
        sqlx::query_as::<_, Location>("SELECT id, name, is_published, created_at FROM locations ORDER BY id")
            .fetch_all(&self.pool).await.map_err(map_err)
    }
    async fn get_location(&self, id: Id) -> RepoResult<Location> {
        sqlx::query_as::<_, Location>("SELECT id, name, is_published, created_at FROM locations WHERE id=$1")
            .bind(id)
            .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn locations_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<Location>> {
        sqlx::query_as::<_, Location>("SELECT id, name, is_published, created_at FROM locations WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool).await.map_err(map_err)
    }
    async fn create_location(&self, new: NewLocation) -> RepoResult<Location> {
        sqlx::query_as::<_, Location>(
            "INSERT INTO locations (name, is_published) VALUES ($1,$2) RETURNING id, name, is_published, created_at"
        )
        .bind(&new.name).bind(new.is_published)
        .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn update_location(&self, id: Id, upd: UpdateLocation) -> RepoResult<Location> {
        sqlx::query_as::<_, Location>(
            "UPDATE locations SET name = COALESCE($2, name), is_published = COALESCE($3, is_published) \
             WHERE id=$1 RETURNING id, name, is_published, created_at"
        )
        .bind(id)
        .bind(upd.name.as_ref())
        .bind(upd.is_published)
        .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn delete_location(&self, id: Id) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM locations WHERE id=$1")
            .bind(id)
            .execute(&self.pool).await.map_err(map_err)?;
        expect_affected(res.rows_affected())
    }
}

#[async_trait]
impl PostRepo for PgRepo {
    async fn count_posts(&self, listing: PostListing) -> RepoResult<usize> {
        let (filter, args) = listing_filter(&listing);
        let sql = format!("SELECT COUNT(*) FROM posts p LEFT JOIN categories c ON c.id = p.category_id {filter}");
        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for arg in args {
            q = match arg {
                ListingArg::Id(v) => q.bind(v),
                ListingArg::At(v) => q.bind(v),
            };
        }
        let n = q.fetch_one(&self.pool).await.map_err(map_err)?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
    async fn list_posts(&self, listing: PostListing, offset: usize, limit: usize) -> RepoResult<Vec<PostRecord>> {
        let (filter, args) = listing_filter(&listing);
        let sql = format!(
            "{POST_WITH_CATEGORY} {filter} ORDER BY p.pub_date DESC, p.id ASC LIMIT ${} OFFSET ${}",
            args.len() + 1,
            args.len() + 2
        );
        let mut q = sqlx::query_as::<_, PostRow>(&sql);
        for arg in args {
            q = match arg {
                ListingArg::Id(v) => q.bind(v),
                ListingArg::At(v) => q.bind(v),
            };
        }
        let rows = q
            .bind(to_sql_int(limit))
            .bind(to_sql_int(offset))
            .fetch_all(&self.pool).await.map_err(map_err)?;
        Ok(rows.into_iter().map(PostRecord::from).collect())
    }
    async fn get_post(&self, id: Id) -> RepoResult<PostRecord> {
        let sql = format!("{POST_WITH_CATEGORY} WHERE p.id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_one(&self.pool).await.map_err(map_err)?;
        Ok(row.into())
    }
    async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
        let sql = format!(
            "INSERT INTO posts (title, text, pub_date, image, is_published, author_id, category_id, location_id) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8) RETURNING {POST_COLUMNS}"
        );
        sqlx::query_as::<_, Post>(&sql)
            .bind(&new.title)
            .bind(&new.text)
            .bind(new.pub_date)
            .bind(new.image.as_ref())
            .bind(new.is_published)
            .bind(new.author_id)
            .bind(new.category_id)
            .bind(new.location_id)
            .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
        // image and location distinguish "keep" from "clear" with a flag
        let sql = format!(
            "UPDATE posts SET title = COALESCE($2, title), text = COALESCE($3, text), \
             pub_date = COALESCE($4, pub_date), is_published = COALESCE($5, is_published), \
             category_id = COALESCE($6, category_id), \
             image = CASE WHEN $7 THEN $8 ELSE image END, \
             location_id = CASE WHEN $9 THEN $10 ELSE location_id END \
             WHERE id=$1 RETURNING {POST_COLUMNS}"
        );
        sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(upd.title.as_ref())
            .bind(upd.text.as_ref())
            .bind(upd.pub_date)
            .bind(upd.is_published)
            .bind(upd.category_id)
            .bind(upd.image.is_some())
            .bind(upd.image.flatten())
            .bind(upd.location_id.is_some())
            .bind(upd.location_id.flatten())
            .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        // comments.post_id is ON DELETE CASCADE
        let res = sqlx::query("DELETE FROM posts WHERE id=$1")
            .bind(id)
            .execute(&self.pool).await.map_err(map_err)?;
        expect_affected(res.rows_affected())
    }
}

#[async_trait]
impl CommentRepo for PgRepo {
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
        sqlx::query_as::<_, Comment>(
            "SELECT id, text, post_id, author_id, created_at FROM comments WHERE post_id=$1 ORDER BY created_at ASC, id ASC"
        )
        .bind(post_id)
        .fetch_all(&self.pool).await.map_err(map_err)
    }
    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        sqlx::query_as::<_, Comment>("SELECT id, text, post_id, author_id, created_at FROM comments WHERE id=$1")
            .bind(id)
            .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        sqlx::query_as::<_, Comment>(
            "INSERT INTO comments (text, post_id, author_id) VALUES ($1,$2,$3) \
             RETURNING id, text, post_id, author_id, created_at"
        )
        .bind(&new.text).bind(new.post_id).bind(new.author_id)
        .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn update_comment(&self, id: Id, text: String) -> RepoResult<Comment> {
        sqlx::query_as::<_, Comment>(
            "UPDATE comments SET text=$2 WHERE id=$1 RETURNING id, text, post_id, author_id, created_at"
        )
        .bind(id).bind(&text)
        .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn delete_comment(&self, id: Id) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM comments WHERE id=$1")
            .bind(id)
            .execute(&self.pool).await.map_err(map_err)?;
        expect_affected(res.rows_affected())
    }
    async fn comment_counts(&self, post_ids: &[Id]) -> RepoResult<HashMap<Id, i64>> {
        let rows = sqlx::query_as::<_, (Id, i64)>(
            "SELECT post_id, COUNT(*) FROM comments WHERE post_id = ANY($1) GROUP BY post_id"
        )
        .bind(post_ids)
        .fetch_all(&self.pool).await.map_err(map_err)?;
        Ok(rows.into_iter().collect())
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (username, password_hash, first_name, last_name, email) \
             VALUES ($1,$2,$3,$4,$5) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&new.username)
            .bind(&new.password_hash)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.email)
            .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn get_user(&self, id: Id) -> RepoResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id=$1");
        sqlx::query_as::<_, User>(&sql).bind(id).fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username=$1");
        sqlx::query_as::<_, User>(&sql).bind(username).fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn users_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)");
        sqlx::query_as::<_, User>(&sql).bind(ids).fetch_all(&self.pool).await.map_err(map_err)
    }
    async fn update_profile(&self, id: Id, upd: ProfileUpdate) -> RepoResult<User> {
        let sql = format!(
            "UPDATE users SET first_name = COALESCE($2, first_name), last_name = COALESCE($3, last_name), \
             email = COALESCE($4, email) WHERE id=$1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(upd.first_name.as_ref())
            .bind(upd.last_name.as_ref())
            .bind(upd.email.as_ref())
            .fetch_one(&self.pool).await.map_err(map_err)
    }
    async fn delete_user(&self, id: Id) -> RepoResult<()> {
        // posts.author_id and comments.author_id cascade; comments on removed posts follow.
        let res = sqlx::query("DELETE FROM users WHERE id=$1")
            .bind(id)
            .execute(&self.pool).await.map_err(map_err)?;
        expect_affected(res.rows_affected())
    }
    async fn list_user_summaries(&self) -> RepoResult<Vec<UserSummary>> {
        sqlx::query_as::<_, UserSummary>(r#"
            SELECT u.id, u.username, u.email, u.first_name, u.last_name, COUNT(p.id) AS posts_count
            FROM users u
            LEFT JOIN posts p ON p.author_id = u.id
            GROUP BY u.id
            ORDER BY u.id
        "#)
        .fetch_all(&self.pool).await.map_err(map_err)
    }
}
