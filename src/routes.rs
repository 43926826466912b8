use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{error::JsonPayloadError, http::header, web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures_util::TryStreamExt as _;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::aggregate::{annotate, comment_views};
use crate::auth::{create_jwt, login_redirect, roles_for, Auth};
use crate::error::{page_not_found, ApiError, FieldErrors};
use crate::forms::{CommentForm, LoginForm, PostForm, ProfileForm, RegistrationForm};
use crate::models::*;
use crate::ownership::can_mutate;
use crate::pagination::{PageInfo, PageQuery, POSTS_PER_PAGE};
use crate::password::{hash_password, verify_password};
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{PostListing, PostScope, Repo, RepoError};
use crate::storage::{ImageStore, ImageStoreError};
use crate::visibility::Audience;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .route("/", web::get().to(index))
        .route("/category/{slug}/", web::get().to(category_posts))
        .route("/profile/{username}/", web::get().to(profile))
        .service(
            web::resource("/edit-profile/")
                .route(web::get().to(edit_profile_form))
                .route(web::post().to(edit_profile)),
        )
        // must precede /posts/{id}/
        .service(
            web::resource("/posts/create/")
                .route(web::get().to(create_post_form))
                .route(web::post().to(create_post)),
        )
        .route("/posts/{id}/", web::get().to(post_detail))
        .service(
            web::resource("/posts/{id}/edit/")
                .route(web::get().to(edit_post_form))
                .route(web::post().to(edit_post)),
        )
        .route("/posts/{id}/delete/", web::post().to(delete_post))
        .route("/posts/{id}/comment/", web::post().to(add_comment))
        .service(
            web::resource("/posts/{id}/comment/{comment_id}/edit/")
                .route(web::get().to(edit_comment_form))
                .route(web::post().to(edit_comment)),
        )
        .route("/posts/{id}/comment/{comment_id}/delete/", web::post().to(delete_comment))
        .service(
            web::scope("/auth")
                .service(
                    web::resource("/registration/")
                        .route(web::get().to(registration_form))
                        .route(web::post().to(registration)),
                )
                .route("/login/", web::post().to(login))
                .route("/refresh/", web::post().to(refresh_token)),
        )
        .service(web::scope("/admin").configure(crate::admin::config))
        .route("/media/", web::post().to(upload_image))
        .route("/media/{hash}", web::get().to(get_image))
        .route("/metrics", web::get().to(prometheus_metrics))
        .default_service(web::route().to(page_not_found));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub image_store: Arc<dyn ImageStore>,
    pub rate_limiter: Option<RateLimiterFacade>,
    pub metrics: Option<PrometheusHandle>,
    pub bootstrap_admins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, image_store: Arc<dyn ImageStore>) -> Self {
        Self { repo, image_store, rate_limiter: None, metrics: None, bootstrap_admins: Arc::new(Vec::new()) }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiterFacade) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn with_bootstrap_admins(mut self, admins: Vec<String>) -> Self {
        self.bootstrap_admins = Arc::new(admins);
        self
    }
}

/// A body that is not valid JSON for the form is reported like any other
/// validation failure.
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let mut errors = FieldErrors::new();
    errors.insert("__all__".to_string(), vec![err.to_string()]);
    ApiError::Validation { errors, form: serde_json::Value::Null }.into()
}

fn redirect(location: impl AsRef<str>) -> HttpResponse {
    HttpResponse::Found().insert_header((header::LOCATION, location.as_ref())).finish()
}

fn post_url(id: Id) -> String {
    format!("/posts/{id}/")
}

/// Ownership denial sends the viewer back to the post without touching it.
fn deny(post_id: Id) -> HttpResponse {
    metrics::counter!("blog_ownership_denied_total").increment(1);
    redirect(post_url(post_id))
}

// ---------------- Listings ----------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct PostListPage {
    pub page_obj: PageInfo,
    pub posts: Vec<PostCard>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryPage {
    pub category: Category,
    pub page_obj: PageInfo,
    pub posts: Vec<PostCard>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfilePage {
    pub profile: Profile,
    pub page_obj: PageInfo,
    pub posts: Vec<PostCard>,
}

/// Count what the audience may see (`None` skips filtering), then load and
/// annotate only the requested page.
async fn listing_page(
    repo: &dyn Repo,
    scope: PostScope,
    audience: Option<Audience>,
    page: Option<&str>,
) -> Result<(Vec<PostCard>, PageInfo), ApiError> {
    let listing = PostListing { scope, audience, now: Utc::now() };
    let page_obj = PageInfo::locate(repo.count_posts(listing).await?, page, POSTS_PER_PAGE);
    let records = repo.list_posts(listing, page_obj.offset(POSTS_PER_PAGE), POSTS_PER_PAGE).await?;
    let posts = annotate(repo, records).await?;
    Ok((posts, page_obj))
}

#[utoipa::path(
    get,
    path = "/",
    params(("page" = Option<String>, Query, description = "Page number, 1-based")),
    responses((status = 200, description = "Publicly visible posts, newest first", body = PostListPage))
)]
pub async fn index(data: web::Data<AppState>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let (posts, page_obj) =
        listing_page(data.repo.as_ref(), PostScope::All, Some(Audience::Public), query.page.as_deref()).await?;
    Ok(HttpResponse::Ok().json(PostListPage { page_obj, posts }))
}

#[utoipa::path(
    get,
    path = "/category/{slug}/",
    params(("slug" = String, Path, description = "Category slug"), ("page" = Option<String>, Query, description = "Page number")),
    responses(
        (status = 200, description = "Publicly visible posts in the category", body = CategoryPage),
        (status = 404, description = "Category missing or unpublished")
    )
)]
pub async fn category_posts(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let category = data.repo.get_category_by_slug(&path.into_inner()).await?;
    if !category.is_published {
        return Err(ApiError::NotFound);
    }
    let (posts, page_obj) = listing_page(
        data.repo.as_ref(),
        PostScope::Category(category.id),
        Some(Audience::Public),
        query.page.as_deref(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(CategoryPage { category, page_obj, posts }))
}

#[utoipa::path(
    get,
    path = "/profile/{username}/",
    params(("username" = String, Path, description = "Username"), ("page" = Option<String>, Query, description = "Page number")),
    responses(
        (status = 200, description = "Profile with the user's posts; hidden ones only for the owner", body = ProfilePage),
        (status = 404, description = "No such user")
    )
)]
pub async fn profile(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user_by_username(&path.into_inner()).await?;
    let own = auth.as_ref().map(Auth::user_id) == Some(user.id);
    let audience = if own { None } else { Some(Audience::Public) };
    let (posts, page_obj) =
        listing_page(data.repo.as_ref(), PostScope::Author(user.id), audience, query.page.as_deref()).await?;
    Ok(HttpResponse::Ok().json(ProfilePage { profile: Profile::from(&user), page_obj, posts }))
}

// ---------------- Profile editing ---------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileFormPage {
    pub form: ProfileForm,
}

pub async fn edit_profile_form(req: HttpRequest, auth: Option<Auth>, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let user = data.repo.get_user(auth.user_id()).await?;
    let form = ProfileForm {
        first_name: Some(user.first_name),
        last_name: Some(user.last_name),
        email: Some(user.email),
    };
    Ok(HttpResponse::Ok().json(ProfileFormPage { form }))
}

#[utoipa::path(
    post,
    path = "/edit-profile/",
    request_body = ProfileForm,
    responses(
        (status = 302, description = "Updated; redirects to the index"),
        (status = 400, description = "Validation failed")
    )
)]
pub async fn edit_profile(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    payload: web::Json<ProfileForm>,
) -> Result<HttpResponse, ApiError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let upd = payload.into_inner().clean()?;
    data.repo.update_profile(auth.user_id(), upd).await?;
    Ok(redirect("/"))
}

// ---------------- Posts -------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct PostDetailPage {
    pub post: PostCard,
    pub comments: Vec<CommentView>,
    pub form: CommentForm,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostFormPage {
    pub form: PostForm,
    pub categories: Vec<Category>,
    pub locations: Vec<Location>,
}

/// Choices offered by the post form.
async fn post_form_page(repo: &dyn Repo, form: PostForm) -> Result<PostFormPage, ApiError> {
    let categories = repo.list_categories().await?.into_iter().filter(|c| c.is_published).collect();
    let locations = repo.list_locations().await?.into_iter().filter(|l| l.is_published).collect();
    Ok(PostFormPage { form, categories, locations })
}

#[utoipa::path(
    get,
    path = "/posts/{id}/",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post with its comments, oldest first", body = PostDetailPage),
        (status = 404, description = "Missing, or hidden from this viewer")
    )
)]
pub async fn post_detail(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let record = data.repo.get_post(path.into_inner()).await?;
    let audience = Audience::for_viewer(auth.as_ref().map(Auth::user_id));
    if !audience.admits_record(&record, Utc::now()) {
        return Err(ApiError::NotFound);
    }
    let comments = data.repo.list_comments(record.post.id).await?;
    let comments = comment_views(data.repo.as_ref(), comments).await?;
    let post = annotate(data.repo.as_ref(), vec![record]).await?.pop().ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(PostDetailPage { post, comments, form: CommentForm::default() }))
}

pub async fn create_post_form(req: HttpRequest, auth: Option<Auth>, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    if auth.is_none() {
        return Ok(login_redirect(&req));
    }
    let page = post_form_page(data.repo.as_ref(), PostForm::default()).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/posts/create/",
    request_body = PostForm,
    responses(
        (status = 302, description = "Created; redirects to the author's profile"),
        (status = 400, description = "Validation failed"),
        (status = 429, description = "Too many posts")
    )
)]
pub async fn create_post(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    payload: web::Json<PostForm>,
) -> Result<HttpResponse, ApiError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_post(&auth.user_id().to_string()) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let new = payload.into_inner().clean(auth.user_id(), data.repo.as_ref()).await?;
    let post = data.repo.create_post(new).await?;
    metrics::counter!("blog_posts_created_total").increment(1);
    tracing::info!(post_id = post.id, author_id = post.author_id, "post created");
    Ok(redirect(format!("/profile/{}/", urlencoding::encode(auth.username()))))
}

pub async fn edit_post_form(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let PostRecord { post, .. } = data.repo.get_post(path.into_inner()).await?;
    if !can_mutate(&post, auth.user_id()) {
        return Ok(deny(post.id));
    }
    let form = PostForm {
        title: Some(post.title),
        text: Some(post.text),
        pub_date: Some(post.pub_date),
        category: post.category_id,
        location: Some(post.location_id),
        image: Some(post.image),
        is_published: Some(post.is_published),
    };
    let page = post_form_page(data.repo.as_ref(), form).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/posts/{id}/edit/",
    request_body = PostForm,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 302, description = "Redirects to the post; nothing changes unless the viewer is the author"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "No such post")
    )
)]
pub async fn edit_post(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<PostForm>,
) -> Result<HttpResponse, ApiError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let PostRecord { post, .. } = data.repo.get_post(path.into_inner()).await?;
    if !can_mutate(&post, auth.user_id()) {
        return Ok(deny(post.id));
    }
    let upd = payload.into_inner().clean_update(data.repo.as_ref()).await?;
    data.repo.update_post(post.id, upd).await?;
    Ok(redirect(post_url(post.id)))
}

#[utoipa::path(
    post,
    path = "/posts/{id}/delete/",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 302, description = "Deleted with its comments and redirected to the index, or redirected to the post when not the author"),
        (status = 404, description = "No such post")
    )
)]
pub async fn delete_post(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let PostRecord { post, .. } = data.repo.get_post(path.into_inner()).await?;
    if !can_mutate(&post, auth.user_id()) {
        return Ok(deny(post.id));
    }
    data.repo.delete_post(post.id).await?;
    tracing::info!(post_id = post.id, "post deleted");
    Ok(redirect("/"))
}

// ---------------- Comments ----------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct CommentFormPage {
    pub comment: CommentView,
    pub form: CommentForm,
}

/// The comment must belong to the post named in the route.
async fn load_comment(repo: &dyn Repo, post_id: Id, comment_id: Id) -> Result<Comment, ApiError> {
    let comment = repo.get_comment(comment_id).await?;
    if comment.post_id != post_id {
        return Err(ApiError::NotFound);
    }
    Ok(comment)
}

#[utoipa::path(
    post,
    path = "/posts/{id}/comment/",
    request_body = CommentForm,
    params(("id" = Id, Path, description = "Post id; always the comment's parent")),
    responses(
        (status = 302, description = "Created; redirects to the post"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Post missing or hidden from this viewer"),
        (status = 429, description = "Too many comments")
    )
)]
pub async fn add_comment(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<CommentForm>,
) -> Result<HttpResponse, ApiError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let record = data.repo.get_post(path.into_inner()).await?;
    if !Audience::Viewer(auth.user_id()).admits_record(&record, Utc::now()) {
        return Err(ApiError::NotFound);
    }
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_comment(&auth.user_id().to_string()) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let text = payload.into_inner().clean()?;
    let post_id = record.post.id;
    data.repo.create_comment(NewComment { text, post_id, author_id: auth.user_id() }).await?;
    metrics::counter!("blog_comments_created_total").increment(1);
    Ok(redirect(post_url(post_id)))
}

pub async fn edit_comment_form(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
) -> Result<HttpResponse, ApiError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let (post_id, comment_id) = path.into_inner();
    let comment = load_comment(data.repo.as_ref(), post_id, comment_id).await?;
    if !can_mutate(&comment, auth.user_id()) {
        return Ok(deny(post_id));
    }
    let form = CommentForm { text: Some(comment.text.clone()) };
    let comment = comment_views(data.repo.as_ref(), vec![comment]).await?.pop().ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(CommentFormPage { comment, form }))
}

#[utoipa::path(
    post,
    path = "/posts/{id}/comment/{comment_id}/edit/",
    request_body = CommentForm,
    params(("id" = Id, Path, description = "Post id"), ("comment_id" = Id, Path, description = "Comment id")),
    responses(
        (status = 302, description = "Redirects to the post; nothing changes unless the viewer is the author"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "No such comment on this post")
    )
)]
pub async fn edit_comment(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
    payload: web::Json<CommentForm>,
) -> Result<HttpResponse, ApiError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let (post_id, comment_id) = path.into_inner();
    let comment = load_comment(data.repo.as_ref(), post_id, comment_id).await?;
    if !can_mutate(&comment, auth.user_id()) {
        return Ok(deny(post_id));
    }
    let text = payload.into_inner().clean()?;
    data.repo.update_comment(comment.id, text).await?;
    Ok(redirect(post_url(post_id)))
}

#[utoipa::path(
    post,
    path = "/posts/{id}/comment/{comment_id}/delete/",
    params(("id" = Id, Path, description = "Post id"), ("comment_id" = Id, Path, description = "Comment id")),
    responses(
        (status = 302, description = "Redirects to the post; deleted only when the viewer is the author"),
        (status = 404, description = "No such comment on this post")
    )
)]
pub async fn delete_comment(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
) -> Result<HttpResponse, ApiError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let (post_id, comment_id) = path.into_inner();
    let comment = load_comment(data.repo.as_ref(), post_id, comment_id).await?;
    if !can_mutate(&comment, auth.user_id()) {
        return Ok(deny(post_id));
    }
    data.repo.delete_comment(comment.id).await?;
    Ok(redirect(post_url(post_id)))
}

// ---------------- Accounts ----------------------------------------

pub async fn registration_form() -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(serde_json::json!({ "form": RegistrationForm::default().redisplay() })))
}

#[utoipa::path(
    post,
    path = "/auth/registration/",
    request_body = RegistrationForm,
    responses(
        (status = 302, description = "Account created; redirects to login"),
        (status = 400, description = "Validation failed or username taken"),
        (status = 429, description = "Too many registrations from this address")
    )
)]
pub async fn registration(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<RegistrationForm>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        // the socket peer; forwarding headers are client-controlled
        let ip = req.peer_addr().map_or_else(|| "unknown".to_string(), |a| a.ip().to_string());
        if !rl.allow_register(&ip) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let form = payload.into_inner();
    let redisplay = form.redisplay();
    let clean = form.clean()?;
    let new = NewUser {
        password_hash: hash_password(&clean.password)?,
        username: clean.username,
        first_name: String::new(),
        last_name: String::new(),
        email: String::new(),
    };
    match data.repo.create_user(new).await {
        Ok(user) => {
            metrics::counter!("blog_users_registered_total").increment(1);
            tracing::info!(user_id = user.id, "user registered");
            Ok(redirect("/auth/login/"))
        }
        Err(RepoError::Conflict) => Err(ApiError::field("username", "A user with that username already exists.", redisplay)),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    /// Where the client was headed before being sent to log in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[utoipa::path(
    post,
    path = "/auth/login/",
    request_body = LoginForm,
    params(("next" = Option<String>, Query, description = "Local path to continue to")),
    responses(
        (status = 200, description = "Bearer token", body = TokenResponse),
        (status = 400, description = "Wrong username or password")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    query: web::Query<LoginQuery>,
    payload: web::Json<LoginForm>,
) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner();
    let invalid = || {
        ApiError::field(
            "__all__",
            "Please enter a correct username and password. Note that both fields may be case-sensitive.",
            serde_json::json!({ "username": form.username }),
        )
    };
    let user = match data.repo.get_user_by_username(&form.username).await {
        Ok(user) => user,
        Err(RepoError::NotFound) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };
    if !verify_password(&form.password, &user.password_hash) {
        return Err(invalid());
    }
    let token = create_jwt(user.id, &user.username, roles_for(&user.username, &data.bootstrap_admins))?;
    // only local paths, never another origin
    let next = query.into_inner().next.filter(|n| n.starts_with('/') && !n.starts_with("//"));
    Ok(HttpResponse::Ok().json(TokenResponse { token, token_type: "Bearer".into(), next }))
}

pub async fn refresh_token(auth: Auth) -> Result<HttpResponse, ApiError> {
    let token = create_jwt(auth.user_id(), auth.username(), auth.0.roles.clone())?;
    Ok(HttpResponse::Ok().json(TokenResponse { token, token_type: "Bearer".into(), next: None }))
}

// ---------------- Media -------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ImageUploadResponse {
    pub hash: String,
    pub mime: String,
    pub size: usize,
    pub duplicate: bool, // true when upload was a duplicate (idempotent)
}

const IMAGE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

#[utoipa::path(
    post,
    path = "/media/",
    responses(
        (status = 201, description = "Image stored (new)", body = ImageUploadResponse),
        (status = 200, description = "Image already existed (idempotent)", body = ImageUploadResponse),
        (status = 400, description = "No file field"),
        (status = 413, description = "Payload too large"),
        (status = 415, description = "Unsupported media type"),
    )
)]
pub async fn upload_image(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    if auth.is_none() {
        return Ok(login_redirect(&req));
    }
    let multipart_err = |e: actix_multipart::MultipartError| {
        log::error!("multipart error: {e}");
        ApiError::Internal
    };
    while let Some(mut field) = payload.try_next().await.map_err(multipart_err)? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }
        let mut bytes: Vec<u8> = Vec::new();
        let mut hasher = Sha256::new();
        while let Some(chunk) = field.try_next().await.map_err(multipart_err)? {
            if bytes.len() + chunk.len() > IMAGE_SIZE_LIMIT {
                return Ok(HttpResponse::PayloadTooLarge().finish());
            }
            hasher.update(&chunk);
            bytes.extend_from_slice(&chunk);
        }
        let hash = format!("{:x}", hasher.finalize());
        let mime = crate::storage::sniff_mime(&bytes);
        if !ALLOWED_MIME.contains(&mime.as_str()) {
            return Ok(HttpResponse::UnsupportedMediaType().finish());
        }
        let (status, duplicate) = match data.image_store.save(&hash, &mime, &bytes).await {
            Ok(()) => (actix_web::http::StatusCode::CREATED, false),
            Err(ImageStoreError::Duplicate) => (actix_web::http::StatusCode::OK, true),
            Err(e) => {
                log::error!("image_store save error: {e}");
                return Err(ApiError::Internal);
            }
        };
        let resp = ImageUploadResponse { hash, mime, size: bytes.len(), duplicate };
        return Ok(HttpResponse::build(status).json(resp));
    }
    Err(ApiError::field("file", "No file was submitted.", serde_json::Value::Null))
}

pub async fn get_image(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    match data.image_store.load(&path.into_inner()).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok().insert_header((header::CONTENT_TYPE, mime)).body(bytes)),
        Err(ImageStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("image_store load error: {e}");
            Err(ApiError::Internal)
        }
    }
}

// ---------------- Operations --------------------------------------

/// Prometheus exposition; 404 when no recorder was installed.
pub async fn prometheus_metrics(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let handle = data.metrics.as_ref().ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().content_type("text/plain; version=0.0.4").body(handle.render()))
}
