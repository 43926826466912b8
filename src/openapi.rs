use crate::forms::{CommentForm, LoginForm, PostForm, ProfileForm, RegistrationForm};
use crate::models::{
    AuthorRef, Category, CommentView, Location, NewCategory, NewLocation, PostCard, Profile, UpdateCategory,
    UpdateLocation, UserSummary,
};
use crate::pagination::PageInfo;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::index,
        crate::routes::category_posts,
        crate::routes::profile,
        crate::routes::edit_profile,
        crate::routes::post_detail,
        crate::routes::create_post,
        crate::routes::edit_post,
        crate::routes::delete_post,
        crate::routes::add_comment,
        crate::routes::edit_comment,
        crate::routes::delete_comment,
        crate::routes::registration,
        crate::routes::login,
        crate::routes::upload_image,
        crate::admin::list_categories,
        crate::admin::create_category,
        crate::admin::update_category,
        crate::admin::delete_category,
        crate::admin::list_locations,
        crate::admin::create_location,
        crate::admin::update_location,
        crate::admin::delete_location,
        crate::admin::list_users,
        crate::admin::delete_user,
    ),
    components(schemas(
        Category, NewCategory, UpdateCategory, Location, NewLocation, UpdateLocation,
        PostCard, AuthorRef, CommentView, Profile, UserSummary, PageInfo,
        PostForm, CommentForm, ProfileForm, RegistrationForm, LoginForm,
        crate::routes::PostListPage, crate::routes::CategoryPage, crate::routes::ProfilePage,
        crate::routes::PostDetailPage, crate::routes::TokenResponse, crate::routes::ImageUploadResponse,
    )),
    tags(
        (name = "posts", description = "Posts, listings and comments"),
        (name = "accounts", description = "Registration, login and profiles"),
        (name = "admin", description = "Site administration"),
    )
)]
pub struct ApiDoc;
