//! Site administration: categories, locations and user accounts.
//!
//! Every handler requires a bearer token carrying the `admin` role.

use actix_web::{web, HttpResponse};

use crate::auth::{Auth, Role};
use crate::error::ApiError;
use crate::models::*;
use crate::require_role;
use crate::routes::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/categories/")
            .route(web::get().to(list_categories))
            .route(web::post().to(create_category)),
    )
    .service(
        web::resource("/categories/{id}/")
            .route(web::patch().to(update_category))
            .route(web::delete().to(delete_category)),
    )
    .service(
        web::resource("/locations/")
            .route(web::get().to(list_locations))
            .route(web::post().to(create_location)),
    )
    .service(
        web::resource("/locations/{id}/")
            .route(web::patch().to(update_location))
            .route(web::delete().to(delete_location)),
    )
    .route("/users/", web::get().to(list_users))
    .route("/users/{id}/", web::delete().to(delete_user));
}

#[utoipa::path(
    get,
    path = "/admin/categories/",
    responses((status = 200, description = "All categories, published or not", body = [Category]), (status = 403, description = "Admins only"))
)]
pub async fn list_categories(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    Ok(HttpResponse::Ok().json(data.repo.list_categories().await?))
}

#[utoipa::path(
    post,
    path = "/admin/categories/",
    request_body = NewCategory,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Slug already in use")
    )
)]
pub async fn create_category(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewCategory>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let category = data.repo.create_category(payload.into_inner().clean()?).await?;
    tracing::info!(category_id = category.id, slug = %category.slug, "category created");
    Ok(HttpResponse::Created().json(category))
}

#[utoipa::path(
    patch,
    path = "/admin/categories/{id}/",
    request_body = UpdateCategory,
    params(("id" = Id, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category updated", body = Category),
        (status = 404, description = "Category not found"),
        (status = 409, description = "Slug already in use")
    )
)]
pub async fn update_category(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateCategory>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let category = data.repo.update_category(path.into_inner(), payload.into_inner().clean()?).await?;
    Ok(HttpResponse::Ok().json(category))
}

#[utoipa::path(
    delete,
    path = "/admin/categories/{id}/",
    params(("id" = Id, Path, description = "Category id")),
    responses((status = 204, description = "Deleted; its posts lose their category"), (status = 404, description = "Category not found"))
)]
pub async fn delete_category(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    data.repo.delete_category(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/admin/locations/",
    responses((status = 200, description = "All locations", body = [Location]), (status = 403, description = "Admins only"))
)]
pub async fn list_locations(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    Ok(HttpResponse::Ok().json(data.repo.list_locations().await?))
}

#[utoipa::path(
    post,
    path = "/admin/locations/",
    request_body = NewLocation,
    responses((status = 201, description = "Location created", body = Location), (status = 400, description = "Validation failed"))
)]
pub async fn create_location(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewLocation>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let location = data.repo.create_location(payload.into_inner().clean()?).await?;
    Ok(HttpResponse::Created().json(location))
}

#[utoipa::path(
    patch,
    path = "/admin/locations/{id}/",
    request_body = UpdateLocation,
    params(("id" = Id, Path, description = "Location id")),
    responses((status = 200, description = "Location updated", body = Location), (status = 404, description = "Location not found"))
)]
pub async fn update_location(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateLocation>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let location = data.repo.update_location(path.into_inner(), payload.into_inner().clean()?).await?;
    Ok(HttpResponse::Ok().json(location))
}

#[utoipa::path(
    delete,
    path = "/admin/locations/{id}/",
    params(("id" = Id, Path, description = "Location id")),
    responses((status = 204, description = "Deleted; its posts lose their location"), (status = 404, description = "Location not found"))
)]
pub async fn delete_location(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    data.repo.delete_location(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/admin/users/",
    responses((status = 200, description = "Users with their post counts", body = [UserSummary]), (status = 403, description = "Admins only"))
)]
pub async fn list_users(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    Ok(HttpResponse::Ok().json(data.repo.list_user_summaries().await?))
}

#[utoipa::path(
    delete,
    path = "/admin/users/{id}/",
    params(("id" = Id, Path, description = "User id")),
    responses((status = 204, description = "Deleted with their posts and comments"), (status = 404, description = "User not found"))
)]
pub async fn delete_user(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let id = path.into_inner();
    data.repo.delete_user(id).await?;
    tracing::info!(user_id = id, by = auth.user_id(), "user deleted");
    Ok(HttpResponse::NoContent().finish())
}
