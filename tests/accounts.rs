#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{dev::Payload, http::header, test, web, App, FromRequest};
use blogicum::auth::{create_jwt, Auth, Claims, Role};
use blogicum::error::ApiError;
use blogicum::repo::inmem::InMemRepo;
use blogicum::repo::UserRepo;
use blogicum::{config, require_role};
use common::*;
use serde_json::json;
use serial_test::serial;

#[actix_web::test]
#[serial]
async fn jwt_roundtrip_ok() {
    set_secret();
    let token = create_jwt(42, "tester", vec![Role::User]).expect("token");
    // The Auth extractor is the public way to validate, so use it here.
    let req = test::TestRequest::default()
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_http_request();
    let mut pl = Payload::None;
    let auth = Auth::from_request(&req, &mut pl).await.expect("extract");
    assert_eq!(auth.user_id(), 42);
    assert_eq!(auth.username(), "tester");
    assert!(auth.has_role(&Role::User));
    assert!(!auth.has_role(&Role::Admin));
}

#[actix_web::test]
#[serial]
async fn extractor_rejects_invalid_token() {
    set_secret();
    let req = test::TestRequest::default()
        .insert_header(("Authorization", "Bearer notatoken"))
        .to_http_request();
    let mut pl = Payload::None;
    assert!(matches!(Auth::from_request(&req, &mut pl).await, Err(ApiError::Unauthorized)));
}

#[actix_web::test]
async fn require_role_macro_enforces_roles() {
    let claims = |roles| Claims { sub: "someone".into(), uid: 1, exp: usize::MAX, roles };
    let admin = Auth(claims(vec![Role::User, Role::Admin]));
    let user = Auth(claims(vec![Role::User]));

    fn guarded(a: Auth) -> actix_web::Result<()> {
        require_role!(a, Role::Admin);
        Ok(())
    }
    assert!(guarded(admin).is_ok());
    assert!(guarded(user).is_err());
}

#[actix_web::test]
#[serial]
async fn register_then_login_then_refresh() {
    let repo = InMemRepo::new();
    let app = test::init_service(App::new().app_data(web::Data::new(state(&repo))).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/auth/registration/")
        .set_json(json!({"username": "anna", "password1": "s3cret-pass", "password2": "s3cret-pass"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/auth/login/");
    let stored = repo.get_user_by_username("anna").await.unwrap();
    assert_ne!(stored.password_hash, "s3cret-pass");

    // same name again
    let req = test::TestRequest::post()
        .uri("/auth/registration/")
        .set_json(json!({"username": "anna", "password1": "other-pass-1", "password2": "other-pass-1"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["errors"]["username"].is_array());
    assert!(body["form"].get("password1").is_none());

    let req = test::TestRequest::post()
        .uri("/auth/login/")
        .set_json(json!({"username": "anna", "password": "wrong-pass"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/auth/login/?next=%2Fposts%2Fcreate%2F")
        .set_json(json!({"username": "anna", "password": "s3cret-pass"}))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["next"], "/posts/create/");

    let req = test::TestRequest::get().uri("/edit-profile/").insert_header(bearer(&token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post().uri("/auth/refresh/").insert_header(bearer(&token)).to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["token"].as_str().is_some());
}

#[actix_web::test]
#[serial]
async fn login_ignores_foreign_next() {
    let repo = InMemRepo::new();
    let app = test::init_service(App::new().app_data(web::Data::new(state(&repo))).configure(config)).await;
    let req = test::TestRequest::post()
        .uri("/auth/registration/")
        .set_json(json!({"username": "anna", "password1": "s3cret-pass", "password2": "s3cret-pass"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 302);

    let req = test::TestRequest::post()
        .uri("/auth/login/?next=%2F%2Fevil.example")
        .set_json(json!({"username": "anna", "password": "s3cret-pass"}))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert!(body.get("next").is_none());
}

#[actix_web::test]
#[serial]
async fn registration_validates_passwords() {
    let repo = InMemRepo::new();
    let app = test::init_service(App::new().app_data(web::Data::new(state(&repo))).configure(config)).await;
    let req = test::TestRequest::post()
        .uri("/auth/registration/")
        .set_json(json!({"username": "bad name", "password1": "1234", "password2": "4321"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    for field in ["username", "password1", "password2"] {
        assert!(body["errors"][field].is_array(), "missing error for {field}");
    }
    assert!(repo.get_user_by_username("bad name").await.is_err());
}

#[actix_web::test]
#[serial]
async fn profile_edit_changes_only_supplied_fields() {
    let repo = InMemRepo::new();
    let anna = seed_user(&repo, "anna").await;
    let app = test::init_service(App::new().app_data(web::Data::new(state(&repo))).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/edit-profile/")
        .insert_header(bearer(&token(&anna)))
        .set_json(json!({"first_name": "Anna", "username": "root"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/");

    let stored = repo.get_user(anna.id).await.unwrap();
    assert_eq!(stored.first_name, "Anna");
    assert_eq!(stored.last_name, "Last");
    assert_eq!(stored.email, "anna@example.com");
    assert_eq!(stored.username, "anna");

    let req = test::TestRequest::post()
        .uri("/edit-profile/")
        .insert_header(bearer(&token(&anna)))
        .set_json(json!({"email": "not-an-address"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
    assert_eq!(repo.get_user(anna.id).await.unwrap().email, "anna@example.com");

    let long = format!("{}@example.com", "a".repeat(300));
    let req = test::TestRequest::post()
        .uri("/edit-profile/")
        .insert_header(bearer(&token(&anna)))
        .set_json(json!({ "email": long }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["errors"]["email"].is_array());
    assert_eq!(repo.get_user(anna.id).await.unwrap().email, "anna@example.com");

    let req = test::TestRequest::get().uri("/edit-profile/").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 302);
}
