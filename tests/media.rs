#![cfg(feature = "inmem-store")]

mod common;

use std::sync::Arc;

use actix_web::{test, web, App};
use blogicum::repo::inmem::InMemRepo;
use blogicum::storage::FsImageStore;
use blogicum::{config, AppState};
use common::*;
use serde_json::json;
use serial_test::serial;

// Helper to build a multipart body with provided bytes and filename
fn build_multipart(field: &str, file_name: &str, bytes: &[u8], boundary: &str) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    let disp = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    );
    body.extend_from_slice(disp.as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

// Minimal 1x1 PNG (transparent)
fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I',
        b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A,
        0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}

#[actix_web::test]
#[serial]
async fn upload_fetch_and_attach_image() {
    let media = tempfile::tempdir().unwrap();
    let repo = InMemRepo::new();
    let anna = seed_user(&repo, "anna").await;
    let travel = seed_category(&repo, "travel", true).await;
    set_secret();
    let state = AppState::new(Arc::new(repo.clone()), Arc::new(FsImageStore::new(media.path())));
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(config)).await;

    let png = sample_png();
    let (ct, body) = build_multipart("file", "dot.png", &png, "XBOUNDARY");
    let req = test::TestRequest::post()
        .uri("/media/")
        .insert_header(bearer(&token(&anna)))
        .insert_header(("Content-Type", ct.clone()))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let uploaded: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(uploaded["mime"], "image/png");
    assert_eq!(uploaded["duplicate"], false);
    let hash = uploaded["hash"].as_str().unwrap().to_string();
    assert_eq!(hash.len(), 64);

    // same bytes again are idempotent
    let req = test::TestRequest::post()
        .uri("/media/")
        .insert_header(bearer(&token(&anna)))
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let again: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(again["duplicate"], true);

    let req = test::TestRequest::get().uri(&format!("/media/{hash}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(test::read_body(resp).await.to_vec(), png);

    let req = test::TestRequest::post()
        .uri("/posts/create/")
        .insert_header(bearer(&token(&anna)))
        .set_json(json!({"title": "t", "text": "b", "pub_date": "2024-01-01T00:00:00Z", "category": travel.id, "image": hash}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 302);
    let req = test::TestRequest::get().uri("/").to_request();
    let page: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["posts"][0]["image"], hash.as_str());
}

#[actix_web::test]
#[serial]
async fn upload_rejects_non_images_and_anonymous() {
    let repo = InMemRepo::new();
    let anna = seed_user(&repo, "anna").await;
    let app = test::init_service(App::new().app_data(web::Data::new(state(&repo))).configure(config)).await;

    let (ct, body) = build_multipart("file", "notes.txt", b"hello world", "XBOUNDARY");
    let req = test::TestRequest::post()
        .uri("/media/")
        .insert_header(bearer(&token(&anna)))
        .insert_header(("Content-Type", ct.clone()))
        .set_payload(body.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 415);

    let req = test::TestRequest::post()
        .uri("/media/")
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 302);

    let (ct, body) = build_multipart("attachment", "dot.png", &sample_png(), "XBOUNDARY");
    let req = test::TestRequest::post()
        .uri("/media/")
        .insert_header(bearer(&token(&anna)))
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get().uri(&format!("/media/{}", "0".repeat(64))).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}
