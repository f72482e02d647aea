use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use server::{build_app, ServerConfig};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

fn app() -> (Router, TempDir) {
    let dir = tempdir().unwrap();
    let config = ServerConfig {
        data_dir: dir.path().to_path_buf(),
        admin_token: Some("secret".into()),
        ..ServerConfig::default()
    };
    (build_app(&config).unwrap(), dir)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, json)
}

async fn create(app: &Router, title: &str, body: &str) -> u64 {
    let (status, json) = call(app, "POST", "/items", Some(json!({ "author_ref": "u1", "title": title, "body": body }))).await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_u64().unwrap()
}

#[tokio::test]
async fn similar_ranks_related_posts_first() {
    let (app, _dir) = app();
    let a = create(&app, "Learning Go concurrency patterns", "goroutines and channels").await;
    let b = create(&app, "Go concurrency patterns in depth", "select statements").await;
    create(&app, "Cooking pasta tonight", "tomato sauce").await;

    let (status, json) = call(&app, "GET", &format!("/items/{a}/similar?limit=2"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "found");
    let items = json["similar_items"].as_array().unwrap();
    assert_eq!(items[0]["id"].as_u64().unwrap(), b);
    assert_eq!(items[0]["excerpt"], "select statements");
    assert!(items[0]["created_at"].is_string());
    assert!(items.iter().all(|i| i["id"].as_u64().unwrap() != a));
}

#[tokio::test]
async fn insufficient_keywords_is_not_an_error() {
    let (app, _dir) = app();
    let blank = create(&app, "   ", "").await;
    create(&app, "anything", "else").await;

    let (status, json) = call(&app, "GET", &format!("/items/{blank}/similar"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "insufficient_keywords");
    assert!(json["message"].is_string());
    assert_eq!(json["similar_items"], json!([]));
}

#[tokio::test]
async fn non_positive_limit_uses_default() {
    let (app, _dir) = app();
    let source = create(&app, "elixir", "").await;
    for _ in 0..5 {
        create(&app, "elixir otp", "").await;
    }
    let (_, json) = call(&app, "GET", &format!("/items/{source}/similar?limit=-4"), None).await;
    assert_eq!(json["similar_items"].as_array().unwrap().len(), 3);
    let (status, json) = call(&app, "GET", &format!("/items/{source}/similar?limit=abc"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["similar_items"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn unknown_item_is_404() {
    let (app, _dir) = app();
    let (status, json) = call(&app, "GET", "/items/999/similar", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());
    let (status, _) = call(&app, "PUT", "/items/999", Some(json!({ "title": "t", "body": "b" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_and_delete_keep_index_in_sync() {
    let (app, _dir) = app();
    let a = create(&app, "svelte stores", "").await;
    let b = create(&app, "svelte runes", "").await;

    let (status, json) = call(&app, "PUT", &format!("/items/{b}"), Some(json!({ "title": "pottery", "body": "clay" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["derived_keywords"], "pottery pottery pottery clay");
    let (status, json) = call(&app, "GET", &format!("/items/{b}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "pottery");
    assert!(json["updated_at"].is_string());
    let (_, json) = call(&app, "GET", &format!("/items/{a}/similar"), None).await;
    assert_eq!(json["similar_items"], json!([]));
    assert_eq!(json["message"], "no similar items found");

    let c = create(&app, "svelte kit", "").await;
    let (status, _) = call(&app, "DELETE", &format!("/items/{c}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = call(&app, "GET", &format!("/items/{a}/similar"), None).await;
    assert_eq!(json["similar_items"], json!([]));
    let (status, _) = call(&app, "GET", &format!("/items/{c}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_validates_fields() {
    let (app, _dir) = app();
    let (status, json) = call(&app, "POST", "/items", Some(json!({ "title": "no body" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("body"));

    let long = "t".repeat(51);
    let (status, _) = call(&app, "POST", "/items", Some(json!({ "title": long, "body": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_returns_highlighted_hits() {
    let (app, _dir) = app();
    let a = create(&app, "Rust", "Rust is great. rust systems programming.").await;
    create(&app, "Learning", "Learning rust.").await;
    create(&app, "Pasta", "al dente").await;

    let (status, json) = call(&app, "GET", "/search?q=rust&k=5", None).await;
    assert_eq!(status, StatusCode::OK);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"].as_u64().unwrap(), a);
    assert!(results[0]["snippet"].as_str().unwrap().contains("<em>Rust</em>"));
}

#[tokio::test]
async fn rebuild_requires_admin_token() {
    let (app, _dir) = app();
    create(&app, "deno", "").await;
    let (status, _) = call(&app, "POST", "/index/rebuild", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("POST")
        .uri("/index/rebuild")
        .header("X-ADMIN-TOKEN", "secret")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["items"], 1);
    assert_eq!(json["updated"], 0);
}
