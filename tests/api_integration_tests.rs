//! Integration Tests for API Endpoints
//!
//! Full request/response cycles through the router, backed by the
//! in-process store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use clipcache::{api::create_router, models::Video, store::MemoryStore, AppState, Config};
use clipcache::store::Record;
use serde_json::Value;
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::from_config(Arc::new(Config::default()), store.clone());
    (create_router(state), store)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn post(app: &Router, uri: &str, body: String) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn seed_video(store: &MemoryStore, id: u64, created_at: i64) {
    store
        .seed(Record::Video(Video {
            id,
            author_id: 100,
            title: format!("video {id}"),
            play_url: format!("https://cdn.example/{id}.mp4"),
            cover_url: String::new(),
            created_at,
        }))
        .await;
}

fn ids(page: &Value, field: &str) -> Vec<u64> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item[field].as_u64().unwrap())
        .collect()
}

// == Publish and Feed ==

#[tokio::test]
async fn test_publish_then_feed_and_author_list() {
    let (app, _) = create_test_app();

    let (status, json) = post(
        &app,
        "/publish/action",
        r#"{"user_id":7,"title":"first clip","play_url":"https://cdn.example/a.mp4"}"#.into(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let video_id = json["id"].as_u64().unwrap();

    let (status, feed) = get(&app, "/feed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&feed, "id"), vec![video_id]);
    assert_eq!(feed["items"][0]["title"], "first clip");
    assert_eq!(feed["items"][0]["favorite_count"], 0);
    assert!(feed["next_cursor"].is_null());

    let (_, mine) = get(&app, "/publish/list/7").await;
    assert_eq!(ids(&mine, "id"), vec![video_id]);
}

#[tokio::test]
async fn test_publish_rejects_empty_title() {
    let (app, _) = create_test_app();

    let (status, json) = post(
        &app,
        "/publish/action",
        r#"{"user_id":7,"title":"","play_url":"https://cdn.example/a.mp4"}"#.into(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_feed_cursor_pagination() {
    let (app, store) = create_test_app();
    for id in 1..=40 {
        seed_video(&store, id, id as i64 * 10).await;
    }

    let (_, first) = get(&app, "/feed").await;
    assert_eq!(first["items"].as_array().unwrap().len(), 30);
    assert_eq!(first["next_cursor"], 110);

    let (_, second) = get(&app, "/feed?cursor=110").await;
    assert_eq!(ids(&second, "id"), (1..=10).rev().collect::<Vec<u64>>());
    assert!(second["next_cursor"].is_null());
}

// == Favorites ==

#[tokio::test]
async fn test_favorite_flow() {
    let (app, store) = create_test_app();
    seed_video(&store, 5, 50).await;

    let like = r#"{"user_id":1,"video_id":5,"action_type":1}"#;
    let (status, _) = post(&app, "/favorite/action", like.into()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(&app, "/favorite/action", like.into()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, list) = get(&app, "/favorite/list/1?viewer_id=1").await;
    assert_eq!(ids(&list, "id"), vec![5]);
    assert_eq!(list["items"][0]["is_favorite"], true);

    let unlike = r#"{"user_id":1,"video_id":5,"action_type":2}"#;
    let (status, _) = post(&app, "/favorite/action", unlike.into()).await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = get(&app, "/favorite/list/1").await;
    assert!(list["items"].as_array().unwrap().is_empty());

    let (status, _) = post(&app, "/favorite/action", unlike.into()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_action_type() {
    let (app, _) = create_test_app();

    let (status, _) = post(
        &app,
        "/favorite/action",
        r#"{"user_id":1,"video_id":5,"action_type":9}"#.into(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// == Follow Graph ==

#[tokio::test]
async fn test_follow_flow_and_counts() {
    let (app, _) = create_test_app();

    for target in [2, 3] {
        let body = format!(r#"{{"user_id":1,"to_user_id":{target},"action_type":1}}"#);
        let (status, _) = post(&app, "/relation/action", body).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, following) = get(&app, "/relation/follow/list/1").await;
    assert_eq!(ids(&following, "user_id"), vec![3, 2]);

    let (_, followers) = get(&app, "/relation/follower/list/2").await;
    assert_eq!(ids(&followers, "user_id"), vec![1]);

    let (status, _) = post(
        &app,
        "/relation/action",
        r#"{"user_id":1,"to_user_id":3,"action_type":2}"#.into(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, following) = get(&app, "/relation/follow/list/1").await;
    assert_eq!(ids(&following, "user_id"), vec![2]);

    let (status, counts) = get(&app, "/user/2/counts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counts["user_id"], 2);
}

// == Comments ==

#[tokio::test]
async fn test_comment_flow() {
    let (app, store) = create_test_app();
    seed_video(&store, 5, 50).await;

    let (status, json) = post(
        &app,
        "/comment/action",
        r#"{"user_id":1,"video_id":5,"action_type":1,"comment_text":"great"}"#.into(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let comment_id = json["id"].as_u64().unwrap();

    let (_, list) = get(&app, "/comment/list/5").await;
    assert_eq!(ids(&list, "id"), vec![comment_id]);
    assert_eq!(list["items"][0]["content"], "great");

    let body = format!(
        r#"{{"user_id":1,"video_id":5,"action_type":2,"comment_id":{comment_id}}}"#
    );
    let (status, _) = post(&app, "/comment/action", body).await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = get(&app, "/comment/list/5").await;
    assert!(list["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_comment_delete_needs_matching_video() {
    let (app, store) = create_test_app();
    seed_video(&store, 5, 50).await;
    seed_video(&store, 6, 50).await;

    let (_, json) = post(
        &app,
        "/comment/action",
        r#"{"user_id":1,"video_id":5,"action_type":1,"comment_text":"mine"}"#.into(),
    )
    .await;
    let comment_id = json["id"].as_u64().unwrap();

    let body = format!(
        r#"{{"user_id":1,"video_id":6,"action_type":2,"comment_id":{comment_id}}}"#
    );
    let (status, _) = post(&app, "/comment/action", body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, list) = get(&app, "/comment/list/5").await;
    assert_eq!(ids(&list, "id"), vec![comment_id]);
}

// == Operations ==

#[tokio::test]
async fn test_stats_and_dead_letters() {
    let (app, _) = create_test_app();
    get(&app, "/feed").await;

    let (status, stats) = get(&app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert!(stats["misses"].as_u64().unwrap() >= 1);
    assert_eq!(stats["queue_lag"], 0);

    let (status, parked) = get(&app, "/admin/dead-letters").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parked["count"], 0);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = create_test_app();
    let (status, json) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
}

// == Error Response Tests ==

#[tokio::test]
async fn test_invalid_json_request() {
    let (app, _) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/favorite/action")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"invalid json"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(
        response.status() == StatusCode::BAD_REQUEST
            || response.status() == StatusCode::UNPROCESSABLE_ENTITY
    );
}
