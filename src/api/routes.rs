//! API Routes
//!
//! Configures the Axum router with every endpoint.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    comment_action_handler, comment_list_handler, dead_letters_handler, favorite_action_handler,
    favorite_list_handler, feed_handler, follow_list_handler, follower_list_handler,
    health_handler, publish_handler, publish_list_handler, relation_action_handler,
    stats_handler, user_counts_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/relation/action", post(relation_action_handler))
        .route("/relation/follow/list/:user_id", get(follow_list_handler))
        .route("/relation/follower/list/:user_id", get(follower_list_handler))
        .route("/user/:user_id/counts", get(user_counts_handler))
        .route("/publish/action", post(publish_handler))
        .route("/publish/list/:user_id", get(publish_list_handler))
        .route("/feed", get(feed_handler))
        .route("/favorite/action", post(favorite_action_handler))
        .route("/favorite/list/:user_id", get(favorite_list_handler))
        .route("/comment/action", post(comment_action_handler))
        .route("/comment/list/:video_id", get(comment_list_handler))
        .route("/stats", get(stats_handler))
        .route("/admin/dead-letters", get(dead_letters_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let state = AppState::from_config(Arc::new(Config::default()), Arc::new(MemoryStore::new()));
        create_router(state)
    }

    fn post_json(uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_publish_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(post_json(
                "/publish/action",
                r#"{"user_id":1,"title":"hello","play_url":"https://cdn.example/1.mp4"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_self_follow_is_bad_request() {
        let app = create_test_app();

        let response = app
            .oneshot(post_json(
                "/relation/action",
                r#"{"user_id":1,"to_user_id":1,"action_type":1}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_favorite_unknown_video_not_found() {
        let app = create_test_app();

        let response = app
            .oneshot(post_json(
                "/favorite/action",
                r#"{"user_id":1,"video_id":99,"action_type":1}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
