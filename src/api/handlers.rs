//! API Handlers
//!
//! HTTP request handlers. Each one validates its input, calls the engine
//! and wraps the result in JSON; errors render through `AppError`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::ids::SnowflakeIds;
use crate::models::{
    ActionResponse, ActionType, Comment, CommentActionRequest, DeadLettersResponse,
    FavoriteActionRequest, FollowEntry, HealthResponse, ListQuery, PublishRequest,
    RelationActionRequest, StatsResponse, UserCounts, VideoView,
};
use crate::pagination::Page;
use crate::queue::WriteBehindQueue;
use crate::service::Engine;
use crate::store::SourceStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Wires a fresh cache, queue and id generator around `store`.
    pub fn from_config(config: Arc<Config>, store: Arc<dyn SourceStore>) -> Self {
        let cache = CacheStore::from_config(&config.cache);
        let queue = WriteBehindQueue::with_partitions(config.queue.partitions);
        let ids = Arc::new(SnowflakeIds::new(config.worker_id));
        Self::new(Arc::new(Engine::new(config, cache, store, queue, ids)))
    }
}

// == Follow Graph ==
/// Handler for POST /relation/action
pub async fn relation_action_handler(
    State(state): State<AppState>,
    Json(req): Json<RelationActionRequest>,
) -> Result<Json<ActionResponse>> {
    let action = req.action().map_err(AppError::InvalidRequest)?;
    match action {
        ActionType::Do => state.engine.follow(req.user_id, req.to_user_id).await?,
        ActionType::Undo => state.engine.unfollow(req.user_id, req.to_user_id).await?,
    }
    Ok(Json(ActionResponse::ok(match action {
        ActionType::Do => "followed",
        ActionType::Undo => "unfollowed",
    })))
}

/// Handler for GET /relation/follow/list/:user_id
pub async fn follow_list_handler(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<FollowEntry>>> {
    let page = state
        .engine
        .follow_list(user_id, query.page_cursor())
        .await?;
    Ok(Json(page))
}

/// Handler for GET /relation/follower/list/:user_id
pub async fn follower_list_handler(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<FollowEntry>>> {
    let page = state
        .engine
        .follower_list(user_id, query.page_cursor())
        .await?;
    Ok(Json(page))
}

/// Handler for GET /user/:user_id/counts
pub async fn user_counts_handler(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Result<Json<UserCounts>> {
    Ok(Json(state.engine.follow_counts(user_id).await?))
}

// == Videos ==
/// Handler for POST /publish/action
pub async fn publish_handler(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> Result<Json<ActionResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(AppError::InvalidRequest(error_msg));
    }
    let video = state
        .engine
        .publish(req.user_id, &req.title, &req.play_url, &req.cover_url)
        .await?;
    Ok(Json(ActionResponse::created("published", video.id)))
}

/// Handler for GET /publish/list/:user_id
pub async fn publish_list_handler(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<VideoView>>> {
    let page = state
        .engine
        .publish_list(user_id, query.page_cursor(), query.viewer_id)
        .await?;
    Ok(Json(page))
}

/// Handler for GET /feed
pub async fn feed_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<VideoView>>> {
    let page = state
        .engine
        .feed(query.page_cursor(), query.viewer_id)
        .await?;
    Ok(Json(page))
}

// == Favorites ==
/// Handler for POST /favorite/action
pub async fn favorite_action_handler(
    State(state): State<AppState>,
    Json(req): Json<FavoriteActionRequest>,
) -> Result<Json<ActionResponse>> {
    let message = match req.action().map_err(AppError::InvalidRequest)? {
        ActionType::Do => {
            state.engine.favorite(req.user_id, req.video_id).await?;
            "favorited"
        }
        ActionType::Undo => {
            state.engine.unfavorite(req.user_id, req.video_id).await?;
            "unfavorited"
        }
    };
    Ok(Json(ActionResponse::ok(message)))
}

/// Handler for GET /favorite/list/:user_id
pub async fn favorite_list_handler(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<VideoView>>> {
    let page = state
        .engine
        .favorite_list(user_id, query.page_cursor(), query.viewer_id)
        .await?;
    Ok(Json(page))
}

// == Comments ==
/// Handler for POST /comment/action
pub async fn comment_action_handler(
    State(state): State<AppState>,
    Json(req): Json<CommentActionRequest>,
) -> Result<Json<ActionResponse>> {
    match (req.action().map_err(AppError::InvalidRequest)?, req.comment_id) {
        (ActionType::Undo, Some(comment_id)) => {
            state.engine.delete_comment(req.video_id, comment_id).await?;
            Ok(Json(ActionResponse::ok("deleted")))
        }
        _ => {
            let text = req.comment_text.as_deref().unwrap_or_default();
            let comment = state.engine.comment(req.user_id, req.video_id, text).await?;
            Ok(Json(ActionResponse::created("commented", comment.id)))
        }
    }
}

/// Handler for GET /comment/list/:video_id
pub async fn comment_list_handler(
    State(state): State<AppState>,
    Path(video_id): Path<u64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Comment>>> {
    let page = state
        .engine
        .comment_list(video_id, query.page_cursor())
        .await?;
    Ok(Json(page))
}

// == Operations ==
/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.engine.stats().await)
}

/// Handler for GET /admin/dead-letters
pub async fn dead_letters_handler(State(state): State<AppState>) -> Json<DeadLettersResponse> {
    Json(state.engine.dead_letters().await.into())
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
