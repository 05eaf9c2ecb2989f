//! Postgres-backed store
//!
//! Ids are stored as `BIGINT`; every id the engine hands out fits in the
//! positive `i64` range.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::query;
use tracing::info;

use crate::cache::{CounterKind, ListKind};
use crate::config::StoreConfig;
use crate::models::{Comment, Video};
use crate::store::{ListRow, Record, RecordKey, SourceStore, StoreError, StoreResult};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS videos (
        id BIGINT PRIMARY KEY,
        author_id BIGINT NOT NULL,
        title TEXT NOT NULL,
        play_url TEXT NOT NULL,
        cover_url TEXT NOT NULL,
        created_at BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS videos_author_created_idx ON videos (author_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS videos_created_idx ON videos (created_at DESC)",
    "CREATE TABLE IF NOT EXISTS favorites (
        user_id BIGINT NOT NULL,
        video_id BIGINT NOT NULL,
        created_at BIGINT NOT NULL,
        CONSTRAINT favorites_user_video_key UNIQUE (user_id, video_id)
    )",
    "CREATE INDEX IF NOT EXISTS favorites_video_idx ON favorites (video_id)",
    "CREATE TABLE IF NOT EXISTS follows (
        follower_id BIGINT NOT NULL,
        followee_id BIGINT NOT NULL,
        created_at BIGINT NOT NULL,
        CONSTRAINT follows_follower_followee_key UNIQUE (follower_id, followee_id)
    )",
    "CREATE INDEX IF NOT EXISTS follows_followee_idx ON follows (followee_id, created_at DESC)",
    "CREATE TABLE IF NOT EXISTS comments (
        id BIGINT PRIMARY KEY,
        video_id BIGINT NOT NULL,
        user_id BIGINT NOT NULL,
        content TEXT NOT NULL,
        created_at BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS comments_video_created_idx ON comments (video_id, created_at DESC)",
];

pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        other => StoreError::unavailable(other),
    }
}

fn db_id(id: u64) -> StoreResult<i64> {
    i64::try_from(id).map_err(|_| StoreError::unavailable(format!("id {id} out of range")))
}

fn db_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[derive(sqlx::FromRow)]
struct VideoRow {
    id: i64,
    author_id: i64,
    title: String,
    play_url: String,
    cover_url: String,
    created_at: i64,
}

impl From<VideoRow> for Video {
    fn from(row: VideoRow) -> Self {
        Self {
            id: row.id as u64,
            author_id: row.author_id as u64,
            title: row.title,
            play_url: row.play_url,
            cover_url: row.cover_url,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    video_id: i64,
    user_id: i64,
    content: String,
    created_at: i64,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id as u64,
            video_id: row.video_id as u64,
            user_id: row.user_id as u64,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    member: i64,
    created_at: i64,
}

// == Postgres Store ==
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &StoreConfig, url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect(url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the tables and indexes the engine queries.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            query(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        info!(statements = SCHEMA.len(), "Store schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn member_rows(
        &self,
        sql: &'static str,
        owner: u64,
        max_score: i64,
        limit: usize,
    ) -> StoreResult<Vec<ListRow>> {
        let rows: Vec<MemberRow> = sqlx::query_as(sql)
            .bind(db_id(owner)?)
            .bind(max_score)
            .bind(db_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows
            .into_iter()
            .map(|row| ListRow::bare(row.member as u64, row.created_at))
            .collect())
    }

    async fn video_rows(
        &self,
        author: Option<u64>,
        max_score: i64,
        limit: usize,
    ) -> StoreResult<Vec<ListRow>> {
        let rows: Vec<VideoRow> = match author {
            Some(author) => {
                sqlx::query_as(
                    "SELECT id, author_id, title, play_url, cover_url, created_at FROM videos \
                     WHERE author_id = $1 AND created_at <= $2 \
                     ORDER BY created_at DESC, id DESC LIMIT $3",
                )
                .bind(db_id(author)?)
                .bind(max_score)
                .bind(db_limit(limit))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    "SELECT id, author_id, title, play_url, cover_url, created_at FROM videos \
                     WHERE created_at <= $1 \
                     ORDER BY created_at DESC, id DESC LIMIT $2",
                )
                .bind(max_score)
                .bind(db_limit(limit))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx_error)?;
        Ok(rows
            .into_iter()
            .map(|row| ListRow::video(row.into()))
            .collect())
    }
}

#[async_trait]
impl SourceStore for PgStore {
    async fn insert(&self, record: &Record) -> StoreResult<()> {
        let statement = match record {
            Record::Favorite(f) => query(
                "INSERT INTO favorites (user_id, video_id, created_at) VALUES ($1, $2, $3)",
            )
            .bind(db_id(f.user_id)?)
            .bind(db_id(f.video_id)?)
            .bind(f.created_at),
            Record::Follow(f) => query(
                "INSERT INTO follows (follower_id, followee_id, created_at) VALUES ($1, $2, $3)",
            )
            .bind(db_id(f.follower_id)?)
            .bind(db_id(f.followee_id)?)
            .bind(f.created_at),
            Record::Comment(c) => query(
                "INSERT INTO comments (id, video_id, user_id, content, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(db_id(c.id)?)
            .bind(db_id(c.video_id)?)
            .bind(db_id(c.user_id)?)
            .bind(c.content.clone())
            .bind(c.created_at),
            Record::Video(v) => query(
                "INSERT INTO videos (id, author_id, title, play_url, cover_url, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(db_id(v.id)?)
            .bind(db_id(v.author_id)?)
            .bind(v.title.clone())
            .bind(v.play_url.clone())
            .bind(v.cover_url.clone())
            .bind(v.created_at),
        };
        statement
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn delete(&self, key: &RecordKey) -> StoreResult<()> {
        let statement = match key {
            RecordKey::Favorite(k) => query("DELETE FROM favorites WHERE user_id = $1 AND video_id = $2")
                .bind(db_id(k.user_id)?)
                .bind(db_id(k.video_id)?),
            RecordKey::Follow(k) => {
                query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
                    .bind(db_id(k.follower_id)?)
                    .bind(db_id(k.followee_id)?)
            }
            RecordKey::Comment(k) => {
                query("DELETE FROM comments WHERE id = $1 AND video_id = $2")
                    .bind(db_id(k.id)?)
                    .bind(db_id(k.video_id)?)
            }
            RecordKey::Video(id) => query("DELETE FROM videos WHERE id = $1").bind(db_id(*id)?),
        };
        let result = statement
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn exists(&self, key: &RecordKey) -> StoreResult<bool> {
        let statement = match key {
            RecordKey::Favorite(k) => sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM favorites WHERE user_id = $1 AND video_id = $2)",
            )
            .bind(db_id(k.user_id)?)
            .bind(db_id(k.video_id)?),
            RecordKey::Follow(k) => sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2)",
            )
            .bind(db_id(k.follower_id)?)
            .bind(db_id(k.followee_id)?),
            RecordKey::Comment(k) => sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM comments WHERE id = $1 AND video_id = $2)",
            )
            .bind(db_id(k.id)?)
            .bind(db_id(k.video_id)?),
            RecordKey::Video(id) => {
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM videos WHERE id = $1)")
                    .bind(db_id(*id)?)
            }
        };
        statement
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn range(
        &self,
        list: ListKind,
        owner: u64,
        max_score: i64,
        limit: usize,
    ) -> StoreResult<Vec<ListRow>> {
        match list {
            ListKind::Follow => {
                self.member_rows(
                    "SELECT followee_id AS member, created_at FROM follows \
                     WHERE follower_id = $1 AND created_at <= $2 \
                     ORDER BY created_at DESC, followee_id DESC LIMIT $3",
                    owner,
                    max_score,
                    limit,
                )
                .await
            }
            ListKind::Follower => {
                self.member_rows(
                    "SELECT follower_id AS member, created_at FROM follows \
                     WHERE followee_id = $1 AND created_at <= $2 \
                     ORDER BY created_at DESC, follower_id DESC LIMIT $3",
                    owner,
                    max_score,
                    limit,
                )
                .await
            }
            ListKind::Favorite => {
                self.member_rows(
                    "SELECT video_id AS member, created_at FROM favorites \
                     WHERE user_id = $1 AND created_at <= $2 \
                     ORDER BY created_at DESC, video_id DESC LIMIT $3",
                    owner,
                    max_score,
                    limit,
                )
                .await
            }
            ListKind::Publish => self.video_rows(Some(owner), max_score, limit).await,
            ListKind::Feed => self.video_rows(None, max_score, limit).await,
            ListKind::Comment => {
                let rows: Vec<CommentRow> = sqlx::query_as(
                    "SELECT id, video_id, user_id, content, created_at FROM comments \
                     WHERE video_id = $1 AND created_at <= $2 \
                     ORDER BY created_at DESC, id DESC LIMIT $3",
                )
                .bind(db_id(owner)?)
                .bind(max_score)
                .bind(db_limit(limit))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
                Ok(rows
                    .into_iter()
                    .map(|row| ListRow::comment(row.into()))
                    .collect())
            }
        }
    }

    async fn count(&self, counter: CounterKind, owner: u64) -> StoreResult<i64> {
        let sql = match counter {
            CounterKind::Following => "SELECT COUNT(*) FROM follows WHERE follower_id = $1",
            CounterKind::Followers => "SELECT COUNT(*) FROM follows WHERE followee_id = $1",
            CounterKind::Favorites => "SELECT COUNT(*) FROM favorites WHERE video_id = $1",
            CounterKind::Comments => "SELECT COUNT(*) FROM comments WHERE video_id = $1",
        };
        sqlx::query_scalar(sql)
            .bind(db_id(owner)?)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn video(&self, id: u64) -> StoreResult<Option<Video>> {
        let row: Option<VideoRow> = sqlx::query_as(
            "SELECT id, author_id, title, play_url, cover_url, created_at FROM videos WHERE id = $1",
        )
        .bind(db_id(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Video::from))
    }

    async fn comment(&self, id: u64) -> StoreResult<Option<Comment>> {
        let row: Option<CommentRow> = sqlx::query_as(
            "SELECT id, video_id, user_id, content, created_at FROM comments WHERE id = $1",
        )
        .bind(db_id(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Comment::from))
    }
}
