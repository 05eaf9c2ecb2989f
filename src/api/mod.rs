//! API Module
//!
//! HTTP handlers and routing.
//!
//! # Endpoints
//! - `POST /relation/action` - Follow or unfollow
//! - `GET /relation/follow/list/:user_id`, `GET /relation/follower/list/:user_id`
//! - `GET /user/:user_id/counts` - Following and follower counts
//! - `POST /publish/action`, `GET /publish/list/:user_id`, `GET /feed`
//! - `POST /favorite/action`, `GET /favorite/list/:user_id`
//! - `POST /comment/action`, `GET /comment/list/:video_id`
//! - `GET /stats`, `GET /admin/dead-letters`, `GET /health`
//!
//! List endpoints take `cursor` and `viewer_id` query parameters.

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
