//! Request DTOs
//!
//! Bodies and query strings of the API. Action endpoints share the
//! `action_type` convention: 1 performs the action, 2 undoes it.

use serde::Deserialize;

use crate::pagination::PageCursor;

const MAX_TITLE_LEN: usize = 128;
const MAX_COMMENT_LEN: usize = 1024;

/// `action_type` of an action request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Do,
    Undo,
}

impl ActionType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ActionType::Do),
            2 => Some(ActionType::Undo),
            _ => None,
        }
    }
}

fn parse_action(code: u8) -> Result<ActionType, String> {
    ActionType::from_code(code).ok_or_else(|| format!("Unknown action_type {}", code))
}

/// Request body for POST /relation/action
#[derive(Debug, Clone, Deserialize)]
pub struct RelationActionRequest {
    /// The follower
    pub user_id: u64,
    /// The user being followed or unfollowed
    pub to_user_id: u64,
    pub action_type: u8,
}

impl RelationActionRequest {
    pub fn action(&self) -> Result<ActionType, String> {
        if self.user_id == self.to_user_id {
            return Err("Users cannot follow themselves".to_string());
        }
        parse_action(self.action_type)
    }
}

/// Request body for POST /publish/action
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub user_id: u64,
    pub title: String,
    pub play_url: String,
    #[serde(default)]
    pub cover_url: String,
}

impl PublishRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.title.trim().is_empty() {
            return Some("Title cannot be empty".to_string());
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Some(format!(
                "Title exceeds maximum length of {} characters",
                MAX_TITLE_LEN
            ));
        }
        if self.play_url.is_empty() {
            return Some("play_url cannot be empty".to_string());
        }
        None
    }
}

/// Request body for POST /favorite/action
#[derive(Debug, Clone, Deserialize)]
pub struct FavoriteActionRequest {
    pub user_id: u64,
    pub video_id: u64,
    pub action_type: u8,
}

impl FavoriteActionRequest {
    pub fn action(&self) -> Result<ActionType, String> {
        parse_action(self.action_type)
    }
}

/// Request body for POST /comment/action
///
/// Posting needs `comment_text`; deleting needs `comment_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentActionRequest {
    pub user_id: u64,
    pub video_id: u64,
    pub action_type: u8,
    #[serde(default)]
    pub comment_text: Option<String>,
    #[serde(default)]
    pub comment_id: Option<u64>,
}

impl CommentActionRequest {
    pub fn action(&self) -> Result<ActionType, String> {
        let action = parse_action(self.action_type)?;
        match action {
            ActionType::Do => match self.comment_text.as_deref().map(str::trim) {
                None | Some("") => Err("comment_text cannot be empty".to_string()),
                Some(text) if text.chars().count() > MAX_COMMENT_LEN => Err(format!(
                    "comment_text exceeds maximum length of {} characters",
                    MAX_COMMENT_LEN
                )),
                Some(_) => Ok(action),
            },
            ActionType::Undo if self.comment_id.is_none() => {
                Err("comment_id is required to delete a comment".to_string())
            }
            ActionType::Undo => Ok(action),
        }
    }
}

/// Query string of every list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// `next_cursor` of the previous page; absent for the first page
    #[serde(default)]
    pub cursor: Option<i64>,
    /// User the items are decorated for
    #[serde(default)]
    pub viewer_id: Option<u64>,
}

impl ListQuery {
    pub fn page_cursor(&self) -> PageCursor {
        PageCursor::from_param(self.cursor)
    }
}
