use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
}

/// Profile fields without the local row id, as returned by registration
/// and used to create the local mirror of an upstream account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUserProfile {
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub text_content: Option<String>,
    pub media_files: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub author_id: i64,
    /// Loaded only when a single post is fetched by id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub text_content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub post_id: i64,
    pub author_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub content: String,
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> AppResult<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AppError::BadRequest(format!(
            "{} must be between {} and {} characters.",
            field, min, max
        )));
    }
    Ok(())
}

impl NewUserProfile {
    pub fn validate(&self) -> AppResult<()> {
        check_len("username", &self.username, 3, 35)?;
        check_len("display_name", &self.display_name, 3, 50)?;
        if let Some(ref avatar) = self.avatar {
            check_len("avatar", avatar, 0, 35)?;
        }
        if let Some(ref bio) = self.bio {
            check_len("bio", bio, 0, 300)?;
        }
        if let Some(ref location) = self.location {
            check_len("location", location, 0, 200)?;
        }
        Ok(())
    }
}

impl NewPost {
    pub fn validate(&self) -> AppResult<()> {
        check_len("title", &self.title, 3, 100)
    }
}

impl NewComment {
    pub fn validate(&self) -> AppResult<()> {
        check_len("content", &self.content, 1, 500)
    }
}
