use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::models::{Comment, NewComment, NewPost, NewUserProfile, Post, UserProfile};
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

fn profile_from_row(row: &Row) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        avatar: row.get(3)?,
        bio: row.get(4)?,
        location: row.get(5)?,
    })
}

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    let raw_media: String = row.get(3)?;
    let media_files = serde_json::from_str(&raw_media).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        text_content: row.get(2)?,
        media_files,
        created_at: row.get(4)?,
        author_id: row.get(5)?,
        comments: None,
    })
}

fn comment_from_row(row: &Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        content: row.get(1)?,
        created_at: row.get(2)?,
        post_id: row.get(3)?,
        author_id: row.get(4)?,
    })
}

pub fn user_profile_by_id(pool: &DbPool, user_id: i64) -> AppResult<Option<UserProfile>> {
    let conn = pool.get()?;
    let profile = conn
        .query_row(
            "SELECT id, username, display_name, avatar, bio, location
             FROM user_profiles WHERE id = ?1",
            params![user_id],
            profile_from_row,
        )
        .optional()?;
    Ok(profile)
}

pub fn user_profile_by_username(pool: &DbPool, username: &str) -> AppResult<Option<UserProfile>> {
    let conn = pool.get()?;
    let profile = conn
        .query_row(
            "SELECT id, username, display_name, avatar, bio, location
             FROM user_profiles WHERE username = ?1",
            params![username],
            profile_from_row,
        )
        .optional()?;
    Ok(profile)
}

pub fn create_user_profile(pool: &DbPool, profile: &NewUserProfile) -> AppResult<UserProfile> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO user_profiles (username, display_name, avatar, bio, location)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            profile.username,
            profile.display_name,
            profile.avatar,
            profile.bio,
            profile.location
        ],
    )?;
    let id = conn.last_insert_rowid();
    Ok(UserProfile {
        id,
        username: profile.username.clone(),
        display_name: profile.display_name.clone(),
        avatar: profile.avatar.clone(),
        bio: profile.bio.clone(),
        location: profile.location.clone(),
    })
}

pub fn list_posts(pool: &DbPool) -> AppResult<Vec<Post>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, title, text_content, media_files, created_at, author_id
         FROM posts ORDER BY id",
    )?;
    let posts = stmt
        .query_map([], post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

/// Fetch a post by id with its comments loaded.
pub fn post_by_id(pool: &DbPool, post_id: i64) -> AppResult<Option<Post>> {
    let conn = pool.get()?;
    let post = conn
        .query_row(
            "SELECT id, title, text_content, media_files, created_at, author_id
             FROM posts WHERE id = ?1",
            params![post_id],
            post_from_row,
        )
        .optional()?;

    match post {
        Some(mut post) => {
            drop(conn);
            post.comments = Some(post_comments(pool, post_id)?);
            Ok(Some(post))
        }
        None => Ok(None),
    }
}

pub fn create_post(
    pool: &DbPool,
    post: &NewPost,
    media_files: &[String],
    author_id: i64,
) -> AppResult<Post> {
    let conn = pool.get()?;
    let created_at = Utc::now();
    let media_json = serde_json::to_string(media_files)?;
    conn.execute(
        "INSERT INTO posts (title, text_content, media_files, created_at, author_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            post.title,
            post.text_content,
            media_json,
            created_at,
            author_id
        ],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Post {
        id,
        title: post.title.clone(),
        text_content: post.text_content.clone(),
        media_files: media_files.to_vec(),
        created_at,
        author_id,
        comments: None,
    })
}

/// Delete a post, author only. Comments cascade via the foreign key.
pub fn delete_post(pool: &DbPool, post_id: i64, current_user_id: i64) -> AppResult<()> {
    let conn = pool.get()?;
    let author_id: Option<i64> = conn
        .query_row(
            "SELECT author_id FROM posts WHERE id = ?1",
            params![post_id],
            |row| row.get(0),
        )
        .optional()?;

    match author_id {
        None => Err(AppError::NotFound("Post not found.".into())),
        Some(author_id) if author_id != current_user_id => Err(AppError::Forbidden(
            "You do not have permission to delete this post.".into(),
        )),
        Some(_) => {
            conn.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
            Ok(())
        }
    }
}

pub fn post_comments(pool: &DbPool, post_id: i64) -> AppResult<Vec<Comment>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, content, created_at, post_id, author_id
         FROM comments WHERE post_id = ?1 ORDER BY id",
    )?;
    let comments = stmt
        .query_map(params![post_id], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

pub fn comment_by_id(pool: &DbPool, comment_id: i64) -> AppResult<Option<Comment>> {
    let conn = pool.get()?;
    let comment = conn
        .query_row(
            "SELECT id, content, created_at, post_id, author_id
             FROM comments WHERE id = ?1",
            params![comment_id],
            comment_from_row,
        )
        .optional()?;
    Ok(comment)
}

pub fn create_comment(
    pool: &DbPool,
    comment: &NewComment,
    post_id: i64,
    author_id: i64,
) -> AppResult<Comment> {
    let conn = pool.get()?;
    let post_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    if !post_exists {
        return Err(AppError::NotFound("Post not found.".into()));
    }

    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO comments (content, created_at, post_id, author_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![comment.content, created_at, post_id, author_id],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Comment {
        id,
        content: comment.content.clone(),
        created_at,
        post_id,
        author_id,
    })
}

pub fn delete_comment(pool: &DbPool, comment_id: i64, current_user_id: i64) -> AppResult<()> {
    let conn = pool.get()?;
    let author_id: Option<i64> = conn
        .query_row(
            "SELECT author_id FROM comments WHERE id = ?1",
            params![comment_id],
            |row| row.get(0),
        )
        .optional()?;

    match author_id {
        None => Err(AppError::NotFound("Comment not found.".into())),
        Some(author_id) if author_id != current_user_id => Err(AppError::Forbidden(
            "You do not have permission to delete this comment.".into(),
        )),
        Some(_) => {
            conn.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
            Ok(())
        }
    }
}
