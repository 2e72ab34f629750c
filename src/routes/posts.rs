use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};

use crate::db::models::{Comment, NewComment, NewPost, Post};
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::media::UploadedFile;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/", get(list_posts).post(create_post))
        .route("/posts/{post_id}/", get(get_post).delete(delete_post))
        .route(
            "/posts/{post_id}/comments/",
            get(list_comments).post(create_comment),
        )
        .route(
            "/posts/{post_id}/comments/{comment_id}/",
            delete(delete_comment),
        )
}

async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Vec<Post>>> {
    Ok(Json(queries::list_posts(&state.db)?))
}

async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<Json<Post>> {
    queries::post_by_id(&state.db, post_id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Post not found.".into()))
}

/// POST /posts/ — multipart: title, optional text_content, and any
/// number of media_files parts. Media is staged and committed before
/// the post row is written, so a rejected file never leaves a post
/// behind and a failed post never leaves files behind.
async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Json<Post>> {
    let mut title = None;
    let mut text_content = None;
    let mut files: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "title" => title = Some(field.text().await?),
            "text_content" => text_content = Some(field.text().await?),
            "media_files" => {
                let filename = field
                    .file_name()
                    .ok_or_else(|| {
                        AppError::BadRequest("Media upload is missing a filename.".into())
                    })?
                    .to_string();
                let data = field.bytes().await?;
                files.push(UploadedFile { filename, data });
            }
            _ => {}
        }
    }

    let new_post = NewPost {
        title: title.ok_or_else(|| AppError::BadRequest("Missing field: title".into()))?,
        text_content,
    };
    new_post.validate()?;

    let media_files = state.media.ingest_all(&files).await?;
    let post = queries::create_post(&state.db, &new_post, &media_files, user.0.id)?;

    tracing::info!(
        "Post {} created by {} with {} media files",
        post.id,
        user.0.username,
        media_files.len()
    );

    Ok(Json(post))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
) -> AppResult<StatusCode> {
    queries::delete_post(&state.db, post_id, user.0.id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<Json<Vec<Comment>>> {
    let post = queries::post_by_id(&state.db, post_id)?
        .ok_or_else(|| AppError::NotFound("Post not found.".into()))?;
    Ok(Json(post.comments.unwrap_or_default()))
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
    Json(req): Json<NewComment>,
) -> AppResult<Json<Comment>> {
    req.validate()?;
    let comment = queries::create_comment(&state.db, &req, post_id, user.0.id)?;
    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((_post_id, comment_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    queries::delete_comment(&state.db, comment_id, user.0.id)?;
    Ok(StatusCode::NO_CONTENT)
}
