use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::NewUserProfile;
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::media::UploadedFile;
use crate::state::AppState;
use crate::upstream::RegistrationFields;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/", post(login))
        .route("/logout/", post(logout))
        .route("/users/", post(create_user))
        .route("/users/me/", get(me))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str) -> String {
    format!("{}={}; HttpOnly; Secure; SameSite=Lax; Path=/", name, token)
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0", name)
}

/// POST /login/ — forward credentials upstream, set the session cookie,
/// and require the account to exist in the local profile mirror.
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.identity.login(&req.username, &req.password).await?;

    let username = outcome
        .payload
        .get("username")
        .and_then(|u| u.as_str())
        .ok_or_else(|| AppError::UpstreamContract("login response missing username".into()))?;

    if queries::user_profile_by_username(&state.db, username)?.is_none() {
        return Err(AppError::NotFound(
            "User not found in the local profile store.".into(),
        ));
    }

    tracing::info!("User logged in: {}", username);

    Ok((
        [(
            header::SET_COOKIE,
            session_cookie(&state.config.auth.cookie_name, &outcome.access_token),
        )],
        Json(outcome.payload),
    ))
}

/// POST /logout/ — notify the provider, then clear the local cookie.
async fn logout(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    state.identity.logout().await?;
    Ok((
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )],
        Json(serde_json::json!({ "message": "Logout successful." })),
    ))
}

/// POST /users/ — register upstream, then create the local profile
/// mirror from the provider's account payload.
async fn create_user(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut username = None;
    let mut email = None;
    let mut password = None;
    let mut display_name = None;
    let mut bio = None;
    let mut location = None;
    let mut avatar: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "username" => username = Some(field.text().await?),
            "email" => email = Some(field.text().await?),
            "password" => password = Some(field.text().await?),
            "display_name" => display_name = Some(field.text().await?),
            "bio" => bio = Some(field.text().await?),
            "location" => location = Some(field.text().await?),
            "avatar" => {
                let filename = field.file_name().unwrap_or("avatar").to_string();
                let data = field.bytes().await?;
                avatar = Some(UploadedFile { filename, data });
            }
            _ => {}
        }
    }

    let missing = |field: &str| AppError::BadRequest(format!("Missing field: {}", field));
    let fields = RegistrationFields {
        username: username.ok_or_else(|| missing("username"))?,
        email: email.ok_or_else(|| missing("email"))?,
        password: password.ok_or_else(|| missing("password"))?,
        display_name: display_name.ok_or_else(|| missing("display_name"))?,
        bio,
        location,
    };

    let account = state.identity.register(&fields, avatar.as_ref()).await?;

    let profile: NewUserProfile = account.into();
    profile.validate()?;
    queries::create_user_profile(&state.db, &profile)?;

    tracing::info!("User registered: {}", profile.username);

    // The response carries the profile fields without the local row id.
    Ok(Json(profile))
}

/// GET /users/me/ — the caller's local profile.
async fn me(CurrentUser(profile): CurrentUser) -> AppResult<impl IntoResponse> {
    Ok(Json(profile))
}
