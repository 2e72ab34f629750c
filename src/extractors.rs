use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::db::models::UserProfile;
use crate::db::queries;
use crate::error::AppError;
use crate::state::AppState;

/// The currently authenticated user's local profile.
///
/// Resolution round-trips to the identity provider on every request:
/// cookie token -> provider lookup -> local profile mirror. There is no
/// verified-token cache, so a revoked session is rejected immediately.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserProfile);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = get_cookie_value(parts, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?
            .to_string();

        let username = state.identity.whoami(&token).await?;

        let profile = queries::user_profile_by_username(&state.db, &username)?.ok_or_else(|| {
            AppError::NotFound("User not found in the local profile store.".into())
        })?;

        Ok(CurrentUser(profile))
    }
}

pub fn get_cookie_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val)
            } else {
                None
            }
        })
}
