// Library exports for Corkboard
// This allows integration tests and external code to use Corkboard modules

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod media;
pub mod routes;
pub mod state;
pub mod upstream;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    // The multipart body must be able to carry the largest allowed
    // video plus form overhead.
    let body_limit = state.config.media.max_video_bytes as usize + 1024 * 1024;

    Router::new()
        .merge(routes::users::router())
        .merge(routes::posts::router())
        .route("/media/{filename}", get(routes::media::serve))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
