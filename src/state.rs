use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::media::MediaStore;
use crate::upstream::IdentityProvider;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub identity: IdentityProvider,
    pub media: MediaStore,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let identity = IdentityProvider::new(&config.auth.provider_url);
        let media = MediaStore::new(
            config.media_path().clone(),
            config.media.max_image_bytes,
            config.media.max_video_bytes,
        );
        Self {
            db,
            config,
            identity,
            media,
        }
    }
}
