pub mod media;
pub mod posts;
pub mod users;
