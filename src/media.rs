use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use rand::Rng;

use crate::error::{AppError, AppResult};

/// Coarse media bucket derived from the declared filename extension.
/// Each class carries its own size ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    Image,
    Video,
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaClass::Image => write!(f, "image"),
            MediaClass::Video => write!(f, "video"),
        }
    }
}

const IMAGE_SUBTYPES: &[&str] = &["jpeg", "png", "gif", "bmp"];
const VIDEO_SUBTYPES: &[&str] = &["mp4", "mpeg", "quicktime", "x-msvideo"];

/// Infer the media class from the filename extension. The actual bytes
/// are never sniffed.
pub fn classify(filename: &str) -> Option<MediaClass> {
    let mime = mime_guess::from_path(filename).first()?;
    match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("image", sub) if IMAGE_SUBTYPES.contains(&sub) => Some(MediaClass::Image),
        ("video", sub) if VIDEO_SUBTYPES.contains(&sub) => Some(MediaClass::Video),
        _ => None,
    }
}

/// Generate a stored filename: 15 random hex characters plus the
/// original extension, preserved exactly. 60 bits of randomness makes
/// collisions negligible; there is no retry on collision.
pub fn generate_media_name(original: &str) -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 8] = rng.gen();
    let mut id: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    id.truncate(15);

    let ext = original.rfind('.').map(|i| &original[i..]).unwrap_or("");
    format!("{}{}", id, ext)
}

/// An upload as received from the client: declared filename plus the
/// full body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

/// Validated, safely-named persistence of uploads to a flat directory.
#[derive(Clone)]
pub struct MediaStore {
    root: PathBuf,
    max_image_bytes: u64,
    max_video_bytes: u64,
}

impl MediaStore {
    pub fn new(root: PathBuf, max_image_bytes: u64, max_video_bytes: u64) -> Self {
        Self {
            root,
            max_image_bytes,
            max_video_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ceiling(&self, class: MediaClass) -> u64 {
        match class {
            MediaClass::Image => self.max_image_bytes,
            MediaClass::Video => self.max_video_bytes,
        }
    }

    /// Classify and size-check a single upload without writing anything.
    pub fn validate(&self, filename: &str, size: u64) -> AppResult<MediaClass> {
        let class = classify(filename).ok_or_else(|| {
            AppError::UnsupportedMediaType(format!("Unsupported media type: {}", filename))
        })?;
        let ceiling = self.ceiling(class);
        if size > ceiling {
            return Err(AppError::PayloadTooLarge(format!(
                "{} exceeds the {} size limit of {} MB.",
                filename,
                class,
                ceiling / (1024 * 1024)
            )));
        }
        Ok(class)
    }

    /// Persist a batch of uploads with all-or-nothing semantics.
    ///
    /// Every file is validated first, then written to a `.part`
    /// temporary; only when the whole batch has staged successfully are
    /// the temporaries renamed into place. Any failure removes whatever
    /// was staged, so a rejected batch leaves no orphan files behind.
    pub async fn ingest_all(&self, files: &[UploadedFile]) -> AppResult<Vec<String>> {
        for file in files {
            self.validate(&file.filename, file.data.len() as u64)?;
        }

        if files.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(&self.root).await?;

        let mut staged: Vec<(PathBuf, PathBuf, String)> = Vec::with_capacity(files.len());
        for file in files {
            let name = generate_media_name(&file.filename);
            let final_path = self.root.join(&name);
            let tmp_path = self.root.join(format!("{}.part", name));
            if let Err(e) = tokio::fs::write(&tmp_path, &file.data).await {
                remove_files(staged.iter().map(|(tmp, _, _)| tmp.clone())).await;
                return Err(e.into());
            }
            staged.push((tmp_path, final_path, name));
        }

        // Commit: rename the whole batch into place.
        for i in 0..staged.len() {
            if let Err(e) = tokio::fs::rename(&staged[i].0, &staged[i].1).await {
                let committed = staged[..i].iter().map(|(_, fin, _)| fin.clone());
                let pending = staged[i..].iter().map(|(tmp, _, _)| tmp.clone());
                remove_files(committed.chain(pending)).await;
                return Err(e.into());
            }
        }

        Ok(staged.into_iter().map(|(_, _, name)| name).collect())
    }

    /// Read a stored blob back by its generated name.
    pub async fn read(&self, stored_name: &str) -> AppResult<Vec<u8>> {
        // Generated names are flat; anything path-like is not ours.
        if stored_name.contains('/') || stored_name.contains('\\') || stored_name.contains("..") {
            return Err(AppError::NotFound("File not found.".into()));
        }
        match tokio::fs::read(self.root.join(stored_name)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound("File not found.".into()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn remove_files(paths: impl Iterator<Item = PathBuf>) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("Failed to remove staged media file {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn store(root: &Path) -> MediaStore {
        MediaStore::new(root.to_path_buf(), 1024, 4096)
    }

    fn upload(filename: &str, size: usize) -> UploadedFile {
        UploadedFile {
            filename: filename.to_string(),
            data: Bytes::from(vec![0u8; size]),
        }
    }

    #[test]
    fn classifies_supported_image_extensions() {
        for name in ["a.jpg", "a.jpeg", "a.png", "a.gif", "a.bmp", "A.PNG"] {
            assert_eq!(classify(name), Some(MediaClass::Image), "{}", name);
        }
    }

    #[test]
    fn classifies_supported_video_extensions() {
        for name in ["a.mp4", "a.mpeg", "a.mpg", "a.mov", "a.avi"] {
            assert_eq!(classify(name), Some(MediaClass::Video), "{}", name);
        }
    }

    #[test]
    fn rejects_unknown_extensions() {
        for name in ["a.txt", "a.pdf", "a.webp", "a.svg", "noextension"] {
            assert_eq!(classify(name), None, "{}", name);
        }
    }

    #[test]
    fn size_at_ceiling_is_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        for name in ["a.jpg", "a.jpeg", "a.png", "a.gif", "a.bmp"] {
            assert!(store.validate(name, 1024).is_ok(), "{}", name);
        }
        for name in ["a.mp4", "a.mpeg", "a.mov", "a.avi"] {
            assert!(store.validate(name, 4096).is_ok(), "{}", name);
        }
    }

    #[test]
    fn one_byte_over_ceiling_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let err = store.validate("photo.jpg", 1025).unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
        let err = store.validate("clip.mp4", 4097).unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
    }

    #[test]
    fn unknown_extension_rejected_regardless_of_size() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let err = store.validate("notes.txt", 1).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMediaType(_)));
    }

    #[test]
    fn generated_names_preserve_extension() {
        let name = generate_media_name("holiday.photo.JPG");
        assert!(name.ends_with(".JPG"));
        assert_eq!(name.len(), 15 + 4);
        let id = &name[..15];
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_names_are_unique_over_many_draws() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let name = generate_media_name("a.png");
            assert!(seen.insert(name), "collision in 10k generated names");
        }
    }

    #[test]
    fn generated_names_fit_storage_column() {
        // media_files entries are capped at 40 chars
        for original in ["a.jpeg", "b.mpeg", "c.mov"] {
            assert!(generate_media_name(original).len() <= 40);
        }
    }

    #[tokio::test]
    async fn ingest_all_persists_whole_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let files = vec![upload("one.jpg", 10), upload("two.mp4", 20)];

        let names = store.ingest_all(&files).await.unwrap();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with(".jpg"));
        assert!(names[1].ends_with(".mp4"));

        for (name, file) in names.iter().zip(&files) {
            let data = std::fs::read(tmp.path().join(name)).unwrap();
            assert_eq!(data.len(), file.data.len());
        }
    }

    #[tokio::test]
    async fn ingest_all_rejects_batch_with_unsupported_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let files = vec![upload("one.jpg", 10), upload("two.txt", 10)];

        let err = store.ingest_all(&files).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMediaType(_)));

        // Nothing was written for the valid file either
        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn ingest_all_rejects_batch_with_oversized_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let files = vec![upload("one.jpg", 10), upload("two.jpg", 2000)];

        let err = store.ingest_all(&files).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));

        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn read_round_trips_stored_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let names = store
            .ingest_all(&[upload("pic.png", 32)])
            .await
            .unwrap();
        let data = store.read(&names[0]).await.unwrap();
        assert_eq!(data.len(), 32);
    }

    #[tokio::test]
    async fn read_rejects_path_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        for name in ["../secret", "a/../../b", "sub/file.png"] {
            let err = store.read(name).await.unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)), "{}", name);
        }
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let err = store.read("deadbeefdeadbee.png").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
