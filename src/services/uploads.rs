//! On-disk storage for report photos and delivery notes.
//!
//! Files live under `{root}/{report_id}/{images|delivery_note}/{uuid}.{ext}` and
//! the database keeps the path relative to `root`. Writes for a new report go
//! to a private staging directory first and are moved into place only after
//! the database transaction commits.

use crate::config::AppConfig;
use crate::errors::ServiceError;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];
const STAGING_DIR: &str = ".staging";

pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1920;
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    DeliveryNote,
}

impl UploadKind {
    fn dir_name(self) -> &'static str {
        match self {
            UploadKind::Image => "images",
            UploadKind::DeliveryNote => "delivery_note",
        }
    }

    fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            UploadKind::Image => IMAGE_EXTENSIONS,
            UploadKind::DeliveryNote => DOCUMENT_EXTENSIONS,
        }
    }
}

/// How report photos are re-encoded before they are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePolicy {
    /// Longest side in pixels; larger photos are scaled down
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// A file received in a multipart request
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub relative_path: String,
    pub original_filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("file has no name")]
    MissingName,
    #[error("file type .{0} is not allowed")]
    Extension(String),
    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("image could not be decoded: {0}")]
    Unreadable(String),
}

/// Files written for one report that are not yet visible at their final path.
#[derive(Debug)]
pub struct StagedUploads {
    dir: PathBuf,
    moves: Vec<(PathBuf, PathBuf)>,
}

impl StagedUploads {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_image_bytes: usize,
    max_document_bytes: usize,
    image_policy: ImagePolicy,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, max_image_bytes: usize, max_document_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_image_bytes,
            max_document_bytes,
            image_policy: ImagePolicy::default(),
        }
    }

    pub fn with_image_policy(mut self, image_policy: ImagePolicy) -> Self {
        self.image_policy = image_policy;
        self
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.upload_dir.clone(), cfg.max_image_bytes, cfg.max_document_bytes)
            .with_image_policy(ImagePolicy {
                max_dimension: cfg.max_image_dimension,
                jpeg_quality: cfg.jpeg_quality,
            })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn limit(&self, kind: UploadKind) -> usize {
        match kind {
            UploadKind::Image => self.max_image_bytes,
            UploadKind::DeliveryNote => self.max_document_bytes,
        }
    }

    /// Returns the lowercase extension of the uploaded file.
    pub fn check(&self, kind: UploadKind, file: &IncomingFile) -> Result<String, UploadRejection> {
        let name = file
            .file_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .ok_or(UploadRejection::MissingName)?;
        let extension = extension_of(name).unwrap_or_default();
        if !kind.allowed_extensions().contains(&extension.as_str()) {
            return Err(UploadRejection::Extension(extension));
        }
        let limit = self.limit(kind);
        if file.bytes.len() > limit {
            return Err(UploadRejection::TooLarge {
                size: file.bytes.len(),
                limit,
            });
        }
        Ok(extension)
    }

    pub fn report_dir(&self, report_id: i32) -> PathBuf {
        self.root.join(report_id.to_string())
    }

    /// Opens a staging area for one unit of work. Nothing touches the disk yet.
    pub fn stage(&self) -> StagedUploads {
        StagedUploads {
            dir: self
                .root
                .join(STAGING_DIR)
                .join(Uuid::new_v4().simple().to_string()),
            moves: Vec::new(),
        }
    }

    /// Validates the file and writes it into the staging area. Photos are
    /// scaled down and re-encoded as JPEG. The caller decides what a
    /// rejection means.
    pub async fn save(
        &self,
        staged: &mut StagedUploads,
        report_id: i32,
        kind: UploadKind,
        file: &IncomingFile,
    ) -> Result<Result<StoredFile, UploadRejection>, ServiceError> {
        let (extension, bytes) = match self.check(kind, file) {
            Ok(_) if kind == UploadKind::Image => {
                let policy = self.image_policy;
                let raw = file.bytes.clone();
                let encoded = tokio::task::spawn_blocking(move || shrink_to_jpeg(&raw, policy))
                    .await
                    .map_err(|e| ServiceError::InternalError(format!("image task failed: {e}")))?;
                match encoded {
                    Ok(jpeg) => ("jpg".to_string(), jpeg),
                    Err(e) => return Ok(Err(UploadRejection::Unreadable(e.to_string()))),
                }
            }
            Ok(extension) => (extension, file.bytes.clone()),
            Err(rejection) => return Ok(Err(rejection)),
        };

        let staged_dir = staged.dir.join(kind.dir_name());
        fs::create_dir_all(&staged_dir).await?;

        let file_name = format!("{}.{}", Uuid::new_v4().simple(), extension);
        let staged_path = staged_dir.join(&file_name);
        fs::write(&staged_path, &bytes).await?;

        let relative_path = format!("{}/{}/{}", report_id, kind.dir_name(), file_name);
        staged
            .moves
            .push((staged_path, self.root.join(&relative_path)));
        debug!(report_id, path = %relative_path, "upload staged");
        Ok(Ok(StoredFile {
            relative_path,
            original_filename: file.file_name.as_deref().map(secure_filename),
        }))
    }

    /// Moves staged files to their final paths. Called after commit.
    pub async fn promote(&self, staged: StagedUploads) -> Result<(), ServiceError> {
        for (from, to) in &staged.moves {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::rename(from, to).await?;
        }
        self.remove_dir(&staged.dir).await;
        Ok(())
    }

    /// Drops everything staged. Called after a rollback.
    pub async fn discard(&self, staged: StagedUploads) {
        self.remove_dir(&staged.dir).await;
    }

    /// Removes everything stored for a report. A missing directory is fine.
    pub async fn remove_report_files(&self, report_id: i32) {
        self.remove_dir(&self.report_dir(report_id)).await;
    }

    async fn remove_dir(&self, dir: &Path) {
        match fs::remove_dir_all(dir).await {
            Ok(()) => debug!(dir = %dir.display(), "upload directory removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %dir.display(), error = %e, "failed to remove upload directory"),
        }
    }
}

/// Decodes a photo, fits it inside `max_dimension` and re-encodes it as JPEG.
pub fn shrink_to_jpeg(bytes: &[u8], policy: ImagePolicy) -> Result<Vec<u8>, image::ImageError> {
    let mut img = image::load_from_memory(bytes)?;
    if img.width() > policy.max_dimension || img.height() > policy.max_dimension {
        img = img.resize(policy.max_dimension, policy.max_dimension, FilterType::Lanczos3);
    }
    let rgb = img.to_rgb8();

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, policy.jpeg_quality);
    encoder.encode_image(&rgb)?;
    Ok(out)
}

pub fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Strips directories and anything but a conservative character set.
pub fn secure_filename(raw: &str) -> String {
    let base = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn file(name: &str, size: usize) -> IncomingFile {
        IncomingFile {
            file_name: Some(name.to_string()),
            bytes: vec![7u8; size],
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([30, 90, 160]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn extensions_depend_on_kind() {
        let store = UploadStore::new("/tmp/unused", 10, 20);
        assert_eq!(store.check(UploadKind::Image, &file("a.WEBP", 1)).unwrap(), "webp");
        assert_matches!(
            store.check(UploadKind::DeliveryNote, &file("a.gif", 1)),
            Err(UploadRejection::Extension(ext)) if ext == "gif"
        );
        assert_eq!(
            store.check(UploadKind::DeliveryNote, &file("note.pdf", 1)).unwrap(),
            "pdf"
        );
        assert_matches!(
            store.check(UploadKind::Image, &file("noext", 1)),
            Err(UploadRejection::Extension(_))
        );
    }

    #[test]
    fn size_limits_depend_on_kind() {
        let store = UploadStore::new("/tmp/unused", 10, 20);
        assert_matches!(
            store.check(UploadKind::Image, &file("a.png", 11)),
            Err(UploadRejection::TooLarge { limit: 10, .. })
        );
        assert!(store.check(UploadKind::DeliveryNote, &file("a.png", 11)).is_ok());
    }

    #[test]
    fn filenames_are_sanitised() {
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\scans\\note 1.pdf"), "note_1.pdf");
        assert_eq!(secure_filename(".hidden"), "hidden");
    }

    #[test]
    fn large_photos_are_scaled_to_fit() {
        let policy = ImagePolicy {
            max_dimension: 100,
            jpeg_quality: 80,
        };
        let jpeg = shrink_to_jpeg(&png(400, 200), policy).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));

        let small = image::load_from_memory(&shrink_to_jpeg(&png(40, 30), policy).unwrap()).unwrap();
        assert_eq!((small.width(), small.height()), (40, 30));
    }

    #[tokio::test]
    async fn staged_files_appear_only_after_promotion() {
        let root = tempfile::tempdir().unwrap();
        let store = UploadStore::new(root.path(), 64 * 1024, 1024);
        let mut staged = store.stage();

        let note = store
            .save(&mut staged, 12, UploadKind::DeliveryNote, &file("signed.pdf", 8))
            .await
            .unwrap()
            .unwrap();
        let photo = IncomingFile {
            file_name: Some("site.png".into()),
            bytes: png(20, 10),
        };
        let photo = store
            .save(&mut staged, 12, UploadKind::Image, &photo)
            .await
            .unwrap()
            .unwrap();
        assert!(note.relative_path.starts_with("12/delivery_note/"));
        assert!(note.relative_path.ends_with(".pdf"));
        assert!(photo.relative_path.starts_with("12/images/"));
        assert!(photo.relative_path.ends_with(".jpg"));
        assert!(!root.path().join(&note.relative_path).exists());

        store.promote(staged).await.unwrap();
        assert!(root.path().join(&note.relative_path).exists());
        assert!(root.path().join(&photo.relative_path).exists());
        assert!(root.path().join(STAGING_DIR).read_dir().unwrap().next().is_none());

        store.remove_report_files(12).await;
        assert!(!root.path().join("12").exists());
        store.remove_report_files(12).await;
    }

    #[tokio::test]
    async fn discarding_leaves_existing_reports_alone() {
        let root = tempfile::tempdir().unwrap();
        let store = UploadStore::new(root.path(), 1024, 1024);
        let existing = root.path().join("7").join("images");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("kept.jpg"), b"x").unwrap();

        let mut staged = store.stage();
        store
            .save(&mut staged, 7, UploadKind::DeliveryNote, &file("signed.pdf", 8))
            .await
            .unwrap()
            .unwrap();
        store.discard(staged).await;

        assert!(existing.join("kept.jpg").exists());
        assert!(!root.path().join("7").join("delivery_note").exists());
    }

    #[tokio::test]
    async fn undecodable_photos_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let store = UploadStore::new(root.path(), 1024, 1024);
        let mut staged = store.stage();
        let result = store
            .save(&mut staged, 3, UploadKind::Image, &file("broken.jpg", 16))
            .await
            .unwrap();
        assert_matches!(result, Err(UploadRejection::Unreadable(_)));
        assert!(staged.is_empty());
    }
}
