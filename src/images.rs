//! Image ingestion: validate an uploaded file, shrink it to fit the
//! configured box, re-encode it as JPEG and store it under a fresh name.

use std::path::{Path, PathBuf};

use axum::body::Bytes;
use chrono::Utc;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ImageConfig;

/// Public path the upload directory is served under.
pub const UPLOAD_URL_PREFIX: &str = "/uploads";

const ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
];

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("Only image files are allowed (got {0})")]
    UnsupportedType(String),

    #[error("File is larger than {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Failed to decode image: {0}")]
    Undecodable(#[source] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub filename: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct ImagePipeline {
    config: ImageConfig,
    upload_dir: PathBuf,
}

impl ImagePipeline {
    pub fn new(config: ImageConfig, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            upload_dir: upload_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.config.max_upload_bytes
    }

    pub fn check_content_type(&self, content_type: Option<&str>) -> Result<(), UploadError> {
        let content_type = content_type.unwrap_or("unknown").to_ascii_lowercase();
        if ALLOWED_TYPES.contains(&content_type.as_str()) {
            Ok(())
        } else {
            Err(UploadError::UnsupportedType(content_type))
        }
    }

    pub fn check_size(&self, len: usize) -> Result<(), UploadError> {
        if len > self.config.max_upload_bytes {
            return Err(UploadError::TooLarge {
                limit: self.config.max_upload_bytes,
            });
        }
        Ok(())
    }

    /// Runs the whole pipeline and returns where the result was stored.
    ///
    /// Decoding and encoding happen on the blocking pool.
    pub async fn ingest(
        &self,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> Result<StoredImage, UploadError> {
        self.check_content_type(content_type)?;
        self.check_size(bytes.len())?;

        let config = self.config;
        let original_len = bytes.len();
        let encoded = tokio::task::spawn_blocking(move || reencode(&bytes, config)).await??;

        fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|source| UploadError::Write {
                path: self.upload_dir.clone(),
                source,
            })?;

        let filename = generate_filename();
        let path = self.upload_dir.join(&filename);
        fs::write(&path, &encoded.jpeg)
            .await
            .map_err(|source| UploadError::Write {
                path: path.clone(),
                source,
            })?;

        info!(
            "Stored image {} ({}x{}, {} -> {} bytes)",
            filename,
            encoded.width,
            encoded.height,
            original_len,
            encoded.jpeg.len()
        );

        Ok(StoredImage {
            url: format!("{UPLOAD_URL_PREFIX}/{filename}"),
            filename,
            width: encoded.width,
            height: encoded.height,
        })
    }
}

struct Encoded {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
}

fn reencode(bytes: &[u8], config: ImageConfig) -> Result<Encoded, UploadError> {
    let image = image::load_from_memory(bytes).map_err(UploadError::Undecodable)?;
    debug!("Decoded upload {}x{}", image.width(), image.height());

    // Fit inside the box, keeping aspect ratio; never enlarge.
    let image = if image.width() > config.max_width || image.height() > config.max_height {
        image.resize(config.max_width, config.max_height, FilterType::Lanczos3)
    } else {
        image
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut jpeg = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, config.quality))
        .map_err(UploadError::Encode)?;

    Ok(Encoded {
        jpeg,
        width: rgb.width(),
        height: rgb.height(),
    })
}

fn generate_filename() -> String {
    format!(
        "{}-{}.jpg",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
        let buffer = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 200])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(buffer)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn pipeline(dir: &Path) -> ImagePipeline {
        ImagePipeline::new(ImageConfig::default(), dir.join("uploads"))
    }

    #[tokio::test]
    async fn large_image_is_shrunk_to_fit_and_stored_as_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let stored = pipeline
            .ingest(Some("image/png"), Bytes::from(png(1600, 900)))
            .await
            .unwrap();

        assert_eq!((stored.width, stored.height), (800, 450));
        assert!(stored.url.starts_with("/uploads/"));
        assert!(stored.filename.ends_with(".jpg"));

        let written = std::fs::read(dir.path().join("uploads").join(&stored.filename)).unwrap();
        assert_eq!(image::guess_format(&written).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&written).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 450));
    }

    #[tokio::test]
    async fn small_image_is_not_enlarged() {
        let dir = tempfile::tempdir().unwrap();
        let stored = pipeline(dir.path())
            .ingest(Some("image/png"), Bytes::from(png(120, 80)))
            .await
            .unwrap();
        assert_eq!((stored.width, stored.height), (120, 80));
    }

    #[tokio::test]
    async fn tall_image_is_bounded_by_height() {
        let dir = tempfile::tempdir().unwrap();
        let stored = pipeline(dir.path())
            .ingest(Some("image/png"), Bytes::from(png(300, 1200)))
            .await
            .unwrap();
        assert_eq!((stored.width, stored.height), (150, 600));
    }

    #[tokio::test]
    async fn rejects_non_image_types() {
        let dir = tempfile::tempdir().unwrap();
        let result = pipeline(dir.path())
            .ingest(Some("text/plain"), Bytes::from_static(b"hello"))
            .await;
        assert!(matches!(result, Err(UploadError::UnsupportedType(t)) if t == "text/plain"));

        let result = pipeline(dir.path())
            .ingest(None, Bytes::from_static(b"hello"))
            .await;
        assert!(matches!(result, Err(UploadError::UnsupportedType(_))));
    }

    #[tokio::test]
    async fn rejects_bytes_that_are_not_an_image() {
        let dir = tempfile::tempdir().unwrap();
        let result = pipeline(dir.path())
            .ingest(Some("image/jpeg"), Bytes::from_static(b"definitely not a jpeg"))
            .await;
        assert!(matches!(result, Err(UploadError::Undecodable(_))));
        assert!(!dir.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn enforces_size_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let config = ImageConfig {
            max_upload_bytes: 64,
            ..ImageConfig::default()
        };
        let result = ImagePipeline::new(config, dir.path())
            .ingest(Some("image/png"), Bytes::from(png(64, 64)))
            .await;
        assert!(matches!(result, Err(UploadError::TooLarge { limit: 64 })));
    }

    #[test]
    fn filenames_are_unique() {
        assert_ne!(generate_filename(), generate_filename());
    }
}
