use crate::imaging::{
    DownloadError, FetchedImage, ImageFetcher, NormalizeError, NormalizedImage, naming, normalize,
};
use crate::models::{StageReport, StoredImageInfo};
use serde::Serialize;
use serde_json::{Value, json};
use std::{
    future::Future,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use thiserror::Error;
use tracing::{info, warn};

/// Sub-directory of the upload root holding product photos.
pub const PRODUCT_IMAGE_DIR: &str = "products";

/// Download → normalize → name → atomic write, for one chosen image.
///
/// Saves for different products never collide. Two concurrent saves for the
/// same product both complete; whichever caller records its path last wins.
#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<PipelineConfig>,
    fetcher: ImageFetcher,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub upload_root: PathBuf,
    pub target_size: (u32, u32),
}

/// Path of a written image, relative to the upload root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredImageRef {
    pub relative_path: String,
}

#[derive(Debug)]
pub struct StoredImage {
    pub image: StoredImageRef,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not move image into place: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("{0}")]
    Inspect(String),
}

/// The first failing stage of a save, with its cause.
#[derive(Debug, Error)]
#[error("Error processing image: {message}")]
pub struct ImageProcessingError {
    stage: &'static str,
    message: String,
}

impl ImageProcessingError {
    pub fn new(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

impl From<DownloadError> for ImageProcessingError {
    fn from(err: DownloadError) -> Self {
        Self::new("download_image", err.to_string())
    }
}

impl From<NormalizeError> for ImageProcessingError {
    fn from(err: NormalizeError) -> Self {
        Self::new("normalize_image", err.to_string())
    }
}

impl From<WriteError> for ImageProcessingError {
    fn from(err: WriteError) -> Self {
        Self::new("write_image", err.to_string())
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig, fetcher: ImageFetcher) -> Self {
        Self {
            config: Arc::new(config),
            fetcher,
        }
    }

    pub fn product_image_dir(&self) -> PathBuf {
        self.config.upload_root.join(PRODUCT_IMAGE_DIR)
    }

    pub async fn save_image_for_product(
        &self,
        image_url: &str,
        product_code: &str,
    ) -> Result<StoredImage, ImageProcessingError> {
        let mut stages = Vec::new();

        let fetched = self
            .capture_stage(
                "download_image",
                &mut stages,
                stages::download_image(&self.fetcher, image_url),
            )
            .await?;

        let normalized = self
            .capture_stage(
                "normalize_image",
                &mut stages,
                stages::normalize_image(fetched, self.config.target_size),
            )
            .await?;

        let filename = naming::name(product_code, image_url);
        let image = self
            .capture_stage(
                "write_image",
                &mut stages,
                stages::write_image(self.product_image_dir(), filename, normalized),
            )
            .await?;

        info!(
            target = "shelfshot.pipeline",
            product_code = %product_code,
            path = %image.relative_path,
            "product_image_saved"
        );
        Ok(StoredImage { image, stages })
    }

    /// Reads back a stored image's dimensions and detected format.
    pub async fn inspect_stored(
        &self,
        relative_path: &str,
    ) -> Result<StoredImageInfo, ImageProcessingError> {
        let root = self.config.upload_root.clone();
        let relative = relative_path.to_string();
        tokio::task::spawn_blocking(move || stages::inspect(&root, &relative))
            .await
            .map_err(|err| ImageProcessingError::new("inspect_image", err.to_string()))?
            .map_err(|err| ImageProcessingError::new("inspect_image", err.to_string()))
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, ImageProcessingError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, ImageProcessingError>>,
    {
        let started = Instant::now();
        let outcome = match fut.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(target = "shelfshot.pipeline", stage = name, error = %err.detail(), "stage_failed");
                return Err(err);
            }
        };
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

pub mod stages {
    use super::*;

    pub async fn download_image(
        fetcher: &ImageFetcher,
        url: &str,
    ) -> Result<StageOutcome<FetchedImage>, ImageProcessingError> {
        let fetched = fetcher.fetch(url).await?;
        let output = json!({
            "url": url,
            "content_type": fetched.content_type,
            "declared_length": fetched.content_length,
            "bytes": fetched.bytes.len(),
        });
        Ok(StageOutcome::new(fetched, output))
    }

    pub async fn normalize_image(
        fetched: FetchedImage,
        target: (u32, u32),
    ) -> Result<StageOutcome<NormalizedImage>, ImageProcessingError> {
        let normalized =
            tokio::task::spawn_blocking(move || normalize::normalize(&fetched, target))
                .await
                .map_err(|err| NormalizeError::Processing(err.to_string()))??;
        let output = json!({
            "source_dimensions": normalized.source_dimensions(),
            "crop": normalized.crop(),
            "dimensions": normalized.dimensions(),
            "bytes": normalized.bytes().len(),
        });
        Ok(StageOutcome::new(normalized, output))
    }

    pub async fn write_image(
        dir: PathBuf,
        filename: String,
        image: NormalizedImage,
    ) -> Result<StageOutcome<StoredImageRef>, ImageProcessingError> {
        let stored = tokio::task::spawn_blocking(move || write_atomic(&dir, &filename, image.bytes()))
            .await
            .map_err(|err| WriteError::Io(std::io::Error::other(err.to_string())))??;
        let stored = StoredImageRef {
            relative_path: format!("{PRODUCT_IMAGE_DIR}/{stored}"),
        };
        let output = json!({ "relative_path": stored.relative_path });
        Ok(StageOutcome::new(stored, output))
    }

    /// Writes to a temp file beside the target, then renames it into place.
    /// A failure at any point leaves nothing at the final path.
    pub(super) fn write_atomic(dir: &Path, filename: &str, bytes: &[u8]) -> Result<String, WriteError> {
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(filename))?;
        Ok(filename.to_string())
    }

    pub(super) fn inspect(root: &Path, relative_path: &str) -> Result<StoredImageInfo, WriteError> {
        let path = root.join(relative_path);
        let file_size = std::fs::metadata(&path)?.len();
        let reader = image::ImageReader::open(&path)?.with_guessed_format()?;
        let format = reader
            .format()
            .map(|f| format!("{f:?}").to_uppercase())
            .ok_or_else(|| WriteError::Inspect("unrecognised image format".into()))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|err| WriteError::Inspect(err.to_string()))?;
        Ok(StoredImageInfo {
            path: relative_path.to_string(),
            width,
            height,
            format,
            file_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::http::build_client;
    use crate::test_util::{encode, serve_body};
    use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, Rgb, RgbImage, Rgba};

    fn pipeline(root: &Path, size: u32) -> Pipeline {
        Pipeline::new(
            PipelineConfig {
                upload_root: root.to_path_buf(),
                target_size: (size, size),
            },
            ImageFetcher::new(build_client(HttpConfig::default())),
        )
    }

    fn files_in(dir: &Path) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn saved_images_have_target_dimensions_for_any_input() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline(tmp.path(), 48);
        let inputs = [
            (
                DynamicImage::ImageRgba8(ImageBuffer::from_pixel(90, 40, Rgba([5, 10, 200, 90]))),
                ImageFormat::Png,
            ),
            (
                DynamicImage::ImageLuma8(GrayImage::from_pixel(30, 70, Luma([128]))),
                ImageFormat::Png,
            ),
            (
                DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([1, 2, 3]))),
                ImageFormat::Jpeg,
            ),
            (
                DynamicImage::ImageRgba8(ImageBuffer::from_pixel(20, 35, Rgba([250, 0, 0, 255]))),
                ImageFormat::Gif,
            ),
        ];

        for (idx, (img, format)) in inputs.iter().enumerate() {
            let url = serve_body("image/png", encode(img, *format), "/img/photo.PNG?x=1").await;
            let code = format!("WM-00{idx}");
            let saved = pipeline
                .save_image_for_product(&url, &code)
                .await
                .expect("save image");

            assert!(saved.image.relative_path.starts_with(&format!("products/{code}_")));
            assert!(saved.image.relative_path.ends_with(".png"));

            let info = pipeline
                .inspect_stored(&saved.image.relative_path)
                .await
                .expect("inspect");
            assert_eq!((info.width, info.height), (48, 48));
            assert_eq!(info.format, "JPEG");

            let names: Vec<&str> = saved.stages.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names, vec!["download_image", "normalize_image", "write_image"]);
        }

        let left: Vec<String> = files_in(&tmp.path().join(PRODUCT_IMAGE_DIR))
            .into_iter()
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(left.is_empty(), "temp files left behind: {left:?}");
    }

    #[tokio::test]
    async fn non_image_response_fails_in_download_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline(tmp.path(), 32);
        let url = serve_body("text/html", b"<html></html>".to_vec(), "/page").await;

        let err = pipeline
            .save_image_for_product(&url, "WH-001")
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "download_image");
        assert!(err.to_string().starts_with("Error processing image: "));
        assert!(files_in(&pipeline.product_image_dir()).is_empty());
    }

    #[tokio::test]
    async fn corrupt_bytes_fail_in_normalize_stage_without_writing() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline(tmp.path(), 32);
        let url = serve_body("image/jpeg", b"not really a jpeg".to_vec(), "/a.jpg").await;

        let err = pipeline
            .save_image_for_product(&url, "WH-001")
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "normalize_image");
        assert!(files_in(&pipeline.product_image_dir()).is_empty());
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("products");
        stages::write_atomic(&dir, "a.jpg", b"first").unwrap();
        stages::write_atomic(&dir, "a.jpg", b"second").unwrap();
        assert_eq!(std::fs::read(dir.join("a.jpg")).unwrap(), b"second");
        assert_eq!(files_in(&dir), vec!["a.jpg".to_string()]);
    }

    #[tokio::test]
    async fn inspecting_missing_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline(tmp.path(), 32);
        let err = pipeline
            .inspect_stored("products/nope.jpg")
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "inspect_image");
    }
}
