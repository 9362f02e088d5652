//! Photo ingestion for one machine.
//!
//! A run moves through
//!
//! ```text
//! Validating -> UploadingOriginal -> GeneratingThumbnail -> UploadingThumbnail -> Done
//! ```
//!
//! and can fail from any stage. Validation happens before any decoding or
//! network activity. A failed upload leaves whatever was already stored in
//! place and never touches the machine record.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vendmap_core::{AppConfig, ImageBounds};

use crate::blob::{resolve_storage_path, BlobRef, BlobStore};
use crate::codec::ImageCodec;
use crate::error::{
    CodecError, DeleteImageError, ImageTransferError, ImageValidationError, IngestError,
};
use crate::geotag::{self, Geotag};

pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Progress callback, called with a percentage at 0, 50 and 100.
pub type ProgressFn<'a> = dyn Fn(u8) + Send + Sync + 'a;

/// Called with each [`PipelineStage`] an ingestion enters, ending with
/// [`PipelineStage::Done`] or [`PipelineStage::Failed`].
pub type StageFn<'a> = dyn Fn(PipelineStage) + Send + Sync + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl MediaType {
    pub const ALL: [MediaType; 4] = [
        MediaType::Jpeg,
        MediaType::Png,
        MediaType::Gif,
        MediaType::Webp,
    ];

    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Gif => "image/gif",
            MediaType::Webp => "image/webp",
        }
    }

    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.mime().eq_ignore_ascii_case(mime.trim()))
    }

    /// Guess from a file name, for callers that have no declared type.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            "png" => Some(MediaType::Png),
            "gif" => Some(MediaType::Gif),
            "webp" => Some(MediaType::Webp),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime())
    }
}

/// A user-submitted file: its name, declared media type and contents.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl std::fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFile")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLimits {
    pub max_bytes: u64,
    pub allowed_types: Vec<MediaType>,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            allowed_types: MediaType::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressOptions {
    /// Encoder quality in `(0, 1]`.
    pub quality: f32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for CompressOptions {
    fn default() -> Self {
        ImageBounds::FULL_SIZE.into()
    }
}

impl From<ImageBounds> for CompressOptions {
    fn from(bounds: ImageBounds) -> Self {
        Self {
            quality: bounds.quality,
            max_width: bounds.max_width,
            max_height: bounds.max_height,
        }
    }
}

/// A re-encoded copy of the submitted image.
#[derive(Clone, PartialEq, Eq)]
pub struct Derivative {
    pub media_type: MediaType,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Derivative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derivative")
            .field("media_type", &self.media_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("size", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub image_url: String,
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validating,
    UploadingOriginal,
    GeneratingThumbnail,
    UploadingThumbnail,
    Done,
    Failed,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PipelineStage::Validating => "validating",
            PipelineStage::UploadingOriginal => "uploading-original",
            PipelineStage::GeneratingThumbnail => "generating-thumbnail",
            PipelineStage::UploadingThumbnail => "uploading-thumbnail",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        })
    }
}

/// Target size for an image of `width`x`height` under the given bounds.
///
/// Images inside the bounds keep their size. Otherwise the longer side is set
/// to its maximum and the other follows the original aspect ratio.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn scaled_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if (width <= max_width && height <= max_height) || width == 0 || height == 0 {
        return (width, height);
    }
    let aspect = f64::from(width) / f64::from(height);
    if width > height {
        let h = (f64::from(max_width) / aspect).round() as u32;
        (max_width, h.max(1))
    } else {
        let w = (f64::from(max_height) * aspect).round() as u32;
        (w.max(1), max_height)
    }
}

/// Object path for one upload: `machines/{id}/{prefix}{timestamp}_{name}`.
fn object_path(machine_id: &str, prefix: &str, timestamp_ms: i64, name: &str) -> String {
    let name = name.replace(['/', '\\'], "_");
    format!("machines/{machine_id}/{prefix}{timestamp_ms}_{name}")
}

fn report(on_progress: Option<&ProgressFn<'_>>, percent: u8) {
    if let Some(callback) = on_progress {
        callback(percent);
    }
}

/// Paths and progress for one original/thumbnail pair. Both objects share
/// the session timestamp.
struct UploadSession<'s> {
    blobs: &'s dyn BlobStore,
    machine_id: &'s str,
    file_name: &'s str,
    timestamp_ms: i64,
    on_progress: Option<&'s ProgressFn<'s>>,
}

impl UploadSession<'_> {
    async fn put(
        &self,
        prefix: &str,
        derivative: &Derivative,
    ) -> Result<BlobRef, ImageTransferError> {
        let path = object_path(self.machine_id, prefix, self.timestamp_ms, self.file_name);
        self.blobs
            .put(&path, derivative.bytes.clone(), derivative.media_type.mime())
            .await
            .map_err(|source| ImageTransferError::Upload { path, source })
    }

    async fn put_original(&self, derivative: &Derivative) -> Result<BlobRef, ImageTransferError> {
        report(self.on_progress, 0);
        let blob = self.put("", derivative).await?;
        report(self.on_progress, 50);
        Ok(blob)
    }

    async fn put_thumbnail(&self, derivative: &Derivative) -> Result<BlobRef, ImageTransferError> {
        let blob = self.put("thumb_", derivative).await?;
        report(self.on_progress, 100);
        Ok(blob)
    }

    async fn url_of(&self, blob: &BlobRef) -> Result<String, ImageTransferError> {
        self.blobs
            .public_url(blob)
            .await
            .map_err(|source| ImageTransferError::Upload {
                path: blob.path.clone(),
                source,
            })
    }

    async fn urls(
        &self,
        original: &BlobRef,
        thumbnail: &BlobRef,
    ) -> Result<UploadResult, ImageTransferError> {
        Ok(UploadResult {
            image_url: self.url_of(original).await?,
            thumbnail_url: self.url_of(thumbnail).await?,
        })
    }
}

pub struct ImagePipeline {
    blobs: Arc<dyn BlobStore>,
    codec: Arc<dyn ImageCodec>,
    limits: ImageLimits,
    full_size: CompressOptions,
    thumbnail: CompressOptions,
}

impl std::fmt::Debug for ImagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePipeline")
            .field("limits", &self.limits)
            .field("full_size", &self.full_size)
            .field("thumbnail", &self.thumbnail)
            .finish_non_exhaustive()
    }
}

impl ImagePipeline {
    pub fn new(blobs: Arc<dyn BlobStore>, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            blobs,
            codec,
            limits: ImageLimits::default(),
            full_size: ImageBounds::FULL_SIZE.into(),
            thumbnail: ImageBounds::THUMBNAIL.into(),
        }
    }

    pub fn from_app_config(
        blobs: Arc<dyn BlobStore>,
        codec: Arc<dyn ImageCodec>,
        config: &AppConfig,
    ) -> Self {
        Self::new(blobs, codec)
            .with_limits(ImageLimits {
                max_bytes: config.image_max_bytes,
                ..ImageLimits::default()
            })
            .with_bounds(config.full_size.into(), config.thumbnail.into())
    }

    #[must_use]
    pub fn with_limits(mut self, limits: ImageLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, full_size: CompressOptions, thumbnail: CompressOptions) -> Self {
        self.full_size = full_size;
        self.thumbnail = thumbnail;
        self
    }

    #[must_use]
    pub fn limits(&self) -> &ImageLimits {
        &self.limits
    }

    /// Check size, then media type.
    ///
    /// # Errors
    ///
    /// Returns [`ImageValidationError`] when the file is too large or not an
    /// allowed image type.
    pub fn validate(&self, file: &ImageFile) -> Result<MediaType, ImageValidationError> {
        if file.size() > self.limits.max_bytes {
            return Err(ImageValidationError::TooLarge {
                size: file.size(),
                limit: self.limits.max_bytes,
            });
        }
        MediaType::from_mime(&file.media_type)
            .filter(|t| self.limits.allowed_types.contains(t))
            .ok_or_else(|| ImageValidationError::UnsupportedType(file.media_type.clone()))
    }

    #[must_use]
    pub fn extract_geotag(&self, file: &ImageFile) -> Option<Geotag> {
        geotag::extract_geotag(&file.bytes)
    }

    /// Decode, shrink to fit `options` and re-encode in the file's own
    /// format. Undeclared formats are written as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if decoding, resizing or encoding fails.
    pub fn compress(
        &self,
        file: &ImageFile,
        options: &CompressOptions,
    ) -> Result<Derivative, CodecError> {
        let media_type = MediaType::from_mime(&file.media_type).unwrap_or(MediaType::Png);
        let decoded = self.codec.decode(&file.bytes)?;
        let (width, height) = scaled_dimensions(
            decoded.width,
            decoded.height,
            options.max_width,
            options.max_height,
        );
        let pixels = if (width, height) == (decoded.width, decoded.height) {
            decoded
        } else {
            self.codec.resize(&decoded, width, height)?
        };
        let bytes = self.codec.encode(&pixels, media_type, options.quality)?;
        debug!(file = %file.name, width, height, bytes = bytes.len(), "derivative encoded");
        Ok(Derivative {
            media_type,
            width,
            height,
            bytes,
        })
    }

    /// [`compress`](Self::compress) with the thumbnail bounds.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if decoding, resizing or encoding fails.
    pub fn generate_thumbnail(&self, file: &ImageFile) -> Result<Derivative, CodecError> {
        self.compress(file, &self.thumbnail)
    }

    fn session<'s>(
        &'s self,
        machine_id: &'s str,
        file_name: &'s str,
        on_progress: Option<&'s ProgressFn<'s>>,
    ) -> UploadSession<'s> {
        UploadSession {
            blobs: self.blobs.as_ref(),
            machine_id,
            file_name,
            timestamp_ms: Utc::now().timestamp_millis(),
            on_progress,
        }
    }

    /// Store both derivatives under `machines/{machine_id}/` and resolve
    /// their public URLs. The original goes first.
    ///
    /// # Errors
    ///
    /// Returns [`ImageTransferError::Upload`] for the first failed call.
    /// Objects stored before the failure are left in place.
    pub async fn upload(
        &self,
        machine_id: &str,
        file_name: &str,
        original: &Derivative,
        thumbnail: &Derivative,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<UploadResult, ImageTransferError> {
        let session = self.session(machine_id, file_name, on_progress);
        let original_ref = session.put_original(original).await?;
        let thumbnail_ref = session.put_thumbnail(thumbnail).await?;
        session.urls(&original_ref, &thumbnail_ref).await
    }

    /// Validate, compress, upload the original, generate and upload the
    /// thumbnail.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] naming the class of the first failure.
    pub async fn ingest(
        &self,
        machine_id: &str,
        file: &ImageFile,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<UploadResult, IngestError> {
        self.ingest_with_stages(machine_id, file, on_progress, None).await
    }

    /// [`ingest`](Self::ingest), also reporting every stage entered to
    /// `on_stage`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] naming the class of the first failure.
    pub async fn ingest_with_stages(
        &self,
        machine_id: &str,
        file: &ImageFile,
        on_progress: Option<&ProgressFn<'_>>,
        on_stage: Option<&StageFn<'_>>,
    ) -> Result<UploadResult, IngestError> {
        let mut stage = PipelineStage::Validating;
        if let Some(callback) = on_stage {
            callback(stage);
        }
        let result = self
            .run(machine_id, file, on_progress, on_stage, &mut stage)
            .await;
        match &result {
            Ok(_) => info!(machine_id, file = %file.name, "photo uploaded"),
            Err(err) => {
                warn!(
                    machine_id,
                    file = %file.name,
                    stage = %stage,
                    error = %err,
                    "photo ingestion failed"
                );
                if let Some(callback) = on_stage {
                    callback(PipelineStage::Failed);
                }
            }
        }
        result
    }

    async fn run(
        &self,
        machine_id: &str,
        file: &ImageFile,
        on_progress: Option<&ProgressFn<'_>>,
        on_stage: Option<&StageFn<'_>>,
        stage: &mut PipelineStage,
    ) -> Result<UploadResult, IngestError> {
        let mut enter = |next: PipelineStage| {
            debug!(machine_id, stage = %next, "pipeline stage");
            *stage = next;
            if let Some(callback) = on_stage {
                callback(next);
            }
        };

        self.validate(file)?;

        enter(PipelineStage::UploadingOriginal);
        let original = self.compress(file, &self.full_size)?;
        let session = self.session(machine_id, &file.name, on_progress);
        let original_ref = session.put_original(&original).await?;

        enter(PipelineStage::GeneratingThumbnail);
        let thumbnail = self.generate_thumbnail(file)?;

        enter(PipelineStage::UploadingThumbnail);
        let thumbnail_ref = session.put_thumbnail(&thumbnail).await?;

        let result = session.urls(&original_ref, &thumbnail_ref).await?;
        enter(PipelineStage::Done);
        Ok(result)
    }

    /// Remove a stored image given its public URL or bare storage path.
    ///
    /// # Errors
    ///
    /// Returns [`DeleteImageError::InvalidStorageUrl`] when no path can be
    /// resolved, or [`DeleteImageError::Transfer`] when the removal fails.
    pub async fn delete_image(&self, url: &str) -> Result<(), DeleteImageError> {
        let path = resolve_storage_path(url)?;
        self.blobs
            .delete(&BlobRef::new(path.clone()))
            .await
            .map_err(|source| ImageTransferError::Delete {
                path: path.clone(),
                source,
            })?;
        info!(path = %path, "image deleted");
        Ok(())
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
