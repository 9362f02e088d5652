//! Submission flow: create a machine, then optionally attach a photo.
//!
//! The machine record exists before any photo work starts. A photo that is
//! refused or fails to upload never removes the record; the caller learns
//! what happened from [`PhotoOutcome`].

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use vendmap_core::{ImageRef, MachineDraft, MachinePatch};
use vendmap_sync::{WriteError, WriteGateway};

use crate::error::{CodecError, ImageTransferError, ImageValidationError, IngestError};
use crate::pipeline::{ImageFile, ImagePipeline, ProgressFn, UploadResult};

/// Why an accepted photo did not end up on the machine.
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transfer(#[from] ImageTransferError),

    /// Both objects are stored but the machine update failed.
    #[error("photo uploaded but could not be attached: {0}")]
    Attach(#[source] WriteError),
}

#[derive(Debug)]
pub enum PhotoOutcome {
    NotProvided,
    Attached(UploadResult),
    Rejected(ImageValidationError),
    Failed(PhotoError),
}

impl PhotoOutcome {
    #[must_use]
    pub fn is_attached(&self) -> bool {
        matches!(self, PhotoOutcome::Attached(_))
    }
}

#[derive(Debug)]
pub struct Submission {
    pub machine_id: String,
    pub photo: PhotoOutcome,
}

/// Run `file` through the pipeline and record both URLs on the machine.
pub async fn attach_photo(
    gateway: &WriteGateway,
    pipeline: &ImagePipeline,
    machine_id: &str,
    file: &ImageFile,
    on_progress: Option<&ProgressFn<'_>>,
) -> PhotoOutcome {
    let uploaded = match pipeline.ingest(machine_id, file, on_progress).await {
        Ok(uploaded) => uploaded,
        Err(IngestError::Validation(err)) => return PhotoOutcome::Rejected(err),
        Err(IngestError::Codec(err)) => return PhotoOutcome::Failed(err.into()),
        Err(IngestError::Transfer(err)) => return PhotoOutcome::Failed(err.into()),
    };

    let patch = MachinePatch::attach_image(ImageRef {
        image_url: uploaded.image_url.clone(),
        thumbnail_url: uploaded.thumbnail_url.clone(),
        uploaded_at: Utc::now(),
    });
    match gateway.update(machine_id, patch).await {
        Ok(()) => {
            info!(machine_id, "photo attached");
            PhotoOutcome::Attached(uploaded)
        }
        Err(err) => {
            warn!(machine_id, error = %err, "photo stored but not attached");
            PhotoOutcome::Failed(PhotoError::Attach(err))
        }
    }
}

/// Create the machine described by `draft`, then attach `photo` if given.
///
/// # Errors
///
/// Returns [`WriteError`] only when the machine itself could not be created.
/// Photo problems are reported through [`Submission::photo`].
pub async fn submit_machine(
    gateway: &WriteGateway,
    pipeline: &ImagePipeline,
    draft: MachineDraft,
    photo: Option<ImageFile>,
    on_progress: Option<&ProgressFn<'_>>,
) -> Result<Submission, WriteError> {
    let machine_id = gateway.create(draft).await?;
    let photo = match photo {
        Some(file) => attach_photo(gateway, pipeline, &machine_id, &file, on_progress).await,
        None => PhotoOutcome::NotProvided,
    };
    Ok(Submission { machine_id, photo })
}
