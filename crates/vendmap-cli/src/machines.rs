//! Write-side commands for machine records.

use std::path::Path;

use vendmap_core::MachineDraft;
use vendmap_media::{submit_machine, ImagePipeline, PhotoOutcome, Submission};
use vendmap_sync::{WriteError, WriteGateway};

use crate::photos::{progress_printer, read_image_file, report_outcome};

/// Create a machine and attach `photo` when one is given.
///
/// # Errors
///
/// Returns an error if the draft is rejected, the store write fails, or the
/// photo file cannot be read. A photo that fails after the machine exists is
/// reported but does not fail the command.
pub(crate) async fn run_add(
    gateway: &WriteGateway,
    pipeline: Option<&ImagePipeline>,
    draft: MachineDraft,
    photo: Option<&Path>,
) -> anyhow::Result<()> {
    let file = match photo {
        Some(path) => Some(read_image_file(path).await?),
        None => None,
    };

    let submission = match (pipeline, file) {
        (Some(pipeline), file) => {
            let on_progress = progress_printer();
            submit_machine(gateway, pipeline, draft, file, Some(&on_progress)).await
        }
        (None, _) => gateway
            .create(draft)
            .await
            .map(|machine_id| Submission {
                machine_id,
                photo: PhotoOutcome::NotProvided,
            }),
    };

    let submission = match submission {
        Ok(submission) => submission,
        Err(WriteError::Validation(err)) => {
            for message in &err.errors {
                eprintln!("  - {message}");
            }
            anyhow::bail!("machine rejected");
        }
        Err(err) => return Err(err.into()),
    };

    println!("created machine {}", submission.machine_id);
    report_outcome(&submission.photo);
    Ok(())
}

/// Delete a machine record. Its stored images are left in place.
///
/// # Errors
///
/// Returns an error if the store rejects the delete.
pub(crate) async fn run_delete(gateway: &WriteGateway, id: &str) -> anyhow::Result<()> {
    gateway.delete(id).await?;
    println!("deleted machine {id}");
    Ok(())
}
