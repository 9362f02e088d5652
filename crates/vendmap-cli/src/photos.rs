//! Photo commands: attach, delete and geotag inspection.

use std::path::Path;

use anyhow::Context;
use vendmap_media::{
    attach_photo, extract_geotag, ImageFile, ImagePipeline, MediaType, PhotoOutcome,
};
use vendmap_sync::WriteGateway;

const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// Read `path` into an [`ImageFile`], guessing the media type from the
/// extension.
pub(crate) async fn read_image_file(path: &Path) -> anyhow::Result<ImageFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo".to_string());
    let media_type = MediaType::from_file_name(&name).map_or(UNKNOWN_MEDIA_TYPE, MediaType::mime);
    Ok(ImageFile::new(name, media_type, bytes))
}

pub(crate) fn progress_printer() -> impl Fn(u8) + Send + Sync {
    |percent| eprintln!("upload {percent}%")
}

pub(crate) fn report_outcome(outcome: &PhotoOutcome) {
    match outcome {
        PhotoOutcome::NotProvided => {}
        PhotoOutcome::Attached(urls) => {
            println!("image:     {}", urls.image_url);
            println!("thumbnail: {}", urls.thumbnail_url);
        }
        PhotoOutcome::Rejected(err) => eprintln!("photo rejected: {err}"),
        PhotoOutcome::Failed(err) => eprintln!("photo not attached: {err}"),
    }
}

/// Upload `photo` and attach it to machine `id`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the photo is not attached.
pub(crate) async fn run_attach_photo(
    gateway: &WriteGateway,
    pipeline: &ImagePipeline,
    id: &str,
    photo: &Path,
) -> anyhow::Result<()> {
    let file = read_image_file(photo).await?;
    let on_progress = progress_printer();
    let outcome = attach_photo(gateway, pipeline, id, &file, Some(&on_progress)).await;
    report_outcome(&outcome);
    anyhow::ensure!(outcome.is_attached(), "photo was not attached to {id}");
    Ok(())
}

/// # Errors
///
/// Returns an error if `url` does not name a stored object or the removal fails.
pub(crate) async fn run_delete_image(pipeline: &ImagePipeline, url: &str) -> anyhow::Result<()> {
    pipeline.delete_image(url).await?;
    println!("deleted {url}");
    Ok(())
}

/// Print the embedded location of `photo` as JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub(crate) async fn run_geotag(photo: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(photo)
        .await
        .with_context(|| format!("failed to read {}", photo.display()))?;
    match extract_geotag(&bytes) {
        Some(geotag) => println!("{}", serde_json::to_string_pretty(&geotag)?),
        None => println!("no location embedded in {}", photo.display()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_file_with_guessed_media_type() {
        let dir = std::env::temp_dir().join(format!("vendmap-cli-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("IMG_0001.JPG");
        tokio::fs::write(&path, [0xFF, 0xD8, 0xFF]).await.unwrap();

        let file = read_image_file(&path).await.unwrap();
        assert_eq!(file.name, "IMG_0001.JPG");
        assert_eq!(file.media_type, "image/jpeg");
        assert_eq!(file.size(), 3);

        let other = dir.join("notes.txt");
        tokio::fs::write(&other, b"hi").await.unwrap();
        let file = read_image_file(&other).await.unwrap();
        assert_eq!(file.media_type, UNKNOWN_MEDIA_TYPE);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let err = read_image_file(Path::new("/definitely/not/here.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
