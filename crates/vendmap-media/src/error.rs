use thiserror::Error;

/// The file was refused before any decoding or network activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageValidationError {
    #[error("file size {size} bytes exceeds the {limit}-byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("invalid file type {0:?}: only images are allowed")]
    UnsupportedType(String),
}

/// Decoding, resizing or re-encoding failed.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("invalid target dimensions {width}x{height}")]
    Dimensions { width: u32, height: u32 },

    #[error("failed to encode {format} image: {reason}")]
    Encode { format: &'static str, reason: String },
}

/// Errors returned by a [`BlobStore`](crate::BlobStore).
#[derive(Debug, Error)]
pub enum BlobError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage returned HTTP {status} for {path}")]
    Status { status: u16, path: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid storage base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("unexpected storage response for {path}: {reason}")]
    InvalidResponse { path: String, reason: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A blob transfer failed. The machine record is left untouched.
#[derive(Debug, Error)]
pub enum ImageTransferError {
    #[error("failed to upload {path}: {source}")]
    Upload {
        path: String,
        #[source]
        source: BlobError,
    },

    #[error("failed to delete {path}: {source}")]
    Delete {
        path: String,
        #[source]
        source: BlobError,
    },
}

#[derive(Debug, Error)]
pub enum DeleteImageError {
    #[error("invalid storage URL: {0}")]
    InvalidStorageUrl(String),

    #[error(transparent)]
    Transfer(#[from] ImageTransferError),
}

/// Failure of a full validate, compress and upload run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ImageValidationError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transfer(#[from] ImageTransferError),
}
