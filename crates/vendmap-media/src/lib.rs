//! Photo ingestion for machine records: validation, geotag extraction,
//! derivative generation, blob upload and attachment.

pub mod blob;
pub mod codec;
pub mod error;
pub mod geotag;
pub mod pipeline;
pub mod submit;

pub use blob::{
    resolve_storage_path, BlobRef, BlobStore, HttpBlobStore, MemoryBlobStore, StoredObject,
};
pub use codec::{ImageCodec, PixelBuffer, RasterCodec};
pub use error::{
    BlobError, CodecError, DeleteImageError, ImageTransferError, ImageValidationError,
    IngestError,
};
pub use geotag::{extract_geotag, Geotag};
pub use pipeline::{
    scaled_dimensions, CompressOptions, Derivative, ImageFile, ImageLimits, ImagePipeline,
    MediaType, PipelineStage, ProgressFn, StageFn, UploadResult,
};
pub use submit::{attach_photo, submit_machine, PhotoError, PhotoOutcome, Submission};
