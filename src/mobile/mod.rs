mod cache;
mod chunker;
mod upload;

pub use cache::{AppUploadCache, AppUploadKey, UploadedArtifact};
pub use chunker::{chunk_bytes, get_size_and_parts, md5_base64, FilePart, SizeAndParts, PART_SIZE};
pub use upload::{
    upload_application_version, validate_upload_job, AppUploadReporter, AppUploader, SilentReporter,
    UploadApplicationConfig, UploadPollOptions,
};
