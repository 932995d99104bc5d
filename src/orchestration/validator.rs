// Submission validation: shape and type checks before any provider call

use tracing::{debug, warn};

use crate::core::errors::ValidationError;
use crate::core::types::{BatchRequest, ImageItem, Submission, UploadedFile};
use crate::utils::image_ops::{mime_from_filename, normalize_mime, sniff_mime, MIME_JPEG, MIME_PNG};

const OCTET_STREAM: &str = "application/octet-stream";

/// Turns a raw submission into an ordered, indexed batch
#[derive(Debug, Clone)]
pub struct Validator {
    max_files: usize,
}

impl Validator {
    pub fn new(max_files: usize) -> Self {
        Self { max_files }
    }

    /// Validate a submission.
    ///
    /// Any violation rejects the whole batch. The type check applies to empty
    /// files too; an empty PNG/JPEG passes and fails later at item scope.
    pub fn validate(&self, submission: Submission) -> Result<BatchRequest, ValidationError> {
        let count = submission.files.len();
        if count == 0 {
            return Err(ValidationError::NoFiles);
        }
        if count > self.max_files {
            warn!("Rejecting batch of {} files (max {})", count, self.max_files);
            return Err(ValidationError::TooManyFiles {
                count,
                max: self.max_files,
            });
        }

        let items = submission
            .files
            .into_iter()
            .enumerate()
            .map(|(index, file)| Self::validate_file(index, file))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Validated batch of {} images", items.len());
        Ok(BatchRequest::new(items))
    }

    fn validate_file(index: usize, file: UploadedFile) -> Result<ImageItem, ValidationError> {
        let filename = file
            .filename
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("upload-{}", index));

        let mime_type = resolve_mime(&filename, file.content_type.as_deref(), &file.bytes);

        if mime_type != MIME_PNG && mime_type != MIME_JPEG {
            return Err(ValidationError::UnsupportedType { filename, mime_type });
        }

        Ok(ImageItem {
            index,
            filename,
            bytes: file.bytes,
            mime_type,
        })
    }
}

/// Declared type if specific, else filename extension, else magic bytes
pub fn resolve_mime(filename: &str, declared: Option<&str>, bytes: &[u8]) -> String {
    if let Some(declared) = declared.map(normalize_mime) {
        if !declared.is_empty() && declared != OCTET_STREAM {
            return declared;
        }
    }

    mime_from_filename(filename)
        .or_else(|| sniff_mime(bytes))
        .unwrap_or(OCTET_STREAM)
        .to_string()
}
