//! Multipart upload bodies.
//!
//! A [`MultipartForm`] is validated when it is built, so a payload that cannot
//! be encoded is rejected before any network exchange starts.

use crate::params::{scalar_text, Parameters};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Default form field name of the uploaded file.
pub const DEFAULT_FIELD_NAME: &str = "upload";
/// Default file name of the uploaded file.
pub const DEFAULT_FILE_NAME: &str = "file.jpg";
/// Default MIME type of the uploaded file.
pub const DEFAULT_MIME_TYPE: &str = "image/jpg";

/// Error building a multipart body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The file payload is empty
    #[error("empty file payload")]
    EmptyPayload,

    /// The MIME type is not of the form `type/subtype`
    #[error("invalid MIME type: {0}")]
    InvalidMimeType(String),

    /// A field or file name contains characters that cannot appear in a
    /// `Content-Disposition` header
    #[error("invalid part name: {0:?}")]
    InvalidName(String),
}

/// Binary payload to upload, with its part metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPayload {
    /// File bytes
    pub data: Vec<u8>,
    /// Form field name of the file part
    pub field_name: String,
    /// File name of the file part
    pub file_name: String,
    /// MIME type of the file part
    pub mime_type: String,
    /// Extra parameters sent as text parts
    pub parameters: Option<Parameters>,
}

impl UploadPayload {
    /// Create a payload with the default field name, file name and MIME type.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            field_name: DEFAULT_FIELD_NAME.to_string(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            parameters: None,
        }
    }

    /// Builder: Set field name
    #[must_use]
    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }

    /// Builder: Set file name
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Builder: Set MIME type
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Builder: Set extra parameters
    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// One text part of a multipart form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextPart {
    /// Field name
    pub name: String,
    /// String-encoded value
    pub value: String,
}

/// The file part of a multipart form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePart {
    /// Field name
    pub name: String,
    /// File name
    pub file_name: String,
    /// MIME type
    pub mime_type: String,
    /// File bytes
    pub data: Vec<u8>,
}

/// A validated multipart form: one file part plus text parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartForm {
    /// File part
    pub file: FilePart,
    /// Text parts, in parameter order
    pub fields: Vec<TextPart>,
}

impl MultipartForm {
    /// Build a form from an upload payload.
    ///
    /// # Errors
    ///
    /// Returns `EncodingError` if the payload is empty, the MIME type is
    /// malformed, or a name contains control characters or quotes.
    pub fn build(payload: UploadPayload) -> Result<Self, EncodingError> {
        if payload.data.is_empty() {
            return Err(EncodingError::EmptyPayload);
        }
        if !is_valid_mime(&payload.mime_type) {
            return Err(EncodingError::InvalidMimeType(payload.mime_type));
        }
        check_name(&payload.field_name)?;
        check_name(&payload.file_name)?;

        let fields = payload
            .parameters
            .unwrap_or_default()
            .iter()
            .map(|(name, value)| {
                check_name(name)?;
                Ok(TextPart {
                    name: name.clone(),
                    value: scalar_text(value),
                })
            })
            .collect::<Result<Vec<_>, EncodingError>>()?;

        Ok(Self {
            file: FilePart {
                name: payload.field_name,
                file_name: payload.file_name,
                mime_type: payload.mime_type,
                data: payload.data,
            },
            fields,
        })
    }

    /// Size of the file part in bytes.
    #[must_use]
    pub fn file_len(&self) -> u64 {
        self.file.data.len() as u64
    }
}

fn check_name(name: &str) -> Result<(), EncodingError> {
    if name.is_empty() || name.chars().any(|c| c.is_control() || c == '"') {
        return Err(EncodingError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn is_valid_mime(mime: &str) -> bool {
    let token = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "!#$&-^_.+".contains(c))
    };
    mime.split_once('/')
        .is_some_and(|(kind, subtype)| token(kind) && token(subtype))
}

/// Progress of an upload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes handed to the connection so far
    pub bytes_sent: u64,
    /// Total bytes of the file part
    pub total_bytes: u64,
}

impl UploadProgress {
    /// Completed fraction in `0.0..=1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.bytes_sent as f64 / self.total_bytes as f64
    }
}

/// Progress side channel for uploads.
#[derive(Clone)]
pub struct ProgressFn(Arc<dyn Fn(UploadProgress) + Send + Sync>);

impl ProgressFn {
    /// Wrap a progress callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(UploadProgress) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// Report progress.
    pub fn report(&self, progress: UploadProgress) {
        (self.0)(progress);
    }
}

impl fmt::Debug for ProgressFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressFn(<callback>)")
    }
}
