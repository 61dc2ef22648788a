use std::path::PathBuf;
use thiserror::Error;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the damage analysis pipeline.
///
/// # Why structured errors
///
/// Each variant captures context specific to its error domain (missing inputs,
/// filesystem, image processing, model operations, etc.), so callers can tell a
/// missing weight file apart from a broken session without parsing strings.
#[derive(Error, Debug)]
pub enum CarDamageError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("{kind} file not found: {path:?}")]
    MissingFile { kind: String, path: PathBuf },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, CarDamageError>;

impl CarDamageError {
    pub(crate) fn model<E>(operation: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Model {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Fail fast when a required input is absent.
///
/// Weight files, the enhancer graph and the input photograph are all checked
/// through here before any session is built.
pub fn ensure_exists(kind: &str, path: &std::path::Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(CarDamageError::MissingFile {
            kind: kind.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// Convert I/O errors to filesystem errors.
///
/// # Why default values for context
///
/// Some I/O errors occur without specific path/operation context. Code that has
/// context should construct `CarDamageError::FileSystem` directly.
impl From<std::io::Error> for CarDamageError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to image processing errors.
impl From<image::ImageError> for CarDamageError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ONNX Runtime errors to model errors.
impl From<ort::Error> for CarDamageError {
    fn from(err: ort::Error) -> Self {
        Self::model("ort operation", err)
    }
}

/// Convert ndarray shape errors to model errors.
///
/// Shape errors occur during tensor operations which are part of model inference,
/// so they're categorized as model errors rather than a separate tensor error type.
impl From<ndarray::ShapeError> for CarDamageError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::model("tensor shape conversion", err)
    }
}

impl From<serde_json::Error> for CarDamageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration {
            message: format!("report serialization: {err}"),
        }
    }
}
