//! Error types for codec operations

use thiserror::Error;

/// Errors raised while decoding or encoding a point cloud file
#[derive(Error, Debug)]
pub enum CodecError {
    #[error(transparent)]
    Core(#[from] cloudconv_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LAS error: {0}")]
    Las(#[from] las::Error),

    #[error("E57 error: {0}")]
    E57(#[from] e57::Error),

    #[error("Malformed {format} file: {message}")]
    Malformed {
        format: &'static str,
        message: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl CodecError {
    pub fn malformed(format: &'static str, message: impl Into<String>) -> Self {
        CodecError::Malformed {
            format,
            message: message.into(),
        }
    }
}

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
