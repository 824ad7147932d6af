//! Error types for the conversion driver

use cloudconv_io::CodecError;
use thiserror::Error;

/// Errors raised by a conversion run
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PotreeConverter not found: {0}")]
    ToolNotFound(String),

    #[error("PotreeConverter failed: {0}")]
    ToolFailed(String),

    #[error("Unsupported destination: {0}")]
    UnsupportedDestination(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
