use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid range: start {start}, end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("Format error: {0}")]
    Format(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Comparison error: {0}")]
    Comparison(String),
}

/// Broad class of a [`CompareError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or unreadable input, or an invalid byte/line range
    Io,
    /// Content could not be parsed as the declared format
    Format,
    /// Caller misuse detected while building a comparator
    Config,
    /// Internal failure while running a comparison
    Comparison,
}

impl CompareError {
    /// Map an I/O error for `path` to `NotFound` when the file is missing
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            CompareError::NotFound(path.into())
        } else {
            CompareError::Io(err)
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CompareError::Io(_) | CompareError::NotFound(_) | CompareError::InvalidRange { .. } => {
                ErrorCategory::Io
            }
            CompareError::Format(_) => ErrorCategory::Format,
            CompareError::Config(_) => ErrorCategory::Config,
            CompareError::Comparison(_) => ErrorCategory::Comparison,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompareError>;
