//! Error types for floodfuse

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for floodfuse operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error at {}: {source}", path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// Irreconcilable CRS pair. Raised under the fail-fast mismatch policy
    /// and whenever no transform path exists between the two systems.
    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Load`] with any displayable reason.
    pub fn load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Attach a path to an I/O failure.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a configuration error (CRS policy violation or a
    /// rejected parameter), as opposed to a data or I/O failure.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::CrsMismatch(..) | Error::InvalidParameter { .. })
    }
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

/// Result type alias for floodfuse operations
pub type Result<T> = std::result::Result<T, Error>;
