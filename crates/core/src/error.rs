//! Error types for the lahar engine

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for lahar operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot open raster {path}: {reason}")]
    RasterOpen { path: PathBuf, reason: String },

    #[error("Invalid raster dimensions: {width}x{height} (at least 2x2 required)")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("cannot write {path}: {source}")]
    OutputIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("flow direction grid is cyclic: cell ({row}, {col}) never drains to the border ({unresolved} cells affected)")]
    CyclicFlowGraph {
        row: usize,
        col: usize,
        unresolved: usize,
    },

    #[error("{0}")]
    OptionConflict(String),

    #[error("could not start worker pool after {attempts} attempts: {reason}")]
    WorkerPool { attempts: u32, reason: String },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

impl Error {
    /// Wrap an I/O failure on an output destination.
    pub fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::OutputIo {
            path: path.into(),
            source,
        }
    }

    /// Wrap a failure to open or decode an input raster.
    pub fn raster_open(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::RasterOpen {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error means the flow graph was not a forest.
    pub fn is_cyclic(&self) -> bool {
        matches!(self, Error::CyclicFlowGraph { .. })
    }
}

/// Result type alias for lahar operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_message_names_cell() {
        let err = Error::CyclicFlowGraph {
            row: 3,
            col: 4,
            unresolved: 2,
        };
        assert!(err.is_cyclic());
        assert!(err.to_string().contains("(3, 4)"));
    }

    #[test]
    fn test_output_error_keeps_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::output("/tmp/out-sdem.tsv", io);
        assert!(err.to_string().contains("out-sdem.tsv"));
        assert!(!err.is_cyclic());
    }
}
