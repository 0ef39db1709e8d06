use std::path::PathBuf;

use crate::georef::Crs;

pub type Result<T> = std::result::Result<T, SegmentError>;

/// Everything that can abort a segmentation run.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// Invalid parameters or flag combination, detected before any I/O.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("unrecognized file type: {}", .0.display())]
    UnrecognizedFileType(PathBuf),

    #[error("failed to read raster {}: {message}", path.display())]
    RasterRead { path: PathBuf, message: String },

    #[error("failed to read vector file {}: {message}", path.display())]
    VectorRead { path: PathBuf, message: String },

    #[error("coordinate system of {} is {found}, expected {expected}", path.display())]
    CrsMismatch {
        path: PathBuf,
        expected: Crs,
        found: Crs,
    },

    #[error(
        "raster {} is {found_width}x{found_height}, expected {width}x{height}",
        path.display()
    )]
    RasterShapeMismatch {
        path: PathBuf,
        width: usize,
        height: usize,
        found_width: usize,
        found_height: usize,
    },

    /// The input cannot be segmented with the given parameters.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    #[error("label grid contains no regions")]
    EmptyGraph,

    #[error("failed to write {}: {message}", path.display())]
    Write { path: PathBuf, message: String },
}

impl SegmentError {
    pub(crate) fn raster_read(path: impl Into<PathBuf>, err: impl ToString) -> Self {
        SegmentError::RasterRead {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn vector_read(path: impl Into<PathBuf>, err: impl ToString) -> Self {
        SegmentError::VectorRead {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, err: impl ToString) -> Self {
        SegmentError::Write {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
