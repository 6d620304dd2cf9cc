// Crate-wide error type. Every variant states *where* things went wrong.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The source image could not be opened or decoded.
    #[error("Image load error ({path}): {reason}")]
    ImageLoad { path: PathBuf, reason: String },

    /// A render parameter fell outside its documented range.
    #[error("Invalid parameter `{name}`: {value} not in [{min}, {max}]")]
    InvalidParameter { name: &'static str, value: f64, min: f64, max: f64 },

    /// A grid cell with zero sampled pixels; only non-positive spacing or
    /// dimensions can produce one.
    #[error("Degenerate cell: width={width} height={height} spacing={spacing}")]
    DegenerateCell { width: i64, height: i64, spacing: i64 },

    /// The kernel arena could not grow to the byte count a render needs.
    #[error("Memory growth error: could not grow kernel arena to {requested} bytes")]
    MemoryGrowth { requested: usize },

    #[error("Window init error: {0}")]
    WindowInit(String),

    #[error("Window update error: {0}")]
    WindowUpdate(String),

    /// Encoding a raster export failed.
    #[error("Encode error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn image_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::ImageLoad { path: path.into(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
