use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while loading or querying experiment data.
///
/// Every variant is terminal for the input that produced it: nothing in the
/// crate retries, and a failed load leaves no partially built source behind.
#[derive(Error, Debug)]
pub enum Error {
    /// An expected column is missing, a cell does not parse, or nothing is
    /// left after parsing.
    #[error("malformed input {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    #[error("invalid smoothing window {0}: must be at least 1")]
    InvalidWindow(usize),

    #[error("timestep {0} not found on the time axis")]
    TimestepNotFound(f64),

    #[error("inconsistent layer count: {} has {found} layers, expected {expected}", path.display())]
    InconsistentLayerCount {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("no data loaded for channel {0}")]
    MissingChannelData(u8),

    #[error("column {label} has {found} values, index has {expected}")]
    ShapeMismatch {
        label: String,
        expected: usize,
        found: usize,
    },

    #[error("{axis} {key} not present")]
    MissingKey { axis: &'static str, key: String },

    #[error("{0:?} cannot label this query")]
    UnsupportedAxis(crate::data::model::GeometryAxis),

    #[error("duplicate entry at time {time} for {key}")]
    DuplicateEntry { time: f64, key: String },

    #[error("channel {0} is outside 0..=2")]
    UnknownChannel(u8),

    #[error("simulation data in {} not loaded; call read_all first", path.display())]
    NotLoaded { path: PathBuf },

    #[error("layer calibration not set; call set_layer_params first")]
    MissingCalibration,

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::MalformedInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
