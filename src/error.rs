use thiserror::Error;

use crate::frame::FrameId;

/// Errors returned by the verification-protocol query layer.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A protocol, group or purpose outside its allowed set.
    #[error("invalid {parameter} '{value}', expected one of: {}", .allowed.join(", "))]
    InvalidParameter {
        parameter: &'static str,
        value: String,
        allowed: Vec<String>,
    },

    /// A request the low-level dataset cannot answer without silently dropping data.
    #[error("unsupported query: {0}")]
    UnsupportedConfiguration(&'static str),

    /// Failure reported by the low-level dataset, passed through unmodified.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Errors raised while resolving data attached to a single sampled frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("no annotation for frame {frame} (key '{key}')")]
    MissingAnnotation { frame: FrameId, key: String },

    #[error("frame {frame} is beyond the {decoded} decoded frames of the video")]
    FrameOutOfRange { frame: FrameId, decoded: usize },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
