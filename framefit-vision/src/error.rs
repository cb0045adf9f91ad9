//! Typed failures surfaced by the vision crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    /// Camera or landmark model could not be opened or stopped delivering.
    /// Fatal to the running session.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Landmark count does not match the face-mesh layout
    #[error("invalid landmark set: expected {expected} points, got {got}")]
    InvalidLandmarks { expected: usize, got: usize },

    /// Model inference or output decoding error
    #[error("model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, VisionError>;
