use thiserror::Error;

/// Errors originating from the core fractal engine.
#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("invalid canvas: {width}×{height} (both must be > 0)")]
    InvalidCanvas { width: u32, height: u32 },

    #[error("invalid zoom: {0} (must be positive and finite)")]
    InvalidZoom(f64),

    #[error("malformed location string {input:?}: {reason}")]
    MalformedLocation { input: String, reason: &'static str },

    #[error("unknown algorithm: {0:?}")]
    UnknownAlgorithm(String),
}
