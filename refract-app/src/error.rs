use std::path::PathBuf;

use thiserror::Error;

use refract_render::RenderError;

/// Everything that stops the binary with a non-zero exit.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("cannot read settings file {}: {source}", path.display())]
    ReadSettings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {}: {source}", path.display())]
    ParseSettings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot write settings file {}: {source}", path.display())]
    WriteSettings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize settings: {0}")]
    SerializeSettings(#[source] serde_json::Error),

    #[error("unknown palette {name:?} (available: {known})")]
    UnknownPalette { name: String, known: String },

    #[error("cannot write image {}: {source}", path.display())]
    WriteImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode an empty {width}×{height} image")]
    EmptyImage { width: u32, height: u32 },

    #[error(transparent)]
    Encoding(#[from] png::EncodingError),

    #[error("render did not finish within {0} s")]
    Timeout(u64),

    #[error(transparent)]
    Render(#[from] RenderError),
}
