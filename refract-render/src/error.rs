use thiserror::Error;

/// Errors originating from the rendering pipeline.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid image dimensions: {width}×{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("failed to spawn compute worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("GPU unavailable: {0}")]
    GpuUnavailable(String),

    #[error("shader failed to compile: {0}")]
    ShaderCompile(String),

    #[error("GPU frame failed: {0}")]
    GpuFrame(String),

    #[error(transparent)]
    Core(#[from] refract_core::CoreError),
}
