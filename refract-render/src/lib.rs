pub mod backend;
pub mod buffer;
pub mod colour;
pub mod controller;
pub mod error;
pub mod gpu;
pub mod iteration_buffer;
pub mod palette;
pub mod schedule;
pub mod scheduler;
pub mod settings;
pub mod task;
pub mod tile;
#[cfg(feature = "gpu")]
pub mod wgpu_shader;

pub use backend::{BackendKind, CpuPool};
pub use buffer::RenderBuffer;
pub use colour::{ColourMapper, ColourMode, ColourParams, Equalizer};
pub use controller::{InteractionMode, RenderController, RenderStatus};
pub use error::RenderError;
pub use gpu::{FrameShader, FrameUniforms, GpuBackend, GpuFrame, ShaderVariant};
pub use iteration_buffer::IterationBuffer;
pub use palette::{builtin_palette, builtin_palettes, PaletteStop, PaletteTable};
pub use schedule::RefinementSchedule;
pub use scheduler::{FrameSpec, ResultOutcome, Scheduler};
pub use settings::Settings;
pub use task::{ComputeTask, TaskResult};
pub use tile::{Rect, Tile, TileId, DEFAULT_TILE_SIZE};
#[cfg(feature = "gpu")]
pub use wgpu_shader::WgpuShader;

/// Convenience result type for the render crate.
pub type Result<T> = std::result::Result<T, RenderError>;
