use refract_core::{compute_band, Band, KernelParams, ViewportBounds};

use crate::tile::TileId;

/// One row band of one tile at one refinement stage.
///
/// Tasks are plain values: workers get their own copy and never touch
/// scheduler state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputeTask {
    pub epoch: u64,
    pub tile_id: TileId,
    pub stage: usize,
    pub band: Band,
    pub bounds: ViewportBounds,
    pub params: KernelParams,
}

impl ComputeTask {
    /// Run the kernel over the band.
    pub fn run(&self) -> TaskResult {
        TaskResult {
            epoch: self.epoch,
            tile_id: self.tile_id,
            stage: self.stage,
            band: self.band,
            values: compute_band(&self.params, &self.bounds, &self.band),
        }
    }

    /// Stand-in result for a band whose computation panicked, filled with
    /// the interior value so the tile can still advance.
    pub fn failed(&self) -> TaskResult {
        TaskResult {
            epoch: self.epoch,
            tile_id: self.tile_id,
            stage: self.stage,
            band: self.band,
            values: vec![self.params.max_iterations as f32; self.band.sample_count()],
        }
    }
}

/// Iteration values for a finished [`ComputeTask`], one per block, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub epoch: u64,
    pub tile_id: TileId,
    pub stage: usize,
    pub band: Band,
    pub values: Vec<f32>,
}
