use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use refract_core::{KernelParams, ViewportBounds};

use crate::schedule::RefinementSchedule;
use crate::task::{ComputeTask, TaskResult};
use crate::tile::{build_tile_grid, exposed_strips, Rect, Tile, TileId};

/// A pan regrids the canvas once it holds more than this many times the
/// tiles of a fresh grid.
const MAX_TILE_FRAGMENTATION: usize = 2;

/// Everything one epoch's tasks are computed against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSpec {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub bounds: ViewportBounds,
    pub params: KernelParams,
}

/// What a result did to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultOutcome {
    /// Tagged with a superseded epoch (or unknown to this epoch); ignored.
    Stale,
    Accepted {
        /// Next-stage tasks of the tile the result completed, if any.
        follow_up: Vec<ComputeTask>,
        /// Every tile of the epoch has finished its last stage.
        epoch_complete: bool,
    },
}

/// Owns the tile set and drives each tile through the refinement stages.
///
/// Per tile: `idle(stage) → in flight(stage) → idle(stage + 1) → … → done`.
/// A tile at stage `s` dispatches one task per row band of block size
/// `schedule[s]`; when the last of them returns it advances and immediately
/// dispatches the next stage, so stages pipeline across tiles.
#[derive(Debug)]
pub struct Scheduler {
    epoch: u64,
    frame: Option<FrameSpec>,
    schedule: RefinementSchedule,
    tiles: BTreeMap<TileId, Tile>,
    pending: HashMap<(TileId, usize), usize>,
    next_tile_id: TileId,
    rendering: bool,
    started: Option<Instant>,
    last_duration: Option<Duration>,
}

impl Scheduler {
    pub fn new(schedule: RefinementSchedule) -> Self {
        Self {
            epoch: 0,
            frame: None,
            schedule,
            tiles: BTreeMap::new(),
            pending: HashMap::new(),
            next_tile_id: 0,
            rendering: false,
            started: None,
            last_duration: None,
        }
    }

    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[inline]
    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    pub fn last_duration(&self) -> Option<Duration> {
        self.last_duration
    }

    pub fn frame(&self) -> Option<&FrameSpec> {
        self.frame.as_ref()
    }

    pub fn schedule(&self) -> &RefinementSchedule {
        &self.schedule
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(&id)
    }

    /// Outstanding band count summed over all in-flight `(tile, stage)` keys.
    pub fn pending_bands(&self) -> usize {
        self.pending.values().sum()
    }

    /// Use a new schedule from the next reset on.
    pub fn set_schedule(&mut self, schedule: RefinementSchedule) {
        self.schedule = schedule;
    }

    fn begin_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.pending.clear();
        self.rendering = true;
        self.started = Some(Instant::now());
        self.epoch
    }

    fn add_tiles(&mut self, rects: impl IntoIterator<Item = Rect>) {
        for rect in rects {
            let id = self.next_tile_id;
            self.next_tile_id += 1;
            self.tiles.insert(id, Tile::new(id, rect));
        }
    }

    fn regrid(&mut self, frame: &FrameSpec) {
        self.tiles.clear();
        let canvas = Rect::new(0, 0, frame.width, frame.height);
        self.add_tiles(build_tile_grid(canvas, frame.tile_size));
    }

    /// Regenerate the whole tile grid under a new epoch.
    pub fn reset(&mut self, frame: FrameSpec) -> u64 {
        let epoch = self.begin_epoch();
        self.regrid(&frame);
        self.frame = Some(frame);
        debug!(
            epoch,
            tiles = self.tiles.len(),
            width = frame.width,
            height = frame.height,
            stages = self.schedule.len(),
            "Tile grid reset"
        );
        epoch
    }

    /// Reuse the tile set after the content moved by `(dx, dy)` pixels.
    ///
    /// Surviving tiles are shifted and clipped, tiles for the exposed strips
    /// are added, and every tile restarts at stage 0 under a new epoch.
    /// Displacements of a full canvas or more fall back to [`reset`].
    ///
    /// Strip tiles are never merged back into their neighbours, so a long
    /// run of small pans splits the canvas into slivers. Once the set
    /// outgrows a fresh grid by [`MAX_TILE_FRAGMENTATION`], the canvas is
    /// regridded. Nothing is lost since every tile restarts anyway.
    ///
    /// [`reset`]: Scheduler::reset
    pub fn pan(&mut self, dx: i32, dy: i32, bounds: ViewportBounds) -> u64 {
        let Some(mut frame) = self.frame else {
            return self.epoch;
        };
        frame.bounds = bounds;
        if dx.unsigned_abs() >= frame.width || dy.unsigned_abs() >= frame.height {
            return self.reset(frame);
        }

        let epoch = self.begin_epoch();
        let (w, h) = (frame.width, frame.height);
        self.tiles = std::mem::take(&mut self.tiles)
            .into_values()
            .filter_map(|tile| {
                let rect = tile.rect.shifted_clipped(dx, dy, w, h)?;
                Some((tile.id, Tile::new(tile.id, rect)))
            })
            .collect();
        let kept = self.tiles.len();

        let fresh: Vec<Rect> = exposed_strips(dx, dy, w, h)
            .into_iter()
            .flat_map(|strip| build_tile_grid(strip, frame.tile_size))
            .collect();
        self.add_tiles(fresh);
        self.frame = Some(frame);

        let grid_len = build_tile_grid(Rect::new(0, 0, w, h), frame.tile_size).len();
        if self.tiles.len() > grid_len * MAX_TILE_FRAGMENTATION {
            debug!(
                epoch,
                tiles = self.tiles.len(),
                grid = grid_len,
                "Pan fragmented the tile set; regridding"
            );
            self.regrid(&frame);
            return epoch;
        }

        debug!(
            epoch,
            dx,
            dy,
            kept,
            added = self.tiles.len() - kept,
            "Tiles reused after pan"
        );
        epoch
    }

    /// Drop all tiles and supersede in-flight work without scheduling any.
    pub fn clear(&mut self) -> u64 {
        self.epoch += 1;
        self.tiles.clear();
        self.pending.clear();
        self.rendering = false;
        self.started = None;
        self.epoch
    }

    fn dispatch_tile(&mut self, id: TileId) -> Vec<ComputeTask> {
        let Some(frame) = self.frame else {
            return Vec::new();
        };
        let Some(tile) = self.tiles.get_mut(&id) else {
            return Vec::new();
        };
        if tile.in_flight {
            return Vec::new();
        }
        let Some(block) = self.schedule.block(tile.stage) else {
            return Vec::new();
        };

        let tasks: Vec<ComputeTask> = tile
            .bands(block)
            .into_iter()
            .map(|band| ComputeTask {
                epoch: self.epoch,
                tile_id: id,
                stage: tile.stage,
                band,
                bounds: frame.bounds,
                params: frame.params,
            })
            .collect();
        tile.in_flight = true;
        self.pending.insert((id, tile.stage), tasks.len());
        tasks
    }

    /// Tasks for every tile that is neither in flight nor done.
    pub fn dispatch_ready(&mut self) -> Vec<ComputeTask> {
        let ready: Vec<TileId> = self
            .tiles
            .values()
            .filter(|t| !t.in_flight && !t.is_done(self.schedule.len()))
            .map(|t| t.id)
            .collect();
        let tasks: Vec<ComputeTask> = ready
            .into_iter()
            .flat_map(|id| self.dispatch_tile(id))
            .collect();
        if !tasks.is_empty() {
            debug!(epoch = self.epoch, tasks = tasks.len(), "Dispatching bands");
        }
        tasks
    }

    /// Account for one finished band.
    pub fn on_task_result(&mut self, result: &TaskResult) -> ResultOutcome {
        if result.epoch != self.epoch {
            trace!(
                result_epoch = result.epoch,
                epoch = self.epoch,
                "Discarding stale result"
            );
            return ResultOutcome::Stale;
        }
        let key = (result.tile_id, result.stage);
        let Some(remaining) = self.pending.get_mut(&key) else {
            trace!(tile = result.tile_id, stage = result.stage, "Result for unknown band");
            return ResultOutcome::Stale;
        };
        *remaining = remaining.saturating_sub(1);

        let mut follow_up = Vec::new();
        if *remaining == 0 {
            self.pending.remove(&key);
            if let Some(tile) = self.tiles.get_mut(&result.tile_id) {
                tile.stage += 1;
                tile.in_flight = false;
            }
            follow_up = self.dispatch_tile(result.tile_id);
        }

        let epoch_complete = self.rendering && self.pending.is_empty() && self.all_done();
        if epoch_complete {
            self.rendering = false;
            let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
            self.last_duration = Some(elapsed);
            info!(
                epoch = self.epoch,
                elapsed_ms = elapsed.as_millis(),
                tiles = self.tiles.len(),
                "Render complete"
            );
        }

        ResultOutcome::Accepted {
            follow_up,
            epoch_complete,
        }
    }

    fn all_done(&self) -> bool {
        let stages = self.schedule.len();
        self.tiles.values().all(|t| t.is_done(stages))
    }
}
