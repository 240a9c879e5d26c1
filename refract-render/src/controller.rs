//! The render controller: owns navigation, settings, the scheduler, the
//! surfaces and the compute backends, and turns view changes into epochs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use refract_core::{KernelParams, Navigation, Precision, ViewportBounds};

use crate::backend::{BackendKind, CpuPool};
use crate::buffer::RenderBuffer;
use crate::colour::{ColourMapper, ColourMode};
use crate::error::RenderError;
use crate::gpu::{
    gpu_resolves, resolve_gpu_precision, FrameShader, FrameUniforms, GpuBackend, GpuFrame,
    ShaderVariant,
};
use crate::iteration_buffer::IterationBuffer;
use crate::palette::PaletteTable;
use crate::scheduler::{FrameSpec, ResultOutcome, Scheduler};
use crate::settings::Settings;
use crate::task::{ComputeTask, TaskResult};

/// Upper bound on a single blocking wait inside [`RenderController::wait_idle`].
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Fraction of a pixel below which a pan still counts as whole-pixel.
const PIXEL_SNAP_TOLERANCE: f64 = 1e-6;

/// What a pointer drag does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    #[default]
    Pan,
    /// Drag out a rectangle to zoom into.
    Select,
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    start: (f64, f64),
    last: (f64, f64),
}

/// Snapshot of what a frontend needs to draw and label a frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderStatus<'a> {
    pub surface: &'a RenderBuffer,
    pub rendering: bool,
    pub last_duration: Option<Duration>,
    pub effective_max_iterations: u32,
    pub precision: Precision,
    /// The active representation cannot resolve the view.
    pub precision_limited: bool,
    pub label: &'a str,
    pub epoch: u64,
}

pub struct RenderController {
    settings: Settings,
    nav: Navigation,
    width: u32,
    height: u32,
    scheduler: Scheduler,
    pool: CpuPool,
    gpu: Option<GpuBackend>,
    mapper: ColourMapper,
    surface: RenderBuffer,
    distribution: Option<IterationBuffer>,
    params: KernelParams,
    precision_limited: bool,
    last_duration: Option<Duration>,
    gpu_fallback: Option<String>,
    label: String,
    interaction: InteractionMode,
    drag: Option<Drag>,
}

fn check_dimensions(width: u32, height: u32) -> crate::Result<()> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidDimensions { width, height });
    }
    Ok(())
}

impl RenderController {
    /// Build a controller and start rendering `nav` at `width × height`.
    pub fn new(settings: Settings, nav: Navigation, width: u32, height: u32) -> crate::Result<Self> {
        check_dimensions(width, height)?;
        nav.bounds(width, height)?;
        let settings = settings.sanitized();
        let pool = CpuPool::new(settings.worker_count())?;
        let table = Arc::new(PaletteTable::from_stops(&settings.palette));
        let mapper = ColourMapper::new(table, settings.colour_params());

        let mut controller = Self {
            scheduler: Scheduler::new(settings.schedule()),
            settings,
            nav,
            width,
            height,
            pool,
            gpu: None,
            mapper,
            surface: RenderBuffer::new(width, height),
            distribution: None,
            params: KernelParams::default(),
            precision_limited: false,
            last_duration: None,
            gpu_fallback: None,
            label: String::new(),
            interaction: InteractionMode::default(),
            drag: None,
        };
        controller.restart()?;
        Ok(controller)
    }

    /// Attach a GPU device; used when the settings select the GPU backend.
    pub fn with_gpu(mut self, shader: Box<dyn FrameShader>) -> crate::Result<Self> {
        self.gpu = Some(GpuBackend::new(shader));
        self.gpu_fallback = None;
        self.restart()?;
        Ok(self)
    }

    // -- Accessors ---------------------------------------------------------

    pub fn navigation(&self) -> &Navigation {
        &self.nav
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn surface(&self) -> &RenderBuffer {
        &self.surface
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn epoch(&self) -> u64 {
        self.scheduler.epoch()
    }

    pub fn is_rendering(&self) -> bool {
        self.scheduler.is_rendering()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn kernel_params(&self) -> &KernelParams {
        &self.params
    }

    pub fn status(&self) -> RenderStatus<'_> {
        RenderStatus {
            surface: &self.surface,
            rendering: self.scheduler.is_rendering(),
            last_duration: self.last_duration,
            effective_max_iterations: self.params.max_iterations,
            precision: self.params.precision,
            precision_limited: self.precision_limited,
            label: &self.label,
            epoch: self.scheduler.epoch(),
        }
    }

    // -- Epochs ------------------------------------------------------------

    fn gpu_eligible(&self) -> bool {
        self.settings.backend == BackendKind::Gpu
            && self.settings.colour_mode != ColourMode::Distribution
            && self.gpu.as_ref().is_some_and(|g| g.is_available())
    }

    /// Kernel parameters and precision flag for the current view on the CPU.
    fn cpu_params(&self, bounds: &ViewportBounds) -> (KernelParams, bool) {
        let s = &self.settings;
        let step = bounds.step();
        let magnitude = bounds.magnitude(self.width, self.height);
        let precision = s.precision.resolve(step, magnitude, s.limb_profile);
        let params = KernelParams {
            algorithm: s.algorithm,
            precision,
            limb_profile: s.limb_profile,
            max_iterations: s.effective_max_iterations(self.nav.zoom),
            smooth: s.smooth_iterations,
            julia_c: s.julia_c(),
        };
        (params, !precision.resolves(step, magnitude, s.limb_profile))
    }

    fn warn_precision(&self) {
        if self.precision_limited {
            warn!(
                epoch = self.scheduler.epoch(),
                precision = self.params.precision.label(),
                zoom = self.nav.zoom,
                "View is finer than the active precision can resolve"
            );
        }
    }

    /// Regenerate everything for the current view under a new epoch.
    pub fn restart(&mut self) -> crate::Result<()> {
        let bounds = self.nav.bounds(self.width, self.height)?;

        if self.gpu_eligible() {
            match self.render_gpu(&bounds) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("GPU backend failed, falling back to CPU tiling: {e}");
                    self.gpu_fallback = Some(e.to_string());
                }
            }
        }

        let (params, limited) = self.cpu_params(&bounds);
        self.params = params;
        self.precision_limited = limited;
        self.distribution = match self.settings.colour_mode {
            ColourMode::Distribution => Some(IterationBuffer::new(
                self.width,
                self.height,
                params.max_iterations,
            )),
            _ => None,
        };

        let frame = FrameSpec {
            width: self.width,
            height: self.height,
            tile_size: self.settings.tile_size,
            bounds,
            params,
        };
        self.scheduler.reset(frame);
        self.label = match &self.gpu_fallback {
            Some(reason) => format!("CPU ({} workers, GPU unavailable: {reason})", self.pool.len()),
            None => format!("CPU ({} workers)", self.pool.len()),
        };
        self.warn_precision();
        self.dispatch();
        Ok(())
    }

    fn render_gpu(&mut self, bounds: &ViewportBounds) -> crate::Result<()> {
        let s = &self.settings;
        let step = bounds.step();
        let magnitude = bounds.magnitude(self.width, self.height);
        let precision = resolve_gpu_precision(s.precision, step, magnitude, s.limb_profile);
        let params = KernelParams {
            algorithm: s.algorithm,
            precision,
            limb_profile: s.limb_profile,
            max_iterations: s.effective_max_iterations(self.nav.zoom),
            smooth: s.smooth_iterations,
            julia_c: s.julia_c(),
        };
        let variant = ShaderVariant {
            algorithm: params.algorithm,
            precision,
            limb_profile: params.limb_profile,
        };
        let table = Arc::clone(self.mapper.table());
        let frame = GpuFrame {
            uniforms: FrameUniforms::new(
                self.width,
                self.height,
                &params,
                self.mapper.params(),
                table.len(),
            ),
            seeds: variant.seed_table(bounds, self.width, self.height, params.julia_c),
            palette: &table,
        };

        let epoch = self.scheduler.clear();
        self.distribution = None;
        self.params = params;
        self.precision_limited = !gpu_resolves(precision, step, magnitude, params.limb_profile);
        self.warn_precision();

        let started = Instant::now();
        let Some(gpu) = self.gpu.as_mut() else {
            return Err(RenderError::GpuUnavailable("no device attached".into()));
        };
        let pixels = gpu.render(variant, &frame)?;
        self.surface.replace(pixels);

        let elapsed = started.elapsed();
        self.last_duration = Some(elapsed);
        self.label = format!("GPU ({})", precision.label());
        info!(
            epoch,
            elapsed_ms = elapsed.as_millis(),
            precision = precision.label(),
            "GPU frame complete"
        );
        Ok(())
    }

    fn dispatch(&mut self) {
        let tasks = self.scheduler.dispatch_ready();
        self.submit(tasks);
    }

    /// Queue tasks on the pool. If some cannot be queued the epoch could
    /// never complete, so it is abandoned instead.
    fn submit(&mut self, tasks: Vec<ComputeTask>) {
        let dropped = self.pool.submit_all(tasks);
        if dropped.is_empty() {
            return;
        }
        let epoch = self.scheduler.clear();
        error!(
            epoch,
            tasks = dropped.len(),
            "No compute worker could take the render; abandoned"
        );
    }

    // -- View changes ------------------------------------------------------

    /// Move to `next`, reusing tiles when it is a whole-pixel pan of the
    /// current view.
    ///
    /// Only an identical view is a no-op. Any other change, sub-pixel
    /// offsets included, lands exactly on `next`: fractional moves cannot
    /// reuse shifted tiles and regenerate in full.
    pub fn set_navigation(&mut self, next: Navigation) -> crate::Result<()> {
        next.bounds(self.width, self.height)?;
        if next == self.nav {
            return Ok(());
        }

        let displacement = self
            .nav
            .pixel_displacement(&next, self.height)
            .filter(|(dx, dy)| {
                dx.unsigned_abs() < self.width && dy.unsigned_abs() < self.height
            })
            .filter(|&(dx, dy)| self.lands_on(&next, dx, dy));
        let reusable = !self.gpu_eligible() && self.scheduler.frame().is_some();

        match displacement {
            Some((dx, dy)) if reusable && (dx, dy) != (0, 0) => self.pan_reuse(dx, dy),
            _ => {
                debug!(zoom = next.zoom, "Navigation changed; full regenerate");
                self.nav = next;
                self.restart()
            }
        }
    }

    /// Whether panning by whole pixels `(dx, dy)` reaches `next` up to
    /// rounding noise.
    fn lands_on(&self, next: &Navigation, dx: i32, dy: i32) -> bool {
        let snapped = self.nav.panned_by_pixels(self.height, dx, dy);
        let tolerance = self.nav.scale(self.height) * PIXEL_SNAP_TOLERANCE;
        (snapped.x - next.x).abs() <= tolerance && (snapped.y - next.y).abs() <= tolerance
    }

    fn pan_reuse(&mut self, dx: i32, dy: i32) -> crate::Result<()> {
        let Some(frame) = self.scheduler.frame().copied() else {
            return self.restart();
        };
        let snapped = self.nav.panned_by_pixels(self.height, dx, dy);
        let bounds = frame.bounds.shifted(dx, dy);

        // A pan can cross a precision boundary; the old tiles are useless then.
        self.nav = snapped;
        let (params, limited) = self.cpu_params(&bounds);
        if params != frame.params {
            debug!("Pan changed kernel parameters; full regenerate");
            return self.restart();
        }

        self.surface.shift(dx, dy);
        if let Some(dist) = &mut self.distribution {
            dist.shift(dx, dy);
        }
        self.scheduler.pan(dx, dy, bounds);
        self.precision_limited = limited;
        self.warn_precision();
        self.dispatch();
        Ok(())
    }

    /// Drag the content by `(dx, dy)` pixels.
    pub fn pan_by_pixels(&mut self, dx: i32, dy: i32) -> crate::Result<()> {
        let next = self.nav.panned_by_pixels(self.height, dx, dy);
        self.set_navigation(next)
    }

    /// Zoom by `factor` keeping the point under `(px, py)` fixed.
    pub fn zoom_at(&mut self, px: f64, py: f64, factor: f64) -> crate::Result<()> {
        let next = self.nav.zoom_at(self.width, self.height, px, py, factor);
        self.set_navigation(next)
    }

    /// Wheel zoom: whole doubling steps around a pixel.
    pub fn zoom_steps(&mut self, px: f64, py: f64, steps: i32) -> crate::Result<()> {
        let next = self.nav.zoom_steps(self.width, self.height, px, py, steps);
        self.set_navigation(next)
    }

    /// Frame the rectangle spanned by two pixel corners.
    pub fn select_rect(&mut self, a: (f64, f64), b: (f64, f64)) -> crate::Result<()> {
        let next = self.nav.select_rect(self.width, self.height, a, b);
        if next == self.nav {
            return Ok(());
        }
        self.set_navigation(next)
    }

    /// Back to the algorithm's default view.
    pub fn reset_view(&mut self) -> crate::Result<()> {
        self.nav = Navigation::default_for(self.settings.algorithm);
        self.restart()
    }

    pub fn interaction_mode(&self) -> InteractionMode {
        self.interaction
    }

    pub fn set_interaction_mode(&mut self, mode: InteractionMode) {
        self.interaction = mode;
        self.drag = None;
    }

    pub fn begin_drag(&mut self, x: f64, y: f64) {
        self.drag = Some(Drag {
            start: (x, y),
            last: (x, y),
        });
    }

    /// Pointer moved while dragging. Pans live in pan mode.
    pub fn drag_to(&mut self, x: f64, y: f64) -> crate::Result<()> {
        let Some(mut drag) = self.drag else {
            return Ok(());
        };
        if self.interaction == InteractionMode::Pan {
            let dx = (x - drag.last.0).round();
            let dy = (y - drag.last.1).round();
            if dx != 0.0 || dy != 0.0 {
                drag.last = (drag.last.0 + dx, drag.last.1 + dy);
                self.drag = Some(drag);
                self.pan_by_pixels(dx as i32, dy as i32)?;
            }
        }
        Ok(())
    }

    /// Pointer released. Zooms to the dragged rectangle in select mode.
    pub fn end_drag(&mut self, x: f64, y: f64) -> crate::Result<()> {
        let result = match (self.interaction, self.drag) {
            (_, None) => Ok(()),
            (InteractionMode::Pan, Some(_)) => self.drag_to(x, y),
            (InteractionMode::Select, Some(drag)) => self.select_rect(drag.start, (x, y)),
        };
        self.drag = None;
        result
    }

    // -- Configuration -----------------------------------------------------

    /// Swap in new settings and regenerate.
    pub fn apply_settings(&mut self, settings: Settings) -> crate::Result<()> {
        let settings = settings.sanitized();
        if settings.worker_count() != self.settings.worker_count() {
            self.pool = CpuPool::new(settings.worker_count())?;
        }
        let table = if settings.palette != self.settings.palette {
            Arc::new(PaletteTable::from_stops(&settings.palette))
        } else {
            Arc::clone(self.mapper.table())
        };
        self.mapper = ColourMapper::new(table, settings.colour_params());
        self.scheduler.set_schedule(settings.schedule());
        if settings.algorithm != self.settings.algorithm {
            self.nav = Navigation::default_for(settings.algorithm);
        }
        if settings.backend != self.settings.backend {
            self.gpu_fallback = None;
        }
        self.settings = settings;
        self.restart()
    }

    /// Resize the canvas, keeping the view centre and zoom.
    pub fn resize(&mut self, width: u32, height: u32) -> crate::Result<()> {
        check_dimensions(width, height)?;
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        self.width = width;
        self.height = height;
        self.surface = RenderBuffer::new(width, height);
        self.restart()
    }

    // -- Results -----------------------------------------------------------

    fn handle_result(&mut self, result: TaskResult) -> bool {
        let ResultOutcome::Accepted {
            follow_up,
            epoch_complete,
        } = self.scheduler.on_task_result(&result)
        else {
            return false;
        };

        self.mapper.paint_band(
            &mut self.surface,
            &result.band,
            &result.values,
            self.params.max_iterations,
        );
        if let Some(dist) = &mut self.distribution {
            dist.fill_band(&result.band, &result.values);
        }
        self.submit(follow_up);

        if epoch_complete {
            self.last_duration = self.scheduler.last_duration();
            if let Some(dist) = &self.distribution {
                let started = Instant::now();
                self.mapper.paint_equalized(&mut self.surface, dist);
                debug!(
                    elapsed_ms = started.elapsed().as_millis(),
                    "Distribution colouring applied"
                );
            }
        }
        true
    }

    /// Process every finished band without blocking. Returns whether the
    /// surface changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Some(result) = self.pool.try_recv() {
            changed |= self.handle_result(result);
        }
        changed
    }

    /// Block until the current epoch completes or `timeout` passes.
    /// Returns `true` if the render is idle.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.poll();
        while self.scheduler.is_rendering() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if let Some(result) = self.pool.recv_timeout((deadline - now).min(WAIT_SLICE)) {
                self.handle_result(result);
                self.poll();
            }
        }
        !self.scheduler.is_rendering()
    }
}

impl std::fmt::Debug for RenderController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderController")
            .field("nav", &self.nav)
            .field("size", &(self.width, self.height))
            .field("epoch", &self.scheduler.epoch())
            .field("label", &self.label)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_finishes_after_workers_close() {
        let settings = Settings {
            workers: 2,
            ..Settings::default()
        };
        let mut controller = RenderController::new(settings, Navigation::default(), 64, 48).unwrap();
        controller.pool.close_workers();
        controller.restart().unwrap();
        assert!(controller.wait_idle(Duration::from_secs(60)));
        assert!(!controller.is_rendering());
        assert!(controller.pool.has_live_workers());
    }
}
