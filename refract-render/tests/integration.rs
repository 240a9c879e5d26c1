use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use refract_core::{iterate_point, Algorithm, KernelParams, Navigation, Precision, PrecisionMode};
use refract_render::palette::PaletteStop;
use refract_render::{
    BackendKind, ColourMode, FrameShader, GpuFrame, InteractionMode, Rect, RenderController,
    RenderError, Settings,
};

const TIMEOUT: Duration = Duration::from_secs(120);

fn settings() -> Settings {
    Settings {
        workers: 2,
        ..Settings::default()
    }
}

fn gray_settings(mode: ColourMode) -> Settings {
    Settings {
        colour_mode: mode,
        smoothing: false,
        palette: vec![
            PaletteStop::new(0.0, [0, 0, 0]),
            PaletteStop::new(1.0, [255, 255, 255]),
        ],
        ..settings()
    }
}

fn coverage(rects: impl Iterator<Item = Rect>, width: u32, height: u32) -> Vec<u8> {
    let mut covered = vec![0u8; (width * height) as usize];
    for r in rects {
        for py in r.y..r.y + r.height {
            for px in r.x..r.x + r.width {
                covered[(py * width + px) as usize] += 1;
            }
        }
    }
    covered
}

fn assert_tiles_cover(controller: &RenderController) {
    let (w, h) = controller.size();
    let cov = coverage(controller.scheduler().tiles().map(|t| t.rect), w, h);
    assert!(cov.iter().all(|&c| c == 1), "tiles must cover the canvas exactly once");
}

#[test]
fn default_view_centre_is_interior() {
    let nav = Navigation::new(-0.5, 0.0, 1.0).unwrap();
    let settings = Settings {
        max_iterations: 256,
        ..settings()
    };
    let mut controller = RenderController::new(settings, nav, 800, 600).unwrap();

    let bounds = nav.bounds(800, 600).unwrap();
    let centre = bounds.pixel_to_world(400.0, 300.0);
    assert!((centre.re + 0.5).abs() < 1e-12);
    assert!(centre.im.abs() < 1e-12);
    let params = KernelParams {
        max_iterations: 256,
        ..KernelParams::default()
    };
    assert_eq!(iterate_point(&params, centre), 256.0);

    assert!(controller.wait_idle(TIMEOUT), "render should finish");
    let status = controller.status();
    assert!(!status.rendering);
    assert!(status.last_duration.is_some());
    assert_eq!(status.effective_max_iterations, 256);
    assert_eq!(status.precision, Precision::Float);
    assert!(!status.precision_limited);
    assert_eq!(status.surface.pixel(400, 300), [0, 0, 0, 255]);
    // Far corner escapes immediately and is coloured.
    assert_ne!(status.surface.pixel(0, 0), [0, 0, 0, 255]);
}

#[test]
fn superseded_epoch_does_not_change_the_image() {
    let nav = Navigation::default();
    let mut reference = RenderController::new(settings(), nav, 160, 120).unwrap();
    assert!(reference.wait_idle(TIMEOUT));

    let mut controller = RenderController::new(settings(), nav, 160, 120).unwrap();
    let first = controller.epoch();
    // Supersede the first epoch before a single result was processed.
    controller.restart().unwrap();
    assert_eq!(controller.epoch(), first + 1);
    assert!(controller.wait_idle(TIMEOUT));
    assert_eq!(controller.epoch(), first + 1);

    assert_eq!(controller.surface(), reference.surface());
}

#[test]
fn pan_and_reverse_pan_keep_canvas_covered() {
    let nav = Navigation::default();
    let mut controller = RenderController::new(settings(), nav, 200, 150).unwrap();
    assert!(controller.wait_idle(TIMEOUT));
    let before = controller.epoch();

    controller.pan_by_pixels(37, -21).unwrap();
    assert_eq!(controller.epoch(), before + 1);
    assert_tiles_cover(&controller);
    assert!(controller.scheduler().tiles().all(|t| t.stage == 0));

    controller.pan_by_pixels(-37, 21).unwrap();
    assert_tiles_cover(&controller);
    assert!(controller.wait_idle(TIMEOUT));

    let back = controller.navigation();
    assert!((back.x - nav.x).abs() < 1e-12);
    assert!((back.y - nav.y).abs() < 1e-12);
    assert_eq!(back.zoom, nav.zoom);
}

#[test]
fn pan_reuses_existing_tiles() {
    let mut controller = RenderController::new(settings(), Navigation::default(), 256, 192).unwrap();
    assert!(controller.wait_idle(TIMEOUT));
    let before: HashSet<u64> = controller.scheduler().tiles().map(|t| t.id).collect();

    controller.pan_by_pixels(10, 0).unwrap();
    let after: HashSet<u64> = controller.scheduler().tiles().map(|t| t.id).collect();
    assert!(before.intersection(&after).count() > 0, "shifted tiles keep their ids");
    assert!(after.difference(&before).count() > 0, "exposed strip gets new tiles");
}

#[test]
fn identical_navigation_is_a_no_op() {
    let mut controller = RenderController::new(settings(), Navigation::default(), 100, 100).unwrap();
    let epoch = controller.epoch();
    let nav = *controller.navigation();
    controller.set_navigation(nav).unwrap();
    assert_eq!(controller.epoch(), epoch);
    assert_eq!(*controller.navigation(), nav);
}

#[test]
fn sub_pixel_move_regenerates_at_exact_view() {
    let mut controller = RenderController::new(settings(), Navigation::default(), 100, 100).unwrap();
    let epoch = controller.epoch();
    let nav = *controller.navigation();
    let scale = nav.scale(100);
    let next = Navigation {
        x: nav.x + scale * 0.3,
        ..nav
    };
    controller.set_navigation(next).unwrap();
    assert_eq!(controller.epoch(), epoch + 1);
    assert_eq!(*controller.navigation(), next);
    assert!(controller.wait_idle(TIMEOUT));
}

#[test]
fn fractional_pan_is_not_snapped() {
    let mut controller = RenderController::new(settings(), Navigation::default(), 100, 100).unwrap();
    assert!(controller.wait_idle(TIMEOUT));
    let nav = *controller.navigation();
    let scale = nav.scale(100);
    let next = Navigation {
        x: nav.x - scale * 4.5,
        ..nav
    };
    controller.set_navigation(next).unwrap();
    assert_eq!(*controller.navigation(), next);
    assert!(controller.wait_idle(TIMEOUT));
}

#[test]
fn zoom_and_select_regenerate() {
    let mut controller = RenderController::new(settings(), Navigation::default(), 120, 90).unwrap();
    let epoch = controller.epoch();
    let zoom = controller.navigation().zoom;

    controller.zoom_steps(60.0, 45.0, 1).unwrap();
    assert_eq!(controller.epoch(), epoch + 1);
    assert_eq!(controller.navigation().zoom, zoom * 2.0);

    controller.select_rect((30.0, 20.0), (60.0, 50.0)).unwrap();
    assert_eq!(controller.epoch(), epoch + 2);
    assert!(controller.navigation().zoom > zoom * 2.0);

    // Degenerate rectangles change nothing.
    controller.select_rect((5.0, 5.0), (5.0, 40.0)).unwrap();
    assert_eq!(controller.epoch(), epoch + 2);

    controller.reset_view().unwrap();
    assert_eq!(*controller.navigation(), Navigation::default_for(Algorithm::Mandelbrot));
    assert_eq!(controller.epoch(), epoch + 3);
}

#[test]
fn drag_pans_or_selects_by_mode() {
    let mut controller = RenderController::new(settings(), Navigation::default(), 100, 80).unwrap();
    let start = *controller.navigation();
    let scale = start.scale(80);

    controller.begin_drag(50.0, 40.0);
    controller.drag_to(55.4, 36.4).unwrap();
    controller.end_drag(55.4, 36.4).unwrap();
    let panned = *controller.navigation();
    assert!((panned.x - (start.x - 5.0 * scale)).abs() < 1e-12);
    assert!((panned.y - (start.y + 4.0 * scale)).abs() < 1e-12);

    controller.set_interaction_mode(InteractionMode::Select);
    controller.begin_drag(10.0, 10.0);
    controller.drag_to(40.0, 30.0).unwrap();
    assert_eq!(*controller.navigation(), panned, "select only acts on release");
    controller.end_drag(40.0, 30.0).unwrap();
    assert!(controller.navigation().zoom > panned.zoom);
}

#[test]
fn distribution_mode_spreads_colours() {
    let nav = Navigation::default();
    let mean_brightness = |mode: ColourMode| {
        let mut controller = RenderController::new(gray_settings(mode), nav, 200, 150).unwrap();
        assert!(controller.wait_idle(TIMEOUT));
        let params = *controller.kernel_params();
        let bounds = nav.bounds(200, 150).unwrap();
        let surface = controller.surface();
        let mut sum = 0.0;
        let mut count = 0.0;
        for y in 0..150 {
            for x in 0..200 {
                let v = iterate_point(&params, bounds.pixel_to_world(x as f64, y as f64));
                if v < params.max_iterations as f32 {
                    sum += surface.pixel(x, y)[0] as f64 / 255.0;
                    count += 1.0;
                }
            }
        }
        sum / count
    };

    let normalized = mean_brightness(ColourMode::Normalize);
    let equalized = mean_brightness(ColourMode::Distribution);
    assert!(normalized < 0.2, "normalize is dominated by fast escapes: {normalized}");
    assert!(
        (0.25..0.75).contains(&equalized),
        "equalization should centre the palette: {equalized}"
    );
}

#[test]
fn explicit_precision_raises_limit_flag() {
    let nav = Navigation::new(-0.75, 0.1, 1e15).unwrap();
    let base = Settings {
        max_iterations: 32,
        auto_max_iterations: false,
        ..settings()
    };

    let float = RenderController::new(
        Settings {
            precision: PrecisionMode::Float,
            ..base.clone()
        },
        nav,
        64,
        64,
    )
    .unwrap();
    assert!(float.status().precision_limited);
    assert_eq!(float.status().precision, Precision::Float);

    let auto = RenderController::new(base, nav, 64, 64).unwrap();
    assert!(!auto.status().precision_limited);
    assert_eq!(auto.status().precision, Precision::DoubleDouble);
}

#[test]
fn auto_iterations_follow_zoom() {
    let nav = Navigation::new(-0.75, 0.1, 1024.0).unwrap();
    let controller = RenderController::new(settings(), nav, 32, 32).unwrap();
    assert_eq!(controller.status().effective_max_iterations, 256 + 300);
}

#[test]
fn algorithm_change_resets_view() {
    let mut controller = RenderController::new(settings(), Navigation::default(), 64, 48).unwrap();
    controller.zoom_steps(10.0, 10.0, 3).unwrap();
    controller
        .apply_settings(Settings {
            algorithm: Algorithm::BurningShip,
            ..settings()
        })
        .unwrap();
    assert_eq!(
        *controller.navigation(),
        Navigation::default_for(Algorithm::BurningShip)
    );
    assert_eq!(controller.kernel_params().algorithm, Algorithm::BurningShip);
    assert!(controller.wait_idle(TIMEOUT));
}

#[test]
fn resize_rebuilds_surface_and_grid() {
    let mut controller = RenderController::new(settings(), Navigation::default(), 64, 48).unwrap();
    controller.resize(130, 70).unwrap();
    assert_eq!(controller.surface().width, 130);
    assert_eq!(controller.surface().pixels.len(), 130 * 70 * 4);
    assert_tiles_cover(&controller);
    assert!(matches!(
        controller.resize(0, 10),
        Err(RenderError::InvalidDimensions { .. })
    ));
}

// ---------------------------------------------------------------------------
// GPU backend selection with stand-in devices
// ---------------------------------------------------------------------------

struct BrokenShader;

impl FrameShader for BrokenShader {
    fn compile(&mut self, _source: &str) -> refract_render::Result<()> {
        Err(RenderError::ShaderCompile("unsupported".into()))
    }

    fn draw(&mut self, _frame: &GpuFrame<'_>) -> refract_render::Result<Vec<u8>> {
        unreachable!("draw after failed compile")
    }
}

struct SolidShader {
    compiles: Arc<AtomicUsize>,
}

impl FrameShader for SolidShader {
    fn compile(&mut self, source: &str) -> refract_render::Result<()> {
        assert!(source.contains("@compute"));
        self.compiles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn draw(&mut self, frame: &GpuFrame<'_>) -> refract_render::Result<Vec<u8>> {
        let u = frame.uniforms;
        assert_eq!(u.palette_len as usize, frame.palette.len());
        Ok([1, 2, 3, 255].repeat(u.width as usize * u.height as usize))
    }
}

fn gpu_settings() -> Settings {
    Settings {
        backend: BackendKind::Gpu,
        ..settings()
    }
}

#[test]
fn gpu_failure_falls_back_to_cpu() {
    let mut controller = RenderController::new(gpu_settings(), Navigation::default(), 64, 48)
        .unwrap()
        .with_gpu(Box::new(BrokenShader))
        .unwrap();
    assert!(controller.status().label.contains("GPU unavailable"));
    assert!(controller.is_rendering());
    assert!(controller.wait_idle(TIMEOUT));
}

#[test]
fn gpu_renders_full_frame_and_caches_variant() {
    let compiles = Arc::new(AtomicUsize::new(0));
    let shader = SolidShader {
        compiles: Arc::clone(&compiles),
    };
    let mut controller = RenderController::new(gpu_settings(), Navigation::default(), 40, 30)
        .unwrap()
        .with_gpu(Box::new(shader))
        .unwrap();

    let status = controller.status();
    assert!(status.label.starts_with("GPU"));
    assert!(!status.rendering);
    assert!(status.surface.pixels.chunks(4).all(|p| p == [1, 2, 3, 255]));
    assert_eq!(controller.scheduler().tiles().count(), 0);
    assert_eq!(compiles.load(Ordering::SeqCst), 1);

    // Same variant: no recompile.
    controller.pan_by_pixels(3, 3).unwrap();
    assert_eq!(compiles.load(Ordering::SeqCst), 1);

    controller
        .apply_settings(Settings {
            algorithm: Algorithm::Tricorn,
            ..gpu_settings()
        })
        .unwrap();
    assert_eq!(compiles.load(Ordering::SeqCst), 2);
}

#[test]
fn distribution_mode_never_uses_gpu() {
    let compiles = Arc::new(AtomicUsize::new(0));
    let settings = Settings {
        colour_mode: ColourMode::Distribution,
        ..gpu_settings()
    };
    let mut controller = RenderController::new(settings, Navigation::default(), 40, 30)
        .unwrap()
        .with_gpu(Box::new(SolidShader {
            compiles: Arc::clone(&compiles),
        }))
        .unwrap();
    assert!(controller.status().label.starts_with("CPU"));
    assert_eq!(compiles.load(Ordering::SeqCst), 0);
    assert!(controller.wait_idle(TIMEOUT));
}
