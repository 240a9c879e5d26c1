mod config;
mod error;
mod export;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{debug, error, info, warn};

use refract_core::Navigation;
use refract_render::{BackendKind, RenderController};

use crate::error::AppError;
use crate::export::{export_png, ExportMetadata};

/// How often progress is logged while waiting for a frame.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Render a fractal view progressively and write the finished frame as PNG.
#[derive(Debug, Parser)]
#[command(name = "refract", version)]
struct Args {
    /// View to render, as `@<x>,<y>x<zoom>`. Falls back to the algorithm's
    /// default view when missing or malformed.
    location: Option<String>,

    /// JSON settings file; missing fields take their defaults.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Output PNG path.
    #[arg(short, long, default_value = "refract.png")]
    output: PathBuf,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Builtin palette to use instead of the configured stops.
    #[arg(short, long)]
    palette: Option<String>,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = 600)]
    timeout: u64,

    /// Write the effective settings to this path and exit.
    #[arg(long)]
    dump_settings: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("refract: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), AppError> {
    info!("Starting Refract");

    let mut settings = config::settings_or_default(args.settings.as_deref())?;
    if let Some(name) = &args.palette {
        config::apply_palette(&mut settings, name)?;
    }
    if let Some(path) = &args.dump_settings {
        config::save_settings(path, &settings)?;
        info!("Wrote settings to {}", path.display());
        return Ok(());
    }

    let nav = match &args.location {
        Some(location) => Navigation::parse_or_default(location, settings.algorithm),
        None => Navigation::default_for(settings.algorithm),
    };
    info!(
        algorithm = settings.algorithm.label(),
        location = %nav.to_location_string(),
        width = args.width,
        height = args.height,
        "Rendering"
    );

    let controller = RenderController::new(settings, nav, args.width, args.height)?;
    let mut controller = attach_gpu(controller)?;
    wait_for_frame(&mut controller, Duration::from_secs(args.timeout))?;

    let status = controller.status();
    info!(
        elapsed_ms = status.last_duration.map(|d| d.as_millis()),
        max_iterations = status.effective_max_iterations,
        precision = status.precision.label(),
        backend = status.label,
        "Frame complete"
    );
    if status.precision_limited {
        warn!("Image is limited by numeric precision; try a finer precision mode");
    }

    export_png(
        &args.output,
        status.surface,
        &ExportMetadata::from_controller(&controller),
    )?;
    info!("Wrote {}", args.output.display());
    Ok(())
}

/// Poll the controller until the epoch completes, logging progress.
fn wait_for_frame(controller: &mut RenderController, timeout: Duration) -> Result<(), AppError> {
    let started = Instant::now();
    loop {
        if controller.wait_idle(PROGRESS_INTERVAL) {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(AppError::Timeout(timeout.as_secs()));
        }
        let scheduler = controller.scheduler();
        let stages = scheduler.schedule().len();
        let tiles = scheduler.tiles().count();
        let done = scheduler.tiles().filter(|t| t.is_done(stages)).count();
        debug!(
            epoch = scheduler.epoch(),
            done,
            tiles,
            pending_bands = scheduler.pending_bands(),
            "Rendering"
        );
    }
}

#[cfg(feature = "gpu")]
fn attach_gpu(controller: RenderController) -> Result<RenderController, AppError> {
    if controller.settings().backend != BackendKind::Gpu {
        return Ok(controller);
    }
    match refract_render::WgpuShader::new() {
        Ok(shader) => Ok(controller.with_gpu(Box::new(shader))?),
        Err(e) => {
            warn!("GPU backend requested but unavailable, using CPU tiling: {e}");
            Ok(controller)
        }
    }
}

#[cfg(not(feature = "gpu"))]
fn attach_gpu(controller: RenderController) -> Result<RenderController, AppError> {
    if controller.settings().backend == BackendKind::Gpu {
        warn!("Built without the `gpu` feature; using CPU tiling");
    }
    Ok(controller)
}
