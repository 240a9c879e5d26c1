//! PNG output sink with the view embedded as tEXt chunks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use refract_core::Complex;
use refract_render::{RenderBuffer, RenderController};

use crate::error::AppError;

/// Metadata to embed in an exported PNG.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportMetadata {
    pub algorithm: String,
    /// `@<x>,<y>x<zoom>`, enough to reopen the view.
    pub location: String,
    pub max_iterations: u32,
    pub precision: String,
    pub colour_mode: String,
    pub julia_c: Option<Complex>,
}

impl ExportMetadata {
    pub fn from_controller(controller: &RenderController) -> Self {
        let settings = controller.settings();
        let params = controller.kernel_params();
        Self {
            algorithm: settings.algorithm.name().to_string(),
            location: controller.navigation().to_location_string(),
            max_iterations: params.max_iterations,
            precision: params.precision.label().to_string(),
            colour_mode: format!("{:?}", settings.colour_mode).to_lowercase(),
            julia_c: settings.algorithm.seeds_z().then(|| settings.julia_c()),
        }
    }

    fn description(&self) -> String {
        let mut desc = format!(
            "{} {} ({} iterations)",
            self.algorithm, self.location, self.max_iterations
        );
        if let Some(c) = self.julia_c {
            desc.push_str(&format!(", c = {} {:+}i", c.re, c.im));
        }
        desc
    }

    fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("Refract.Algorithm".into(), self.algorithm.clone()),
            ("Refract.Location".into(), self.location.clone()),
            ("Refract.MaxIterations".into(), self.max_iterations.to_string()),
            ("Refract.Precision".into(), self.precision.clone()),
            ("Refract.ColourMode".into(), self.colour_mode.clone()),
        ];
        if let Some(c) = self.julia_c {
            pairs.push(("Refract.JuliaC".into(), format!("{},{}", c.re, c.im)));
        }
        pairs
    }
}

/// Encode a surface as PNG into any writer.
pub fn write_png<W: Write>(
    writer: W,
    surface: &RenderBuffer,
    metadata: &ExportMetadata,
) -> Result<(), AppError> {
    if surface.width == 0 || surface.height == 0 {
        return Err(AppError::EmptyImage {
            width: surface.width,
            height: surface.height,
        });
    }
    let mut encoder = png::Encoder::new(writer, surface.width, surface.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Default);

    encoder.add_text_chunk("Software".to_string(), "Refract".to_string())?;
    encoder.add_text_chunk("Description".to_string(), metadata.description())?;
    for (key, value) in metadata.pairs() {
        encoder.add_text_chunk(key, value)?;
    }

    let mut png_writer = encoder.write_header()?;
    png_writer.write_image_data(&surface.pixels)?;
    png_writer.finish()?;
    Ok(())
}

/// Write a surface to `path` as PNG.
pub fn export_png(path: &Path, surface: &RenderBuffer, metadata: &ExportMetadata) -> Result<(), AppError> {
    let file = File::create(path).map_err(|source| AppError::WriteImage {
        path: path.to_path_buf(),
        source,
    })?;
    write_png(BufWriter::new(file), surface, metadata)?;
    debug!(
        width = surface.width,
        height = surface.height,
        "Exported PNG to {}",
        path.display()
    );
    Ok(())
}
