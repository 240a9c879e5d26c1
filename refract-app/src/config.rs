use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use refract_render::{builtin_palette, builtin_palettes, Settings};

use crate::error::AppError;

/// Read settings from a JSON file. Missing fields take their defaults and
/// out-of-range values are clamped.
pub fn load_settings(path: &Path) -> Result<Settings, AppError> {
    let json = fs::read_to_string(path).map_err(|source| AppError::ReadSettings {
        path: path.to_path_buf(),
        source,
    })?;
    let settings: Settings =
        serde_json::from_str(&json).map_err(|source| AppError::ParseSettings {
            path: path.to_path_buf(),
            source,
        })?;
    info!("Loaded settings from {}", path.display());
    Ok(settings.sanitized())
}

/// Settings from `path` when given, otherwise the defaults.
pub fn settings_or_default(path: Option<&Path>) -> Result<Settings, AppError> {
    match path {
        Some(path) => load_settings(path),
        None => {
            debug!("No settings file given; using defaults");
            Ok(Settings::default())
        }
    }
}

/// Replace the palette stops with a builtin palette.
pub fn apply_palette(settings: &mut Settings, name: &str) -> Result<(), AppError> {
    let stops = builtin_palette(name).ok_or_else(|| AppError::UnknownPalette {
        name: name.to_string(),
        known: builtin_palettes()
            .into_iter()
            .map(|(n, _)| n)
            .collect::<Vec<_>>()
            .join(", "),
    })?;
    settings.palette = stops;
    Ok(())
}

/// Write `settings` as pretty JSON, creating parent directories.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), AppError> {
    let write_err = |source| AppError::WriteSettings {
        path: PathBuf::from(path),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(AppError::SerializeSettings)?;
    fs::write(path, json).map_err(write_err)?;
    debug!("Saved settings to {}", path.display());
    Ok(())
}
