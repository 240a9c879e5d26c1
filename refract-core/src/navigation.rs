use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::algorithm::Algorithm;
use crate::error::CoreError;
use crate::viewport::ViewportBounds;

/// Where the camera looks: a centre on the fractal plane and a zoom factor.
///
/// Zoom doubles per zoom step; at zoom 1 the canvas shows
/// [`BASE_SPAN`](crate::viewport::BASE_SPAN) world units vertically.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Navigation {
    pub const MIN_ZOOM: f64 = 1e-3;
    pub const MAX_ZOOM: f64 = 1e290;

    pub fn new(x: f64, y: f64, zoom: f64) -> crate::Result<Self> {
        if !(zoom > 0.0 && zoom.is_finite()) {
            return Err(CoreError::InvalidZoom(zoom));
        }
        Ok(Self {
            x: if x.is_finite() { x } else { 0.0 },
            y: if y.is_finite() { y } else { 0.0 },
            zoom: zoom.clamp(Self::MIN_ZOOM, Self::MAX_ZOOM),
        })
    }

    /// The built-in starting view for an algorithm.
    pub fn default_for(algorithm: Algorithm) -> Self {
        let (x, y) = match algorithm {
            Algorithm::Mandelbrot => (-0.5, 0.0),
            Algorithm::Julia => (0.0, 0.0),
            Algorithm::BurningShip => (-0.4, -0.5),
            Algorithm::Tricorn => (-0.3, 0.0),
            Algorithm::Multibrot3 => (0.0, 0.0),
        };
        Self { x, y, zoom: 1.0 }
    }

    /// Parse a location string, falling back to the algorithm's default view.
    pub fn parse_or_default(input: &str, algorithm: Algorithm) -> Self {
        input.parse().unwrap_or_else(|e| {
            debug!("{e}; using default {} view", algorithm.label());
            Self::default_for(algorithm)
        })
    }

    /// Compact location string `@<x>,<y>x<zoom>`.
    ///
    /// Uses the shortest representation that parses back to the same `f64`.
    pub fn to_location_string(&self) -> String {
        self.to_string()
    }

    pub fn bounds(&self, width: u32, height: u32) -> crate::Result<ViewportBounds> {
        ViewportBounds::new(self, width, height)
    }

    /// World units per pixel on a canvas `height` pixels tall.
    #[inline]
    pub fn scale(&self, height: u32) -> f64 {
        crate::viewport::BASE_SPAN / self.zoom / height.max(1) as f64
    }

    /// Zoom by `factor` keeping the world point under `(px, py)` fixed.
    pub fn zoom_at(&self, width: u32, height: u32, px: f64, py: f64, factor: f64) -> Self {
        let scale = self.scale(height);
        let dx = (px - width as f64 / 2.0) * scale;
        let dy = (py - height as f64 / 2.0) * scale;
        let zoom = (self.zoom * factor).clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
        // The anchor moves from `dx` to `dx / factor` away from the centre.
        let applied = zoom / self.zoom;
        Self {
            x: self.x + dx - dx / applied,
            y: self.y + dy - dy / applied,
            zoom,
        }
    }

    /// Zoom by whole doubling steps (positive = in) around a pixel.
    pub fn zoom_steps(&self, width: u32, height: u32, px: f64, py: f64, steps: i32) -> Self {
        self.zoom_at(width, height, px, py, 2f64.powi(steps))
    }

    /// Frame the pixel rectangle spanned by two corners.
    ///
    /// Degenerate rectangles (zero width or height) return `self`.
    pub fn select_rect(&self, width: u32, height: u32, a: (f64, f64), b: (f64, f64)) -> Self {
        let (left, right) = (a.0.min(b.0), a.0.max(b.0));
        let (top, bottom) = (a.1.min(b.1), a.1.max(b.1));
        if right - left < 1.0 || bottom - top < 1.0 {
            return *self;
        }
        let scale = self.scale(height);
        let cx = (left + right) / 2.0;
        let cy = (top + bottom) / 2.0;
        let fit = (width as f64 / (right - left)).min(height as f64 / (bottom - top));
        Self {
            x: self.x + (cx - width as f64 / 2.0) * scale,
            y: self.y + (cy - height as f64 / 2.0) * scale,
            zoom: (self.zoom * fit).clamp(Self::MIN_ZOOM, Self::MAX_ZOOM),
        }
    }

    /// The view after dragging the content by `(dx, dy)` pixels.
    pub fn panned_by_pixels(&self, height: u32, dx: i32, dy: i32) -> Self {
        let scale = self.scale(height);
        Self {
            x: self.x - dx as f64 * scale,
            y: self.y - dy as f64 * scale,
            zoom: self.zoom,
        }
    }

    /// Whole-pixel displacement of the content when moving from `self` to
    /// `next`, or `None` if the zoom changed.
    pub fn pixel_displacement(&self, next: &Navigation, height: u32) -> Option<(i32, i32)> {
        if self.zoom != next.zoom {
            return None;
        }
        let scale = self.scale(height);
        let dx = ((self.x - next.x) / scale).round();
        let dy = ((self.y - next.y) / scale).round();
        if dx.abs() > i32::MAX as f64 || dy.abs() > i32::MAX as f64 {
            return None;
        }
        Some((dx as i32, dy as i32))
    }
}

impl Default for Navigation {
    fn default() -> Self {
        Self::default_for(Algorithm::default())
    }
}

/// Shortest round-trip digits; exponent form outside a readable range.
fn format_coordinate(v: f64) -> String {
    let a = v.abs();
    if v == 0.0 || (1e-5..1e16).contains(&a) {
        format!("{v}")
    } else {
        format!("{v:e}")
    }
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{},{}x{}",
            format_coordinate(self.x),
            format_coordinate(self.y),
            format_coordinate(self.zoom)
        )
    }
}

impl FromStr for Navigation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason| CoreError::MalformedLocation {
            input: s.to_string(),
            reason,
        };
        let body = s.trim().strip_prefix('@').ok_or_else(|| malformed("missing '@'"))?;
        let (x, rest) = body.split_once(',').ok_or_else(|| malformed("missing ','"))?;
        let (y, zoom) = rest.rsplit_once('x').ok_or_else(|| malformed("missing 'x'"))?;

        let parse = |field: &str, name| {
            field
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| malformed(name))
        };
        let x = parse(x, "bad x coordinate")?;
        let y = parse(y, "bad y coordinate")?;
        let zoom = parse(zoom, "bad zoom")?;
        if zoom <= 0.0 {
            return Err(malformed("zoom must be positive"));
        }
        Navigation::new(x, y, zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn significant_match(a: f64, b: f64) -> bool {
        if a == b {
            return true;
        }
        ((a - b) / a.abs().max(b.abs())).abs() < 1e-15
    }

    #[test]
    fn location_string_roundtrip() {
        let cases = [
            Navigation::new(-0.5, 0.0, 1.0).unwrap(),
            Navigation::new(-0.743643887037151, 0.131825904205330, 2.5e11).unwrap(),
            Navigation::new(1e-7, -3.3e-9, 1e-3).unwrap(),
            Navigation::new(0.1 + 0.2, -1.0 / 3.0, 12345.678).unwrap(),
        ];
        for nav in cases {
            let s = nav.to_location_string();
            let back: Navigation = s.parse().unwrap();
            assert!(significant_match(nav.x, back.x), "{s}");
            assert!(significant_match(nav.y, back.y), "{s}");
            assert!(significant_match(nav.zoom, back.zoom), "{s}");
        }
    }

    #[test]
    fn location_string_format() {
        let nav = Navigation::new(-0.5, 0.25, 4.0).unwrap();
        assert_eq!(nav.to_location_string(), "@-0.5,0.25x4");
    }

    #[test]
    fn malformed_strings_are_rejected() {
        for s in ["", "-0.5,0x1", "@-0.5x1", "@a,0x1", "@0,0x0", "@0,0x-2", "@0,0xinf"] {
            assert!(s.parse::<Navigation>().is_err(), "{s:?} should not parse");
        }
    }

    #[test]
    fn malformed_falls_back_to_default_view() {
        let nav = Navigation::parse_or_default("@garbage", Algorithm::Julia);
        assert_eq!(nav, Navigation::default_for(Algorithm::Julia));
    }

    #[test]
    fn exponent_coordinates_parse() {
        let nav: Navigation = "@-1.5e-3,2E-2x1e30".parse().unwrap();
        assert_eq!(nav.x, -1.5e-3);
        assert_eq!(nav.y, 2e-2);
        assert_eq!(nav.zoom, 1e30);
    }

    #[test]
    fn zoom_at_keeps_anchor_fixed() {
        let nav = Navigation::new(-0.5, 0.0, 1.0).unwrap();
        let (w, h) = (800, 600);
        let before = nav.bounds(w, h).unwrap().pixel_to_world(100.0, 50.0);
        let zoomed = nav.zoom_steps(w, h, 100.0, 50.0, 3);
        let after = zoomed.bounds(w, h).unwrap().pixel_to_world(100.0, 50.0);
        assert!((zoomed.zoom - 8.0).abs() < 1e-12);
        assert!((before.re - after.re).abs() < 1e-12);
        assert!((before.im - after.im).abs() < 1e-12);
    }

    #[test]
    fn select_rect_frames_region() {
        let nav = Navigation::new(0.0, 0.0, 1.0).unwrap();
        let sel = nav.select_rect(800, 600, (400.0, 300.0), (600.0, 450.0));
        assert!((sel.zoom - 4.0).abs() < 1e-12);
        let b = nav.bounds(800, 600).unwrap();
        let mid = b.pixel_to_world(500.0, 375.0);
        assert!((sel.x - mid.re).abs() < 1e-12);
        assert!((sel.y - mid.im).abs() < 1e-12);
    }

    #[test]
    fn degenerate_selection_is_ignored() {
        let nav = Navigation::default();
        assert_eq!(nav.select_rect(800, 600, (10.0, 10.0), (10.5, 300.0)), nav);
    }

    #[test]
    fn pan_displacement_inverts_panning() {
        let nav = Navigation::new(-0.5, 0.0, 3.0).unwrap();
        let moved = nav.panned_by_pixels(600, 37, -12);
        assert_eq!(nav.pixel_displacement(&moved, 600), Some((37, -12)));
        let zoomed = Navigation { zoom: 6.0, ..moved };
        assert_eq!(nav.pixel_displacement(&zoomed, 600), None);
    }

    #[test]
    fn invalid_zoom_is_rejected() {
        assert!(Navigation::new(0.0, 0.0, 0.0).is_err());
        assert!(Navigation::new(0.0, 0.0, f64::NAN).is_err());
        assert_eq!(Navigation::new(0.0, 0.0, 1e-9).unwrap().zoom, Navigation::MIN_ZOOM);
    }
}
