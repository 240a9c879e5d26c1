use crate::complex::Complex;
use crate::double_double::DoubleDouble;
use crate::error::CoreError;
use crate::navigation::Navigation;

/// Vertical span of the fractal plane visible at zoom 1.
pub const BASE_SPAN: f64 = 3.0;

/// The world-space rectangle covered by a canvas.
///
/// Pixel `(px, py)` maps to `(x0 + px·x_scale, y0 + py·y_scale)`: world y
/// grows downward with the pixel rows. The top-left corner is also kept as
/// an exact double-double so extended-precision kernels can rebuild seeds
/// whose offsets fall below the centre's last `f64` place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportBounds {
    pub x0: f64,
    pub y0: f64,
    /// World units per pixel, horizontally.
    pub x_scale: f64,
    /// World units per pixel, vertically.
    pub y_scale: f64,
    x0_lo: f64,
    y0_lo: f64,
}

impl ViewportBounds {
    /// Derive the bounds of `nav` on a `width × height` canvas.
    pub fn new(nav: &Navigation, width: u32, height: u32) -> crate::Result<Self> {
        if width == 0 || height == 0 {
            return Err(CoreError::InvalidCanvas { width, height });
        }
        if !(nav.zoom > 0.0 && nav.zoom.is_finite()) {
            return Err(CoreError::InvalidZoom(nav.zoom));
        }
        let aspect = width as f64 / height as f64;
        let span_y = BASE_SPAN / nav.zoom;
        let span_x = span_y * aspect;
        let x_scale = span_x / width as f64;
        let y_scale = span_y / height as f64;

        let corner_x = DoubleDouble::sum(nav.x, -span_x / 2.0);
        let corner_y = DoubleDouble::sum(nav.y, -span_y / 2.0);

        Ok(Self {
            x0: corner_x.hi,
            y0: corner_y.hi,
            x_scale,
            y_scale,
            x0_lo: corner_x.lo,
            y0_lo: corner_y.lo,
        })
    }

    /// Top-left corner at full double-double precision.
    #[inline]
    pub fn origin(&self) -> (DoubleDouble, DoubleDouble) {
        (
            DoubleDouble {
                hi: self.x0,
                lo: self.x0_lo,
            },
            DoubleDouble {
                hi: self.y0,
                lo: self.y0_lo,
            },
        )
    }

    /// World coordinate of a pixel's top-left corner.
    #[inline]
    pub fn pixel_to_world(&self, px: f64, py: f64) -> Complex {
        Complex::new(
            self.x0 + self.x0_lo + px * self.x_scale,
            self.y0 + self.y0_lo + py * self.y_scale,
        )
    }

    /// The smaller of the two per-pixel steps.
    #[inline]
    pub fn step(&self) -> f64 {
        self.x_scale.min(self.y_scale)
    }

    /// Largest absolute corner coordinate, for the scaled epsilon test.
    pub fn magnitude(&self, width: u32, height: u32) -> f64 {
        let x1 = self.x0 + self.x_scale * width as f64;
        let y1 = self.y0 + self.y_scale * height as f64;
        self.x0.abs().max(x1.abs()).max(self.y0.abs()).max(y1.abs())
    }

    /// Same region, described from a canvas shifted by whole pixels.
    ///
    /// `dx > 0` means the content moved right, so the new corner lies
    /// `dx` pixels further left in world space.
    pub fn shifted(&self, dx: i32, dy: i32) -> Self {
        let corner_x = DoubleDouble {
            hi: self.x0,
            lo: self.x0_lo,
        } + DoubleDouble::from(-(dx as f64) * self.x_scale);
        let corner_y = DoubleDouble {
            hi: self.y0,
            lo: self.y0_lo,
        } + DoubleDouble::from(-(dy as f64) * self.y_scale);
        Self {
            x0: corner_x.hi,
            y0: corner_y.hi,
            x0_lo: corner_x.lo,
            y0_lo: corner_y.lo,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    #[test]
    fn centre_pixel_maps_to_navigation_centre() {
        let nav = Navigation::new(-0.5, 0.0, 1.0).unwrap();
        let b = ViewportBounds::new(&nav, 800, 600).unwrap();
        let c = b.pixel_to_world(400.0, 300.0);
        assert!((c.re + 0.5).abs() < EPSILON);
        assert!(c.im.abs() < EPSILON);
    }

    #[test]
    fn square_pixels() {
        let nav = Navigation::new(0.3, -0.2, 7.5).unwrap();
        let b = ViewportBounds::new(&nav, 1280, 720).unwrap();
        assert!((b.x_scale - b.y_scale).abs() < 1e-18);
        assert!((b.y_scale * 720.0 - BASE_SPAN / 7.5).abs() < EPSILON);
    }

    #[test]
    fn corners_are_ordered() {
        for (w, h) in [(1, 1), (800, 600), (3, 2000)] {
            for zoom in [1e-3, 1.0, 1e12, 1e40] {
                let nav = Navigation::new(-1.25, 0.01, zoom).unwrap();
                let b = ViewportBounds::new(&nav, w, h).unwrap();
                assert!(b.x_scale > 0.0 && b.y_scale > 0.0);
                let (ox, oy) = b.origin();
                assert!(ox < ox + DoubleDouble::from(b.x_scale * w as f64));
                assert!(oy < oy + DoubleDouble::from(b.y_scale * h as f64));
            }
        }
    }

    #[test]
    fn origin_keeps_sub_ulp_offset() {
        // At zoom 1e20 the half span is far below one ulp of -0.75.
        let nav = Navigation::new(-0.75, 0.0, 1e20).unwrap();
        let b = ViewportBounds::new(&nav, 100, 100).unwrap();
        let (ox, _) = b.origin();
        let offset = ox - DoubleDouble::from(-0.75);
        assert!((offset.to_f64() + BASE_SPAN / 1e20 / 2.0).abs() < 1e-35);
    }

    #[test]
    fn rejects_empty_canvas() {
        let nav = Navigation::default();
        assert!(ViewportBounds::new(&nav, 0, 10).is_err());
        assert!(ViewportBounds::new(&nav, 10, 0).is_err());
    }

    #[test]
    fn shifted_moves_corner_against_content() {
        let nav = Navigation::new(0.0, 0.0, 1.0).unwrap();
        let b = ViewportBounds::new(&nav, 100, 100).unwrap();
        let s = b.shifted(10, -5);
        assert!((s.x0 - (b.x0 - 10.0 * b.x_scale)).abs() < EPSILON);
        assert!((s.y0 - (b.y0 + 5.0 * b.y_scale)).abs() < EPSILON);
    }
}
