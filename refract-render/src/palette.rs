use serde::{Deserialize, Serialize};

/// Number of entries in a generated palette table.
pub const TABLE_SIZE: usize = 1024;

// ---------------------------------------------------------------------------
// Stops
// ---------------------------------------------------------------------------

/// A colour pinned at a position in `[0, 1]` along the palette.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaletteStop {
    pub position: f64,
    pub color: [u8; 3],
}

impl PaletteStop {
    pub const fn new(position: f64, color: [u8; 3]) -> Self {
        Self { position, color }
    }
}

/// Sort stops, clamp positions into `[0, 1]` and drop non-finite ones.
///
/// Of several stops at the same position only the last is kept.
pub fn sanitize_stops(stops: &[PaletteStop]) -> Vec<PaletteStop> {
    let mut out: Vec<PaletteStop> = stops
        .iter()
        .filter(|s| s.position.is_finite())
        .map(|s| PaletteStop::new(s.position.clamp(0.0, 1.0), s.color))
        .collect();
    out.sort_by(|a, b| a.position.total_cmp(&b.position));
    out.dedup_by(|later, earlier| {
        if later.position == earlier.position {
            earlier.color = later.color;
            true
        } else {
            false
        }
    });
    out
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// RGB lookup table generated from palette stops.
///
/// Entry `i` holds the spline value at position `i / (len - 1)`. Tables are
/// rebuilt only when the stops change and are shared read-only behind an
/// `Arc` between the colour mapper and the GPU upload.
#[derive(Debug, Clone, PartialEq)]
pub struct PaletteTable {
    entries: Vec<[u8; 3]>,
}

impl PaletteTable {
    pub fn from_stops(stops: &[PaletteStop]) -> Self {
        Self::with_size(stops, TABLE_SIZE)
    }

    pub fn with_size(stops: &[PaletteStop], size: usize) -> Self {
        let size = size.max(2);
        let stops = sanitize_stops(stops);
        let entries = match stops.len() {
            0 => {
                let fallback = default_stops();
                return Self::with_size(&fallback, size);
            }
            1 => vec![stops[0].color; size],
            _ => {
                let xs: Vec<f64> = stops.iter().map(|s| s.position).collect();
                let channels: [MonotoneSpline; 3] = std::array::from_fn(|c| {
                    let ys: Vec<f64> = stops.iter().map(|s| s.color[c] as f64).collect();
                    MonotoneSpline::new(&xs, &ys)
                });
                (0..size)
                    .map(|i| {
                        let t = i as f64 / (size - 1) as f64;
                        std::array::from_fn(|c| channels[c].eval(t).round().clamp(0.0, 255.0) as u8)
                    })
                    .collect()
            }
        };
        Self { entries }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> [u8; 3] {
        self.entries[index.min(self.entries.len() - 1)]
    }

    pub fn entries(&self) -> &[[u8; 3]] {
        &self.entries
    }

    /// Entries packed as little-endian `0x00BBGGRR` words for GPU upload.
    pub fn packed(&self) -> Vec<u32> {
        self.entries
            .iter()
            .map(|&[r, g, b]| r as u32 | (g as u32) << 8 | (b as u32) << 16)
            .collect()
    }
}

impl Default for PaletteTable {
    fn default() -> Self {
        Self::from_stops(&default_stops())
    }
}

// ---------------------------------------------------------------------------
// Monotone cubic interpolation
// ---------------------------------------------------------------------------

/// Fritsch–Carlson monotone cubic Hermite spline.
///
/// Between two stops the curve never leaves the range of their values, so
/// channels never overshoot into clipped colours.
struct MonotoneSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    tangents: Vec<f64>,
}

impl MonotoneSpline {
    fn new(xs: &[f64], ys: &[f64]) -> Self {
        let n = xs.len();
        debug_assert!(n >= 2 && ys.len() == n);

        let secants: Vec<f64> = (0..n - 1)
            .map(|k| (ys[k + 1] - ys[k]) / (xs[k + 1] - xs[k]))
            .collect();

        let mut m = vec![0.0; n];
        m[0] = secants[0];
        m[n - 1] = secants[n - 2];
        for k in 1..n - 1 {
            m[k] = if secants[k - 1] * secants[k] <= 0.0 {
                0.0
            } else {
                (secants[k - 1] + secants[k]) / 2.0
            };
        }

        for k in 0..n - 1 {
            let d = secants[k];
            if d == 0.0 {
                m[k] = 0.0;
                m[k + 1] = 0.0;
                continue;
            }
            let a = m[k] / d;
            let b = m[k + 1] / d;
            let s = a * a + b * b;
            if s > 9.0 {
                let tau = 3.0 / s.sqrt();
                m[k] = tau * a * d;
                m[k + 1] = tau * b * d;
            }
        }

        Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            tangents: m,
        }
    }

    fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[n - 1] {
            return self.ys[n - 1];
        }
        let k = self.xs.partition_point(|&xk| xk <= x).saturating_sub(1).min(n - 2);
        let h = self.xs[k + 1] - self.xs[k];
        let t = (x - self.xs[k]) / h;
        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        h00 * self.ys[k]
            + h10 * h * self.tangents[k]
            + h01 * self.ys[k + 1]
            + h11 * h * self.tangents[k + 1]
    }
}

// ---------------------------------------------------------------------------
// Builtin palettes
// ---------------------------------------------------------------------------

pub fn default_stops() -> Vec<PaletteStop> {
    classic()
}

/// Named stop sets shipped with the renderer.
pub fn builtin_palettes() -> Vec<(&'static str, Vec<PaletteStop>)> {
    vec![
        ("classic", classic()),
        ("fire", fire()),
        ("ocean", ocean()),
        ("neon", neon()),
        ("grayscale", grayscale()),
    ]
}

/// Look up a builtin palette by name (case-insensitive).
pub fn builtin_palette(name: &str) -> Option<Vec<PaletteStop>> {
    builtin_palettes()
        .into_iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, stops)| stops)
}

fn classic() -> Vec<PaletteStop> {
    vec![
        PaletteStop::new(0.0, [0, 7, 100]),
        PaletteStop::new(0.16, [32, 107, 203]),
        PaletteStop::new(0.42, [237, 255, 255]),
        PaletteStop::new(0.6425, [255, 170, 0]),
        PaletteStop::new(0.8575, [0, 2, 0]),
        PaletteStop::new(1.0, [0, 7, 100]),
    ]
}

fn fire() -> Vec<PaletteStop> {
    vec![
        PaletteStop::new(0.0, [0, 0, 0]),
        PaletteStop::new(0.25, [128, 0, 0]),
        PaletteStop::new(0.5, [255, 128, 0]),
        PaletteStop::new(0.75, [255, 255, 0]),
        PaletteStop::new(1.0, [255, 255, 255]),
    ]
}

fn ocean() -> Vec<PaletteStop> {
    vec![
        PaletteStop::new(0.0, [0, 0, 30]),
        PaletteStop::new(0.3, [0, 50, 120]),
        PaletteStop::new(0.6, [0, 150, 200]),
        PaletteStop::new(0.8, [100, 220, 255]),
        PaletteStop::new(1.0, [240, 255, 255]),
    ]
}

fn neon() -> Vec<PaletteStop> {
    vec![
        PaletteStop::new(0.0, [10, 0, 20]),
        PaletteStop::new(0.2, [80, 0, 150]),
        PaletteStop::new(0.4, [200, 0, 200]),
        PaletteStop::new(0.6, [0, 200, 255]),
        PaletteStop::new(0.8, [0, 255, 100]),
        PaletteStop::new(1.0, [10, 0, 20]),
    ]
}

fn grayscale() -> Vec<PaletteStop> {
    vec![
        PaletteStop::new(0.0, [0, 0, 0]),
        PaletteStop::new(1.0, [255, 255, 255]),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_hits_stops_exactly() {
        let table = PaletteTable::with_size(&grayscale(), 256);
        assert_eq!(table.len(), 256);
        assert_eq!(table.get(0), [0, 0, 0]);
        assert_eq!(table.get(255), [255, 255, 255]);
    }

    #[test]
    fn two_stops_interpolate_linearly() {
        let table = PaletteTable::with_size(&grayscale(), 256);
        for (i, entry) in table.entries().iter().enumerate() {
            assert_eq!(entry[0] as usize, i);
        }
    }

    #[test]
    fn spline_never_overshoots_between_stops() {
        let stops = classic();
        let table = PaletteTable::with_size(&stops, 2048);
        let last = (table.len() - 1) as f64;
        for pair in stops.windows(2) {
            let lo = (pair[0].position * last).ceil() as usize;
            let hi = (pair[1].position * last).floor() as usize;
            for i in lo..=hi {
                let c = table.get(i);
                for ch in 0..3 {
                    let a = pair[0].color[ch].min(pair[1].color[ch]);
                    let b = pair[0].color[ch].max(pair[1].color[ch]);
                    assert!(
                        (a..=b).contains(&c[ch]),
                        "entry {i} channel {ch} = {} outside [{a}, {b}]",
                        c[ch]
                    );
                }
            }
        }
    }

    #[test]
    fn single_stop_is_constant() {
        let table = PaletteTable::with_size(&[PaletteStop::new(0.3, [9, 8, 7])], 16);
        assert!(table.entries().iter().all(|&c| c == [9, 8, 7]));
    }

    #[test]
    fn empty_stops_fall_back_to_default() {
        assert_eq!(PaletteTable::from_stops(&[]), PaletteTable::default());
    }

    #[test]
    fn unsorted_and_out_of_range_stops_are_sanitized() {
        let stops = [
            PaletteStop::new(1.5, [255, 255, 255]),
            PaletteStop::new(f64::NAN, [1, 2, 3]),
            PaletteStop::new(-0.2, [0, 0, 0]),
            PaletteStop::new(0.0, [10, 10, 10]),
        ];
        let clean = sanitize_stops(&stops);
        assert_eq!(clean.len(), 2);
        assert_eq!(clean[0], PaletteStop::new(0.0, [10, 10, 10]));
        assert_eq!(clean[1], PaletteStop::new(1.0, [255, 255, 255]));
    }

    #[test]
    fn packed_layout_is_rgb_little_endian() {
        let table = PaletteTable::with_size(&[PaletteStop::new(0.0, [1, 2, 3])], 2);
        assert_eq!(table.packed(), vec![0x0003_0201, 0x0003_0201]);
    }

    #[test]
    fn builtin_palettes_build_full_tables() {
        for (name, stops) in builtin_palettes() {
            let table = PaletteTable::from_stops(&stops);
            assert_eq!(table.len(), TABLE_SIZE, "{name}");
        }
        assert!(builtin_palette("Fire").is_some());
        assert!(builtin_palette("plaid").is_none());
    }

    #[test]
    fn stops_deserialize_from_json() {
        let json = r#"[{"position":0.0,"color":[0,0,0]},{"position":1.0,"color":[255,0,0]}]"#;
        let stops: Vec<PaletteStop> = serde_json::from_str(json).unwrap();
        let table = PaletteTable::with_size(&stops, 3);
        assert_eq!(table.get(2), [255, 0, 0]);
    }
}
