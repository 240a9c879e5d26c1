use refract_core::Band;

/// Per-pixel raw iteration values for a full frame.
///
/// Only kept in distribution mode, where the final colouring needs every
/// value of the epoch at once. Pixels not yet computed hold `NaN`, which the
/// equalizer ignores.
#[derive(Debug, Clone)]
pub struct IterationBuffer {
    pub width: u32,
    pub height: u32,
    pub max_iterations: u32,
    pub data: Vec<f32>,
}

impl IterationBuffer {
    pub fn new(width: u32, height: u32, max_iterations: u32) -> Self {
        let size = width as usize * height as usize;
        Self {
            width,
            height,
            max_iterations,
            data: vec![f32::NAN; size],
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Spread a band's block samples over the pixels they stand for.
    pub fn fill_band(&mut self, band: &Band, values: &[f32]) {
        let block = band.block.max(1);
        let columns = band.sample_columns() as usize;
        let x_end = (band.x + band.width).min(self.width);
        let y_end = (band.y + band.height).min(self.height);
        for py in band.y..y_end {
            let row = ((py - band.y) / block) as usize;
            let base = py as usize * self.width as usize;
            for px in band.x..x_end {
                let col = ((px - band.x) / block) as usize;
                if let Some(&v) = values.get(row * columns + col) {
                    self.data[base + px as usize] = v;
                }
            }
        }
    }

    /// Shift the buffer by a pixel offset, preserving overlapping data.
    ///
    /// `dx > 0` means content moves right (left edge exposed).
    /// `dy > 0` means content moves down (top edge exposed).
    /// Exposed regions are filled with `NaN`.
    pub fn shift(&mut self, dx: i32, dy: i32) {
        if dx == 0 && dy == 0 {
            return;
        }
        let w = self.width as i32;
        let h = self.height as i32;
        let mut new_data = vec![f32::NAN; self.data.len()];

        let x_start = dx.max(0) as usize;
        let x_end = (w + dx).min(w).max(0) as usize;
        if x_start >= x_end {
            self.data = new_data;
            return;
        }
        let count = x_end - x_start;
        let src_x_start = (x_start as i32 - dx) as usize;

        for dst_y in 0..h as usize {
            let src_y = dst_y as i32 - dy;
            if src_y < 0 || src_y >= h {
                continue;
            }
            let dst_row = dst_y * self.width as usize;
            let src_row = src_y as usize * self.width as usize;
            new_data[dst_row + x_start..dst_row + x_end]
                .copy_from_slice(&self.data[src_row + src_x_start..src_row + src_x_start + count]);
        }

        self.data = new_data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_unfilled() {
        let buf = IterationBuffer::new(3, 2, 100);
        assert_eq!(buf.data.len(), 6);
        assert!(buf.data.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn fill_band_expands_blocks() {
        let mut buf = IterationBuffer::new(6, 4, 100);
        let band = Band {
            x: 1,
            y: 1,
            width: 5,
            height: 2,
            block: 4,
        };
        buf.fill_band(&band, &[3.0, 8.0]);
        assert_eq!(buf.get(1, 1), 3.0);
        assert_eq!(buf.get(4, 2), 3.0);
        assert_eq!(buf.get(5, 2), 8.0);
        assert!(buf.get(0, 1).is_nan());
        assert!(buf.get(1, 3).is_nan());
    }

    #[test]
    fn shift_preserves_overlap() {
        let mut buf = IterationBuffer::new(4, 4, 100);
        for (i, v) in buf.data.iter_mut().enumerate() {
            *v = i as f32;
        }
        buf.shift(-1, 2);
        // Pixel (0, 2) now holds what was at (1, 0).
        assert_eq!(buf.get(0, 2), 1.0);
        assert!(buf.get(3, 2).is_nan());
        assert!(buf.get(0, 0).is_nan());
    }
}
