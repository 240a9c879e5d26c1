/// An RGBA pixel buffer representing the drawable surface.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderBuffer {
    pub width: u32,
    pub height: u32,
    /// RGBA pixel data, 4 bytes per pixel, row-major order.
    pub pixels: Vec<u8>,
}

const BLACK: [u8; 4] = [0, 0, 0, 255];

impl RenderBuffer {
    /// Create a new buffer filled with black (opaque).
    pub fn new(width: u32, height: u32) -> Self {
        let pixels = BLACK.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = self.offset(x, y);
        self.pixels[i..i + 4].copy_from_slice(&rgba);
    }

    /// Replace the whole surface with a frame of the same size.
    ///
    /// Frames of the wrong length are ignored and `false` is returned.
    pub fn replace(&mut self, pixels: Vec<u8>) -> bool {
        if pixels.len() != self.pixels.len() {
            return false;
        }
        self.pixels = pixels;
        true
    }

    /// Shift the surface by a pixel offset, preserving overlapping content.
    ///
    /// `dx > 0` means content moves right (left edge exposed).
    /// `dy > 0` means content moves down (top edge exposed).
    /// Exposed regions are filled with opaque black.
    pub fn shift(&mut self, dx: i32, dy: i32) {
        if dx == 0 && dy == 0 {
            return;
        }
        let w = self.width as i32;
        let h = self.height as i32;
        let mut shifted = BLACK.repeat(self.pixels.len() / 4);

        let x_start = dx.max(0);
        let x_end = (w + dx).min(w);
        if x_start >= x_end {
            self.pixels = shifted;
            return;
        }
        let count = (x_end - x_start) as usize * 4;
        let src_x = (x_start - dx) as usize * 4;
        let stride = self.width as usize * 4;

        for dst_y in 0..h {
            let src_y = dst_y - dy;
            if !(0..h).contains(&src_y) {
                continue;
            }
            let dst = dst_y as usize * stride + x_start as usize * 4;
            let src = src_y as usize * stride + src_x;
            shifted[dst..dst + count].copy_from_slice(&self.pixels[src..src + count]);
        }

        self.pixels = shifted;
    }
}
