use refract_core::Band;

/// Default tile size in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 64;

pub type TileId = u64;

/// A pixel rectangle on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Move by `(dx, dy)` and clip to a `width × height` canvas.
    ///
    /// Returns `None` when nothing of the rectangle remains visible.
    pub fn shifted_clipped(&self, dx: i32, dy: i32, width: u32, height: u32) -> Option<Rect> {
        let x0 = (self.x as i64 + dx as i64).max(0);
        let y0 = (self.y as i64 + dy as i64).max(0);
        let x1 = (self.x as i64 + self.width as i64 + dx as i64).min(width as i64);
        let y1 = (self.y as i64 + self.height as i64 + dy as i64).min(height as i64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some(Rect::new(
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        ))
    }
}

/// A rectangular output region advancing through the refinement stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub id: TileId,
    pub rect: Rect,
    /// Index of the next stage to run; `>= schedule.len()` means done.
    pub stage: usize,
    pub in_flight: bool,
}

impl Tile {
    pub fn new(id: TileId, rect: Rect) -> Self {
        Self {
            id,
            rect,
            stage: 0,
            in_flight: false,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.rect.pixel_count()
    }

    #[inline]
    pub fn is_done(&self, stages: usize) -> bool {
        self.stage >= stages
    }

    /// Split into row bands one block tall (clipped to the tile).
    pub fn bands(&self, block: u32) -> Vec<Band> {
        let block = block.max(1);
        let Rect {
            x,
            y,
            width,
            height,
        } = self.rect;
        (0..height)
            .step_by(block as usize)
            .map(|row| Band {
                x,
                y: y + row,
                width,
                height: block.min(height - row),
                block,
            })
            .collect()
    }
}

/// Cover a region with a grid of tiles of at most `tile_size` pixels a side.
pub fn build_tile_grid(region: Rect, tile_size: u32) -> Vec<Rect> {
    let tile_size = tile_size.max(1);
    let mut tiles = Vec::new();
    let mut y = 0;
    while y < region.height {
        let th = tile_size.min(region.height - y);
        let mut x = 0;
        while x < region.width {
            let tw = tile_size.min(region.width - x);
            tiles.push(Rect::new(region.x + x, region.y + y, tw, th));
            x += tw;
        }
        y += th;
    }
    tiles
}

/// The strips a pan by `(dx, dy)` exposes on a `width × height` canvas.
///
/// The vertical strip spans the full height; the horizontal strip skips the
/// columns the vertical one already covers, so the two never overlap.
pub fn exposed_strips(dx: i32, dy: i32, width: u32, height: u32) -> Vec<Rect> {
    let mut strips = Vec::with_capacity(2);
    let adx = dx.unsigned_abs().min(width);
    let ady = dy.unsigned_abs().min(height);

    let (keep_x, keep_w) = match dx.signum() {
        1 => {
            strips.push(Rect::new(0, 0, adx, height));
            (adx, width - adx)
        }
        -1 => {
            strips.push(Rect::new(width - adx, 0, adx, height));
            (0, width - adx)
        }
        _ => (0, width),
    };
    match dy.signum() {
        1 => strips.push(Rect::new(keep_x, 0, keep_w, ady)),
        -1 => strips.push(Rect::new(keep_x, height - ady, keep_w, ady)),
        _ => {}
    }
    strips.retain(|r| !r.is_empty());
    strips
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage(rects: &[Rect], width: u32, height: u32) -> Vec<u8> {
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

    #[test]
    fn tile_grid_covers_viewport() {
        let tiles = build_tile_grid(Rect::new(0, 0, 200, 150), 64);
        let total_pixels: usize = tiles.iter().map(|t| t.pixel_count()).sum();
        assert_eq!(total_pixels, 200 * 150);
    }

    #[test]
    fn tile_grid_no_overlap() {
        let tiles = build_tile_grid(Rect::new(0, 0, 200, 150), 64);
        assert!(coverage(&tiles, 200, 150).iter().all(|&c| c == 1));
    }

    #[test]
    fn tile_size_respects_limit() {
        for t in build_tile_grid(Rect::new(0, 0, 256, 256), 48) {
            assert!(t.width <= 48);
            assert!(t.height <= 48);
        }
    }

    #[test]
    fn grid_offsets_by_region_origin() {
        let tiles = build_tile_grid(Rect::new(10, 20, 5, 5), 64);
        assert_eq!(tiles, vec![Rect::new(10, 20, 5, 5)]);
    }

    #[test]
    fn final_stage_bands_cover_tile_exactly() {
        let tile = Tile::new(0, Rect::new(64, 128, 64, 37));
        let bands = tile.bands(1);
        assert_eq!(bands.len(), 37);
        let rects: Vec<Rect> = bands
            .iter()
            .map(|b| Rect::new(b.x, b.y, b.width, b.height))
            .collect();
        let cov = coverage(&rects, 128, 165);
        for py in 0..165 {
            for px in 0..128 {
                let inside = (64..128).contains(&px) && (128..165).contains(&py);
                assert_eq!(cov[(py * 128 + px) as usize], inside as u8);
            }
        }
    }

    #[test]
    fn coarse_bands_are_clipped() {
        let tile = Tile::new(0, Rect::new(0, 0, 64, 40));
        let bands = tile.bands(16);
        let heights: Vec<u32> = bands.iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![16, 16, 8]);
        // Coarser than the tile: one band, one sample.
        let bands = tile.bands(256);
        assert_eq!(bands.len(), 1);
        assert_eq!(bands[0].sample_count(), 1);
    }

    #[test]
    fn shifted_clipped_drops_offscreen() {
        let r = Rect::new(0, 0, 64, 64);
        assert_eq!(r.shifted_clipped(-64, 0, 200, 100), None);
        assert_eq!(
            r.shifted_clipped(-10, 50, 200, 100),
            Some(Rect::new(0, 50, 54, 50))
        );
    }

    #[test]
    fn exposed_strips_do_not_overlap() {
        for (dx, dy) in [(5, 0), (0, -7), (13, 9), (-13, -9), (-3, 20)] {
            let strips = exposed_strips(dx, dy, 100, 60);
            let exposed = dx.unsigned_abs() * 60 + dy.unsigned_abs() * (100 - dx.unsigned_abs());
            let cov = coverage(&strips, 100, 60);
            assert!(cov.iter().all(|&c| c <= 1));
            assert_eq!(cov.iter().filter(|&&c| c == 1).count() as u32, exposed);
        }
        assert!(exposed_strips(0, 0, 100, 60).is_empty());
    }
}
