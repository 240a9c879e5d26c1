/// Block sizes of the progressive refinement stages, coarsest first.
///
/// Sizes fall geometrically from [`COARSEST_BLOCK`] to the final block size.
/// The sequence is non-increasing, starts at the coarsest block and ends
/// exactly at the final one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinementSchedule {
    sizes: Vec<u32>,
}

pub const COARSEST_BLOCK: u32 = 256;
pub const MIN_STEPS: usize = 2;

impl RefinementSchedule {
    pub fn new(steps: usize, final_block: u32) -> Self {
        let n = steps.max(MIN_STEPS);
        let last = final_block.clamp(1, COARSEST_BLOCK);
        let ratio = last as f64 / COARSEST_BLOCK as f64;

        let mut sizes: Vec<u32> = (0..n)
            .map(|k| {
                let t = k as f64 / (n - 1) as f64;
                (COARSEST_BLOCK as f64 * ratio.powf(t)).round() as u32
            })
            .collect();
        sizes[0] = COARSEST_BLOCK;
        sizes[n - 1] = last;
        for k in 1..n {
            sizes[k] = sizes[k].clamp(last, sizes[k - 1]);
        }
        Self { sizes }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Block size of `stage`, or `None` once every stage has run.
    #[inline]
    pub fn block(&self, stage: usize) -> Option<u32> {
        self.sizes.get(stage).copied()
    }

    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    pub fn final_block(&self) -> u32 {
        self.sizes[self.sizes.len() - 1]
    }
}

impl Default for RefinementSchedule {
    fn default() -> Self {
        Self::new(5, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_steps_to_one() {
        assert_eq!(RefinementSchedule::new(5, 1).sizes(), &[256, 64, 16, 4, 1]);
    }

    #[test]
    fn invariants_hold_for_all_shapes() {
        for steps in 0..12 {
            for last in [1, 2, 4] {
                let s = RefinementSchedule::new(steps, last);
                assert_eq!(s.len(), steps.max(MIN_STEPS));
                assert_eq!(s.block(0), Some(256));
                assert_eq!(s.final_block(), last);
                assert!(s.sizes().windows(2).all(|w| w[0] >= w[1]), "{s:?}");
            }
        }
    }

    #[test]
    fn two_steps_jump_straight_to_final() {
        assert_eq!(RefinementSchedule::new(2, 4).sizes(), &[256, 4]);
    }

    #[test]
    fn block_past_the_end_is_none() {
        let s = RefinementSchedule::new(3, 2);
        assert_eq!(s.block(3), None);
    }
}
