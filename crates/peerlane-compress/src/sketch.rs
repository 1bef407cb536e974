use std::hash::{BuildHasher, Hash};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default number of hash rows.
pub const DEFAULT_DEPTH: usize = 16;
/// Default number of counters per row.
pub const DEFAULT_WIDTH: usize = 1024;

/// Approximate frequency counter.
///
/// Estimates never undercount. Hash collisions can make them overshoot,
/// which only affects which values get picked for a table.
#[derive(Debug, Clone)]
pub struct CountMinSketch {
    depth: usize,
    width: usize,
    mask: u64,
    row_seeds: Vec<u64>,
    hasher: std::hash::RandomState,
    counters: Vec<u64>,
    size: u64,
}

impl CountMinSketch {
    /// Sketch with `depth` rows of `width` counters; `width` is rounded up
    /// to a power of two. Row hashes are derived from `seed`.
    pub fn new(depth: usize, width: usize, seed: u64) -> Self {
        let depth = depth.max(1);
        let width = width.max(1).next_power_of_two();
        let mut rng = StdRng::seed_from_u64(seed);
        let row_seeds = (0..depth).map(|_| rng.gen::<u64>()).collect();

        Self {
            depth,
            width,
            mask: (width - 1) as u64,
            row_seeds,
            hasher: std::hash::RandomState::new(),
            counters: vec![0; depth * width],
            size: 0,
        }
    }

    /// Sketch seeded from the thread-local random generator.
    pub fn with_random_seed(depth: usize, width: usize) -> Self {
        Self::new(depth, width, rand::thread_rng().gen())
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Sum of all counts added.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Add `count` occurrences of `item` and return its new estimate.
    pub fn add_and_estimate<T: Hash + ?Sized>(&mut self, item: &T, count: u64) -> u64 {
        let base = self.hasher.hash_one(item);
        self.size = self.size.saturating_add(count);

        let mut estimate = u64::MAX;
        for row in 0..self.depth {
            let slot = self.slot(row, base);
            let counter = &mut self.counters[slot];
            *counter = counter.saturating_add(count);
            estimate = estimate.min(*counter);
        }
        estimate
    }

    /// Current estimate for `item`.
    pub fn estimate<T: Hash + ?Sized>(&self, item: &T) -> u64 {
        let base = self.hasher.hash_one(item);
        (0..self.depth)
            .map(|row| self.counters[self.slot(row, base)])
            .min()
            .unwrap_or(0)
    }

    fn slot(&self, row: usize, base: u64) -> usize {
        let column = (mix64(base ^ self.row_seeds[row]) & self.mask) as usize;
        row * self.width + column
    }
}

impl Default for CountMinSketch {
    fn default() -> Self {
        Self::with_random_seed(DEFAULT_DEPTH, DEFAULT_WIDTH)
    }
}

// splitmix64 finalizer
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_rounds_up_to_power_of_two() {
        let sketch = CountMinSketch::new(4, 1000, 1);
        assert_eq!(sketch.width(), 1024);
        assert_eq!(sketch.depth(), 4);
    }

    #[test]
    fn estimates_never_undercount() {
        let mut sketch = CountMinSketch::new(DEFAULT_DEPTH, 64, 7);
        for i in 0..500u32 {
            sketch.add_and_estimate(&format!("/user/{}", i % 50), 1);
        }
        for i in 0..50u32 {
            assert!(sketch.estimate(&format!("/user/{i}")) >= 10);
        }
        assert_eq!(sketch.size(), 500);
    }

    #[test]
    fn add_returns_running_estimate() {
        let mut sketch = CountMinSketch::default();
        assert!(sketch.add_and_estimate("a", 3) >= 3);
        assert!(sketch.add_and_estimate("a", 2) >= 5);
        assert!(sketch.estimate("never-added") <= sketch.size());
    }
}
