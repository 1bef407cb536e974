use crate::sketch::{CountMinSketch, DEFAULT_DEPTH, DEFAULT_WIDTH};
use crate::top_heavy_hitters::TopHeavyHitters;
use crate::value::Compressible;

/// Picks the values worth compressing for one peer and field kind.
#[derive(Debug, Clone)]
pub struct HeavyHitterDetector<T> {
    sketch: CountMinSketch,
    top: TopHeavyHitters<T>,
}

impl<T: Compressible> HeavyHitterDetector<T> {
    /// Detector tracking at most `max` values.
    pub fn new(max: usize) -> Self {
        Self::with_sketch(max, CountMinSketch::with_random_seed(DEFAULT_DEPTH, DEFAULT_WIDTH))
    }

    pub fn with_sketch(max: usize, sketch: CountMinSketch) -> Self {
        Self {
            sketch,
            top: TopHeavyHitters::new(max),
        }
    }

    /// Count `n` occurrences of `value`. Blank values are ignored. Returns
    /// `true` if the value is among the heavy hitters afterwards.
    pub fn increment(&mut self, value: &T, n: u64) -> bool {
        if value.is_blank() {
            return false;
        }
        let estimate = self.sketch.add_and_estimate(value, n);
        self.top.update(value.clone(), estimate)
    }

    pub fn estimate(&self, value: &T) -> u64 {
        self.sketch.estimate(value)
    }

    /// Heavy hitters, heaviest first.
    pub fn ranked_values(&self) -> Vec<T> {
        self.top
            .snapshot()
            .into_iter()
            .map(|(value, _)| value)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.top.len()
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_empty()
    }
}
