//! Chunk aggregation
//!
//! Reduces a raw per-block series of arbitrary length to at most
//! `max_display_width` chunks, each summarizing one contiguous window.

use serde::{Deserialize, Serialize};

/// Summary of one contiguous window of raw samples
///
/// Invariant: `min <= avg_min <= avg <= avg_max <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Data volume preceding this window, in MB
    pub offset_mb: f64,
    pub min: f64,
    /// Mean of the samples strictly below `avg` (or `avg` if none)
    pub avg_min: f64,
    pub avg: f64,
    /// Mean of the samples strictly above `avg` (or `avg` if none)
    pub avg_max: f64,
    pub max: f64,
}

/// Ordered chunks of one run
pub type ChunkSeries = Vec<Chunk>;

impl Chunk {
    pub fn new(offset_mb: f64, min: f64, avg_min: f64, avg: f64, avg_max: f64, max: f64) -> Self {
        Self {
            offset_mb,
            min,
            avg_min,
            avg,
            avg_max,
            max,
        }
    }

    /// Chunk carrying a single value in every field
    pub fn flat(offset_mb: f64, avg: f64) -> Self {
        Self::new(offset_mb, avg, avg, avg, avg, avg)
    }

    /// Summarize one window of samples
    ///
    /// Returns `None` for an empty window.
    pub fn from_window(offset_mb: f64, window: &[f64]) -> Option<Self> {
        let (&first, rest) = window.split_first()?;

        let (mut min, mut max, mut sum) = (first, first, first);
        for &v in rest {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        // rounding in the sum must not push the mean outside the window
        let avg = (sum / window.len() as f64).clamp(min, max);

        let (mut below_sum, mut below_n, mut above_sum, mut above_n) = (0.0, 0usize, 0.0, 0usize);
        for &v in window {
            if v < avg {
                below_sum += v;
                below_n += 1;
            } else if v > avg {
                above_sum += v;
                above_n += 1;
            }
        }

        let avg_min = if below_n == 0 {
            avg
        } else {
            (below_sum / below_n as f64).clamp(min, avg)
        };
        let avg_max = if above_n == 0 {
            avg
        } else {
            (above_sum / above_n as f64).clamp(avg, max)
        };

        Some(Self::new(offset_mb, min, avg_min, avg, avg_max, max))
    }

    /// Whether the ordering invariant holds
    pub fn is_ordered(&self) -> bool {
        self.min <= self.avg_min
            && self.avg_min <= self.avg
            && self.avg <= self.avg_max
            && self.avg_max <= self.max
    }
}

/// Number of raw samples folded into one chunk
pub fn chunk_width(sample_count: usize, max_display_width: usize) -> usize {
    let width = max_display_width.max(1);
    sample_count.div_ceil(width).max(1)
}

/// Downsample a raw series into at most `max_display_width` chunks
///
/// Offsets assume every sample covers `block_size_mb` of data.
pub fn aggregate(samples: &[f64], block_size_mb: f64, max_display_width: usize) -> ChunkSeries {
    let width = chunk_width(samples.len(), max_display_width);

    samples
        .chunks(width)
        .enumerate()
        .filter_map(|(i, window)| {
            let offset_mb = (i * width) as f64 * block_size_mb;
            Chunk::from_window(offset_mb, window)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    #[test]
    fn test_chunk_width() {
        assert_eq!(chunk_width(0, 680), 1);
        assert_eq!(chunk_width(680, 680), 1);
        assert_eq!(chunk_width(681, 680), 2);
        assert_eq!(chunk_width(10_000, 680), 15);
        assert_eq!(chunk_width(10, 0), 10);
    }

    #[test]
    fn test_empty_series_yields_no_chunks() {
        assert!(aggregate(&[], 4.0, 680).is_empty());
    }

    #[test]
    fn test_window_statistics() {
        let chunk = Chunk::from_window(0.0, &[10.0, 20.0, 30.0, 60.0]).unwrap();
        assert_eq!(chunk.min, 10.0);
        assert_eq!(chunk.max, 60.0);
        assert_eq!(chunk.avg, 30.0);
        assert_eq!(chunk.avg_min, 15.0);
        assert_eq!(chunk.avg_max, 60.0);
        assert!(chunk.is_ordered());
    }

    #[test]
    fn test_degenerate_window() {
        let chunk = Chunk::from_window(8.0, &[0.1, 0.1, 0.1]).unwrap();
        assert_eq!(chunk.avg_min, chunk.avg);
        assert_eq!(chunk.avg_max, chunk.avg);
        assert!(chunk.is_ordered());
        assert!(Chunk::from_window(0.0, &[]).is_none());
    }

    #[test]
    fn test_short_last_window_uses_its_own_length() {
        let chunks = aggregate(&[1.0, 1.0, 1.0, 5.0, 5.0], 1.0, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].avg, 5.0);
        assert_eq!(chunks[1].offset_mb, 3.0);
    }

    #[test]
    fn test_chunk_invariants_on_noisy_series() {
        let mut rng = SmallRng::seed_from_u64(7);
        for &(n, w) in &[(1usize, 680usize), (679, 680), (5_000, 680), (12_345, 100), (97, 7)] {
            let samples: Vec<f64> = (0..n).map(|_| rng.gen_range(0.5..3000.0)).collect();
            let chunks = aggregate(&samples, 4.0, w);
            let width = chunk_width(n, w);

            assert!(chunks.len() <= w);
            assert_eq!(chunks.len(), n.div_ceil(width));
            assert!(chunks.iter().all(Chunk::is_ordered));
            assert!(chunks.windows(2).all(|p| p[0].offset_mb < p[1].offset_mb));
        }
    }

    #[test]
    fn test_partial_series_aggregates_like_any_other() {
        let samples = vec![100.0; 7];
        let chunks = aggregate(&samples, 4.0, 680);
        assert_eq!(chunks.len(), 7);
        assert_eq!(chunks[6].offset_mb, 24.0);
    }
}
