//! Typical-performance extraction
//!
//! Builds smoothed 101-bucket histograms over the normalized chunk means and
//! picks their peaks, suppressing the neighbourhood of every peak found so the
//! next one is a genuinely different performance regime.

use crate::stats::Chunk;
use crate::{Result, SlowMarkError};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const HISTOGRAM_BUCKETS: usize = 101;
pub const KERNEL_HALF_WIDTH: usize = 5;
pub const SUPPRESSION_RADIUS: usize = 15;
pub const BAND_FRACTION: f64 = 0.15;
/// Number of ranked modes taken from the chunk-mean histogram
pub const AVG_MODES: usize = 3;

/// Tuning of the histogram kernel and peak search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeParams {
    /// Center weight of the triangular kernel; also its reach in buckets
    pub kernel_half_width: usize,
    /// Buckets cleared on each side of a found peak
    pub suppression_radius: usize,
    /// Half-width of a band as a fraction of the observed range
    pub band_fraction: f64,
}

impl Default for ModeParams {
    fn default() -> Self {
        Self {
            kernel_half_width: KERNEL_HALF_WIDTH,
            suppression_radius: SUPPRESSION_RADIUS,
            band_fraction: BAND_FRACTION,
        }
    }
}

/// Weighted histogram over the normalized throughput axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Histogram {
    weights: [u32; HISTOGRAM_BUCKETS],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::empty()
    }
}

impl Histogram {
    pub const fn empty() -> Self {
        Self {
            weights: [0; HISTOGRAM_BUCKETS],
        }
    }

    pub fn weights(&self) -> &[u32; HISTOGRAM_BUCKETS] {
        &self.weights
    }

    pub fn total(&self) -> u64 {
        self.weights.iter().map(|&w| u64::from(w)).sum()
    }

    /// Add a triangular kernel centered on `bucket`
    ///
    /// The center gets `half_width`, neighbours at distance `d` get
    /// `half_width - d`; taps past either end of the axis are dropped.
    #[must_use]
    pub fn deposit(mut self, bucket: usize, half_width: usize) -> Self {
        let center = bucket.min(HISTOGRAM_BUCKETS - 1);
        self.weights[center] += half_width as u32;

        for d in 1..=half_width {
            let w = (half_width - d) as u32;
            if let Some(lo) = center.checked_sub(d) {
                self.weights[lo] += w;
            }
            if let Some(slot) = self.weights.get_mut(center + d) {
                *slot += w;
            }
        }
        self
    }

    /// Zero every bucket within `radius` of `bucket`
    #[must_use]
    pub fn suppress(mut self, bucket: usize, radius: usize) -> Self {
        let center = bucket.min(HISTOGRAM_BUCKETS - 1);
        let from = center.saturating_sub(radius);
        let to = (center + radius).min(HISTOGRAM_BUCKETS - 1);
        self.weights[from..=to].fill(0);
        self
    }

    /// Bucket with the strictly largest weight, first one on ties
    ///
    /// `None` when the histogram holds no weight at all.
    pub fn peak(&self) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        for (pos, &w) in self.weights.iter().enumerate() {
            if w > best.map_or(0, |(_, bw)| bw) {
                best = Some((pos, w));
            }
        }
        best.map(|(pos, _)| pos)
    }
}

/// Map a value onto the 0..=100 bucket axis spanning `[all_min, all_min + range]`
pub fn bucket_of(value: f64, all_min: f64, range: f64) -> usize {
    let pos = (100.0 * (value - all_min) / range).round();
    if pos.is_nan() || pos <= 0.0 {
        0
    } else {
        (pos as usize).min(HISTOGRAM_BUCKETS - 1)
    }
}

/// One detected performance band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pctl {
    /// Bucket on the 0..=100 axis
    pub position: usize,
    /// Throughput at the bucket, MB/s
    pub value: f64,
    /// Percentage of chunks inside the band
    pub weight: f64,
    /// Data volume attributed to the band, GB
    pub size_gb: f64,
}

impl fmt::Display for Pctl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1} MB/s, {:.1}% ({:.1} GB)",
            self.value, self.weight, self.size_gb
        )
    }
}

/// Typical-performance summary of one chunk series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pctls {
    /// Modes of the chunk means in extraction order (strongest first)
    pub avg: Vec<Pctl>,
    /// Mode of the above-mean sub-averages
    pub typ_max: Pctl,
    /// Mode of the below-mean sub-averages
    pub typ_min: Pctl,
    pub all_min: f64,
    pub all_max: f64,
}

impl Pctls {
    /// Chunk-mean modes ordered from fastest to slowest
    pub fn ranked(&self) -> Vec<Pctl> {
        let mut ranked = self.avg.clone();
        ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
        ranked
    }
}

impl fmt::Display for Pctls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ranked = self.ranked();
        let labels: &[&str] = match ranked.len() {
            1 => &["avg"],
            2 => &["avg.max", "min"],
            _ => &["avg.max", "mid", "min"],
        };

        for (label, pctl) in labels.iter().zip(&ranked) {
            writeln!(f, "  {:>7}: {}", label, pctl)?;
        }
        writeln!(f, "  typ.max: {}", self.typ_max)?;
        writeln!(f, "  typ.min: {}", self.typ_min)
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Avg,
    AvgMax,
    AvgMin,
}

impl Field {
    fn of(self, chunk: &Chunk) -> f64 {
        match self {
            Field::Avg => chunk.avg,
            Field::AvgMax => chunk.avg_max,
            Field::AvgMin => chunk.avg_min,
        }
    }
}

struct ModeExtractor<'a> {
    chunks: &'a [Chunk],
    all_min: f64,
    all_max: f64,
    range: f64,
    data_size_gb: f64,
    params: ModeParams,
}

impl<'a> ModeExtractor<'a> {
    fn new(chunks: &'a [Chunk], data_size_gb: f64, params: ModeParams) -> Result<Self> {
        if chunks.len() < 2 {
            return Err(SlowMarkError::InsufficientData(format!(
                "need at least 2 chunks, got {}",
                chunks.len()
            )));
        }

        let all_min = chunks.iter().map(|c| c.min).fold(f64::INFINITY, f64::min);
        let all_max = chunks.iter().map(|c| c.max).fold(f64::NEG_INFINITY, f64::max);
        let range = all_max - all_min;

        if !range.is_finite() || range <= f64::EPSILON * all_max.abs().max(1.0) {
            return Err(SlowMarkError::InsufficientData(format!(
                "throughput range {:.3}..{:.3} is too narrow",
                all_min, all_max
            )));
        }

        Ok(Self {
            chunks,
            all_min,
            all_max,
            range,
            data_size_gb,
            params,
        })
    }

    fn histogram(&self, field: Field) -> Histogram {
        self.chunks.iter().fold(Histogram::empty(), |hist, chunk| {
            let bucket = bucket_of(field.of(chunk), self.all_min, self.range);
            hist.deposit(bucket, self.params.kernel_half_width)
        })
    }

    fn materialize(&self, position: usize, field: Field) -> Pctl {
        let value = self.all_min + self.range * position as f64 / 100.0;
        let band = self.range * self.params.band_fraction;
        let inside = self
            .chunks
            .iter()
            .filter(|c| (field.of(c) - value).abs() <= band)
            .count();
        let weight = 100.0 * inside as f64 / self.chunks.len() as f64;

        Pctl {
            position,
            value,
            weight,
            size_gb: self.data_size_gb * weight / 100.0,
        }
    }

    fn single_mode(&self, field: Field) -> Result<Pctl> {
        let pos = self.histogram(field).peak().ok_or_else(|| {
            SlowMarkError::InsufficientData("histogram holds no weight".to_string())
        })?;
        Ok(self.materialize(pos, field))
    }

    fn ranked_modes(&self, count: usize) -> Result<Vec<Pctl>> {
        let mut hist = self.histogram(Field::Avg);
        let mut modes = Vec::with_capacity(count);

        while modes.len() < count {
            let Some(pos) = hist.peak() else { break };
            modes.push(self.materialize(pos, Field::Avg));
            hist = hist.suppress(pos, self.params.suppression_radius);
        }

        if modes.is_empty() {
            return Err(SlowMarkError::InsufficientData(
                "histogram holds no weight".to_string(),
            ));
        }
        Ok(modes)
    }
}

/// Summarize a chunk series with the default tuning
pub fn summarize(chunks: &[Chunk], data_size_gb: f64) -> Result<Pctls> {
    summarize_with(chunks, data_size_gb, ModeParams::default())
}

/// Summarize a chunk series
///
/// Fails with [`SlowMarkError::InsufficientData`] for fewer than two chunks
/// or a degenerate throughput range.
pub fn summarize_with(chunks: &[Chunk], data_size_gb: f64, params: ModeParams) -> Result<Pctls> {
    let extractor = ModeExtractor::new(chunks, data_size_gb, params)?;

    Ok(Pctls {
        avg: extractor.ranked_modes(AVG_MODES)?,
        typ_max: extractor.single_mode(Field::AvgMax)?,
        typ_min: extractor.single_mode(Field::AvgMin)?,
        all_min: extractor.all_min,
        all_max: extractor.all_max,
    })
}

/// Data volume of a uniformly spaced chunk series, GB
pub fn estimate_data_size_gb(chunks: &[Chunk]) -> f64 {
    match chunks {
        [_, second, ..] => second.offset_mb * chunks.len() as f64 / 1024.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_insufficient_data;
    use crate::stats::aggregate;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn flat_chunks(values: &[f64]) -> Vec<Chunk> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Chunk::flat(i as f64 * 4.0, v))
            .collect()
    }

    #[test]
    fn test_kernel_shape() {
        let hist = Histogram::empty().deposit(50, 5);
        let w = hist.weights();
        assert_eq!(w[50], 5);
        assert_eq!(w[49], 4);
        assert_eq!(w[54], 1);
        assert_eq!(w[45], 0);
        assert_eq!(w[55], 0);
        assert_eq!(hist.total(), 5 + 2 * (4 + 3 + 2 + 1));
    }

    #[test]
    fn test_kernel_at_edges() {
        let hist = Histogram::empty().deposit(0, 5).deposit(250, 5);
        let w = hist.weights();
        assert_eq!(w[0], 5);
        assert_eq!(w[1], 4);
        assert_eq!(w[100], 5);
        assert_eq!(w[99], 4);
        assert_eq!(hist.total(), 2 * 15);
    }

    #[test]
    fn test_bucket_clamping() {
        assert_eq!(bucket_of(5.0, 10.0, 40.0), 0);
        assert_eq!(bucket_of(90.0, 10.0, 40.0), 100);
        assert_eq!(bucket_of(30.0, 10.0, 40.0), 50);
        assert_eq!(bucket_of(10.2, 10.0, 40.0), 1);
    }

    #[test]
    fn test_peak_first_wins_and_empty() {
        let hist = Histogram::empty().deposit(20, 5).deposit(80, 5);
        assert_eq!(hist.peak(), Some(20));
        assert_eq!(Histogram::empty().peak(), None);
        assert_eq!(hist.suppress(20, 15).suppress(80, 15).peak(), None);
    }

    #[test]
    fn test_suppress_does_not_alias_source() {
        let hist = Histogram::empty().deposit(50, 5);
        let cleared = hist.suppress(50, 15);
        assert_eq!(hist.weights()[50], 5);
        assert_eq!(cleared.total(), 0);
    }

    #[test]
    fn test_two_regimes() {
        let chunks = flat_chunks(&[10.0, 10.0, 10.0, 10.0, 50.0, 50.0, 50.0, 50.0]);
        let pctls = summarize(&chunks, 1.0).unwrap();

        assert_eq!(pctls.avg.len(), 2);
        assert_eq!(pctls.avg[0].position, 0);
        assert!((pctls.avg[0].value - 10.0).abs() < 1e-9);
        assert!((pctls.avg[0].weight - 50.0).abs() < 1e-9);
        assert!((pctls.avg[0].size_gb - 0.5).abs() < 1e-9);
        assert_eq!(pctls.avg[1].position, 100);
        assert!((pctls.avg[1].value - 50.0).abs() < 1e-9);
        assert!((pctls.avg[1].weight - 50.0).abs() < 1e-9);
        assert_eq!(pctls.all_min, 10.0);
        assert_eq!(pctls.all_max, 50.0);

        let ranked = pctls.ranked();
        assert!(ranked[0].value > ranked[1].value);
    }

    #[test]
    fn test_insufficient_data() {
        let one = flat_chunks(&[10.0]);
        assert!(is_insufficient_data(&summarize(&one, 1.0).unwrap_err()));
        assert!(is_insufficient_data(&summarize(&[], 1.0).unwrap_err()));

        let flat = flat_chunks(&[42.0; 20]);
        assert!(is_insufficient_data(&summarize(&flat, 1.0).unwrap_err()));
    }

    #[test]
    fn test_modes_are_separated() {
        let mut rng = SmallRng::seed_from_u64(42);
        let samples: Vec<f64> = (0..20_000)
            .map(|i| {
                let base = if i < 3_000 { 1800.0 } else if i < 15_000 { 450.0 } else { 90.0 };
                base * rng.gen_range(0.8..1.2)
            })
            .collect();
        let chunks = aggregate(&samples, 4.0, 680);
        let pctls = summarize(&chunks, 78.0).unwrap();

        assert_eq!(pctls.avg.len(), AVG_MODES);
        for (i, a) in pctls.avg.iter().enumerate() {
            for b in &pctls.avg[i + 1..] {
                assert!(a.position.abs_diff(b.position) > SUPPRESSION_RADIUS);
            }
        }
        assert!(pctls.typ_max.value >= pctls.typ_min.value);
        assert!(pctls.avg.iter().all(|p| p.weight >= 0.0 && p.weight <= 100.0));
    }

    #[test]
    fn test_custom_params() {
        let chunks = flat_chunks(&[10.0, 10.0, 20.0, 20.0, 50.0, 50.0]);
        let wide = ModeParams {
            suppression_radius: 100,
            ..ModeParams::default()
        };
        let pctls = summarize_with(&chunks, 1.0, wide).unwrap();
        assert_eq!(pctls.avg.len(), 1);

        let narrow = summarize(&chunks, 1.0).unwrap();
        assert_eq!(narrow.avg.len(), 3);
    }

    #[test]
    fn test_display_lists_bands() {
        let chunks = flat_chunks(&[10.0, 10.0, 10.0, 10.0, 50.0, 50.0, 50.0, 50.0]);
        let text = summarize(&chunks, 1.0).unwrap().to_string();
        assert!(text.contains("avg.max: 50.0 MB/s, 50.0% (0.5 GB)"));
        assert!(text.contains("min: 10.0 MB/s"));
        assert!(text.contains("typ.max:"));
        assert!(text.contains("typ.min:"));
    }

    #[test]
    fn test_estimate_data_size() {
        let chunks = flat_chunks(&[1.0; 256]);
        assert!((estimate_data_size_gb(&chunks) - 1.0).abs() < 1e-9);
        assert_eq!(estimate_data_size_gb(&chunks[..1]), 0.0);
    }
}
