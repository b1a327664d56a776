//! Per-gigabyte averaging across runs
//!
//! Each run's chunk series is resampled to one value per GB so runs of
//! different length can be compared and averaged element-wise.

use crate::stats::Chunk;

/// Reduce a chunk series to one smoothed mean per GB of data
///
/// Every value is the mean of the chunk averages in a window of roughly
/// three GB centered on that GB; windows are clipped at both ends of
/// the series.
pub fn gb_average(chunks: &[Chunk]) -> Vec<f64> {
    let Some(last) = chunks.last() else {
        return Vec::new();
    };

    let data_gb = ((last.offset_mb / 1024.0).round() as usize).max(1);
    let per_gb = (chunks.len() / data_gb).max(1);
    let last_index = chunks.len() - 1;

    (0..data_gb)
        .map(|i| {
            let mid = i * per_gb + per_gb / 2;
            let to = (mid + per_gb).min(last_index);
            let from = mid.saturating_sub(per_gb).min(to);

            let window = &chunks[from..=to];
            window.iter().map(|c| c.avg).sum::<f64>() / window.len() as f64
        })
        .collect()
}

/// Element-wise mean of several per-GB series
///
/// The result is as long as the longest run; each position averages only
/// the runs that reach it.
pub fn cross_run_average(runs: &[Vec<Chunk>]) -> Vec<f64> {
    let per_run: Vec<Vec<f64>> = runs.iter().map(|chunks| gb_average(chunks)).collect();
    let longest = per_run.iter().map(Vec::len).max().unwrap_or(0);

    (0..longest)
        .map(|i| {
            let (sum, count) = per_run
                .iter()
                .filter_map(|values| values.get(i))
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            sum / count as f64
        })
        .collect()
}

/// Turn per-GB values back into a chunk series, one flat chunk per GB
pub fn to_chunks(values: &[f64]) -> Vec<Chunk> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| Chunk::flat(1024.0 * i as f64, v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64], step_mb: f64) -> Vec<Chunk> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Chunk::flat(i as f64 * step_mb, v))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(gb_average(&[]).is_empty());
        assert!(cross_run_average(&[]).is_empty());
        assert!(cross_run_average(&[Vec::new()]).is_empty());
    }

    #[test]
    fn test_short_run_yields_one_value() {
        let chunks = series(&[100.0, 200.0, 300.0], 100.0);
        let avg = gb_average(&chunks);
        assert_eq!(avg.len(), 1);
        assert!((avg[0] - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_series_stays_constant() {
        // 8 chunks spaced 512 MB apart: last offset 3584 MB rounds to 4 GB
        let chunks = series(&[250.0; 8], 512.0);
        let avg = gb_average(&chunks);
        assert_eq!(avg.len(), 4);
        assert!(avg.iter().all(|v| (v - 250.0).abs() < 1e-9));
    }

    #[test]
    fn test_windows_follow_the_series() {
        let values: Vec<f64> = (0..40).map(|i| if i < 20 { 100.0 } else { 10.0 }).collect();
        let chunks = series(&values, 256.0);
        let avg = gb_average(&chunks);

        assert_eq!(avg.len(), 10);
        assert!((avg[0] - 100.0).abs() < 1e-9);
        assert!((avg[9] - 10.0).abs() < 1e-9);
        assert!(avg.windows(2).all(|p| p[0] >= p[1]));
    }

    #[test]
    fn test_cross_run_uses_runs_reaching_each_gb() {
        let long = series(&[100.0; 12], 256.0);
        let short = series(&[50.0; 4], 256.0);

        assert_eq!(gb_average(&long).len(), 3);
        assert_eq!(gb_average(&short).len(), 1);

        let avg = cross_run_average(&[long, short]);
        assert_eq!(avg.len(), 3);
        assert!((avg[0] - 75.0).abs() < 1e-9);
        assert!((avg[1] - 100.0).abs() < 1e-9);
        assert!((avg[2] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_to_chunks() {
        let chunks = to_chunks(&[1.0, 2.0]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].offset_mb, 1024.0);
        assert_eq!(chunks[1].avg, 2.0);
        assert!(chunks.iter().all(Chunk::is_ordered));
    }
}
