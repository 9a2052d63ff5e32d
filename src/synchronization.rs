// synchronization.rs: Aligning independently clocked sensor streams
//
// Two strategies:
//   * interpolation join: sample a continuous (piecewise linear) version of a
//     source stream at the timestamps of a target clock
//   * nearest join: pair each primary sample with the closest secondary sample
//     inside a tolerance, never synthesizing values across gaps
//
// Both expect non-decreasing timestamps, which `TimeSeries` guarantees.

use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::types::{ScalarSeries, TimeSeries};

/// Behavior of the interpolation join outside the source time range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrapolation {
    /// Out-of-range queries have no value.
    #[default]
    Undefined,
    /// Hold the first/last source value.
    Clamp,
}

/// Outcome counts of a nearest join.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct JoinStats {
    pub matched: usize,
    pub unmatched: usize,
}

/// Linear interpolation of `(times, values)` at `t`.
pub fn interpolate_at(times: &[f64], values: &[f64], t: f64, mode: Extrapolation) -> Option<f64> {
    let (&t_first, &t_last) = (times.first()?, times.last()?);
    if t < t_first || t > t_last {
        return match mode {
            Extrapolation::Undefined => None,
            Extrapolation::Clamp if t < t_first => values.first().copied(),
            Extrapolation::Clamp => values.last().copied(),
        };
    }

    let hi = times.partition_point(|&x| x <= t);
    if hi == times.len() {
        return values.last().copied();
    }
    // t >= t_first guarantees hi >= 1
    let lo = hi - 1;
    let (t0, t1) = (times[lo], times[hi]);
    let (v0, v1) = (values[lo], values[hi]);
    Some(v0 + (v1 - v0) * (t - t0) / (t1 - t0))
}

/// Index of the sample in `times` closest to `t`. Ties go to the earlier one.
pub fn nearest_index(times: &[f64], t: f64) -> Option<usize> {
    if times.is_empty() {
        return None;
    }
    let after = times.partition_point(|&x| x < t);
    if after == 0 {
        return Some(0);
    }
    if after == times.len() {
        return Some(times.len() - 1);
    }
    let before = after - 1;
    if (t - times[before]) <= (times[after] - t) {
        Some(before)
    } else {
        Some(after)
    }
}

pub struct MultiStreamSynchronizer {
    config: SyncConfig,
}

impl MultiStreamSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn tolerance_s(&self) -> f64 {
        self.config.tolerance_s
    }

    /// Resample `source` onto `target_times`.
    pub fn interpolate_onto(
        &self,
        source: &ScalarSeries,
        target_times: &[f64],
        mode: Extrapolation,
    ) -> Result<TimeSeries<Option<f64>>> {
        let values = target_times
            .iter()
            .map(|&t| interpolate_at(source.times(), source.values(), t, mode))
            .collect();
        TimeSeries::new(target_times.to_vec(), values)
    }

    /// Pair each primary sample with the nearest secondary sample whose time
    /// gap is at most the tolerance. Unmatched primary samples are dropped.
    pub fn nearest_join<A: Clone, B: Clone>(
        &self,
        primary: &TimeSeries<A>,
        secondary: &TimeSeries<B>,
    ) -> (TimeSeries<(A, B)>, JoinStats) {
        let mut joined = Vec::with_capacity(primary.len());
        let mut stats = JoinStats::default();

        for (t, a) in primary.iter() {
            let hit = nearest_index(secondary.times(), t)
                .filter(|&i| (secondary.times()[i] - t).abs() <= self.config.tolerance_s);
            match hit {
                Some(i) => {
                    joined.push((t, (a.clone(), secondary.values()[i].clone())));
                    stats.matched += 1;
                }
                None => stats.unmatched += 1,
            }
        }

        if stats.unmatched > 0 {
            log::info!(
                "nearest join: {} matched, {} dropped (no sample within {} s)",
                stats.matched,
                stats.unmatched,
                self.config.tolerance_s
            );
        }
        (TimeSeries::from_unsorted(joined), stats)
    }
}

impl Default for MultiStreamSynchronizer {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

/// Keep only rows whose value is defined. Returns the survivors and the
/// number of dropped rows.
pub fn drop_undefined<T: Clone>(series: &TimeSeries<Option<T>>) -> (TimeSeries<T>, usize) {
    let kept: Vec<(f64, T)> = series
        .iter()
        .filter_map(|(t, v)| v.clone().map(|v| (t, v)))
        .collect();
    let dropped = series.len() - kept.len();
    if dropped > 0 {
        log::debug!("dropped {dropped} rows with undefined values");
    }
    (TimeSeries::from_unsorted(kept), dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn scalar(times: &[f64], values: &[f64]) -> ScalarSeries {
        TimeSeries::new(times.to_vec(), values.to_vec()).unwrap()
    }

    #[test]
    fn test_interpolate_inside_range() {
        let v = interpolate_at(&[0.0, 1.0, 3.0], &[0.0, 10.0, 30.0], 2.0, Extrapolation::Undefined);
        assert_abs_diff_eq!(v.unwrap(), 20.0, epsilon = 1e-12);
        assert_eq!(interpolate_at(&[0.0, 1.0], &[5.0, 7.0], 1.0, Extrapolation::Undefined), Some(7.0));
        assert_eq!(interpolate_at(&[0.0, 1.0], &[5.0, 7.0], 0.0, Extrapolation::Undefined), Some(5.0));
    }

    #[test]
    fn test_interpolate_outside_range() {
        let (t, v) = ([1.0, 2.0], [4.0, 8.0]);
        assert_eq!(interpolate_at(&t, &v, 0.5, Extrapolation::Undefined), None);
        assert_eq!(interpolate_at(&t, &v, 2.5, Extrapolation::Undefined), None);
        assert_eq!(interpolate_at(&t, &v, 0.5, Extrapolation::Clamp), Some(4.0));
        assert_eq!(interpolate_at(&t, &v, 2.5, Extrapolation::Clamp), Some(8.0));
        assert_eq!(interpolate_at(&[], &[], 0.0, Extrapolation::Clamp), None);
    }

    #[test]
    fn test_interpolate_onto_target_clock() {
        let sync = MultiStreamSynchronizer::default();
        let source = scalar(&[0.0, 1.0], &[0.0, 2.0]);
        let out = sync
            .interpolate_onto(&source, &[-1.0, 0.25, 0.5, 2.0], Extrapolation::Undefined)
            .unwrap();
        assert_eq!(out.values(), &[None, Some(0.5), Some(1.0), None]);
    }

    #[test]
    fn test_nearest_join_tolerance() {
        let sync = MultiStreamSynchronizer::default();
        let primary = scalar(&[10.0], &[1.0]);

        let far = scalar(&[10.15], &[2.0]);
        let (joined, stats) = sync.nearest_join(&primary, &far);
        assert!(joined.is_empty());
        assert_eq!(stats, JoinStats { matched: 0, unmatched: 1 });

        let near = scalar(&[10.09], &[2.0]);
        let (joined, stats) = sync.nearest_join(&primary, &near);
        assert_eq!(joined.values(), &[(1.0, 2.0)]);
        assert_eq!(stats.matched, 1);
    }

    #[test]
    fn test_nearest_join_prefers_earlier_on_tie() {
        let sync = MultiStreamSynchronizer::default();
        let primary = scalar(&[1.0], &[0.0]);
        let secondary = scalar(&[0.5, 1.5], &[10.0, 20.0]);
        assert_eq!(nearest_index(secondary.times(), 1.0), Some(0));

        let secondary = scalar(&[0.95, 1.04], &[10.0, 20.0]);
        let (joined, _) = sync.nearest_join(&primary, &secondary);
        assert_eq!(joined.values()[0].1, 20.0);
    }

    #[test]
    fn test_drop_undefined() {
        let series = TimeSeries::new(vec![0.0, 1.0, 2.0], vec![Some(1.0), None, Some(3.0)]).unwrap();
        let (kept, dropped) = drop_undefined(&series);
        assert_eq!(dropped, 1);
        assert_eq!(kept.times(), &[0.0, 2.0]);
        assert_eq!(kept.values(), &[1.0, 3.0]);
    }
}
