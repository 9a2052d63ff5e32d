//! Scattered-to-grid field interpolation
//!
//! Samples are triangulated (Delaunay) and every node of a regular mesh over
//! the sample extent gets the barycentric blend of its enclosing triangle.
//! Nodes outside the convex hull stay `None`.

pub mod delaunay;
pub mod triangle_index;

use std::collections::HashSet;

use geo::Coord;
use ndarray::Array2;
use serde::Serialize;

use crate::config::GridConfig;
use crate::physics::linspace;
use crate::types::FieldSample;

pub use triangle_index::TriangleIndex;

/// Regular mesh of field values, `values[[iy, ix]]` at `(xs[ix], ys[iy])`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldGrid {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub values: Array2<Option<f64>>,
}

impl FieldGrid {
    pub fn value_at(&self, ix: usize, iy: usize) -> Option<f64> {
        self.values.get([iy, ix]).copied().flatten()
    }

    pub fn defined_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// `(min, max)` over defined cells.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values.iter().flatten().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

/// What happened while gridding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GridReport {
    pub samples: usize,
    pub duplicates_ignored: usize,
    /// Samples with a NaN or infinite coordinate or value.
    pub non_finite_ignored: usize,
    pub triangles: usize,
    /// No triangle could be formed (too few or collinear samples).
    pub degenerate: bool,
}

pub struct FieldGridInterpolator {
    config: GridConfig,
}

impl FieldGridInterpolator {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    pub fn interpolate(&self, samples: &[FieldSample]) -> (FieldGrid, GridReport) {
        let Deduped {
            points,
            values,
            duplicates,
            non_finite,
        } = dedupe(samples);
        if duplicates > 0 {
            log::debug!("grid: ignoring {duplicates} samples at repeated positions");
        }
        if non_finite > 0 {
            log::warn!("grid: ignoring {non_finite} non-finite samples");
        }

        let xs = extent_axis(points.iter().map(|p| p.x), self.config.resolution_x);
        let ys = extent_axis(points.iter().map(|p| p.y), self.config.resolution_y);

        let triangles = delaunay::triangulate(&points);
        let report = GridReport {
            samples: samples.len(),
            duplicates_ignored: duplicates,
            non_finite_ignored: non_finite,
            triangles: triangles.len(),
            degenerate: triangles.is_empty(),
        };

        let mut grid = Array2::from_elem((ys.len(), xs.len()), None);
        if report.degenerate {
            log::warn!(
                "grid: {} distinct samples do not span an area, grid left undefined",
                points.len()
            );
            return (FieldGrid { xs, ys, values: grid }, report);
        }

        let index = TriangleIndex::new(&triangles, &points);
        for (iy, &y) in ys.iter().enumerate() {
            for (ix, &x) in xs.iter().enumerate() {
                grid[[iy, ix]] = index.locate(x, y).map(|(tri, w)| {
                    let [a, b, c] = tri.vertices;
                    w[0] * values[a] + w[1] * values[b] + w[2] * values[c]
                });
            }
        }

        let grid = FieldGrid { xs, ys, values: grid };
        log::info!(
            "grid: {}x{} nodes, {} defined, {} triangles",
            grid.xs.len(),
            grid.ys.len(),
            grid.defined_count(),
            report.triangles
        );
        (grid, report)
    }
}

impl Default for FieldGridInterpolator {
    fn default() -> Self {
        Self::new(GridConfig::default())
    }
}

struct Deduped {
    points: Vec<Coord<f64>>,
    values: Vec<f64>,
    duplicates: usize,
    non_finite: usize,
}

/// Drop non-finite samples and samples at a position already seen; the first
/// one wins.
fn dedupe(samples: &[FieldSample]) -> Deduped {
    let mut seen = HashSet::with_capacity(samples.len());
    let mut out = Deduped {
        points: Vec::with_capacity(samples.len()),
        values: Vec::with_capacity(samples.len()),
        duplicates: 0,
        non_finite: 0,
    };
    for s in samples {
        if !(s.x.is_finite() && s.y.is_finite() && s.value.is_finite()) {
            out.non_finite += 1;
            continue;
        }
        // `+ 0.0` folds -0.0 into 0.0
        let key = ((s.x + 0.0).to_bits(), (s.y + 0.0).to_bits());
        if seen.insert(key) {
            out.points.push(Coord { x: s.x, y: s.y });
            out.values.push(s.value);
        } else {
            out.duplicates += 1;
        }
    }
    out
}

/// `n` evenly spaced nodes spanning the observed range; empty when there is
/// nothing to span.
fn extent_axis(coords: impl Iterator<Item = f64>, n: usize) -> Vec<f64> {
    let range = coords.fold(None, |acc: Option<(f64, f64)>, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    });
    match range {
        Some((lo, hi)) => linspace(lo, hi, n),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::{Contains, ConvexHull, MultiPoint, Point};

    fn sample(x: f64, y: f64, value: f64) -> FieldSample {
        FieldSample { x, y, value }
    }

    #[test]
    fn test_linear_field_reproduced() {
        let f = |x: f64, y: f64| 3.0 + 2.0 * x - 0.5 * y;
        let samples: Vec<FieldSample> = [(0.0, 0.0), (4.0, 0.0), (4.0, 3.0), (0.0, 3.0), (1.5, 1.0), (3.0, 2.2)]
            .iter()
            .map(|&(x, y)| sample(x, y, f(x, y)))
            .collect();
        let interp = FieldGridInterpolator::new(GridConfig { resolution_x: 9, resolution_y: 7 });
        let (grid, report) = interp.interpolate(&samples);
        assert!(!report.degenerate);
        assert_eq!(grid.values.dim(), (7, 9));
        // The hull is the full rectangle, so every node is defined
        assert_eq!(grid.defined_count(), 63);
        for (iy, &y) in grid.ys.iter().enumerate() {
            for (ix, &x) in grid.xs.iter().enumerate() {
                assert_abs_diff_eq!(grid.value_at(ix, iy).unwrap(), f(x, y), epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_outside_hull_is_undefined() {
        // Triangle hull: the (max x, max y) corner of the bounding box is outside
        let samples = [sample(0.0, 0.0, 1.0), sample(1.0, 0.0, 2.0), sample(0.0, 1.0, 3.0)];
        let interp = FieldGridInterpolator::new(GridConfig { resolution_x: 5, resolution_y: 5 });
        let (grid, _) = interp.interpolate(&samples);
        assert_eq!(grid.value_at(4, 4), None);
        assert_abs_diff_eq!(grid.value_at(0, 0).unwrap(), 1.0, epsilon = 1e-12);
        assert!(grid.value_at(3, 3).is_none());
        assert!(grid.value_at(1, 1).is_some());
    }

    #[test]
    fn test_duplicates_keep_first() {
        let samples = [
            sample(0.0, 0.0, 1.0),
            sample(0.0, 0.0, 99.0),
            sample(1.0, 0.0, 1.0),
            sample(0.0, 1.0, 1.0),
        ];
        let (grid, report) = FieldGridInterpolator::new(GridConfig { resolution_x: 3, resolution_y: 3 })
            .interpolate(&samples);
        assert_eq!(report.duplicates_ignored, 1);
        let (lo, hi) = grid.value_range().unwrap();
        assert_abs_diff_eq!(lo, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(hi, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_and_signed_zero() {
        let samples = [
            sample(0.0, 0.0, 1.0),
            sample(-0.0, 0.0, 5.0),
            sample(f64::NAN, 0.5, 1.0),
            sample(0.5, 0.5, f64::INFINITY),
            sample(1.0, 0.0, 1.0),
            sample(0.0, 1.0, 1.0),
        ];
        let (grid, report) = FieldGridInterpolator::new(GridConfig { resolution_x: 3, resolution_y: 3 })
            .interpolate(&samples);
        assert_eq!(report.duplicates_ignored, 1);
        assert_eq!(report.non_finite_ignored, 2);
        assert_abs_diff_eq!(grid.value_at(0, 0).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_flat_hull_edge_fully_defined() {
        // Shallow arc: every sample is a hull vertex and the hull is nearly flat
        let mut coords: Vec<(f64, f64)> = (0..21)
            .map(|i| {
                let x = -1.0 + i as f64 * 0.1;
                (x, 0.002 * x * x)
            })
            .collect();
        coords.push((0.0, 0.02));
        let samples: Vec<FieldSample> = coords.iter().map(|&(x, y)| sample(x, y, 40.0 + x)).collect();
        let hull = MultiPoint::from(coords.iter().map(|&(x, y)| Point::new(x, y)).collect::<Vec<_>>()).convex_hull();

        let (grid, report) = FieldGridInterpolator::default().interpolate(&samples);
        assert_eq!(report.triangles, 20);
        let mut inside = 0;
        for (iy, &y) in grid.ys.iter().enumerate() {
            for (ix, &x) in grid.xs.iter().enumerate() {
                if hull.contains(&Point::new(x, y)) {
                    inside += 1;
                    let value = grid.value_at(ix, iy);
                    assert!(value.is_some(), "node ({x}, {y}) inside the hull is undefined");
                    assert_abs_diff_eq!(value.unwrap_or_default(), 40.0 + x, epsilon = 1e-9);
                }
            }
        }
        assert!(inside > 40_000);
    }

    #[test]
    fn test_collinear_samples_give_empty_grid() {
        let samples: Vec<FieldSample> = (0..5).map(|i| sample(i as f64, i as f64, 1.0)).collect();
        let (grid, report) = FieldGridInterpolator::default().interpolate(&samples);
        assert!(report.degenerate);
        assert_eq!(grid.values.dim(), (300, 300));
        assert_eq!(grid.defined_count(), 0);
    }

    #[test]
    fn test_no_samples() {
        let (grid, report) = FieldGridInterpolator::default().interpolate(&[]);
        assert!(report.degenerate);
        assert!(grid.xs.is_empty());
        assert_eq!(grid.defined_count(), 0);
    }
}
