use geo::Coord;
use rstar::{RTree, RTreeObject, AABB};

use crate::types::{Mat2, Vec2};

/// Barycentric weights below this are treated as outside the triangle.
const INSIDE_TOLERANCE: f64 = -1e-9;

/// Triangle with its bounding box, for the spatial index
#[derive(Clone, Debug)]
pub struct IndexedTriangle {
    pub vertices: [usize; 3],
    corners: [Vec2; 3],
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedTriangle {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedTriangle {
    pub fn new(vertices: [usize; 3], points: &[Coord<f64>]) -> Self {
        let corners = vertices.map(|i| Vec2::new(points[i].x, points[i].y));
        let envelope = AABB::from_points(&corners.map(|c| [c.x, c.y]));
        Self {
            vertices,
            corners,
            envelope,
        }
    }

    /// Barycentric weights of `p`, or `None` when the triangle is degenerate.
    pub fn barycentric(&self, p: Vec2) -> Option<[f64; 3]> {
        let [a, b, c] = self.corners;
        let t = Mat2::new(a.x - c.x, b.x - c.x, a.y - c.y, b.y - c.y);
        let l = t.try_inverse()? * (p - c);
        Some([l.x, l.y, 1.0 - l.x - l.y])
    }

    pub fn contains(&self, p: Vec2) -> Option<[f64; 3]> {
        self.barycentric(p)
            .filter(|w| w.iter().all(|&wi| wi >= INSIDE_TOLERANCE))
    }
}

/// R-tree over a triangulation for point location
pub struct TriangleIndex {
    tree: RTree<IndexedTriangle>,
}

impl TriangleIndex {
    pub fn new(triangles: &[[usize; 3]], points: &[Coord<f64>]) -> Self {
        let indexed = triangles
            .iter()
            .map(|&t| IndexedTriangle::new(t, points))
            .collect();
        Self {
            tree: RTree::bulk_load(indexed),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Triangle containing `(x, y)` and the point's barycentric weights.
    pub fn locate(&self, x: f64, y: f64) -> Option<(&IndexedTriangle, [f64; 3])> {
        let p = Vec2::new(x, y);
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([x, y]))
            .find_map(|t| t.contains(p).map(|w| (t, w)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barycentric_weights() {
        let pts = [Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 0.0 }, Coord { x: 0.0, y: 2.0 }];
        let tri = IndexedTriangle::new([0, 1, 2], &pts);
        let w = tri.contains(Vec2::new(0.5, 0.5)).unwrap();
        assert!((w[0] - 0.5).abs() < 1e-12);
        assert!((w[1] - 0.25).abs() < 1e-12);
        assert!((w[2] - 0.25).abs() < 1e-12);
        assert!(tri.contains(Vec2::new(1.5, 1.5)).is_none());
        // On an edge counts as inside
        assert!(tri.contains(Vec2::new(1.0, 1.0)).is_some());
    }

    #[test]
    fn test_locate() {
        let pts = [
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 0.0, y: 1.0 },
        ];
        let index = TriangleIndex::new(&[[0, 1, 2], [0, 2, 3]], &pts);
        assert_eq!(index.len(), 2);
        let (tri, _) = index.locate(0.8, 0.2).unwrap();
        assert_eq!(tri.vertices, [0, 1, 2]);
        let (tri, _) = index.locate(0.2, 0.8).unwrap();
        assert_eq!(tri.vertices, [0, 2, 3]);
        assert!(index.locate(1.5, 0.5).is_none());
    }
}
