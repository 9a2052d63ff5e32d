//! Delaunay triangulation by sorted incremental insertion
//!
//! Points are inserted in lexicographic `(x, y)` order, so each new point lies
//! outside the hull built so far. It is joined to every hull edge it can see
//! and the edges it faces are legalized with Lawson flips. No auxiliary
//! vertices are involved, so the mesh always covers the whole convex hull.
//!
//! Input points must be distinct; callers dedupe first.

use std::collections::HashMap;

use geo::Coord;

/// Relative slack on the in-circle test; cocircular quads are never flipped.
const IN_CIRCLE_EPS: f64 = 1e-12;
/// Relative slack below which three points count as collinear.
const COLLINEAR_EPS: f64 = 1e-12;

/// Twice the signed area of `(a, b, p)`; positive when `p` is left of `a -> b`.
fn cross(a: Coord<f64>, b: Coord<f64>, p: Coord<f64>) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn signed_area(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> f64 {
    0.5 * cross(a, b, c)
}

/// Positive when `d` lies inside the circumcircle of the counter-clockwise
/// triangle `(a, b, c)`.
fn in_circle(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>, d: Coord<f64>) -> f64 {
    let (adx, ady) = (a.x - d.x, a.y - d.y);
    let (bdx, bdy) = (b.x - d.x, b.y - d.y);
    let (cdx, cdy) = (c.x - d.x, c.y - d.y);
    let ad = adx * adx + ady * ady;
    let bd = bdx * bdx + bdy * bdy;
    let cd = cdx * cdx + cdy * cdy;
    adx * (bdy * cd - bd * cdy) - ady * (bdx * cd - bd * cdx) + ad * (bdx * cdy - bdy * cdx)
}

/// Triangle soup with directed-edge adjacency. Every stored triangle is
/// counter-clockwise, so the neighbor across `(a, b)` owns `(b, a)`.
struct Mesh<'a> {
    pts: &'a [Coord<f64>],
    triangles: Vec<[usize; 3]>,
    edges: HashMap<(usize, usize), usize>,
    in_circle_tol: f64,
}

impl<'a> Mesh<'a> {
    fn new(pts: &'a [Coord<f64>], in_circle_tol: f64) -> Self {
        Self {
            pts,
            triangles: Vec::with_capacity(2 * pts.len()),
            edges: HashMap::with_capacity(6 * pts.len()),
            in_circle_tol,
        }
    }

    fn ccw(&self, [a, b, c]: [usize; 3]) -> [usize; 3] {
        if cross(self.pts[a], self.pts[b], self.pts[c]) < 0.0 {
            [a, c, b]
        } else {
            [a, b, c]
        }
    }

    fn put(&mut self, id: usize, t: [usize; 3]) {
        let [a, b, c] = t;
        self.edges.insert((a, b), id);
        self.edges.insert((b, c), id);
        self.edges.insert((c, a), id);
        self.triangles[id] = t;
    }

    fn push(&mut self, t: [usize; 3]) {
        let t = self.ccw(t);
        self.triangles.push(t);
        self.put(self.triangles.len() - 1, t);
    }

    fn unlink(&mut self, id: usize) {
        let [a, b, c] = self.triangles[id];
        self.edges.remove(&(a, b));
        self.edges.remove(&(b, c));
        self.edges.remove(&(c, a));
    }

    /// Flip `(a, b)` and the edges it exposes until each passes the empty
    /// circumcircle test.
    fn legalize(&mut self, a: usize, b: usize) {
        let mut stack = vec![(a, b)];
        while let Some((a, b)) = stack.pop() {
            let (Some(&inner), Some(&outer)) = (self.edges.get(&(a, b)), self.edges.get(&(b, a))) else {
                continue;
            };
            let (Some(p), Some(d)) = (
                opposite(self.triangles[inner], a, b),
                opposite(self.triangles[outer], a, b),
            ) else {
                continue;
            };
            let (pa, pb, pp, pd) = (self.pts[a], self.pts[b], self.pts[p], self.pts[d]);
            if in_circle(pa, pb, pp, pd) <= self.in_circle_tol {
                continue;
            }
            // The replacement pair must stay counter-clockwise
            if cross(pa, pd, pp) <= 0.0 || cross(pd, pb, pp) <= 0.0 {
                continue;
            }
            self.unlink(inner);
            self.unlink(outer);
            self.put(inner, [a, d, p]);
            self.put(outer, [d, b, p]);
            stack.push((a, d));
            stack.push((d, b));
        }
    }
}

fn opposite(t: [usize; 3], a: usize, b: usize) -> Option<usize> {
    t.into_iter().find(|&v| v != a && v != b)
}

/// Triangulate `points`, returning triangles as index triples into `points`.
///
/// Fewer than three points, or input with no 2-D extent, yields no triangles.
pub fn triangulate(points: &[Coord<f64>]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }

    let (mut min, mut max) = (points[0], points[0]);
    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    let extent = (max.x - min.x).max(max.y - min.y);
    if extent <= 0.0 || !extent.is_finite() {
        return Vec::new();
    }
    let collinear_tol = COLLINEAR_EPS * extent * extent;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        points[i]
            .x
            .total_cmp(&points[j].x)
            .then(points[i].y.total_cmp(&points[j].y))
    });

    // Leading collinear run, fanned from the first point off its line
    let (p0, p1) = (points[order[0]], points[order[1]]);
    let Some(k) = (2..n).find(|&k| cross(p0, p1, points[order[k]]).abs() > collinear_tol) else {
        return Vec::new();
    };
    let apex = order[k];

    let mut mesh = Mesh::new(points, IN_CIRCLE_EPS * extent.powi(4));
    for w in order[..k].windows(2) {
        mesh.push([w[0], w[1], apex]);
    }
    // Hull vertices, counter-clockwise
    let mut hull: Vec<usize> = order[..=k].to_vec();
    if cross(p0, p1, points[apex]) < 0.0 {
        hull.reverse();
    }

    for &q in &order[k + 1..] {
        let h = hull.len();
        let visible: Vec<bool> = (0..h)
            .map(|i| cross(points[hull[i]], points[hull[(i + 1) % h]], points[q]) < 0.0)
            .collect();
        let Some(start) = (0..h).find(|&i| visible[i] && !visible[(i + h - 1) % h]) else {
            log::debug!("triangulate: point {q} sees no hull edge, skipped");
            continue;
        };

        let mut faced = Vec::new();
        let mut end = start;
        while visible[end] && faced.len() < h {
            let (a, b) = (hull[end], hull[(end + 1) % h]);
            mesh.push([a, q, b]);
            faced.push((b, a));
            end = (end + 1) % h;
        }
        for (a, b) in faced {
            mesh.legalize(a, b);
        }

        // Vertices strictly between `start` and `end` drop off the hull
        let mut next = Vec::with_capacity(h + 1);
        let mut i = end;
        loop {
            next.push(hull[i]);
            if i == start {
                break;
            }
            i = (i + 1) % h;
        }
        next.push(q);
        hull = next;
    }

    mesh.triangles
        .into_iter()
        .filter(|t| signed_area(points[t[0]], points[t[1]], points[t[2]]) > 0.0)
        .collect()
}
