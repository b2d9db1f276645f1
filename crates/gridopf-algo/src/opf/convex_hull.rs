//! 2D convex hull (Andrew's monotone chain) and its half-plane facets.
//!
//! Used to turn reactive capability curve samples into linear constraints.
//! Collinear and duplicate points are dropped from the hull.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// `a·x + b·y <= c`, with `(a, b)` pointing out of the hull.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Facet {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Facet {
    /// Signed distance-like slack: positive when `p` is strictly inside.
    pub fn slack(&self, p: Point) -> f64 {
        self.c - (self.a * p.x + self.b * p.y)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Hull {
    /// Vertices in counter-clockwise order, without repeating the first
    pub vertices: Vec<Point>,
    /// Input points lying strictly inside the hull
    pub interior: Vec<Point>,
}

/// Cross product of `o→a` and `o→b`; positive for a left turn.
fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn half_chain<'a>(points: impl Iterator<Item = &'a Point>) -> Vec<Point> {
    let mut chain: Vec<Point> = Vec::new();
    for &p in points {
        while chain.len() >= 2 && cross(chain[chain.len() - 2], chain[chain.len() - 1], p) <= 0.0
        {
            chain.pop();
        }
        chain.push(p);
    }
    chain
}

/// Convex hull of `points`. Fewer than three non-collinear points give a
/// degenerate hull with fewer than three vertices.
pub fn convex_hull(points: &[Point]) -> Hull {
    let mut sorted: Vec<Point> = points
        .iter()
        .copied()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .collect();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();

    if sorted.len() < 3 {
        return Hull {
            vertices: sorted,
            interior: Vec::new(),
        };
    }

    let mut lower = half_chain(sorted.iter());
    let mut upper = half_chain(sorted.iter().rev());
    lower.pop();
    upper.pop();
    lower.extend(upper);

    let mut hull = Hull {
        vertices: lower,
        interior: Vec::new(),
    };
    if hull.vertices.len() >= 3 {
        let facets = hull.facets();
        hull.interior = sorted
            .into_iter()
            .filter(|&p| facets.iter().all(|f| f.slack(p) > 1e-12))
            .collect();
    }
    hull
}

impl Hull {
    pub fn is_polygon(&self) -> bool {
        self.vertices.len() >= 3
    }

    /// One facet per hull edge. Empty for a degenerate hull.
    pub fn facets(&self) -> Vec<Facet> {
        if !self.is_polygon() {
            return Vec::new();
        }
        let n = self.vertices.len();
        (0..n)
            .map(|k| {
                let p = self.vertices[k];
                let q = self.vertices[(k + 1) % n];
                // counter-clockwise order: the outward normal is the edge turned clockwise
                let a = q.y - p.y;
                let b = p.x - q.x;
                Facet {
                    a,
                    b,
                    c: a * p.x + b * p.y,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[(f64, f64)]) -> Vec<Point> {
        raw.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_square_with_interior_point() {
        let hull = convex_hull(&pts(&[
            (0.0, 0.0),
            (2.0, 0.0),
            (2.0, 2.0),
            (0.0, 2.0),
            (1.0, 1.0),
        ]));
        assert_eq!(hull.vertices.len(), 4);
        assert_eq!(hull.interior, pts(&[(1.0, 1.0)]));
        let facets = hull.facets();
        assert_eq!(facets.len(), 4);
        assert!(facets.iter().all(|f| f.slack(Point::new(1.0, 1.0)) > 0.0));
        assert!(facets.iter().any(|f| f.slack(Point::new(3.0, 1.0)) < 0.0));
    }

    #[test]
    fn test_collinear_points_are_redundant_not_interior() {
        let hull = convex_hull(&pts(&[
            (0.0, 0.0),
            (1.0, 0.0),
            (2.0, 0.0),
            (2.0, 2.0),
            (0.0, 2.0),
        ]));
        assert_eq!(hull.vertices.len(), 4);
        assert!(hull.interior.is_empty());
    }

    #[test]
    fn test_counter_clockwise_order() {
        let hull = convex_hull(&pts(&[(0.0, 0.0), (0.0, 1.0), (1.0, 0.0)]));
        let v = &hull.vertices;
        assert_eq!(v.len(), 3);
        assert!(cross(v[0], v[1], v[2]) > 0.0);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(!convex_hull(&[]).is_polygon());
        assert!(!convex_hull(&pts(&[(0.0, 0.0), (1.0, 1.0)])).is_polygon());
        let line = convex_hull(&pts(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]));
        assert!(!line.is_polygon());
        assert!(line.facets().is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        let hull = convex_hull(&pts(&[
            (0.0, 0.0),
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 0.0),
            (0.0, 1.0),
        ]));
        assert_eq!(hull.vertices.len(), 3);
    }
}
