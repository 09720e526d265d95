//! Chain simplification - collinear vertex removal

use glam::Vec2;

use super::Chain;

/// Remove interior vertices that are collinear with their neighbours.
///
/// Vertices are never reordered. Open chains keep both endpoints. For
/// closed chains the seam is rotated onto a real corner first, so a loop
/// ends up as its corner set (plus the repeated first vertex) even when the
/// original seam sat in the middle of an edge.
pub fn simplify_chain(points: Chain, epsilon: f32) -> Chain {
    if points.len() < 3 {
        return points;
    }
    let closed = points.first() == points.last();
    if closed {
        simplify_closed(points, epsilon)
    } else {
        simplify_open(points, epsilon)
    }
}

/// Middle vertex `b` is removable when `a -> b -> c` keeps going the same
/// way: near-zero cross product and a positive dot product (a doubling-back
/// vertex is a feature, not noise).
fn removable(a: Vec2, b: Vec2, c: Vec2, epsilon: f32) -> bool {
    let ab = b - a;
    let bc = c - b;
    ab.perp_dot(bc).abs() <= epsilon && ab.dot(bc) > 0.0
}

fn simplify_open(points: Chain, epsilon: f32) -> Chain {
    let mut out: Chain = Vec::with_capacity(points.len());
    out.push(points[0]);
    for i in 1..points.len() - 1 {
        let anchor = out[out.len() - 1];
        if !removable(anchor, points[i], points[i + 1], epsilon) {
            out.push(points[i]);
        }
    }
    out.push(points[points.len() - 1]);
    out
}

fn simplify_closed(mut points: Chain, epsilon: f32) -> Chain {
    // drop the duplicated seam vertex, leaving the pure ring
    points.pop();
    let n = points.len();
    if n < 3 {
        points.push(points[0]);
        return points;
    }

    // rotate the ring so it starts at a genuine corner
    let corner = (0..n).find(|&i| {
        let a = points[(i + n - 1) % n];
        let b = points[i];
        let c = points[(i + 1) % n];
        !removable(a, b, c, epsilon)
    });
    let Some(corner) = corner else {
        // fully degenerate ring; keep it as-is
        points.push(points[0]);
        return points;
    };
    points.rotate_left(corner);
    points.push(points[0]);
    simplify_open(points, epsilon)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(points: &[(f32, f32)]) -> Chain {
        points.iter().map(|&(x, y)| Vec2::new(x, y)).collect()
    }

    #[test]
    fn test_open_collinear_run_collapses() {
        let result = simplify_chain(
            chain(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]),
            1e-4,
        );
        assert_eq!(result, chain(&[(0.0, 0.0), (3.0, 0.0)]));
    }

    #[test]
    fn test_open_corner_is_kept() {
        let result = simplify_chain(
            chain(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (2.0, 1.0), (2.0, 2.0)]),
            1e-4,
        );
        assert_eq!(result, chain(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0)]));
    }

    #[test]
    fn test_endpoints_always_survive() {
        let points = chain(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let result = simplify_chain(points.clone(), 1e-4);
        assert_eq!(result.first(), points.first());
        assert_eq!(result.last(), points.last());
    }

    #[test]
    fn test_doubling_back_vertex_is_kept() {
        // a -> b -> a again: cross is zero but dot is negative
        let result = simplify_chain(chain(&[(0.0, 0.0), (2.0, 0.0), (0.0, 0.0)]), 1e-4);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_closed_square_with_mid_edge_seam() {
        // seam starts in the middle of the top edge; after simplification
        // only the four corners remain (first repeated)
        let result = simplify_chain(
            chain(&[
                (1.0, 0.0),
                (0.0, 0.0),
                (0.0, 1.0),
                (0.0, 2.0),
                (1.0, 2.0),
                (2.0, 2.0),
                (2.0, 1.0),
                (2.0, 0.0),
                (1.0, 0.0),
            ]),
            1e-4,
        );
        assert_eq!(result.len(), 5);
        assert_eq!(result.first(), result.last());
        let mut corners: Vec<_> = result[..4].iter().map(|v| (v.x as i32, v.y as i32)).collect();
        corners.sort();
        assert_eq!(corners, vec![(0, 0), (0, 2), (2, 0), (2, 2)]);
    }

    #[test]
    fn test_short_chains_pass_through() {
        let two = chain(&[(0.0, 0.0), (1.0, 0.0)]);
        assert_eq!(simplify_chain(two.clone(), 1e-4), two);
    }

    #[test]
    fn test_never_reorders() {
        let points = chain(&[(0.0, 0.0), (1.0, 0.5), (2.0, 0.0), (3.0, 0.5)]);
        let result = simplify_chain(points.clone(), 1e-4);
        assert_eq!(result, points);
    }
}
