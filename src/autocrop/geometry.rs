//! Contour geometry: simplification, area and minimum-area rectangles.

use imageproc::geometry::convex_hull;
use imageproc::point::Point;

/// Drops points that lie on a straight run between their neighbours.
///
/// Contours from the border follower list every boundary pixel; only the
/// corners matter for area and hull computations.
pub fn simplify_contour(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let mut out = Vec::with_capacity(n / 4 + 2);
    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let cur = points[i];
        let next = points[(i + 1) % n];
        let cross = (cur.x - prev.x) as i64 * (next.y - cur.y) as i64
            - (cur.y - prev.y) as i64 * (next.x - cur.x) as i64;
        let dot = (cur.x - prev.x) as i64 * (next.x - cur.x) as i64
            + (cur.y - prev.y) as i64 * (next.y - cur.y) as i64;
        // Keep turns and reversals; skip points in the middle of a straight run
        if cross != 0 || dot <= 0 {
            out.push(cur);
        }
    }
    out
}

/// Absolute enclosed area of a closed polygon (shoelace formula).
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice as f64 / 2.0).abs()
}

/// An oriented rectangle in pixel-center coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    /// Center `(x, y)`.
    pub center: (f64, f64),
    /// Length of the side closer to horizontal.
    pub width: f64,
    /// Length of the side closer to vertical.
    pub height: f64,
    /// Rotation of the width side in degrees, in `(-45, 45]`.
    pub angle: f64,
    /// Corners in order around the rectangle.
    pub corners: [(f64, f64); 4],
}

/// Smallest-area rectangle enclosing `points`.
///
/// Uses rotating calipers over the convex hull: the optimal rectangle has
/// one side collinear with a hull edge. Returns `None` when the points do
/// not span an area.
pub fn min_area_rect(points: &[Point<i32>]) -> Option<RotatedRect> {
    if points.len() < 3 {
        return None;
    }
    let hull = convex_hull(points);
    if hull.len() < 3 {
        return None;
    }

    let pts: Vec<(f64, f64)> = hull.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let mut best: Option<(f64, [f64; 6])> = None;

    for i in 0..pts.len() {
        let (ax, ay) = pts[i];
        let (bx, by) = pts[(i + 1) % pts.len()];
        let len = ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt();
        if len == 0.0 {
            continue;
        }
        let (ux, uy) = ((bx - ax) / len, (by - ay) / len);
        let (vx, vy) = (-uy, ux);

        let (mut min_u, mut max_u, mut min_v, mut max_v) =
            (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for &(px, py) in &pts {
            let u = px * ux + py * uy;
            let v = px * vx + py * vy;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if best.map_or(true, |(a, _)| area < a - 1e-9) {
            best = Some((area, [ux, uy, min_u, max_u, min_v, max_v]));
        }
    }

    let (area, [ux, uy, min_u, max_u, min_v, max_v]) = best?;
    if area <= 0.0 {
        return None;
    }
    let (vx, vy) = (-uy, ux);
    let at = |u: f64, v: f64| (u * ux + v * vx, u * uy + v * vy);
    let corners = [
        at(min_u, min_v),
        at(max_u, min_v),
        at(max_u, max_v),
        at(min_u, max_v),
    ];
    let center = at((min_u + max_u) / 2.0, (min_v + max_v) / 2.0);

    let along_u = max_u - min_u;
    let along_v = max_v - min_v;
    let angle_u = fold_half_turn(uy.atan2(ux).to_degrees());

    let (width, height, angle) = if angle_u.abs() <= 45.0 {
        (along_u, along_v, angle_u)
    } else {
        (along_v, along_u, fold_half_turn(angle_u - 90.0))
    };
    // Map -45 onto 45 so the range is half-open
    let angle = if angle <= -45.0 { angle + 90.0 } else { angle };

    Some(RotatedRect {
        center,
        width,
        height,
        angle,
        corners,
    })
}

/// Folds an angle in degrees into `(-90, 90]`; a line has no direction.
fn fold_half_turn(mut degrees: f64) -> f64 {
    while degrees > 90.0 {
        degrees -= 180.0;
    }
    while degrees <= -90.0 {
        degrees += 180.0;
    }
    degrees
}
