//! Planar geometry helpers shared by lanes, car shapes and the rule engine

use super::types::Position;

const EPSILON: f32 = 1e-6;

/// Point on a quadratic Bezier curve
pub fn quadratic_bezier(start: &Position, control: &Position, end: &Position, t: f32) -> Position {
    let a = start.lerp(control, t);
    let b = control.lerp(end, t);
    a.lerp(&b, t)
}

/// Intersection of two infinite lines given as point + direction
pub fn line_intersection(
    p: &Position,
    p_dir: &Position,
    q: &Position,
    q_dir: &Position,
) -> Option<Position> {
    let denom = cross(p_dir, q_dir);
    if denom.abs() < EPSILON {
        return None;
    }
    let t = cross(&q.sub(p), q_dir) / denom;
    Some(p.add(&p_dir.scale(t)))
}

fn cross(a: &Position, b: &Position) -> f32 {
    a.x * b.y - a.y * b.x
}

pub fn point_segment_distance(point: &Position, a: &Position, b: &Position) -> f32 {
    let ab = b.sub(a);
    let len_sq = ab.dot(&ab);
    if len_sq < EPSILON {
        return point.distance(a);
    }
    let t = (point.sub(a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    point.distance(&a.add(&ab.scale(t)))
}

/// Shortest distance between segments `p1-q1` and `p2-q2`
///
/// Closest-point computation after Ericson, Real-Time Collision Detection 5.1.9.
pub fn segment_distance(p1: &Position, q1: &Position, p2: &Position, q2: &Position) -> f32 {
    let d1 = q1.sub(p1);
    let d2 = q2.sub(p2);
    let r = p1.sub(p2);
    let a = d1.dot(&d1);
    let e = d2.dot(&d2);
    let f = d2.dot(&r);

    let (s, t) = if a <= EPSILON && e <= EPSILON {
        (0.0, 0.0)
    } else if a <= EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(&r);
        if e <= EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let mut s = if denom > EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    let c1 = p1.add(&d1.scale(s));
    let c2 = p2.add(&d2.scale(t));
    c1.distance(&c2)
}

/// Whether two segments touch or cross
pub fn segments_intersect(p1: &Position, q1: &Position, p2: &Position, q2: &Position) -> bool {
    segment_distance(p1, q1, p2, q2) <= EPSILON
}

/// Corners of a rectangle centred on `center` and rotated by `angle`
pub fn oriented_rectangle(center: &Position, angle: f32, length: f32, width: f32) -> Vec<Position> {
    let forward = Position::from_angle(angle).scale(length / 2.0);
    let side = Position::new(-forward.y, forward.x)
        .scale(if length > 0.0 { width / length } else { 0.0 });
    vec![
        center.add(&forward).add(&side),
        center.add(&forward).sub(&side),
        center.sub(&forward).sub(&side),
        center.sub(&forward).add(&side),
    ]
}

/// Penetration depth of two convex polygons along their separating axes;
/// zero when they are apart or only touch.
pub fn polygon_penetration(a: &[Position], b: &[Position]) -> f32 {
    let mut min_overlap = f32::MAX;
    for polygon in [a, b] {
        for (i, start) in polygon.iter().enumerate() {
            let end = &polygon[(i + 1) % polygon.len()];
            let edge = end.sub(start);
            let axis = Position::new(-edge.y, edge.x);
            let len = axis.length();
            if len < EPSILON {
                continue;
            }
            let axis = axis.scale(1.0 / len);
            let (a_min, a_max) = project(a, &axis);
            let (b_min, b_max) = project(b, &axis);
            let overlap = a_max.min(b_max) - a_min.max(b_min);
            if overlap <= 0.0 {
                return 0.0;
            }
            min_overlap = min_overlap.min(overlap);
        }
    }
    if min_overlap == f32::MAX {
        0.0
    } else {
        min_overlap
    }
}

/// Separating axis test for convex polygons
pub fn polygons_overlap(a: &[Position], b: &[Position]) -> bool {
    polygon_penetration(a, b) > 1e-3
}

fn project(polygon: &[Position], axis: &Position) -> (f32, f32) {
    polygon
        .iter()
        .map(|p| p.dot(axis))
        .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// Length of a polyline
pub fn polyline_length(points: &[Position]) -> f32 {
    points.windows(2).map(|w| w[0].distance(&w[1])).sum()
}
