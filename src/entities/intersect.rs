use crate::helpers::vector::Vector2D;

use super::{Body, EntityKind, Wall};

/// Intersection of a segment `from -> to` with something, `t` being the
/// fraction along the segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Intercept {
    pub t: f32,
    pub point: Vector2D,
}

/// Closest object struck by a ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Collision {
    pub kind: EntityKind,
    pub t: f32,
    pub distance: f32,
    pub point: Vector2D,
    pub velocity: Vector2D,
}

/**
 * Both parametric coordinates must lie in the open interval (0, 1), so
 * touching an endpoint is not a hit. Parallel segments (denominator exactly
 * zero) never intersect.
 */
pub fn segment_intersect(
    from1: Vector2D,
    to1: Vector2D,
    from2: Vector2D,
    to2: Vector2D,
) -> Option<Intercept> {
    let x1 = from1.x;
    let y1 = from1.y;
    let x2 = to1.x;
    let y2 = to1.y;
    let x3 = from2.x;
    let y3 = from2.y;
    let x4 = to2.x;
    let y4 = to2.y;

    let x1mx3 = x1 - x3;
    let y3my4 = y3 - y4;
    let y1my3 = y1 - y3;
    let x3mx4 = x3 - x4;
    let x1mx2 = x1 - x2;
    let y1my2 = y1 - y2;

    let den = x1mx2 * y3my4 - y1my2 * x3mx4;
    if den == 0.0 {
        return None;
    }
    let t = (x1mx3 * y3my4 - y1my3 * x3mx4) / den;
    let u = (x1mx3 * y1my2 - y1my3 * x1mx2) / den;

    if t > 0.0 && t < 1.0 && u > 0.0 && u < 1.0 {
        Some(Intercept {
            t,
            point: Vector2D::new(x1 + t * (x2 - x1), y1 + t * (y2 - y1)),
        })
    } else {
        None
    }
}

/// Perpendicular distance test of a circle against a segment. The reported
/// point is the projection of the center onto the segment.
pub fn segment_circle_intersect(
    from: Vector2D,
    to: Vector2D,
    center: Vector2D,
    radius: f32,
) -> Option<Intercept> {
    let seg = to - from;
    let len_sq = seg.dot(seg);
    if len_sq == 0.0 {
        return None;
    }
    let cross = (seg.x * (from.y - center.y) - (from.x - center.x) * seg.y).abs();
    let dist = cross / len_sq.sqrt();
    if dist > radius {
        return None;
    }
    let t = (center - from).dot(seg) / len_sq;
    if t > 0.0 && t < 1.0 {
        Some(Intercept {
            t,
            point: from + seg * t,
        })
    } else {
        None
    }
}

fn closer(best: &Option<Collision>, t: f32) -> bool {
    match best {
        Some(b) => t < b.t,
        None => true,
    }
}

/// Nearest wall along `from -> to`, if any.
pub fn wall_hit(from: Vector2D, to: Vector2D, walls: &[Wall]) -> Option<Collision> {
    nearest_hit(from, to, walls, &[], None)
}

/**
 * Walls are checked before bodies, in slice order. Equal distances keep the
 * first hit found. `exclude` skips the body with that id (the caster).
 */
pub fn nearest_hit(
    from: Vector2D,
    to: Vector2D,
    walls: &[Wall],
    bodies: &[Body],
    exclude: Option<usize>,
) -> Option<Collision> {
    let mut best: Option<Collision> = None;
    for wall in walls {
        if let Some(intercept) = segment_intersect(from, to, wall.p1, wall.p2) {
            if closer(&best, intercept.t) {
                best = Some(Collision {
                    kind: EntityKind::Wall,
                    t: intercept.t,
                    distance: intercept.point.distance_to(from),
                    point: intercept.point,
                    velocity: Vector2D::ZERO,
                });
            }
        }
    }
    for body in bodies {
        if exclude == Some(body.id) {
            continue;
        }
        if let Some(intercept) = segment_circle_intersect(from, to, body.position, body.radius) {
            if closer(&best, intercept.t) {
                best = Some(Collision {
                    kind: body.kind,
                    t: intercept.t,
                    distance: intercept.point.distance_to(from),
                    point: intercept.point,
                    velocity: body.velocity,
                });
            }
        }
    }
    best
}
