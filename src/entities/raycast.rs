use rayon::prelude::*;

use crate::helpers::vector::Vector2D;

use super::{intersect::nearest_hit, Body, EntityKind, Wall};

/// Last reading of an eye.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayDetection {
    pub detection: Option<EntityKind>,
    pub distance: f32,
    pub velocity: Vector2D,
}
impl RayDetection {
    pub fn none(max_range: f32) -> Self {
        Self {
            detection: None,
            distance: max_range,
            velocity: Vector2D::ZERO,
        }
    }
    pub fn is_none(&self) -> bool {
        self.detection.is_none()
    }
    /// -1 when nothing was sensed.
    pub fn type_code(&self) -> i32 {
        self.detection.map_or(-1, |d| d.code())
    }
}

/// Ray sensor at a fixed angle relative to its owner's heading.
#[derive(Clone, Debug)]
pub struct Eye {
    pub angle: f32,
    pub max_range: f32,
    pub reading: RayDetection,
}
impl Eye {
    pub fn new(angle: f32, max_range: f32) -> Self {
        Self {
            angle,
            max_range,
            reading: RayDetection::none(max_range),
        }
    }

    /// End point of the ray for an owner at `location` facing `heading`.
    pub fn ray_end(&self, location: Vector2D, heading: f32) -> Vector2D {
        location + Vector2D::new(self.max_range, 0.0).rotate(heading + self.angle)
    }

    pub fn sense(
        &mut self,
        location: Vector2D,
        heading: f32,
        walls: &[Wall],
        bodies: &[Body],
        owner: Option<usize>,
    ) -> RayDetection {
        let end = self.ray_end(location, heading);
        self.reading = match nearest_hit(location, end, walls, bodies, owner) {
            Some(hit) => RayDetection {
                detection: Some(hit.kind),
                distance: hit.distance,
                velocity: hit.velocity,
            },
            None => RayDetection::none(self.max_range),
        };
        self.reading
    }
}

/// Evenly spaced eyes, the k-th at `(k - offset) * spacing`.
pub fn make_eyes(count: usize, spacing: f32, offset: f32, max_range: f32) -> Vec<Eye> {
    (0..count)
        .map(|k| Eye::new((k as f32 - offset) * spacing, max_range))
        .collect()
}

pub fn cast_rays(
    eyes: &mut [Eye],
    location: Vector2D,
    heading: f32,
    walls: &[Wall],
    bodies: &[Body],
    owner: Option<usize>,
) {
    eyes.par_iter_mut().for_each(|eye| {
        eye.sense(location, heading, walls, bodies, owner);
    });
}
