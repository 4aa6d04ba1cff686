use crate::config::BOUNDARY_EPSILON;
use crate::entities::Wall;
use crate::helpers::config_parser::WorldConfig;

use super::vector::Vector2D;

/**
 * Adds the sides of an axis-aligned box in this order:
 * top, right, bottom, left. With `open_left` the last side is skipped.
 */
pub fn add_box(walls: &mut Vec<Wall>, x: f32, y: f32, w: f32, h: f32, open_left: bool) {
    walls.push(Wall::new(Vector2D::new(x, y), Vector2D::new(x + w, y)));
    walls.push(Wall::new(Vector2D::new(x + w, y), Vector2D::new(x + w, y + h)));
    walls.push(Wall::new(Vector2D::new(x + w, y + h), Vector2D::new(x, y + h)));
    if !open_left {
        walls.push(Wall::new(Vector2D::new(x, y + h), Vector2D::new(x, y)));
    }
}

/// Boundary box inset by `pad`, plus two open boxes when enabled.
pub fn build_walls(config: &WorldConfig) -> Vec<Wall> {
    let (w, h, pad) = (config.width, config.height, config.pad);
    let mut walls = Vec::new();
    add_box(&mut walls, pad, pad, w - pad * 2.0, h - pad * 2.0, false);
    if config.interior_walls {
        // 100x100 / 200x300 boxes on the default 700x500 world
        add_box(&mut walls, w / 7.0, h / 5.0, w * 2.0 / 7.0, h * 3.0 / 5.0, true);
        add_box(&mut walls, w * 4.0 / 7.0, h / 5.0, w * 2.0 / 7.0, h * 3.0 / 5.0, true);
    }
    walls
}

/// Keeps a point inside `[eps, width - eps] x [eps, height - eps]`.
pub fn clamp_to_world(p: Vector2D, width: f32, height: f32) -> Vector2D {
    Vector2D::new(
        p.x.clamp(BOUNDARY_EPSILON, width - BOUNDARY_EPSILON),
        p.y.clamp(BOUNDARY_EPSILON, height - BOUNDARY_EPSILON),
    )
}
