use super::{intersect::wall_hit, Body, Wall};

pub fn circles_overlap(a: &Body, b: &Body) -> bool {
    a.position.distance_to(b.position) < a.radius + b.radius
}

/// Index of the first agent touching `item` with no wall in between.
pub fn get_intersecting_agent(item: &Body, agents: &[Body], walls: &[Wall]) -> Option<usize> {
    agents.iter().position(|a| {
        circles_overlap(a, item) && wall_hit(a.position, item.position, walls).is_none()
    })
}
