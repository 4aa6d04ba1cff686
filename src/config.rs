/// Left and right wheel speeds of the differential drive actions.
pub const WHEEL_SPEEDS: [[f32; 2]; 5] = [[1.0, 1.0], [0.8, 1.0], [1.0, 0.8], [0.5, 0.0], [0.0, 0.5]];
pub const HOLONOMIC_ACTIONS: usize = 4;

/// Sensed kinds with their own observation slot: wall, food, poison.
pub const NUM_TYPES: usize = 3;
/// Extra per-eye slots carrying the sensed object's velocity.
pub const VELOCITY_SLOTS: usize = 2;
pub const PROPRIOCEPTION_SLOTS: usize = 2;

pub const PROXIMITY_FORWARD_THRESHOLD: f32 = 0.75;
pub const FORWARD_BONUS: f32 = 0.1;

pub const SPAWN_MARGIN: f32 = 20.0;
pub const AGED_ITEM_REMOVAL_PROBABILITY: f64 = 0.1;
/// Distance kept from the world bounds after clamping.
pub const BOUNDARY_EPSILON: f32 = 1.0;
