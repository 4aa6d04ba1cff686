use std::f32::consts::PI;

use crate::config::{HOLONOMIC_ACTIONS, WHEEL_SPEEDS};
use crate::helpers::config_parser::AgentVariant;
use crate::helpers::map::clamp_to_world;
use crate::helpers::vector::Vector2D;

use super::{intersect::wall_hit, Agent, Wall};

pub fn num_actions(variant: AgentVariant) -> usize {
    match variant {
        AgentVariant::DifferentialDrive => WHEEL_SPEEDS.len(),
        AgentVariant::Holonomic => HOLONOMIC_ACTIONS,
    }
}

fn wrap_angle(mut angle: f32) -> f32 {
    angle %= 2.0 * PI;
    if angle < 0.0 {
        angle += 2.0 * PI;
    }
    angle
}

/**
 * Each wheel sits half a radius from the center and rotates the body
 * around the other wheel by its own speed.
 */
fn drive(agent: &mut Agent, speed: f32) {
    let [rot1, rot2] = WHEEL_SPEEDS[agent.action].map(|w| w * speed);
    let v = Vector2D::new(0.0, -agent.radius / 2.0).rotate(agent.angle);
    let w1p = agent.position + v;
    let w2p = agent.position - v;
    let mut np = w2p + (agent.position - w2p).rotate(-rot1);
    np.scale(0.5);
    let mut np2 = w1p + (agent.position - w1p).rotate(rot2);
    np2.scale(0.5);
    let new_position = np + np2;
    agent.velocity = new_position - agent.position;
    agent.position = new_position;
    agent.angle = wrap_angle(agent.angle - rot1 + rot2);
}

/// Actions nudge the velocity along -x, +x, -y, +y.
fn push(agent: &mut Agent, speed: f32, max_speed: f32, friction: f32) {
    match agent.action {
        0 => agent.velocity.x -= speed,
        1 => agent.velocity.x += speed,
        2 => agent.velocity.y -= speed,
        _ => agent.velocity.y += speed,
    }
    agent.velocity.scale(friction);
    if agent.velocity.length() > max_speed {
        agent.velocity.normalize();
        agent.velocity.scale(max_speed);
    }
    agent.position = agent.position + agent.velocity;
}

/// Moves the agent by its chosen action. Crossing a wall restores the old
/// position, then the position is clamped to the world.
pub fn control_agent(agent: &mut Agent, walls: &[Wall], width: f32, height: f32) {
    let (speed, max_speed, friction) = {
        let cfg = agent.config();
        (cfg.speed, cfg.max_speed, cfg.friction)
    };
    agent.old_position = agent.position;
    match agent.variant {
        AgentVariant::DifferentialDrive => drive(agent, speed),
        AgentVariant::Holonomic => push(agent, speed, max_speed, friction),
    }
    if wall_hit(agent.old_position, agent.position, walls).is_some() {
        agent.position = agent.old_position;
        if agent.variant == AgentVariant::Holonomic {
            agent.velocity = Vector2D::ZERO;
        }
    }
    let clamped = clamp_to_world(agent.position, width, height);
    if clamped != agent.position && agent.variant == AgentVariant::Holonomic {
        agent.velocity = Vector2D::ZERO;
    }
    agent.position = clamped;
}
