use crate::config::{
    FORWARD_BONUS, NUM_TYPES, PROPRIOCEPTION_SLOTS, PROXIMITY_FORWARD_THRESHOLD, VELOCITY_SLOTS,
};
use crate::helpers::config_parser::{AgentConfig, AgentVariant};
use crate::helpers::vector::Vector2D;

use super::{raycast::Eye, EntityKind};

/// Slots per eye; holonomic agents also see the sensed object's velocity.
pub fn slots_per_eye(variant: AgentVariant) -> usize {
    match variant {
        AgentVariant::DifferentialDrive => NUM_TYPES,
        AgentVariant::Holonomic => NUM_TYPES + VELOCITY_SLOTS,
    }
}

pub fn proprioception_slots(variant: AgentVariant) -> usize {
    match variant {
        AgentVariant::DifferentialDrive => 0,
        AgentVariant::Holonomic => PROPRIOCEPTION_SLOTS,
    }
}

pub fn observation_size(config: &AgentConfig) -> usize {
    config.eye_count * slots_per_eye(config.variant) + proprioception_slots(config.variant)
}

/**
 * Per eye, the slot of the sensed kind holds `distance / max_range` and the
 * other type slots stay at 1.0. Kinds without a slot (other agents) leave
 * all of them at 1.0. Velocity and proprioception slots are raw.
 */
pub fn observe(eyes: &[Eye], velocity: Vector2D, variant: AgentVariant) -> Vec<f32> {
    let slots = slots_per_eye(variant);
    let mut data = vec![1.0; eyes.len() * slots + proprioception_slots(variant)];
    for (i, eye) in eyes.iter().enumerate() {
        let offset = i * slots;
        let reading = &eye.reading;
        if let Some(kind) = reading.detection {
            let code = kind.code() as usize;
            if code < NUM_TYPES {
                data[offset + code] = reading.distance / eye.max_range;
            }
        }
        if slots > NUM_TYPES {
            data[offset + NUM_TYPES] = reading.velocity.x;
            data[offset + NUM_TYPES + 1] = reading.velocity.y;
        }
    }
    if proprioception_slots(variant) > 0 {
        let n = eyes.len() * slots;
        data[n] = velocity.x;
        data[n + 1] = velocity.y;
    }
    data
}

/// Mean wall proximity over the eyes, doubled and capped at 1.
pub fn proximity(eyes: &[Eye]) -> f32 {
    if eyes.is_empty() {
        return 0.0;
    }
    let total: f32 = eyes
        .iter()
        .map(|e| match e.reading.detection {
            Some(EntityKind::Wall) => e.reading.distance / e.max_range,
            _ => 1.0,
        })
        .sum();
    (total / eyes.len() as f32 * 2.0).min(1.0)
}

pub fn calculate_rewards(eyes: &[Eye], action: usize, digestion: f32, config: &AgentConfig) -> f32 {
    let mut reward = digestion;
    if config.rewards.proximity_shaping && config.variant == AgentVariant::DifferentialDrive {
        let proximity_reward = proximity(eyes);
        reward += proximity_reward;
        // Going straight while the way is clear
        if action == 0 && proximity_reward > PROXIMITY_FORWARD_THRESHOLD {
            reward += FORWARD_BONUS * proximity_reward;
        }
    }
    reward
}

#[cfg(test)]
mod preprocessing_tests {
    use super::*;
    use crate::entities::raycast::RayDetection;

    fn eye(detection: Option<EntityKind>, distance: f32) -> Eye {
        let mut e = Eye::new(0.0, 100.0);
        e.reading = RayDetection {
            detection,
            distance,
            velocity: Vector2D::new(0.5, -1.5),
        };
        e
    }

    #[test]
    fn test_observation_layout() {
        let eyes = [
            eye(Some(EntityKind::Food), 25.0),
            eye(None, 100.0),
            eye(Some(EntityKind::Agent), 10.0),
        ];
        let obs = observe(&eyes, Vector2D::ZERO, AgentVariant::DifferentialDrive);
        assert_eq!(obs, vec![1.0, 0.25, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_observation_with_velocities() {
        let eyes = [eye(Some(EntityKind::Wall), 50.0)];
        let obs = observe(&eyes, Vector2D::new(2.0, 3.0), AgentVariant::Holonomic);
        assert_eq!(obs, vec![0.5, 1.0, 1.0, 0.5, -1.5, 2.0, 3.0]);
        let cfg = AgentConfig {
            variant: AgentVariant::Holonomic,
            eye_count: 30,
            ..AgentConfig::default()
        };
        assert_eq!(observation_size(&cfg), 152);
        assert_eq!(observation_size(&AgentConfig::default()), 27);
    }

    #[test]
    fn test_proximity_reward() {
        let clear = [eye(None, 100.0), eye(Some(EntityKind::Food), 10.0)];
        let cfg = AgentConfig::default();
        assert_eq!(proximity(&clear), 1.0);
        assert!((calculate_rewards(&clear, 0, 0.0, &cfg) - 1.1).abs() < 1e-6);
        assert_eq!(calculate_rewards(&clear, 1, 5.0, &cfg), 6.0);

        let blocked = [eye(Some(EntityKind::Wall), 10.0), eye(Some(EntityKind::Wall), 20.0)];
        assert!((proximity(&blocked) - 0.3).abs() < 1e-6);
        assert!((calculate_rewards(&blocked, 0, -6.0, &cfg) - (-5.7)).abs() < 1e-5);

        let holonomic = AgentConfig {
            variant: AgentVariant::Holonomic,
            ..AgentConfig::default()
        };
        assert_eq!(calculate_rewards(&blocked, 0, 5.0, &holonomic), 5.0);
    }
}
