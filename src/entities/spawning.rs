use rand::Rng;
use rand_distr::{Distribution, UnitCircle};

use crate::config::{AGED_ITEM_REMOVAL_PROBABILITY, SPAWN_MARGIN};
use crate::helpers::config_parser::WorldConfig;
use crate::helpers::vector::Vector2D;

use super::{Body, EntityKind, Item};

/// Food or poison with equal odds, away from the world edges.
pub fn spawn_item<R: Rng>(id: usize, config: &WorldConfig, rng: &mut R) -> Item {
    let x = rng.gen_range(SPAWN_MARGIN..(config.width - SPAWN_MARGIN).max(SPAWN_MARGIN + 1.0));
    let y = rng.gen_range(SPAWN_MARGIN..(config.height - SPAWN_MARGIN).max(SPAWN_MARGIN + 1.0));
    let kind = if rng.gen_bool(0.5) {
        EntityKind::Food
    } else {
        EntityKind::Poison
    };
    let velocity = if config.item_speed > 0.0 {
        let [vx, vy]: [f32; 2] = UnitCircle.sample(rng);
        Vector2D::new(vx, vy) * config.item_speed
    } else {
        Vector2D::ZERO
    };
    Item {
        body: Body {
            id,
            kind,
            position: Vector2D::new(x, y),
            radius: config.item_radius,
            velocity,
        },
        age: 0,
    }
}

pub fn spawn_items<R: Rng>(
    count: usize,
    next_id: &mut usize,
    config: &WorldConfig,
    rng: &mut R,
) -> Vec<Item> {
    (0..count)
        .map(|_| {
            let item = spawn_item(*next_id, config, rng);
            *next_id += 1;
            item
        })
        .collect()
}

/// Random position inside the padded walls plus a random heading.
pub fn random_pose<R: Rng>(radius: f32, config: &WorldConfig, rng: &mut R) -> (Vector2D, f32) {
    let margin = config.pad + radius + SPAWN_MARGIN;
    let x = rng.gen_range(margin..(config.width - margin).max(margin + 1.0));
    let y = rng.gen_range(margin..(config.height - margin).max(margin + 1.0));
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    (Vector2D::new(x, y), angle)
}

/// Moves items by their velocity, bouncing off the world bounds.
pub fn move_items(items: &mut [Item], config: &WorldConfig) {
    for it in items.iter_mut() {
        let body = &mut it.body;
        body.position = body.position + body.velocity;
        if body.position.x < 1.0 {
            body.position.x = 1.0;
            body.velocity.x *= -1.0;
        }
        if body.position.x > config.width - 1.0 {
            body.position.x = config.width - 1.0;
            body.velocity.x *= -1.0;
        }
        if body.position.y < 1.0 {
            body.position.y = 1.0;
            body.velocity.y *= -1.0;
        }
        if body.position.y > config.height - 1.0 {
            body.position.y = config.height - 1.0;
            body.velocity.y *= -1.0;
        }
    }
}

/// Ages every item; items past `item_max_age` disappear with a fixed chance
/// per tick.
pub fn age_items<R: Rng>(items: &mut Vec<Item>, config: &WorldConfig, rng: &mut R) {
    items.retain_mut(|it| {
        it.age += 1;
        !(it.age > config.item_max_age && rng.gen_bool(AGED_ITEM_REMOVAL_PROBABILITY))
    });
}

#[cfg(test)]
mod spawning_tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_spawned_items_inside_world() {
        let cfg = WorldConfig {
            item_speed: 2.0,
            ..WorldConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let mut next_id = 3;
        let items = spawn_items(50, &mut next_id, &cfg, &mut rng);
        assert_eq!(next_id, 53);
        assert_eq!(items[0].body.id, 3);
        for it in &items {
            let p = it.body.position;
            assert!(p.x >= 20.0 && p.x < 680.0 && p.y >= 20.0 && p.y < 480.0);
            assert!(matches!(it.body.kind, EntityKind::Food | EntityKind::Poison));
            assert!((it.body.velocity.length() - 2.0).abs() < 1e-4);
        }
        assert!(items.iter().any(|it| it.body.kind == EntityKind::Food));
        assert!(items.iter().any(|it| it.body.kind == EntityKind::Poison));
    }

    #[test]
    fn test_items_bounce() {
        let cfg = WorldConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut item = spawn_item(0, &cfg, &mut rng);
        item.body.position = Vector2D::new(2.0, 250.0);
        item.body.velocity = Vector2D::new(-3.0, 0.0);
        let mut items = vec![item];
        move_items(&mut items, &cfg);
        assert_eq!(items[0].body.position.x, 1.0);
        assert_eq!(items[0].body.velocity.x, 3.0);
    }

    #[test]
    fn test_aged_items_expire() {
        let cfg = WorldConfig {
            item_max_age: 5,
            ..WorldConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let mut next_id = 0;
        let mut items = spawn_items(20, &mut next_id, &cfg, &mut rng);
        for _ in 0..5 {
            age_items(&mut items, &cfg, &mut rng);
        }
        assert_eq!(items.len(), 20);
        for _ in 0..500 {
            age_items(&mut items, &cfg, &mut rng);
        }
        assert!(items.is_empty());
    }

    #[test]
    fn test_pose_clear_of_walls() {
        let cfg = WorldConfig::default();
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..100 {
            let (p, angle) = random_pose(10.0, &cfg, &mut rng);
            assert!(p.x >= 40.0 && p.x <= 660.0 && p.y >= 40.0 && p.y <= 460.0);
            assert!((0.0..std::f32::consts::TAU).contains(&angle));
        }
    }
}
