use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::helpers::config_parser::{AgentConfig, AgentVariant, WorldConfig};
use crate::helpers::map::build_walls;
use crate::helpers::vector::Vector2D;
use crate::rl::{BrainError, Learner};
use crate::states::TickPhase;

use self::bbox::get_intersecting_agent;
use self::go::control_agent;
use self::preprocessing::{calculate_rewards, observe};
use self::raycast::{cast_rays, make_eyes, Eye};
use self::spawning::{age_items, move_items, random_pose, spawn_item, spawn_items};

pub mod bbox;
pub mod go;
pub mod intersect;
pub mod preprocessing;
pub mod raycast;
pub mod spawning;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Wall,
    Food,
    Poison,
    Agent,
}
impl EntityKind {
    pub fn code(self) -> i32 {
        match self {
            Self::Wall => 0,
            Self::Food => 1,
            Self::Poison => 2,
            Self::Agent => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Wall {
    pub p1: Vector2D,
    pub p2: Vector2D,
}
impl Wall {
    pub fn new(p1: Vector2D, p2: Vector2D) -> Self {
        Self { p1, p2 }
    }
}

/// Circle visible to the eyes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Body {
    pub id: usize,
    pub kind: EntityKind,
    pub position: Vector2D,
    pub radius: f32,
    pub velocity: Vector2D,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    pub body: Body,
    pub age: usize,
}

pub struct Agent {
    pub id: usize,
    pub variant: AgentVariant,
    pub position: Vector2D,
    pub old_position: Vector2D,
    pub velocity: Vector2D,
    pub angle: f32,
    pub radius: f32,
    pub eyes: Vec<Eye>,
    pub action: usize,
    pub digestion_signal: f32,
    pub phase: TickPhase,
    config: AgentConfig,
    learner: Box<dyn Learner + Send>,
}
impl Agent {
    pub fn new(
        id: usize,
        position: Vector2D,
        angle: f32,
        config: &AgentConfig,
        learner: Box<dyn Learner + Send>,
    ) -> Self {
        Self {
            id,
            variant: config.variant,
            position,
            old_position: position,
            velocity: Vector2D::ZERO,
            angle,
            radius: config.radius,
            eyes: make_eyes(
                config.eye_count,
                config.eye_spacing,
                config.eye_offset,
                config.eye_range,
            ),
            action: 0,
            digestion_signal: 0.0,
            phase: TickPhase::Sensing,
            config: config.clone(),
            learner,
        }
    }

    pub fn body(&self) -> Body {
        Body {
            id: self.id,
            kind: EntityKind::Agent,
            position: self.position,
            radius: self.radius,
            velocity: self.velocity,
        }
    }

    pub fn sense(&mut self, walls: &[Wall], bodies: &[Body]) {
        debug_assert_eq!(self.phase, TickPhase::Sensing);
        cast_rays(
            &mut self.eyes,
            self.position,
            self.angle,
            walls,
            bodies,
            Some(self.id),
        );
        self.phase = self.phase.next();
    }

    pub fn decide(&mut self) -> Result<usize, BrainError> {
        debug_assert_eq!(self.phase, TickPhase::Deciding);
        let observation = observe(&self.eyes, self.velocity, self.variant);
        self.action = self.learner.act(&observation)?;
        self.phase = self.phase.next();
        Ok(self.action)
    }

    pub fn act(&mut self, walls: &[Wall], width: f32, height: f32) {
        debug_assert_eq!(self.phase, TickPhase::Acting);
        control_agent(self, walls, width, height);
        self.phase = self.phase.next();
    }

    pub fn digest(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Food => self.digestion_signal += self.config.rewards.food,
            EntityKind::Poison => self.digestion_signal += self.config.rewards.poison,
            _ => {}
        }
    }

    /// Feeds the tick's reward to the learner and clears the accumulator.
    pub fn reward(&mut self) -> Result<f32, BrainError> {
        debug_assert_eq!(self.phase, TickPhase::Rewarding);
        let reward = calculate_rewards(&self.eyes, self.action, self.digestion_signal, &self.config);
        self.digestion_signal = 0.0;
        self.phase = self.phase.next();
        self.learner.learn(reward)?;
        Ok(reward)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
    pub fn learner(&self) -> &(dyn Learner + Send) {
        self.learner.as_ref()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickSummary {
    pub rewards: Vec<f32>,
    pub food_eaten: usize,
    pub poison_eaten: usize,
}

/// Walls, items and agents of a headless run.
pub struct World {
    pub config: WorldConfig,
    pub walls: Vec<Wall>,
    pub items: Vec<Item>,
    pub agents: Vec<Agent>,
    pub clock: usize,
    next_id: usize,
    rng: StdRng,
}
impl World {
    pub fn new(config: &WorldConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut next_id = 0;
        let items = spawn_items(config.max_items, &mut next_id, config, &mut rng);
        let walls = build_walls(config);
        debug!(walls = walls.len(), items = items.len(), "created world");
        Self {
            config: config.clone(),
            walls,
            items,
            agents: Vec::new(),
            clock: 0,
            next_id,
            rng,
        }
    }

    /// Places a new agent at a random pose and returns its id.
    pub fn add_agent(&mut self, config: &AgentConfig, learner: Box<dyn Learner + Send>) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        let (position, angle) = random_pose(config.radius, &self.config, &mut self.rng);
        self.agents.push(Agent::new(id, position, angle, config, learner));
        id
    }

    pub fn bodies(&self) -> Vec<Body> {
        self.items
            .iter()
            .map(|it| it.body)
            .chain(self.agents.iter().map(|a| a.body()))
            .collect()
    }

    pub fn tick(&mut self) -> Result<TickSummary, BrainError> {
        self.clock += 1;
        let mut summary = TickSummary::default();

        let bodies = self.bodies();
        for agent in self.agents.iter_mut() {
            agent.sense(&self.walls, &bodies);
        }
        for agent in self.agents.iter_mut() {
            agent.decide()?;
        }
        for agent in self.agents.iter_mut() {
            agent.act(&self.walls, self.config.width, self.config.height);
        }

        move_items(&mut self.items, &self.config);
        let agent_bodies = self.agents.iter().map(|a| a.body()).collect::<Vec<_>>();
        let walls = &self.walls;
        let agents = &mut self.agents;
        self.items.retain(|it| {
            match get_intersecting_agent(&it.body, &agent_bodies, walls) {
                Some(idx) => {
                    agents[idx].digest(it.body.kind);
                    match it.body.kind {
                        EntityKind::Food => summary.food_eaten += 1,
                        EntityKind::Poison => summary.poison_eaten += 1,
                        _ => {}
                    }
                    false
                }
                None => true,
            }
        });
        age_items(&mut self.items, &self.config, &mut self.rng);
        if self.items.len() < self.config.max_items
            && self.clock % self.config.spawn_interval.max(1) == 0
            && self.rng.gen::<f32>() < self.config.spawn_probability
        {
            let item = spawn_item(self.next_id, &self.config, &mut self.rng);
            self.next_id += 1;
            self.items.push(item);
        }

        for agent in self.agents.iter_mut() {
            summary.rewards.push(agent.reward()?);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod entities_tests {
    use super::*;
    use crate::helpers::config_parser::TabularConfig;
    use crate::rl::brain::brain_tests::{config, stub_brain};
    use crate::rl::tabular::TabularQLearner;

    /// Always drives straight ahead.
    struct Forward {
        observations: Vec<Vec<f32>>,
        rewards: Vec<f32>,
    }
    impl Learner for Forward {
        fn act(&mut self, observation: &[f32]) -> Result<usize, BrainError> {
            self.observations.push(observation.to_vec());
            Ok(0)
        }
        fn learn(&mut self, reward: f32) -> Result<(), BrainError> {
            self.rewards.push(reward);
            Ok(())
        }
        fn epsilon(&self) -> f32 {
            0.0
        }
        fn save(&self, _dir: &std::path::Path) -> Result<std::path::PathBuf, BrainError> {
            Err(BrainError::Snapshot("not persistent".to_string()))
        }
    }

    fn empty_world() -> World {
        World::new(&WorldConfig {
            max_items: 0,
            interior_walls: false,
            spawn_probability: 0.0,
            seed: Some(3),
            ..WorldConfig::default()
        })
    }

    fn food(id: usize, x: f32, y: f32) -> Item {
        Item {
            body: Body {
                id,
                kind: EntityKind::Food,
                position: Vector2D::new(x, y),
                radius: 10.0,
                velocity: Vector2D::ZERO,
            },
            age: 0,
        }
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(EntityKind::Wall.code(), 0);
        assert_eq!(EntityKind::Food.code(), 1);
        assert_eq!(EntityKind::Poison.code(), 2);
        assert_eq!(EntityKind::Agent.code(), 3);
    }

    #[test]
    fn test_agent_eats_food_in_reach() {
        let mut world = empty_world();
        let cfg = AgentConfig {
            rewards: crate::helpers::config_parser::RewardsConfig {
                proximity_shaping: false,
                ..Default::default()
            },
            ..AgentConfig::default()
        };
        world.add_agent(
            &cfg,
            Box::new(Forward {
                observations: Vec::new(),
                rewards: Vec::new(),
            }),
        );
        let p = world.agents[0].position;
        world.items.push(food(100, p.x, p.y));
        let summary = world.tick().unwrap();
        assert_eq!(summary.food_eaten, 1);
        assert_eq!(summary.rewards, vec![5.0]);
        assert!(world.items.is_empty());
        assert_eq!(world.agents[0].digestion_signal, 0.0);
        assert_eq!(world.agents[0].phase, TickPhase::Sensing);
    }

    #[test]
    fn test_wall_blocks_eating() {
        let mut world = empty_world();
        world.add_agent(
            &AgentConfig::default(),
            Box::new(Forward {
                observations: Vec::new(),
                rewards: Vec::new(),
            }),
        );
        let agent_body = world.agents[0].body();
        let mut item = food(100, agent_body.position.x + 15.0, agent_body.position.y);
        item.body.kind = EntityKind::Poison;
        let x = agent_body.position.x + 7.0;
        let walls = [Wall::new(
            Vector2D::new(x, agent_body.position.y - 30.0),
            Vector2D::new(x, agent_body.position.y + 30.0),
        )];
        assert_eq!(get_intersecting_agent(&item.body, &[agent_body], &walls), None);
        assert_eq!(get_intersecting_agent(&item.body, &[agent_body], &[]), Some(0));
    }

    #[test]
    fn test_world_runs_with_learners() {
        let mut world = World::new(&WorldConfig {
            seed: Some(8),
            ..WorldConfig::default()
        });
        let agent_cfg = AgentConfig::default();
        let states = preprocessing::observation_size(&agent_cfg);
        let actions = go::num_actions(agent_cfg.variant);
        world.add_agent(&agent_cfg, Box::new(stub_brain(states, actions, &config(100, 10, 4))));
        world.add_agent(
            &agent_cfg,
            Box::new(TabularQLearner::new(actions, &TabularConfig::default()).unwrap()),
        );
        assert_eq!(world.items.len(), 30);
        for _ in 0..300 {
            let summary = world.tick().unwrap();
            assert_eq!(summary.rewards.len(), 2);
            assert!(world.items.len() <= 30);
            for agent in &world.agents {
                assert!(agent.action < actions);
                assert!(agent.position.x >= 1.0 && agent.position.x <= 699.0);
                assert!(agent.position.y >= 1.0 && agent.position.y <= 499.0);
            }
        }
        assert_eq!(world.clock, 300);
    }
}
