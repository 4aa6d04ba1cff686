//! Tabular Q-learning / SARSA over quantized observations.
//!
//! The update for a transition is applied lazily: `learn` stores the
//! reward, and the next `act` supplies `s1` (and `a1` for SARSA).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::helpers::config_parser::{TabularConfig, UpdateRule};

use super::brain::argmax;
use super::model_helpers::save_json;
use super::{BrainError, Learner};

pub const SNAPSHOT_PREFIX: &str = "tabular";

fn build_rng(seed: Option<u64>) -> StdRng {
    if let Some(seed) = seed {
        StdRng::seed_from_u64(seed)
    } else {
        StdRng::from_entropy()
    }
}

/// Bucket index of every slot, joined into a table key.
pub fn quantize(observation: &[f32], bins: usize) -> String {
    observation
        .iter()
        .map(|v| {
            let b = (v.clamp(0.0, 1.0) * bins as f32).floor() as usize;
            b.min(bins - 1).to_string()
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Action values per quantized state. Unseen states read as `q_init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QTable {
    values: HashMap<String, Vec<f32>>,
    num_actions: usize,
    q_init: f32,
}
impl QTable {
    pub fn new(num_actions: usize, q_init: f32) -> Self {
        Self {
            values: HashMap::new(),
            num_actions,
            q_init,
        }
    }
    pub fn row(&self, state: &str) -> Vec<f32> {
        self.values
            .get(state)
            .cloned()
            .unwrap_or_else(|| vec![self.q_init; self.num_actions])
    }
    pub fn get(&self, state: &str, action: usize) -> f32 {
        self.values
            .get(state)
            .map(|row| row[action])
            .unwrap_or(self.q_init)
    }
    pub fn set(&mut self, state: &str, action: usize, value: f32) {
        let (n, init) = (self.num_actions, self.q_init);
        self.values
            .entry(state.to_string())
            .or_insert_with(|| vec![init; n])[action] = value;
    }
    pub fn size(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularSnapshot {
    pub table: QTable,
    pub epsilon: f32,
    pub steps: usize,
    pub config: TabularConfig,
}

fn validate(num_actions: usize, config: &TabularConfig) -> Result<(), BrainError> {
    let fail = |msg: String| Err(BrainError::Configuration(msg));
    if num_actions == 0 {
        return fail("num_actions must be non-zero".to_string());
    }
    if config.bins == 0 {
        return fail("bins must be non-zero".to_string());
    }
    if !(config.alpha > 0.0 && config.alpha <= 1.0) {
        return fail(format!("alpha {} outside (0, 1]", config.alpha));
    }
    if !(0.0..=1.0).contains(&config.gamma) {
        return fail(format!("gamma {} outside [0, 1]", config.gamma));
    }
    if !(0.0..=1.0).contains(&config.epsilon) || config.epsilon_min > config.epsilon {
        return fail(format!(
            "epsilon {} must lie in [epsilon_min {}, 1]",
            config.epsilon, config.epsilon_min
        ));
    }
    if !(config.epsilon_decay > 0.0 && config.epsilon_decay <= 1.0) {
        return fail(format!("epsilon_decay {} outside (0, 1]", config.epsilon_decay));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct TabularQLearner {
    num_actions: usize,
    config: TabularConfig,
    table: QTable,
    epsilon: f32,
    steps: usize,
    learning: bool,
    /// State and action of the last `act`.
    current: Option<(String, usize)>,
    /// Transition waiting for its successor state.
    pending: Option<(String, usize, f32)>,
    rng: StdRng,
}

impl TabularQLearner {
    pub fn new(num_actions: usize, config: &TabularConfig) -> Result<Self, BrainError> {
        validate(num_actions, config)?;
        Ok(Self {
            num_actions,
            config: config.clone(),
            table: QTable::new(num_actions, config.q_init),
            epsilon: config.epsilon,
            steps: 0,
            learning: true,
            current: None,
            pending: None,
            rng: build_rng(config.seed),
        })
    }

    /// Restores a saved table with exploration frozen at `epsilon_min`.
    pub fn from_snapshot(snapshot: TabularSnapshot) -> Result<Self, BrainError> {
        let mut learner = Self::new(snapshot.table.num_actions, &snapshot.config)?;
        learner.table = snapshot.table;
        learner.steps = snapshot.steps;
        learner.set_learning(false);
        Ok(learner)
    }

    pub fn snapshot(&self) -> TabularSnapshot {
        TabularSnapshot {
            table: self.table.clone(),
            epsilon: self.epsilon,
            steps: self.steps,
            config: self.config.clone(),
        }
    }

    pub fn set_learning(&mut self, learning: bool) {
        self.learning = learning;
        if !learning {
            self.epsilon = self.config.epsilon_min;
            self.pending = None;
        }
    }

    fn update(&mut self, s0: &str, a0: usize, r0: f32, s1: &str, a1: usize) {
        let next = match self.config.rule {
            UpdateRule::QLearning => argmax(&self.table.row(s1)).1,
            UpdateRule::Sarsa => self.table.get(s1, a1),
        };
        let q = self.table.get(s0, a0);
        let mut tderror = r0 + self.config.gamma * next - q;
        if self.config.tderror_clamp > 0.0 {
            tderror = tderror.clamp(-self.config.tderror_clamp, self.config.tderror_clamp);
        }
        self.table.set(s0, a0, q + self.config.alpha * tderror);
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
    pub fn steps(&self) -> usize {
        self.steps
    }
    pub fn learning(&self) -> bool {
        self.learning
    }
    pub fn table(&self) -> &QTable {
        &self.table
    }
    pub fn table_mut(&mut self) -> &mut QTable {
        &mut self.table
    }
}

impl Learner for TabularQLearner {
    fn act(&mut self, observation: &[f32]) -> Result<usize, BrainError> {
        let state = quantize(observation, self.config.bins);
        let action = if self.rng.gen::<f32>() < self.epsilon {
            self.rng.gen_range(0..self.num_actions)
        } else {
            argmax(&self.table.row(&state)).0
        };
        if let Some((s0, a0, r0)) = self.pending.take() {
            self.update(&s0, a0, r0, &state, action);
        }
        self.current = Some((state, action));
        Ok(action)
    }

    fn learn(&mut self, reward: f32) -> Result<(), BrainError> {
        if !self.learning {
            return Ok(());
        }
        if let Some((state, action)) = self.current.take() {
            self.pending = Some((state, action, reward));
        }
        self.steps += 1;
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        if self.steps % 10000 == 0 {
            debug!(
                steps = self.steps,
                epsilon = self.epsilon,
                states = self.table.size(),
                "tabular learner progress"
            );
        }
        Ok(())
    }

    fn epsilon(&self) -> f32 {
        self.epsilon
    }

    fn save(&self, dir: &Path) -> Result<PathBuf, BrainError> {
        save_json(dir, SNAPSHOT_PREFIX, &self.snapshot())
    }
}

#[cfg(test)]
mod tabular_tests {
    use super::*;

    fn greedy_config() -> TabularConfig {
        TabularConfig {
            alpha: 0.5,
            gamma: 0.9,
            epsilon: 0.0,
            epsilon_min: 0.0,
            seed: Some(4),
            ..TabularConfig::default()
        }
    }

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(&[0.0, 0.3, 0.99, 1.0, 7.0, -2.0], 4), "0,1,3,3,3,0");
        assert_eq!(quantize(&[0.5], 1), "0");
    }

    #[test]
    fn test_epsilon_decays_monotonically() {
        let cfg = TabularConfig {
            epsilon_decay: 0.9,
            epsilon_min: 0.2,
            seed: Some(1),
            ..TabularConfig::default()
        };
        let mut learner = TabularQLearner::new(3, &cfg).unwrap();
        let mut last = learner.epsilon();
        for i in 0..100 {
            let action = learner.act(&[i as f32 / 100.0, 0.5]).unwrap();
            assert!(action < 3);
            learner.learn(0.1).unwrap();
            assert!(learner.epsilon() <= last);
            assert!(learner.epsilon() >= 0.2);
            last = learner.epsilon();
        }
        assert_eq!(learner.epsilon(), 0.2);
    }

    #[test]
    fn test_update_waits_for_next_state() {
        let mut learner = TabularQLearner::new(2, &greedy_config()).unwrap();
        assert_eq!(learner.act(&[0.0]).unwrap(), 0);
        learner.learn(1.0).unwrap();
        assert_eq!(learner.table().size(), 0);
        learner.act(&[0.9]).unwrap();
        assert_eq!(learner.table().get("0", 0), 0.5);
    }

    #[test]
    fn test_tderror_is_clamped() {
        let mut learner = TabularQLearner::new(2, &greedy_config()).unwrap();
        learner.act(&[0.0]).unwrap();
        learner.learn(10.0).unwrap();
        learner.act(&[0.0]).unwrap();
        assert_eq!(learner.table().get("0", 0), 0.5);
    }

    #[test]
    fn test_update_rules() {
        let mut q = TabularQLearner::new(2, &greedy_config()).unwrap();
        q.table_mut().set("1", 0, 0.2);
        q.table_mut().set("1", 1, 0.8);
        q.update("0", 0, 0.0, "1", 0);
        assert!((q.table().get("0", 0) - 0.5 * 0.9 * 0.8).abs() < 1e-6);

        let mut sarsa = TabularQLearner::new(
            2,
            &TabularConfig {
                rule: UpdateRule::Sarsa,
                ..greedy_config()
            },
        )
        .unwrap();
        sarsa.table_mut().set("1", 0, 0.2);
        sarsa.table_mut().set("1", 1, 0.8);
        sarsa.update("0", 0, 0.0, "1", 0);
        assert!((sarsa.table().get("0", 0) - 0.5 * 0.9 * 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_snapshot_freezes_exploration() {
        let mut learner = TabularQLearner::new(2, &greedy_config()).unwrap();
        learner.act(&[0.0]).unwrap();
        learner.learn(1.0).unwrap();
        learner.act(&[0.6]).unwrap();
        let json = serde_json::to_string(&learner.snapshot()).unwrap();
        let snapshot: TabularSnapshot = serde_json::from_str(&json).unwrap();
        let mut restored = TabularQLearner::from_snapshot(snapshot).unwrap();
        assert_eq!(restored.table(), learner.table());
        assert!(!restored.learning());
        restored.act(&[0.0]).unwrap();
        restored.learn(5.0).unwrap();
        restored.act(&[0.0]).unwrap();
        assert_eq!(restored.table().get("0", 0), 0.5);
        assert_eq!(restored.steps(), 1);

        // Resuming picks the lagged update back up
        let frozen = restored.table().clone();
        restored.set_learning(true);
        restored.act(&[0.0]).unwrap();
        restored.learn(5.0).unwrap();
        restored.act(&[0.0]).unwrap();
        assert!(restored.learning());
        assert_eq!(restored.steps(), 2);
        assert_ne!(restored.table(), &frozen);
    }

    #[test]
    fn test_invalid_config() {
        let bad = TabularConfig {
            bins: 0,
            ..TabularConfig::default()
        };
        assert!(matches!(
            TabularQLearner::new(2, &bad),
            Err(BrainError::Configuration(_))
        ));
        let bad = TabularConfig {
            epsilon: 0.01,
            epsilon_min: 0.05,
            ..TabularConfig::default()
        };
        assert!(TabularQLearner::new(2, &bad).is_err());
        assert!(TabularQLearner::new(0, &TabularConfig::default()).is_err());
    }
}
