//! Temporal-difference Q-learner with experience replay.
//!
//! The network input concatenates the current observation with the last
//! `temporal_window` (observation, one-hot action) pairs. Actions are chosen
//! epsilon-greedily, epsilon decaying linearly with age after a burn-in.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::helpers::config_parser::BrainConfig;

use super::model::{BurnValueNetwork, RegressionTarget, ValueNetwork};
use super::model_helpers::save_json;
use super::{BrainError, Experience, Learner, ReplayBuffer, Window};

/// File name prefix of saved brain snapshots.
pub const SNAPSHOT_PREFIX: &str = "brain";

fn build_rng(seed: Option<u64>) -> StdRng {
    if let Some(seed) = seed {
        StdRng::seed_from_u64(seed)
    } else {
        StdRng::from_entropy()
    }
}

/// First index holding the maximum value.
pub fn argmax(values: &[f32]) -> (usize, f32) {
    let mut max_idx = 0;
    let mut max_val = values.first().copied().unwrap_or(f32::NEG_INFINITY);
    for (i, val) in values.iter().enumerate().skip(1) {
        if *val > max_val {
            max_idx = i;
            max_val = *val;
        }
    }
    (max_idx, max_val)
}

fn shift_push<T>(window: &mut VecDeque<Option<T>>, value: T) {
    window.pop_front();
    window.push_back(Some(value));
}

/// Number of network inputs for the given sizes.
pub fn net_input_size(num_states: usize, num_actions: usize, temporal_window: usize) -> usize {
    num_states * temporal_window + num_actions * temporal_window + num_states
}

/// Learner statistics for logs.
#[derive(Clone, Debug, PartialEq)]
pub struct BrainReport {
    pub experience_size: usize,
    pub epsilon: f32,
    pub age: usize,
    pub average_loss: f32,
    pub average_reward: f32,
}
impl fmt::Display for BrainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "experience replay size: {}, exploration epsilon: {:.3}, age: {}, average Q-learning loss: {:.5}, smooth-ish reward: {:.3}",
            self.experience_size, self.epsilon, self.age, self.average_loss, self.average_reward
        )
    }
}

fn validate(num_states: usize, num_actions: usize, config: &BrainConfig) -> Result<(), BrainError> {
    let fail = |msg: String| Err(BrainError::Configuration(msg));
    if num_states == 0 {
        return fail("num_states must be non-zero".to_string());
    }
    if num_actions == 0 {
        return fail("num_actions must be non-zero".to_string());
    }
    if config.experience_size == 0 {
        return fail("experience_size must be non-zero".to_string());
    }
    if config.learning_steps_total <= config.learning_steps_burnin {
        return fail(format!(
            "learning_steps_total {} must exceed learning_steps_burnin {}",
            config.learning_steps_total, config.learning_steps_burnin
        ));
    }
    if !(0.0..=1.0).contains(&config.epsilon_min) {
        return fail(format!("epsilon_min {} outside [0, 1]", config.epsilon_min));
    }
    if !(0.0..=1.0).contains(&config.epsilon_test_time) {
        return fail(format!(
            "epsilon_test_time {} outside [0, 1]",
            config.epsilon_test_time
        ));
    }
    if !config.gamma.is_finite() || config.gamma < 0.0 {
        return fail(format!("gamma {} must be a non-negative number", config.gamma));
    }
    let trainer = &config.trainer;
    if trainer.batch_size == 0 {
        return fail("trainer batch_size must be non-zero".to_string());
    }
    if !(trainer.learning_rate > 0.0 && trainer.learning_rate.is_finite()) {
        return fail(format!("learning_rate {} must be positive", trainer.learning_rate));
    }
    if !(0.0..1.0).contains(&trainer.momentum) {
        return fail(format!("momentum {} outside [0, 1)", trainer.momentum));
    }
    if trainer.l2_decay < 0.0 {
        return fail(format!("l2_decay {} must not be negative", trainer.l2_decay));
    }
    if let Some(dist) = &config.random_action_distribution {
        if dist.len() != num_actions {
            return fail(format!(
                "random_action_distribution has {} entries, expected {num_actions}",
                dist.len()
            ));
        }
        if dist.iter().any(|p| *p < 0.0) {
            return fail("random_action_distribution has negative entries".to_string());
        }
        let sum: f32 = dist.iter().sum();
        if (sum - 1.0).abs() > 1e-4 {
            return fail(format!(
                "random_action_distribution sums to {sum}, expected 1"
            ));
        }
    }
    Ok(())
}

pub struct Brain<N: ValueNetwork = BurnValueNetwork> {
    num_states: usize,
    num_actions: usize,
    temporal_window: usize,
    window_size: usize,
    net_inputs: usize,
    config: BrainConfig,
    start_learn_threshold: usize,

    network: N,
    experience: ReplayBuffer,

    state_window: VecDeque<Option<Vec<f32>>>,
    action_window: VecDeque<Option<usize>>,
    reward_window: VecDeque<Option<f32>>,
    net_window: VecDeque<Option<Vec<f32>>>,

    age: usize,
    forward_passes: usize,
    epsilon: f32,
    latest_reward: f32,
    learning: bool,

    average_reward_window: Window,
    average_loss_window: Window,
    rng: StdRng,
}

impl Brain<BurnValueNetwork> {
    /// Learner backed by the default burn network described in `config`.
    pub fn new(num_states: usize, num_actions: usize, config: &BrainConfig) -> Result<Self, BrainError> {
        validate(num_states, num_actions, config)?;
        let inputs = net_input_size(num_states, num_actions, config.temporal_window);
        let network = BurnValueNetwork::from_config(inputs, num_actions, config)?;
        Self::with_network(num_states, num_actions, config, network)
    }
}

impl<N: ValueNetwork> Brain<N> {
    pub fn with_network(
        num_states: usize,
        num_actions: usize,
        config: &BrainConfig,
        network: N,
    ) -> Result<Self, BrainError> {
        validate(num_states, num_actions, config)?;
        let net_inputs = net_input_size(num_states, num_actions, config.temporal_window);
        if network.input_size() != net_inputs {
            return Err(BrainError::Configuration(format!(
                "network takes {} inputs, expected {net_inputs}",
                network.input_size()
            )));
        }
        if network.output_size() != num_actions {
            return Err(BrainError::Configuration(format!(
                "network has {} outputs, expected {num_actions}",
                network.output_size()
            )));
        }
        let window_size = config.window_size();
        debug!(
            num_states,
            num_actions,
            net_inputs,
            window_size,
            "created temporal difference learner"
        );
        Ok(Self {
            num_states,
            num_actions,
            temporal_window: config.temporal_window,
            window_size,
            net_inputs,
            config: config.clone(),
            start_learn_threshold: config.start_learn_threshold(),
            network,
            experience: ReplayBuffer::new(config.experience_size),
            state_window: VecDeque::from(vec![None; window_size]),
            action_window: VecDeque::from(vec![None; window_size]),
            reward_window: VecDeque::from(vec![None; window_size]),
            net_window: VecDeque::from(vec![None; window_size]),
            age: 0,
            forward_passes: 0,
            epsilon: 1.0,
            latest_reward: 0.0,
            learning: true,
            average_reward_window: Window::new(1000, 10),
            average_loss_window: Window::new(1000, 10),
            rng: build_rng(config.seed),
        })
    }

    fn random_action(&mut self) -> usize {
        match &self.config.random_action_distribution {
            None => self.rng.gen_range(0..self.num_actions),
            Some(dist) => {
                let p = self.rng.gen::<f32>();
                let mut cumprob = 0.0;
                for (k, prob) in dist.iter().enumerate() {
                    cumprob += prob;
                    if p < cumprob {
                        return k;
                    }
                }
                // Rounding left the cumulative sum just below p
                self.num_actions - 1
            }
        }
    }

    /// Greedy action and its value.
    pub fn policy(&self, net_input: &[f32]) -> (usize, f32) {
        argmax(&self.network.forward(net_input))
    }

    fn net_input(&self, observation: &[f32]) -> Vec<f32> {
        let mut w = Vec::with_capacity(self.net_inputs);
        w.extend_from_slice(observation);
        let n = self.window_size;
        for k in 0..self.temporal_window {
            match &self.state_window[n - 1 - k] {
                Some(state) => w.extend_from_slice(state),
                None => w.extend(std::iter::repeat(0.0).take(self.num_states)),
            }
            // Scaled by num_states so weight decay does not drown the action
            let mut action1ofk = vec![0.0; self.num_actions];
            if let Some(a) = self.action_window[n - 1 - k] {
                action1ofk[a] = self.num_states as f32;
            }
            w.extend(action1ofk);
        }
        w
    }

    fn scheduled_epsilon(&self) -> f32 {
        let burnin = self.config.learning_steps_burnin as f32;
        let total = self.config.learning_steps_total as f32;
        (1.0 - (self.age as f32 - burnin) / (total - burnin)).clamp(self.config.epsilon_min, 1.0)
    }

    pub fn forward(&mut self, observation: &[f32]) -> usize {
        debug_assert_eq!(observation.len(), self.num_states);
        self.forward_passes += 1;
        let (net_input, action) = if self.forward_passes > self.temporal_window {
            let net_input = self.net_input(observation);
            self.epsilon = if self.learning {
                self.scheduled_epsilon()
            } else {
                self.config.epsilon_test_time
            };
            let action = if self.rng.gen::<f32>() < self.epsilon {
                self.random_action()
            } else {
                self.policy(&net_input).0
            };
            (net_input, action)
        } else {
            // Not enough history for a full network input yet
            (Vec::new(), self.random_action())
        };
        shift_push(&mut self.net_window, net_input);
        shift_push(&mut self.state_window, observation.to_vec());
        shift_push(&mut self.action_window, action);
        action
    }

    pub fn backward(&mut self, reward: f32) -> Result<(), BrainError> {
        self.latest_reward = reward;
        self.average_reward_window.add(reward);
        shift_push(&mut self.reward_window, reward);
        if !self.learning {
            return Ok(());
        }
        self.age += 1;

        if self.forward_passes > self.temporal_window + 1 {
            let n = self.window_size;
            if let (Some(state0), Some(action0), Some(reward0), Some(state1)) = (
                &self.net_window[n - 2],
                self.action_window[n - 2],
                self.reward_window[n - 2],
                &self.net_window[n - 1],
            ) {
                let e = Experience {
                    state0: state0.clone(),
                    action0,
                    reward0,
                    state1: state1.clone(),
                };
                self.experience.add(e, &mut self.rng);
                if self.experience.len() == self.start_learn_threshold + 1 {
                    debug!(age = self.age, "replay threshold reached, training starts");
                }
            }
        }

        if self.experience.len() > self.start_learn_threshold {
            let batch_size = self.config.trainer.batch_size;
            let mut avcost = 0.0;
            for _ in 0..batch_size {
                let Some(e) = self.experience.sample(&mut self.rng) else {
                    break;
                };
                let (_, max_value) = argmax(&self.network.forward(&e.state1));
                let target = RegressionTarget {
                    action: e.action0,
                    value: e.reward0 + self.config.gamma * max_value,
                };
                avcost += self.network.train(&e.state0, target);
            }
            avcost /= batch_size as f32;
            self.average_loss_window.add(avcost);
            if !avcost.is_finite() {
                warn!(age = self.age, loss = avcost, "value network diverged");
                return Err(BrainError::Diverged {
                    age: self.age,
                    loss: avcost,
                });
            }
        }
        if self.age % 1000 == 0 {
            debug!(report = %self.report(), "brain progress");
        }
        Ok(())
    }

    /// Switches between training and test-time inference.
    pub fn set_learning(&mut self, learning: bool) {
        self.learning = learning;
        if !learning {
            self.epsilon = self.config.epsilon_test_time;
        }
    }

    pub(crate) fn restore(&mut self, age: usize) {
        self.age = age;
        self.set_learning(false);
    }

    pub fn report(&self) -> BrainReport {
        BrainReport {
            experience_size: self.experience.len(),
            epsilon: self.epsilon,
            age: self.age,
            average_loss: self.average_loss_window.average(),
            average_reward: self.average_reward_window.average(),
        }
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }
    pub fn num_actions(&self) -> usize {
        self.num_actions
    }
    pub fn net_inputs(&self) -> usize {
        self.net_inputs
    }
    pub fn window_size(&self) -> usize {
        self.window_size
    }
    pub fn age(&self) -> usize {
        self.age
    }
    pub fn forward_passes(&self) -> usize {
        self.forward_passes
    }
    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
    pub fn learning(&self) -> bool {
        self.learning
    }
    pub fn latest_reward(&self) -> f32 {
        self.latest_reward
    }
    pub fn config(&self) -> &BrainConfig {
        &self.config
    }
    pub fn experience(&self) -> &ReplayBuffer {
        &self.experience
    }
    pub fn network(&self) -> &N {
        &self.network
    }
    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }
}

impl<N: ValueNetwork> Learner for Brain<N> {
    fn act(&mut self, observation: &[f32]) -> Result<usize, BrainError> {
        Ok(self.forward(observation))
    }
    fn learn(&mut self, reward: f32) -> Result<(), BrainError> {
        self.backward(reward)
    }
    fn epsilon(&self) -> f32 {
        self.epsilon
    }
    fn save(&self, dir: &Path) -> Result<PathBuf, BrainError> {
        save_json(dir, SNAPSHOT_PREFIX, &self.snapshot()?)
    }
}
