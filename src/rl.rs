use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod brain;
pub mod model;
pub mod model_helpers;
pub mod tabular;
pub mod worker;

#[derive(Debug, Error)]
pub enum BrainError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("training diverged at age {age}: loss {loss}")]
    Diverged { age: usize, loss: f32 },
    #[error("snapshot error: {0}")]
    Snapshot(String),
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("learner worker disconnected")]
    WorkerDisconnected,
}

/// What the agent needs from a learner, whichever algorithm is behind it.
pub trait Learner {
    fn act(&mut self, observation: &[f32]) -> Result<usize, BrainError>;
    fn learn(&mut self, reward: f32) -> Result<(), BrainError>;
    fn epsilon(&self) -> f32;
    /// Writes a snapshot under `dir` and returns its path.
    fn save(&self, dir: &Path) -> Result<PathBuf, BrainError>;
}

/// One transition; states are network inputs, not raw observations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state0: Vec<f32>,
    pub action0: usize,
    pub reward0: f32,
    pub state1: Vec<f32>,
}

/// Bounded experience memory. Once full, a uniformly random slot is
/// overwritten instead of the oldest one.
#[derive(Default, Debug, Clone)]
pub struct ReplayBuffer {
    buffer: Vec<Experience>,
    pub capacity: usize,
}
impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity.min(4096)),
            capacity,
        }
    }
    pub fn add<R: Rng>(&mut self, e: Experience, rng: &mut R) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(e);
        } else {
            let i = rng.gen_range(0..self.capacity);
            self.buffer[i] = e;
        }
    }
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<&Experience> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(&self.buffer[rng.gen_range(0..self.buffer.len())])
        }
    }
    pub fn get(&self) -> &[Experience] {
        &self.buffer
    }
    pub fn len(&self) -> usize {
        self.buffer.len()
    }
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Running average over the last `size` values. Reports -1 until
/// `min_size` values were added.
#[derive(Debug, Clone)]
pub struct Window {
    values: VecDeque<f32>,
    size: usize,
    min_size: usize,
    sum: f32,
}
impl Window {
    pub fn new(size: usize, min_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(size),
            size,
            min_size,
            sum: 0.0,
        }
    }
    pub fn add(&mut self, x: f32) {
        self.values.push_back(x);
        self.sum += x;
        if self.values.len() > self.size {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
    }
    pub fn average(&self) -> f32 {
        if self.values.len() < self.min_size {
            -1.0
        } else {
            self.sum / self.values.len() as f32
        }
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod rl_tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn exp(i: usize) -> Experience {
        Experience {
            state0: vec![i as f32],
            action0: i % 2,
            reward0: i as f32,
            state1: vec![i as f32 + 1.0],
        }
    }

    #[test]
    fn test_replay_never_exceeds_capacity() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut buf = ReplayBuffer::new(5);
        for i in 0..5 {
            buf.add(exp(i), &mut rng);
        }
        // Appends keep insertion order while under capacity
        assert_eq!(buf.get()[4], exp(4));
        for i in 5..200 {
            buf.add(exp(i), &mut rng);
            assert_eq!(buf.len(), 5);
        }
        // Random replacement, so some recent experiences must have landed
        assert!(buf.get().iter().any(|e| e.reward0 >= 5.0));
    }

    #[test]
    fn test_replay_sample() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut buf = ReplayBuffer::new(5);
        assert!(buf.sample(&mut rng).is_none());
        buf.add(exp(1), &mut rng);
        assert_eq!(buf.sample(&mut rng), Some(&exp(1)));
    }

    #[test]
    fn test_window_average() {
        let mut w = Window::new(3, 2);
        w.add(1.0);
        assert_eq!(w.average(), -1.0);
        w.add(3.0);
        assert_eq!(w.average(), 2.0);
        w.add(5.0);
        w.add(7.0);
        assert_eq!(w.len(), 3);
        assert_eq!(w.average(), 5.0);
    }
}
