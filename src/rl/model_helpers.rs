use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::info;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::helpers::config_parser::BrainConfig;

use super::{
    brain::Brain,
    model::{BurnValueNetwork, ValueNetwork},
    BrainError,
};

/// Persisted learner state. Loading it freezes exploration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BrainSnapshot {
    pub value_network_weights: serde_json::Value,
    pub epsilon: f32,
    pub age: usize,
    pub layers: Vec<usize>,
}
impl BrainSnapshot {
    pub fn to_json(&self) -> Result<String, BrainError> {
        serde_json::to_string(self).map_err(|e| BrainError::Snapshot(e.to_string()))
    }
    pub fn from_json(json: &str) -> Result<Self, BrainError> {
        serde_json::from_str(json).map_err(|e| BrainError::Snapshot(e.to_string()))
    }
}

impl<N: ValueNetwork> Brain<N> {
    pub fn snapshot(&self) -> Result<BrainSnapshot, BrainError> {
        Ok(BrainSnapshot {
            value_network_weights: self.network().weights()?,
            epsilon: self.epsilon(),
            age: self.age(),
            layers: self.network().layers(),
        })
    }

    /// Restores weights and age, then switches to test-time inference.
    pub fn load_snapshot(&mut self, snapshot: &BrainSnapshot) -> Result<(), BrainError> {
        let layers = self.network().layers();
        if layers != snapshot.layers {
            return Err(BrainError::Snapshot(format!(
                "snapshot layers {:?} do not match network layers {:?}",
                snapshot.layers, layers
            )));
        }
        self.network_mut()
            .load_weights(&snapshot.value_network_weights)?;
        self.restore(snapshot.age);
        Ok(())
    }
}

impl Brain<BurnValueNetwork> {
    /// Rebuilds the network with the snapshot's layer widths and loads it.
    pub fn from_snapshot(
        num_states: usize,
        num_actions: usize,
        config: &BrainConfig,
        snapshot: &BrainSnapshot,
    ) -> Result<Self, BrainError> {
        let layers = &snapshot.layers;
        if layers.len() < 2 {
            return Err(BrainError::Snapshot(format!(
                "snapshot needs at least two layers, got {layers:?}"
            )));
        }
        let network = BurnValueNetwork::new(
            layers[0],
            layers[layers.len() - 1],
            &layers[1..layers.len() - 1],
            &config.trainer,
        );
        let mut brain = Self::with_network(num_states, num_actions, config, network)?;
        brain.load_snapshot(snapshot)?;
        Ok(brain)
    }
}

fn timestamp() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Writes `value` as `{dir}/{prefix}_{millis}.json` and returns the path.
pub fn save_json<T: Serialize>(dir: &Path, prefix: &str, value: &T) -> Result<PathBuf, BrainError> {
    if !dir.is_dir() {
        std::fs::create_dir_all(dir)?;
    }
    let path = dir.join(format!("{prefix}_{}.json", timestamp()));
    let json = serde_json::to_string(value).map_err(|e| BrainError::Snapshot(e.to_string()))?;
    std::fs::write(&path, json)?;
    info!(path = %path.display(), "saved snapshot");
    Ok(path)
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, BrainError> {
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|e| BrainError::Snapshot(e.to_string()))
}

/// Newest `{prefix}_{millis}.json` in `dir`.
pub fn latest_snapshot(dir: &Path, prefix: &str) -> Result<Option<PathBuf>, BrainError> {
    let mut files = std::fs::read_dir(dir)?
        .filter_map(|f| {
            f.ok().and_then(|f| {
                let path = f.path();
                let stem = path.file_stem()?.to_str()?.to_string();
                let (t, n) = stem.rsplit_once('_')?;
                let stamp = n.parse::<u128>().ok()?;
                (t == prefix && path.extension()? == "json").then_some((stamp, path))
            })
        })
        .collect::<Vec<_>>();
    files.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(files.into_iter().next().map(|(_, p)| p))
}

#[cfg(test)]
mod snapshot_tests {
    use super::*;
    use crate::helpers::config_parser::TrainerConfig;
    use crate::rl::brain::brain_tests::{config, stub_brain};

    #[test]
    fn test_burn_snapshot_roundtrip() {
        let cfg = BrainConfig {
            hidden_layer_sizes: vec![6],
            experience_size: 50,
            start_learn_threshold: Some(2),
            trainer: TrainerConfig {
                batch_size: 2,
                ..TrainerConfig::default()
            },
            seed: Some(5),
            ..BrainConfig::default()
        };
        let mut brain = Brain::new(3, 2, &cfg).unwrap();
        for i in 0..10 {
            brain.forward(&[0.1 * i as f32, 0.5, 0.9]);
            brain.backward(1.0).unwrap();
        }
        let json = brain.snapshot().unwrap().to_json().unwrap();
        let snapshot = BrainSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot.age, 10);

        let mut loaded = Brain::from_snapshot(3, 2, &cfg, &snapshot).unwrap();
        let probe = vec![0.2; brain.net_inputs()];
        assert_eq!(brain.network().forward(&probe), loaded.network().forward(&probe));
        assert!(!loaded.learning());
        assert_eq!(loaded.epsilon(), cfg.epsilon_test_time);
        assert_eq!(loaded.age(), 10);

        loaded.set_learning(true);
        loaded.forward(&[0.3, 0.5, 0.9]);
        loaded.backward(1.0).unwrap();
        assert!(loaded.learning());
        assert_eq!(loaded.age(), 11);
    }

    #[test]
    fn test_layer_mismatch_is_rejected() {
        let cfg = config(10, 2, 2);
        let mut brain = stub_brain(2, 2, &cfg);
        let mut snapshot = brain.snapshot().unwrap();
        snapshot.layers = vec![3, 2];
        assert!(matches!(
            brain.load_snapshot(&snapshot),
            Err(BrainError::Snapshot(_))
        ));
    }

    #[test]
    fn test_save_and_find_latest() {
        let dir = std::env::temp_dir().join(format!("td_sandbox_snapshots_{}", timestamp()));
        let mut brain = stub_brain(2, 2, &config(10, 2, 2));
        brain.network_mut().bias = vec![0.25, -1.0];
        let snapshot = brain.snapshot().unwrap();
        let path = save_json(&dir, "brain", &snapshot).unwrap();
        assert_eq!(latest_snapshot(&dir, "brain").unwrap(), Some(path.clone()));
        assert_eq!(latest_snapshot(&dir, "tabular").unwrap(), None);

        let restored: BrainSnapshot = load_json(&path).unwrap();
        let mut other = stub_brain(2, 2, &config(10, 2, 2));
        other.load_snapshot(&restored).unwrap();
        assert_eq!(other.network().bias, vec![0.25, -1.0]);
        assert!(!other.learning());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
