use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use td_sandbox::entities::go::num_actions;
use td_sandbox::entities::preprocessing::observation_size;
use td_sandbox::entities::World;
use td_sandbox::helpers::config_parser::{read_config, Config, LearnerKind};
use td_sandbox::rl::brain::{self, Brain};
use td_sandbox::rl::model_helpers::{latest_snapshot, load_json, BrainSnapshot};
use td_sandbox::rl::tabular::{self, TabularQLearner, TabularSnapshot};
use td_sandbox::rl::worker::LearnerWorker;
use td_sandbox::rl::{Learner, Window};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// `path` itself, or the newest snapshot with `prefix` when it is a directory.
fn snapshot_path(path: &str, prefix: &str) -> Result<PathBuf> {
    let path = Path::new(path);
    if path.is_dir() {
        latest_snapshot(path, prefix)?
            .with_context(|| format!("no {prefix} snapshot in {}", path.display()))
    } else {
        Ok(path.to_path_buf())
    }
}

fn boxed<L: Learner + Send + 'static>(
    learner: L,
    worker_thread: bool,
    index: usize,
) -> Result<Box<dyn Learner + Send>> {
    if worker_thread {
        Ok(Box::new(LearnerWorker::spawn(&format!("agent-{index}"), learner)?))
    } else {
        Ok(Box::new(learner))
    }
}

fn build_learner(cfg: &Config, index: usize) -> Result<Box<dyn Learner + Send>> {
    let num_states = observation_size(&cfg.agent);
    let num_actions = num_actions(cfg.agent.variant);
    match cfg.rl.learner {
        LearnerKind::TemporalDifference => {
            let mut brain_cfg = cfg.rl.brain.clone();
            brain_cfg.seed = brain_cfg.seed.map(|s| s + index as u64);
            let mut brain = if let Some(path) = &cfg.rl.load_path {
                let path = snapshot_path(path, brain::SNAPSHOT_PREFIX)?;
                info!(path = %path.display(), "loading brain");
                let snapshot: BrainSnapshot = load_json(&path)?;
                Brain::from_snapshot(num_states, num_actions, &brain_cfg, &snapshot)?
            } else {
                Brain::new(num_states, num_actions, &brain_cfg)?
            };
            // Loaded brains come back frozen
            if cfg.rl.learn && !brain.learning() {
                info!(age = brain.age(), "resuming training of loaded brain");
            }
            brain.set_learning(cfg.rl.learn);
            info!(
                num_states,
                num_actions,
                net_inputs = brain.net_inputs(),
                "temporal difference learner ready"
            );
            boxed(brain, cfg.rl.worker_thread, index)
        }
        LearnerKind::Tabular => {
            let mut tabular_cfg = cfg.rl.tabular.clone();
            tabular_cfg.seed = tabular_cfg.seed.map(|s| s + index as u64);
            let mut learner = if let Some(path) = &cfg.rl.load_path {
                let path = snapshot_path(path, tabular::SNAPSHOT_PREFIX)?;
                info!(path = %path.display(), "loading q-table");
                let snapshot: TabularSnapshot = load_json(&path)?;
                TabularQLearner::from_snapshot(snapshot)?
            } else {
                TabularQLearner::new(num_actions, &tabular_cfg)?
            };
            if cfg.rl.learn && !learner.learning() {
                info!(steps = learner.steps(), "resuming training of loaded q-table");
            }
            learner.set_learning(cfg.rl.learn);
            boxed(learner, cfg.rl.worker_thread, index)
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cfg = read_config()?;

    let mut world = World::new(&cfg.world);
    for i in 0..cfg.world.agent_count {
        let learner = build_learner(&cfg, i)?;
        world.add_agent(&cfg.agent, learner);
    }
    info!(
        agents = world.agents.len(),
        items = world.items.len(),
        ticks = cfg.rl.ticks,
        learn = cfg.rl.learn,
        "starting run"
    );

    let mut rewards = Window::new(1000, 10);
    let (mut food, mut poison) = (0usize, 0usize);
    for tick in 1..=cfg.rl.ticks {
        let summary = world
            .tick()
            .with_context(|| format!("tick {tick} failed"))?;
        food += summary.food_eaten;
        poison += summary.poison_eaten;
        for r in &summary.rewards {
            rewards.add(*r);
        }
        if cfg.rl.report_every > 0 && tick % cfg.rl.report_every == 0 {
            let epsilon = world
                .agents
                .first()
                .map(|a| a.learner().epsilon())
                .unwrap_or(0.0);
            info!(
                tick,
                food,
                poison,
                average_reward = rewards.average(),
                epsilon,
                "progress"
            );
        }
    }

    if cfg.rl.learn {
        for (i, agent) in world.agents.iter().enumerate() {
            let dir = Path::new(&cfg.rl.save_path).join(format!("agent_{i}"));
            match agent.learner().save(&dir) {
                Ok(path) => info!(agent = i, path = %path.display(), "saved learner"),
                Err(err) => warn!(agent = i, "could not save learner: {err}"),
            }
        }
    }
    Ok(())
}
