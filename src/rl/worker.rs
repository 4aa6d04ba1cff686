//! Runs a learner on its own thread behind a request/response channel.
//!
//! Every request carries its own reply channel, so the caller decides when
//! to block. Requests are served in send order.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, warn};

use super::{BrainError, Learner};

enum LearnerCommand {
    Act {
        observation: Vec<f32>,
        reply: mpsc::Sender<Result<(usize, f32), BrainError>>,
    },
    Learn {
        reward: f32,
        reply: mpsc::Sender<Result<f32, BrainError>>,
    },
    Save {
        dir: PathBuf,
        reply: mpsc::Sender<Result<PathBuf, BrainError>>,
    },
    Shutdown,
}

/// An `act` request that has been sent but not yet answered.
pub struct PendingAct {
    rx: mpsc::Receiver<Result<(usize, f32), BrainError>>,
}
impl PendingAct {
    /// Blocks until the worker answers with the action and current epsilon.
    pub fn wait(self) -> Result<(usize, f32), BrainError> {
        self.rx.recv().map_err(|_| BrainError::WorkerDisconnected)?
    }
}

pub struct PendingLearn {
    rx: mpsc::Receiver<Result<f32, BrainError>>,
}
impl PendingLearn {
    pub fn wait(self) -> Result<f32, BrainError> {
        self.rx.recv().map_err(|_| BrainError::WorkerDisconnected)?
    }
}

pub struct LearnerWorker<L> {
    tx: mpsc::Sender<LearnerCommand>,
    handle: Option<thread::JoinHandle<L>>,
    epsilon: f32,
}

impl<L: Learner + Send + 'static> LearnerWorker<L> {
    pub fn spawn(name: &str, mut learner: L) -> Result<Self, BrainError> {
        let epsilon = learner.epsilon();
        let (tx, rx) = mpsc::channel::<LearnerCommand>();
        let handle = thread::Builder::new()
            .name(format!("learner-{name}"))
            .spawn(move || {
                while let Ok(command) = rx.recv() {
                    match command {
                        LearnerCommand::Act { observation, reply } => {
                            let result = learner
                                .act(&observation)
                                .map(|action| (action, learner.epsilon()));
                            let _ = reply.send(result);
                        }
                        LearnerCommand::Learn { reward, reply } => {
                            let result = learner.learn(reward).map(|_| learner.epsilon());
                            if let Err(err) = &result {
                                warn!("learner worker failed to learn: {err}");
                            }
                            let _ = reply.send(result);
                        }
                        LearnerCommand::Save { dir, reply } => {
                            let _ = reply.send(learner.save(&dir));
                        }
                        LearnerCommand::Shutdown => break,
                    }
                }
                learner
            })?;
        debug!(name, "spawned learner worker");
        Ok(Self {
            tx,
            handle: Some(handle),
            epsilon,
        })
    }

    pub fn request_act(&self, observation: &[f32]) -> Result<PendingAct, BrainError> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(LearnerCommand::Act {
                observation: observation.to_vec(),
                reply,
            })
            .map_err(|_| BrainError::WorkerDisconnected)?;
        Ok(PendingAct { rx })
    }

    pub fn request_learn(&self, reward: f32) -> Result<PendingLearn, BrainError> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(LearnerCommand::Learn { reward, reply })
            .map_err(|_| BrainError::WorkerDisconnected)?;
        Ok(PendingLearn { rx })
    }

    /// Stops the worker and hands the learner back, e.g. for a snapshot.
    pub fn into_inner(mut self) -> Result<L, BrainError> {
        let _ = self.tx.send(LearnerCommand::Shutdown);
        let handle = self.handle.take().ok_or(BrainError::WorkerDisconnected)?;
        handle.join().map_err(|_| BrainError::WorkerDisconnected)
    }
}

impl<L: Learner + Send + 'static> Learner for LearnerWorker<L> {
    fn act(&mut self, observation: &[f32]) -> Result<usize, BrainError> {
        let (action, epsilon) = self.request_act(observation)?.wait()?;
        self.epsilon = epsilon;
        Ok(action)
    }
    fn learn(&mut self, reward: f32) -> Result<(), BrainError> {
        self.epsilon = self.request_learn(reward)?.wait()?;
        Ok(())
    }
    fn epsilon(&self) -> f32 {
        self.epsilon
    }
    fn save(&self, dir: &Path) -> Result<PathBuf, BrainError> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(LearnerCommand::Save {
                dir: dir.to_path_buf(),
                reply,
            })
            .map_err(|_| BrainError::WorkerDisconnected)?;
        rx.recv().map_err(|_| BrainError::WorkerDisconnected)?
    }
}

impl<L> Drop for LearnerWorker<L> {
    fn drop(&mut self) {
        let _ = self.tx.send(LearnerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("learner worker thread panicked");
            }
        }
    }
}
