//! The sense, act, step, score, record loop.

use std::path::PathBuf;

use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;

use super::{EpisodeSummary, SaveOutcome, StepOutcome, TaskController};
use crate::error::Result;
use crate::rl::{
    ActorCritic, Agent, ExperienceBuffer, RewardFunction, StateExtractor, TrainingMetrics,
    UpdateStats,
};
use crate::sim::Simulation;

/// What happened during one [`Session::tick`].
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Reward for this step; `None` when the simulation diverged
    pub reward: Option<f32>,
    pub outcome: StepOutcome,
    /// Set when the buffer filled up and a training pass ran
    pub update: Option<UpdateStats>,
    /// Set when the episode ended on this tick
    pub episode: Option<EpisodeSummary>,
}

/// One training run: simulation, agent, rollout storage and episode state.
pub struct Session<S, B: AutodiffBackend, O> {
    sim: S,
    agent: Agent<B, O>,
    extractor: StateExtractor,
    reward: RewardFunction,
    buffer: ExperienceBuffer,
    task: TaskController,
    metrics: TrainingMetrics,
    policy_dir: Option<PathBuf>,
    log_every: usize,
    reset_requested: bool,
}

impl<S, B, O> Session<S, B, O>
where
    S: Simulation,
    B: AutodiffBackend,
    O: Optimizer<ActorCritic<B>, B>,
{
    pub fn new(sim: S, agent: Agent<B, O>, task: TaskController) -> Self {
        let extractor = StateExtractor::new(&sim);
        let buffer = ExperienceBuffer::new(agent.config().rollout_capacity);

        Self {
            sim,
            agent,
            extractor,
            reward: RewardFunction::default(),
            buffer,
            task,
            metrics: TrainingMetrics::default(),
            policy_dir: None,
            log_every: 10,
            reset_requested: false,
        }
    }

    /// Save the policy next to every improved checkpoint.
    pub fn with_policy_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.policy_dir = Some(dir.into());
        self
    }

    /// Log the metrics summary every `episodes` finished episodes.
    pub fn with_log_every(mut self, episodes: usize) -> Self {
        self.log_every = episodes.max(1);
        self
    }

    pub fn sim(&self) -> &S {
        &self.sim
    }

    pub fn agent(&self) -> &Agent<B, O> {
        &self.agent
    }

    pub fn task(&self) -> &TaskController {
        &self.task
    }

    pub fn buffer(&self) -> &ExperienceBuffer {
        &self.buffer
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    /// Restore the best-reward record and, if present, the saved policy.
    pub fn load_checkpoint(&mut self) -> Result<()> {
        self.task.checkpointer_mut().load()?;

        if let Some(dir) = &self.policy_dir {
            if dir.exists() {
                self.agent.load_policy(dir)?;
            }
        }
        Ok(())
    }

    /// Abandon the current episode at the start of the next tick.
    pub fn request_reset(&mut self) {
        self.reset_requested = true;
    }

    /// Advance the loop by one simulation step.
    pub fn tick(&mut self) -> Result<TickReport> {
        if self.reset_requested {
            self.reset_requested = false;
            tracing::info!("Episode {} reset by user", self.task.episode());
            self.sim.reset();
            self.task.reset();
        }

        let observation = self.extractor.extract(&self.sim);
        self.agent.observe(&observation)?;
        let sample = self.agent.sample_action(&observation)?;

        self.sim.step(&sample.action)?;
        self.metrics.record_step();

        let (reward, outcome) = if self.sim.snapshot().is_finite() {
            let reward = self.reward.evaluate(&self.sim);
            self.buffer.push(
                observation,
                sample.action,
                reward,
                sample.value,
                sample.log_prob,
            )?;
            let outcome = self.task.record_step(reward, self.sim.torso_height());
            (Some(reward), outcome)
        } else {
            tracing::warn!(
                "Simulation diverged at step {} of episode {}",
                self.task.steps(),
                self.task.episode()
            );
            (None, self.task.mark_diverged())
        };

        let episode = match outcome {
            StepOutcome::Terminated(_) => Some(self.end_episode()?),
            _ => None,
        };

        let update = if self.buffer.is_full() {
            let stats = self.agent.update(&self.buffer)?;
            self.buffer.clear();
            self.metrics.record_update(&stats);
            tracing::info!(
                "Training pass {}: policy_loss={:.4}, value_loss={:.4}, entropy={:.4}",
                self.metrics.updates,
                stats.policy_loss,
                stats.value_loss,
                stats.entropy
            );
            Some(stats)
        } else {
            None
        };

        Ok(TickReport {
            reward,
            outcome,
            update,
            episode,
        })
    }

    fn end_episode(&mut self) -> Result<EpisodeSummary> {
        let summary = self.task.finish_episode(&self.sim.snapshot())?;

        if summary.checkpoint == SaveOutcome::Saved {
            if let Some(dir) = &self.policy_dir {
                self.agent.save_policy(dir)?;
            }
        }

        tracing::info!(
            "Episode {} finished after {} steps ({:?}): reward={:.3}",
            summary.episode,
            summary.steps,
            summary.reason,
            summary.total_reward
        );
        self.metrics.record_episode(
            summary.total_reward,
            summary.steps,
            summary.reason == super::TerminationReason::Fallen,
        );
        if self.metrics.episodes % self.log_every == 0 {
            self.metrics.log_to_console();
        }

        self.sim.reset();
        self.task.reset();
        Ok(summary)
    }

    /// Run headless until `max_episodes` episodes have finished, or forever.
    pub fn run(&mut self, max_episodes: Option<usize>) -> Result<()> {
        tracing::info!(
            "Starting headless training (obs_dim={}, action_dim={}, episodes={:?})",
            self.agent.obs_dim(),
            self.agent.action_dim(),
            max_episodes
        );

        let mut finished = 0;
        while max_episodes.is_none_or(|max| finished < max) {
            if self.tick()?.episode.is_some() {
                finished += 1;
            }
        }

        self.metrics.log_to_console();
        tracing::info!("Training complete!");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::{ActorCriticConfig, TrainConfig, adam};
    use crate::sim::model::tests::TEST_MODEL;
    use crate::sim::{ModelDescription, PlanarBody};
    use crate::task::{Checkpointer, TerminationReason};
    use burn::backend::{Autodiff, NdArray};
    use burn::module::AutodiffModule;
    use burn::prelude::Tensor;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn session(
        name: &str,
        capacity: usize,
        max_steps: usize,
    ) -> Session<PlanarBody, TestBackend, impl Optimizer<ActorCritic<TestBackend>, TestBackend>> {
        let body = PlanarBody::new(ModelDescription::from_str(TEST_MODEL).unwrap());
        let obs_dim = StateExtractor::new(&body).obs_dim();
        let network = ActorCriticConfig::new(obs_dim, body.action_dim()).with_hidden_size(16);
        let config = TrainConfig {
            rollout_capacity: capacity,
            ppo_epochs: 2,
            ..TrainConfig::default()
        };
        let agent = Agent::new(Default::default(), &network, config, adam::<TestBackend>());

        let path = std::env::temp_dir().join(format!("standup-session-{}-{}.bin", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        let task = TaskController::with_limits(Checkpointer::new(path), max_steps, 0.2);
        Session::new(body, agent, task)
    }

    #[test]
    fn test_training_fires_when_buffer_fills() {
        let mut session = session("train", 4, 1000);
        for _ in 0..3 {
            let report = session.tick().unwrap();
            assert!(report.update.is_none());
            assert!(report.reward.is_some());
        }
        assert_eq!(session.buffer().len(), 3);

        let report = session.tick().unwrap();
        let stats = report.update.expect("buffer was full");
        assert_eq!(stats.samples, 4);
        assert!(session.buffer().is_empty());
        assert_eq!(session.metrics().updates, 1);
    }

    #[test]
    fn test_episode_ends_and_resets() {
        let mut session = session("episode", 64, 5);
        let reports: Vec<TickReport> = (0..5).map(|_| session.tick().unwrap()).collect();

        assert!(reports[..4].iter().all(|r| r.episode.is_none()));
        let summary = reports[4].episode.as_ref().expect("episode should end");
        assert_eq!(summary.reason, TerminationReason::MaxSteps);
        assert_eq!(summary.steps, 5);
        assert_eq!(summary.checkpoint, SaveOutcome::Saved);

        assert_eq!(session.task().episode(), 1);
        assert_eq!(session.task().steps(), 0);
        assert_eq!(session.metrics().episodes, 1);

        let _ = std::fs::remove_file(session.task().checkpointer().path());
    }

    #[test]
    fn test_policy_saved_before_training_on_shared_tick() {
        let dir = std::env::temp_dir().join(format!("standup-session-policy-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut session = session("shared-tick", 3, 3).with_policy_dir(&dir);

        session.tick().unwrap();
        session.tick().unwrap();
        let acting = session.agent().model().valid();

        let report = session.tick().unwrap();
        assert!(report.update.is_some());
        let summary = report.episode.expect("episode should end");
        assert_eq!(summary.checkpoint, SaveOutcome::Saved);

        let (obs_dim, action_dim) = (session.agent().obs_dim(), session.agent().action_dim());
        let network = ActorCriticConfig::new(obs_dim, action_dim).with_hidden_size(16);
        let mut restored = Agent::new(
            Default::default(),
            &network,
            TrainConfig::default(),
            adam::<TestBackend>(),
        );
        restored.load_policy(&dir).unwrap();

        let input = Tensor::<NdArray<f32>, 2>::ones([1, obs_dim], &Default::default());
        let mean_of = |model: ActorCritic<NdArray<f32>>| {
            let (mean, _, _) = model.forward(input.clone());
            mean.into_data().to_vec::<f32>().unwrap()
        };
        let expected = mean_of(acting);
        let saved = mean_of(restored.model().valid());
        let trained = mean_of(session.agent().model().valid());

        for (s, e) in saved.iter().zip(&expected) {
            assert!((s - e).abs() < 1e-6, "saved {saved:?}, acting {expected:?}");
        }
        assert_ne!(trained, expected);

        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_file(session.task().checkpointer().path());
    }

    #[test]
    fn test_reset_request_starts_new_episode() {
        let mut session = session("reset", 64, 1000);
        session.tick().unwrap();
        session.tick().unwrap();
        session.request_reset();
        session.tick().unwrap();

        assert_eq!(session.task().episode(), 1);
        assert_eq!(session.task().steps(), 1);
    }

    #[test]
    fn test_run_stops_after_episode_limit() {
        let mut session = session("run", 16, 3);
        session.run(Some(2)).unwrap();
        assert_eq!(session.metrics().episodes, 2);
        assert_eq!(session.metrics().total_timesteps, 6);

        let _ = std::fs::remove_file(session.task().checkpointer().path());
    }
}
