//! Episode lifecycle for the stand-up task.
//!
//! An episode runs until the torso falls below the termination height or the
//! step limit is reached. [`TaskController::record_step`] reports the end of
//! an episode exactly once; the session then calls
//! [`TaskController::finish_episode`] and [`TaskController::reset`].

pub mod checkpoint;
pub mod session;

use crate::config::{EPISODE_LENGTH, TERMINATION_HEIGHT};
use crate::error::Result;
use crate::sim::SimState;

pub use checkpoint::{Checkpoint, Checkpointer, SaveOutcome};
pub use session::{Session, TickReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Torso dropped below the termination height
    Fallen,
    /// Step limit reached
    MaxSteps,
    /// The simulation produced NaN or infinite state
    Diverged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePhase {
    Running,
    Terminated(TerminationReason),
}

/// What a recorded step did to the episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// Reported once, on the step that ended the episode
    Terminated(TerminationReason),
    /// The episode had already ended; the step was ignored
    AlreadyTerminated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub total_reward: f32,
    pub steps: usize,
    pub reason: TerminationReason,
    /// Whether the episode set a new best and was written to disk
    pub checkpoint: SaveOutcome,
}

/// Tracks the running episode and its cumulative reward.
#[derive(Debug)]
pub struct TaskController {
    phase: EpisodePhase,
    episode: usize,
    steps: usize,
    total_reward: f32,
    max_steps: usize,
    termination_height: f32,
    checkpointer: Checkpointer,
}

impl TaskController {
    pub fn new(checkpointer: Checkpointer) -> Self {
        Self::with_limits(checkpointer, EPISODE_LENGTH, TERMINATION_HEIGHT)
    }

    pub fn with_limits(checkpointer: Checkpointer, max_steps: usize, termination_height: f32) -> Self {
        Self {
            phase: EpisodePhase::Running,
            episode: 0,
            steps: 0,
            total_reward: 0.0,
            max_steps,
            termination_height,
            checkpointer,
        }
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    /// Index of the current episode, starting at 0.
    pub fn episode(&self) -> usize {
        self.episode
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn total_reward(&self) -> f32 {
        self.total_reward
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    pub fn checkpointer_mut(&mut self) -> &mut Checkpointer {
        &mut self.checkpointer
    }

    /// Add one step's reward and check the termination conditions.
    pub fn record_step(&mut self, reward: f32, torso_height: f32) -> StepOutcome {
        if let EpisodePhase::Terminated(_) = self.phase {
            return StepOutcome::AlreadyTerminated;
        }

        self.steps += 1;
        self.total_reward += reward;

        let reason = if torso_height < self.termination_height {
            Some(TerminationReason::Fallen)
        } else if self.steps >= self.max_steps {
            Some(TerminationReason::MaxSteps)
        } else {
            None
        };

        match reason {
            Some(reason) => self.terminate(reason),
            None => StepOutcome::Continue,
        }
    }

    /// End the episode because the simulation blew up.
    pub fn mark_diverged(&mut self) -> StepOutcome {
        if let EpisodePhase::Terminated(_) = self.phase {
            return StepOutcome::AlreadyTerminated;
        }
        self.terminate(TerminationReason::Diverged)
    }

    fn terminate(&mut self, reason: TerminationReason) -> StepOutcome {
        self.phase = EpisodePhase::Terminated(reason);
        StepOutcome::Terminated(reason)
    }

    /// Summarize the terminated episode and offer it to the checkpointer.
    ///
    /// Diverged episodes are never checkpointed: their reward and state are
    /// not trustworthy.
    pub fn finish_episode(&mut self, final_state: &SimState) -> Result<EpisodeSummary> {
        let reason = match self.phase {
            EpisodePhase::Terminated(reason) => reason,
            EpisodePhase::Running => TerminationReason::MaxSteps,
        };

        let checkpoint = if reason == TerminationReason::Diverged
            || !self.total_reward.is_finite()
            || !final_state.is_finite()
        {
            SaveOutcome::NotImproved
        } else {
            self.checkpointer.save(self.total_reward, final_state)?
        };

        Ok(EpisodeSummary {
            episode: self.episode,
            total_reward: self.total_reward,
            steps: self.steps,
            reason,
            checkpoint,
        })
    }

    /// Start the next episode.
    pub fn reset(&mut self) {
        self.phase = EpisodePhase::Running;
        self.episode += 1;
        self.steps = 0;
        self.total_reward = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(name: &str) -> TaskController {
        let path = std::env::temp_dir().join(format!("standup-task-{}-{}.bin", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        TaskController::new(Checkpointer::new(path))
    }

    fn state() -> SimState {
        SimState {
            positions: vec![0.0; 8],
            velocities: vec![0.0; 7],
            controls: vec![0.0],
        }
    }

    #[test]
    fn test_fall_terminates_exactly_once() {
        let mut task = controller("fall");
        assert_eq!(task.record_step(1.0, 1.2), StepOutcome::Continue);
        assert_eq!(
            task.record_step(0.5, 0.19),
            StepOutcome::Terminated(TerminationReason::Fallen)
        );
        assert_eq!(task.record_step(0.5, 0.1), StepOutcome::AlreadyTerminated);
        assert_eq!(task.record_step(0.5, 1.0), StepOutcome::AlreadyTerminated);
        assert_eq!(task.steps(), 2);
        assert!((task.total_reward() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_episode_ends_at_step_limit() {
        let mut task = controller("limit");
        for step in 1..EPISODE_LENGTH {
            assert_eq!(task.record_step(0.0, 1.0), StepOutcome::Continue, "step {step}");
        }
        assert_eq!(
            task.record_step(0.0, 1.0),
            StepOutcome::Terminated(TerminationReason::MaxSteps)
        );
        assert_eq!(task.steps(), EPISODE_LENGTH);
    }

    #[test]
    fn test_fall_takes_precedence_over_step_limit() {
        let mut task = TaskController::with_limits(Checkpointer::new("unused.bin"), 1, 0.2);
        assert_eq!(
            task.record_step(0.0, 0.05),
            StepOutcome::Terminated(TerminationReason::Fallen)
        );
    }

    #[test]
    fn test_finish_and_reset() {
        let mut task = controller("finish");
        task.record_step(-5.0, 0.1);
        let summary = task.finish_episode(&state()).unwrap();
        assert_eq!(summary.episode, 0);
        assert_eq!(summary.steps, 1);
        assert_eq!(summary.reason, TerminationReason::Fallen);
        assert_eq!(summary.checkpoint, SaveOutcome::Saved);

        task.reset();
        assert_eq!(task.phase(), EpisodePhase::Running);
        assert_eq!(task.episode(), 1);
        assert_eq!(task.steps(), 0);
        assert_eq!(task.total_reward(), 0.0);

        task.record_step(-6.0, 0.1);
        let summary = task.finish_episode(&state()).unwrap();
        assert_eq!(summary.checkpoint, SaveOutcome::NotImproved);

        let _ = std::fs::remove_file(task.checkpointer().path());
    }

    #[test]
    fn test_only_better_episodes_reach_disk() {
        let mut task = controller("better");
        let path = task.checkpointer().path().to_path_buf();

        task.record_step(-5.0, 0.1);
        assert_eq!(task.finish_episode(&state()).unwrap().checkpoint, SaveOutcome::Saved);
        task.reset();

        task.record_step(-3.0, 0.1);
        assert_eq!(task.finish_episode(&state()).unwrap().checkpoint, SaveOutcome::Saved);
        task.reset();
        let best = std::fs::read(&path).unwrap();

        // A write for the worse episode would recreate the file
        std::fs::remove_file(&path).unwrap();
        task.record_step(-4.0, 0.1);
        assert_eq!(task.finish_episode(&state()).unwrap().checkpoint, SaveOutcome::NotImproved);
        assert!(!path.exists());
        assert_eq!(task.checkpointer().best_reward(), -3.0);

        std::fs::write(&path, &best).unwrap();
        let mut reader = Checkpointer::new(&path);
        assert!(reader.load().unwrap());
        assert_eq!(reader.best_reward(), -3.0);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_diverged_episode_is_not_checkpointed() {
        let mut task = controller("diverged");
        task.record_step(3.0, 1.0);
        assert_eq!(
            task.mark_diverged(),
            StepOutcome::Terminated(TerminationReason::Diverged)
        );
        assert_eq!(task.mark_diverged(), StepOutcome::AlreadyTerminated);

        let summary = task.finish_episode(&state()).unwrap();
        assert_eq!(summary.reason, TerminationReason::Diverged);
        assert_eq!(summary.checkpoint, SaveOutcome::NotImproved);
        assert!(!task.checkpointer().path().exists());
    }
}
