//! Moving-average training statistics

use std::collections::VecDeque;
use std::time::Instant;

use super::train::UpdateStats;

/// Moving average calculator
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.window_size {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
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

/// Training metrics tracker
#[derive(Debug)]
pub struct TrainingMetrics {
    /// Episode rewards
    pub episode_rewards: MovingAverage,
    /// Episode lengths
    pub episode_lengths: MovingAverage,
    /// Fraction of episodes that ended with the torso on the ground
    pub fall_rate: MovingAverage,
    /// Policy loss
    pub policy_loss: MovingAverage,
    /// Value loss
    pub value_loss: MovingAverage,
    /// Entropy
    pub entropy: MovingAverage,
    /// Finished episodes
    pub episodes: usize,
    /// Completed PPO updates
    pub updates: usize,
    /// Total simulation steps
    pub total_timesteps: usize,
    /// Best episode reward seen in this process
    pub best_reward: f32,
    start_time: Instant,
}

impl TrainingMetrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            episode_rewards: MovingAverage::new(window_size),
            episode_lengths: MovingAverage::new(window_size),
            fall_rate: MovingAverage::new(window_size),
            policy_loss: MovingAverage::new(window_size),
            value_loss: MovingAverage::new(window_size),
            entropy: MovingAverage::new(window_size),
            episodes: 0,
            updates: 0,
            total_timesteps: 0,
            best_reward: f32::NEG_INFINITY,
            start_time: Instant::now(),
        }
    }

    pub fn record_step(&mut self) {
        self.total_timesteps += 1;
    }

    /// Record episode completion
    pub fn record_episode(&mut self, reward: f32, length: usize, fell: bool) {
        self.episodes += 1;
        self.episode_rewards.push(reward);
        self.episode_lengths.push(length as f32);
        self.fall_rate.push(if fell { 1.0 } else { 0.0 });
        self.best_reward = self.best_reward.max(reward);
    }

    /// Record training losses
    pub fn record_update(&mut self, stats: &UpdateStats) {
        self.updates += 1;
        self.policy_loss.push(stats.policy_loss);
        self.value_loss.push(stats.value_loss);
        self.entropy.push(stats.entropy);
    }

    pub fn timesteps_per_second(&self) -> f64 {
        let duration = self.start_time.elapsed().as_secs_f64();
        if duration > 0.0 {
            self.total_timesteps as f64 / duration
        } else {
            0.0
        }
    }

    /// Log current metrics to console
    pub fn log_to_console(&self) {
        tracing::info!(
            "Episode {} | Updates {} | Timesteps {} | SPS {:.1}",
            self.episodes,
            self.updates,
            self.total_timesteps,
            self.timesteps_per_second()
        );
        tracing::info!(
            "  Episode: reward={:.2}, length={:.1}, fall={:.1}%, best={:.2}",
            self.episode_rewards.average(),
            self.episode_lengths.average(),
            self.fall_rate.average() * 100.0,
            self.best_reward
        );
        tracing::info!(
            "  Losses: policy={:.4}, value={:.4}, entropy={:.4}",
            self.policy_loss.average(),
            self.value_loss.average(),
            self.entropy.average()
        );
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}
