//! Rollout storage between two training passes.

use crate::error::{Error, Result};

/// Fixed-capacity log of one rollout.
///
/// The five sequences are parallel: index `i` in each belongs to the same
/// transition.
#[derive(Debug, Clone)]
pub struct ExperienceBuffer {
    /// Raw observations [timesteps, obs_dim]
    pub states: Vec<Vec<f32>>,
    /// Sampled actions [timesteps, action_dim]
    pub actions: Vec<Vec<f32>>,
    /// Reward received after each action [timesteps]
    pub rewards: Vec<f32>,
    /// Critic estimate at the time of acting [timesteps]
    pub values: Vec<f32>,
    /// Summed log probability of each action [timesteps]
    pub log_probs: Vec<f32>,
    capacity: usize,
}

impl ExperienceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            states: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            log_probs: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(
        &mut self,
        state: Vec<f32>,
        action: Vec<f32>,
        reward: f32,
        value: f32,
        log_prob: f32,
    ) -> Result<()> {
        if self.is_full() {
            return Err(Error::BufferFull {
                capacity: self.capacity,
            });
        }
        self.states.push(state);
        self.actions.push(action);
        self.rewards.push(reward);
        self.values.push(value);
        self.log_probs.push(log_prob);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.actions.clear();
        self.rewards.clear();
        self.values.clear();
        self.log_probs.clear();
    }
}
