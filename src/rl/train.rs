//! PPO agent: action sampling and clipped-objective updates

use std::fs;
use std::path::Path;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::Distribution;
use burn::tensor::backend::AutodiffBackend;

use super::buffer::ExperienceBuffer;
use super::normalizer::RunningNormalizer;
use super::policy::{ActorCritic, ActorCriticConfig, gaussian_entropy, gaussian_log_prob};
use crate::error::{Error, Result, tensor_to_vec};

const POLICY_FILE: &str = "policy";
const NORMALIZER_FILE: &str = "normalizer.json";

/// Training configuration
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Number of PPO epochs per update
    pub ppo_epochs: usize,
    /// PPO clip range
    pub clip_epsilon: f32,
    /// Value loss coefficient
    pub value_coef: f32,
    /// Entropy bonus coefficient
    pub entropy_coef: f32,
    /// Transitions collected before every update
    pub rollout_capacity: usize,
    /// Number of mini-batches. Kept for configuration compatibility; each
    /// epoch is a single full-batch step.
    pub mini_batch_count: usize,
    /// Added to the advantage std before dividing
    pub advantage_epsilon: f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            ppo_epochs: 10,
            clip_epsilon: 0.2,
            value_coef: 0.5,
            entropy_coef: 0.01,
            rollout_capacity: 2048,
            mini_batch_count: 32,
            advantage_epsilon: 1e-8,
        }
    }
}

/// One sampled action with the quantities recorded next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSample {
    pub action: Vec<f32>,
    /// Log density of `action`, summed over dimensions
    pub log_prob: f32,
    /// Critic estimate for the observation
    pub value: f32,
}

/// Losses averaged over the epochs of one update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateStats {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub samples: usize,
}

/// Adam with burn's default moments, as used by the agent.
pub fn adam<B: AutodiffBackend>() -> impl Optimizer<ActorCritic<B>, B> {
    AdamConfig::new().init::<B, ActorCritic<B>>()
}

/// Owns the network, the observation statistics and the optimizer state.
/// The acting path and the training path both go through it.
pub struct Agent<B: AutodiffBackend, O> {
    model: ActorCritic<B>,
    normalizer: RunningNormalizer,
    optimizer: O,
    config: TrainConfig,
    obs_dim: usize,
    action_dim: usize,
    device: B::Device,
}

impl<B, O> Agent<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ActorCritic<B>, B>,
{
    pub fn new(
        device: B::Device,
        network: &ActorCriticConfig,
        config: TrainConfig,
        optimizer: O,
    ) -> Self {
        let model = network.init(&device);

        Self {
            model,
            normalizer: RunningNormalizer::new(network.obs_dim),
            optimizer,
            config,
            obs_dim: network.obs_dim,
            action_dim: network.action_dim,
            device,
        }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn model(&self) -> &ActorCritic<B> {
        &self.model
    }

    pub fn normalizer(&self) -> &RunningNormalizer {
        &self.normalizer
    }

    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    /// Sample an action for a single observation.
    pub fn sample_action(&self, observation: &[f32]) -> Result<ActionSample> {
        let mut samples = self.sample_actions(&[observation.to_vec()])?;
        samples
            .pop()
            .ok_or(Error::Tensor("empty policy output".to_string()))
    }

    /// Sample one action per observation. Does not touch the parameters.
    pub fn sample_actions(&self, observations: &[Vec<f32>]) -> Result<Vec<ActionSample>> {
        if observations.is_empty() {
            return Ok(Vec::new());
        }
        let normalized = self.normalizer.normalize_batch(observations)?;
        let batch_size = normalized.len();

        let model = self.model.valid();
        let obs = to_tensor::<B::InnerBackend>(&normalized, self.obs_dim, &self.device);
        let (mean, std, value) = model.forward(obs);

        let noise = Tensor::random(mean.shape(), Distribution::Normal(0.0, 1.0), &self.device);
        let action = mean.clone() + std.clone() * noise;
        let log_prob = gaussian_log_prob(action.clone(), mean, std);

        let actions = tensor_to_vec(action.into_data())?;
        let log_probs = tensor_to_vec(log_prob.into_data())?;
        let values = tensor_to_vec(value.into_data())?;

        if !actions.iter().all(|a| a.is_finite()) {
            return Err(Error::NonFinite("sampled action"));
        }
        if !values.iter().chain(&log_probs).all(|v| v.is_finite()) {
            return Err(Error::NonFinite("value estimate"));
        }

        Ok((0..batch_size)
            .map(|i| ActionSample {
                action: actions[i * self.action_dim..(i + 1) * self.action_dim].to_vec(),
                log_prob: log_probs[i],
                value: values[i],
            })
            .collect())
    }

    /// Deterministic action: the Gaussian mean.
    pub fn action_mean(&self, observation: &[f32]) -> Result<Vec<f32>> {
        let normalized = self.normalizer.normalize(observation)?;
        let obs = to_tensor::<B::InnerBackend>(&[normalized], self.obs_dim, &self.device);
        let (mean, _, _) = self.model.valid().forward(obs);
        tensor_to_vec(mean.into_data())
    }

    /// Fold one step's observation into the running statistics.
    ///
    /// A single row only moves the mean, so during training the std keeps
    /// its initial value of 1 and normalization is mean subtraction.
    pub fn observe(&mut self, observation: &[f32]) -> Result<()> {
        self.normalizer.update(&[observation.to_vec()])
    }

    /// Run the PPO epochs over the whole buffer.
    pub fn update(&mut self, buffer: &ExperienceBuffer) -> Result<UpdateStats> {
        let n = buffer.len();
        if n == 0 {
            return Ok(UpdateStats::default());
        }
        if let Some(bad) = buffer.states.iter().find(|s| s.len() != self.obs_dim) {
            return Err(Error::ShapeMismatch {
                what: "observation",
                expected: self.obs_dim,
                actual: bad.len(),
            });
        }
        if let Some(bad) = buffer.actions.iter().find(|a| a.len() != self.action_dim) {
            return Err(Error::ShapeMismatch {
                what: "action",
                expected: self.action_dim,
                actual: bad.len(),
            });
        }

        let advantages: Vec<f32> = buffer
            .rewards
            .iter()
            .zip(&buffer.values)
            .map(|(r, v)| r - v)
            .collect();
        let advantages = standardize_advantages(&advantages, self.config.advantage_epsilon);

        let obs = self
            .normalizer
            .normalize_tensor(to_tensor::<B>(&buffer.states, self.obs_dim, &self.device))?;
        let actions = to_tensor::<B>(&buffer.actions, self.action_dim, &self.device);
        let old_log_probs = column::<B>(&buffer.log_probs, &self.device);
        let rewards = column::<B>(&buffer.rewards, &self.device);
        let advantages = column::<B>(&advantages, &self.device);

        let mut total_policy_loss = 0.0f32;
        let mut total_value_loss = 0.0f32;
        let mut total_entropy = 0.0f32;

        for _ in 0..self.config.ppo_epochs {
            let (mean, std, values) = self.model.forward(obs.clone());
            let new_log_probs = gaussian_log_prob(actions.clone(), mean, std.clone());

            let ratio = (new_log_probs - old_log_probs.clone()).exp();
            let surrogate = clipped_surrogate(ratio, advantages.clone(), self.config.clip_epsilon);
            let policy_loss = -surrogate.mean();

            let value_loss = (values - rewards.clone()).powf_scalar(2.0).mean();
            let entropy = gaussian_entropy(std).mean();

            let loss = policy_loss.clone() + value_loss.clone() * self.config.value_coef
                - entropy.clone() * self.config.entropy_coef;

            let loss_value = scalar(loss.clone())?;
            if !loss_value.is_finite() {
                return Err(Error::NonFinite("loss"));
            }

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            total_policy_loss += scalar(policy_loss)?;
            total_value_loss += scalar(value_loss)?;
            total_entropy += scalar(entropy)?;
        }

        let epochs = self.config.ppo_epochs.max(1) as f32;
        let stats = UpdateStats {
            policy_loss: total_policy_loss / epochs,
            value_loss: total_value_loss / epochs,
            entropy: total_entropy / epochs,
            samples: n,
        };
        tracing::debug!(
            "PPO update on {} samples: policy_loss={:.4}, value_loss={:.4}, entropy={:.4}",
            n,
            stats.policy_loss,
            stats.value_loss,
            stats.entropy
        );
        Ok(stats)
    }

    /// Write network weights and normalizer statistics into `dir`.
    pub fn save_policy(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(dir.join(POLICY_FILE), &recorder)
            .map_err(|e| Error::Recorder(format!("{e:?}")))?;

        let stats = serde_json::to_string_pretty(&self.normalizer).map_err(Error::Json)?;
        fs::write(dir.join(NORMALIZER_FILE), stats)?;

        tracing::info!("Saved policy to {}", dir.display());
        Ok(())
    }

    /// Replace weights and normalizer statistics with the ones in `dir`.
    pub fn load_policy(&mut self, dir: &Path) -> Result<()> {
        let stats = fs::read_to_string(dir.join(NORMALIZER_FILE))?;
        let normalizer: RunningNormalizer = serde_json::from_str(&stats).map_err(Error::Json)?;
        if normalizer.dim() != self.obs_dim {
            return Err(Error::ShapeMismatch {
                what: "normalizer",
                expected: self.obs_dim,
                actual: normalizer.dim(),
            });
        }

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model = self
            .model
            .clone()
            .load_file(dir.join(POLICY_FILE), &recorder, &self.device)
            .map_err(|e| Error::Recorder(format!("{e:?}")))?;
        self.normalizer = normalizer;

        tracing::info!("Loaded policy from {}", dir.display());
        Ok(())
    }
}

/// `(a - mean) / (std + epsilon)` with the unbiased std.
///
/// A single sample has zero spread, so it maps to zero.
pub fn standardize_advantages(advantages: &[f32], epsilon: f32) -> Vec<f32> {
    let n = advantages.len();
    if n == 0 {
        return Vec::new();
    }
    let mean = advantages.iter().sum::<f32>() / n as f32;
    let std = if n > 1 {
        let var = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / (n - 1) as f32;
        var.sqrt()
    } else {
        0.0
    };
    advantages
        .iter()
        .map(|a| (a - mean) / (std + epsilon))
        .collect()
}

/// Element-wise `min(ratio * A, clip(ratio, 1 - e, 1 + e) * A)`.
pub fn clipped_surrogate<B: Backend, const D: usize>(
    ratio: Tensor<B, D>,
    advantages: Tensor<B, D>,
    epsilon: f32,
) -> Tensor<B, D> {
    let clipped_ratio = ratio.clone().clamp(1.0 - epsilon, 1.0 + epsilon);
    let surr1 = ratio * advantages.clone();
    let surr2 = clipped_ratio * advantages;
    surr1.min_pair(surr2)
}

fn to_tensor<B: Backend>(rows: &[Vec<f32>], width: usize, device: &B::Device) -> Tensor<B, 2> {
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([rows.len(), width])
}

fn column<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 2> {
    Tensor::<B, 1>::from_floats(values, device).reshape([values.len(), 1])
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> Result<f32> {
    tensor_to_vec(tensor.into_data())?
        .first()
        .copied()
        .ok_or(Error::Tensor("empty scalar".to_string()))
}
