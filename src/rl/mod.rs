//! Reinforcement learning for the stand-up task.
//!
//! A Gaussian actor-critic trained with PPO on single-step rewards.
//! Observations are built by [`StateExtractor`], scored by
//! [`RewardFunction`], and stored in an [`ExperienceBuffer`] until the
//! [`Agent`] runs a training pass.

pub mod buffer;
pub mod metrics;
pub mod normalizer;
pub mod observation;
pub mod policy;
pub mod reward;
pub mod train;

pub use buffer::ExperienceBuffer;
pub use metrics::{MovingAverage, TrainingMetrics};
pub use normalizer::RunningNormalizer;
pub use observation::StateExtractor;
pub use policy::{ActorCritic, ActorCriticConfig};
pub use reward::{RewardBreakdown, RewardConfig, RewardFunction};
pub use train::{ActionSample, Agent, TrainConfig, UpdateStats, adam};
