//! Stand-up reward.

use crate::config::{MIN_HEIGHT, TARGET_HEIGHT};
use crate::sim::{ROOT_VELOCITY_DIM, Simulation};

/// Reward shaping weights.
#[derive(Debug, Clone)]
pub struct RewardConfig {
    /// Height at which the height term starts paying out
    pub min_height: f32,
    /// Height at which the height term saturates
    pub target_height: f32,
    pub height_weight: f32,
    pub upright_weight: f32,
    /// Penalty on mean squared joint velocity
    pub stability_weight: f32,
    /// Penalty on squared control effort
    pub energy_weight: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            min_height: MIN_HEIGHT,
            target_height: TARGET_HEIGHT,
            height_weight: 1.0,
            upright_weight: 0.5,
            stability_weight: 0.01,
            energy_weight: 0.001,
        }
    }
}

/// Individual reward terms, kept for logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewardBreakdown {
    pub height: f32,
    pub upright: f32,
    pub stability: f32,
    pub energy: f32,
}

impl RewardBreakdown {
    pub fn total(&self) -> f32 {
        self.height + self.upright - self.stability - self.energy
    }
}

#[derive(Debug, Clone, Default)]
pub struct RewardFunction {
    config: RewardConfig,
}

impl RewardFunction {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    pub fn evaluate(&self, sim: &impl Simulation) -> f32 {
        self.breakdown(sim).total()
    }

    pub fn breakdown(&self, sim: &impl Simulation) -> RewardBreakdown {
        let c = &self.config;

        let span = (c.target_height - c.min_height).max(f32::EPSILON);
        let height = ((sim.torso_height() - c.min_height) / span).clamp(0.0, 1.0);

        let [_, x, y, _] = sim.torso_orientation();
        let upright = 1.0 - 2.0 * (x * x + y * y);

        let joint_vel = sim.velocities().get(ROOT_VELOCITY_DIM..).unwrap_or(&[]);
        let stability = if joint_vel.is_empty() {
            0.0
        } else {
            joint_vel.iter().map(|v| v * v).sum::<f32>() / joint_vel.len() as f32
        };

        let energy: f32 = sim.controls().iter().map(|u| u * u).sum();

        RewardBreakdown {
            height: c.height_weight * height,
            upright: c.upright_weight * upright,
            stability: c.stability_weight * stability,
            energy: c.energy_weight * energy,
        }
    }
}
