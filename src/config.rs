//! Run configuration: compile-time defaults with environment overrides.

use std::env;
use std::path::PathBuf;

/// Restore the best-reward checkpoint at startup.
pub const LOAD_ON_START: bool = true;
/// Torso height at which the height reward starts counting.
pub const MIN_HEIGHT: f32 = 0.6;
/// Torso height of a fully standing body.
pub const TARGET_HEIGHT: f32 = 1.3;
/// Maximum number of simulation steps in one episode.
pub const EPISODE_LENGTH: usize = 1000;
/// Episodes end as soon as the torso drops below this height.
pub const TERMINATION_HEIGHT: f32 = 0.2;

const DEFAULT_MODEL: &str = "assets/planar_humanoid.json";
const DEFAULT_CHECKPOINT: &str = "checkpoints/best_state.bin";
const DEFAULT_POLICY_DIR: &str = "checkpoints/policy";

fn get_env_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.parse::<T>().ok())
}

/// Everything `main` needs to assemble a training session.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// JSON body description consumed once at startup
    pub model_path: PathBuf,
    /// Best-reward state snapshot
    pub checkpoint_path: PathBuf,
    /// Directory for policy weights and normalizer statistics
    pub policy_dir: PathBuf,
    pub load_on_start: bool,
    /// Stop after this many episodes (headless only); `None` runs forever
    pub max_episodes: Option<usize>,
    pub viewer: bool,
    /// Log the metrics summary every N episodes
    pub log_every: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL),
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT),
            policy_dir: PathBuf::from(DEFAULT_POLICY_DIR),
            load_on_start: LOAD_ON_START,
            max_episodes: None,
            viewer: false,
            log_every: 10,
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `STANDUP_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_path: get_env_var("STANDUP_MODEL").unwrap_or(defaults.model_path),
            checkpoint_path: get_env_var("STANDUP_CHECKPOINT")
                .unwrap_or(defaults.checkpoint_path),
            policy_dir: get_env_var("STANDUP_POLICY_DIR").unwrap_or(defaults.policy_dir),
            load_on_start: get_env_var("STANDUP_LOAD_CHECKPOINT")
                .unwrap_or(defaults.load_on_start),
            max_episodes: get_env_var("STANDUP_EPISODES").or(defaults.max_episodes),
            viewer: get_env_var("STANDUP_VIEWER").unwrap_or(defaults.viewer),
            log_every: get_env_var::<usize>("STANDUP_LOG_EVERY")
                .filter(|&n| n > 0)
                .unwrap_or(defaults.log_every),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        let config = AppConfig::default();
        assert_eq!(config.max_episodes, None);
        assert!(config.load_on_start);
        assert_eq!(EPISODE_LENGTH, 1000);
        assert!((TERMINATION_HEIGHT - 0.2).abs() < 1e-6);
        assert!(MIN_HEIGHT < TARGET_HEIGHT);
    }
}
