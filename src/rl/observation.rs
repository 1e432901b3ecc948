//! Feature extraction from raw simulation state.

use crate::sim::{ROOT_POSITION_DIM, Simulation};

/// Builds the policy's observation vector.
///
/// Layout: `[joint positions (root excluded), velocities, torso height,
/// torso orientation (w, x, y, z)]`. The size is fixed by the model the
/// extractor was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateExtractor {
    joint_dim: usize,
    velocity_dim: usize,
}

impl StateExtractor {
    pub fn new(sim: &impl Simulation) -> Self {
        Self {
            joint_dim: sim.positions().len().saturating_sub(ROOT_POSITION_DIM),
            velocity_dim: sim.velocities().len(),
        }
    }

    pub fn obs_dim(&self) -> usize {
        self.joint_dim + self.velocity_dim + 1 + 4
    }

    pub fn extract(&self, sim: &impl Simulation) -> Vec<f32> {
        let positions = sim.positions();
        let joints = positions.get(ROOT_POSITION_DIM..).unwrap_or(&[]);
        debug_assert_eq!(joints.len(), self.joint_dim);
        debug_assert_eq!(sim.velocities().len(), self.velocity_dim);

        let mut obs = Vec::with_capacity(self.obs_dim());
        obs.extend_from_slice(joints);
        obs.extend_from_slice(sim.velocities());
        obs.push(sim.torso_height());
        obs.extend_from_slice(&sim.torso_orientation());
        obs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::model::tests::TEST_MODEL;
    use crate::sim::{ModelDescription, PlanarBody};

    #[test]
    fn test_observation_layout() {
        let mut body = PlanarBody::new(ModelDescription::from_str(TEST_MODEL).unwrap());
        body.step(&[0.2, -0.1, 0.4]).unwrap();
        let extractor = StateExtractor::new(&body);

        // 3 joints + (6 root + 3 joint) velocities + height + quaternion
        assert_eq!(extractor.obs_dim(), 3 + 9 + 1 + 4);

        let obs = extractor.extract(&body);
        assert_eq!(obs.len(), extractor.obs_dim());
        assert_eq!(&obs[..3], &body.positions()[ROOT_POSITION_DIM..]);
        assert_eq!(&obs[3..12], body.velocities());
        assert_eq!(obs[12], body.torso_height());
        assert_eq!(&obs[13..], &body.torso_orientation());
    }
}
