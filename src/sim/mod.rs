//! Simulation driver seam.
//!
//! The trainer only needs a handful of things from a physics engine: apply a
//! control vector, advance one step, and read back positions, velocities and
//! the torso pose. [`Simulation`] captures exactly that, so a full engine can
//! be plugged in without touching the RL code. [`PlanarBody`] is the bundled
//! driver, built from a JSON [`ModelDescription`].

pub mod model;
pub mod planar;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use model::{JointDescription, ModelDescription, TorsoDescription};
pub use planar::PlanarBody;

/// Width of the free root joint in the position vector (xyz + quaternion).
pub const ROOT_POSITION_DIM: usize = 7;
/// Width of the free root joint in the velocity vector (linear + angular).
pub const ROOT_VELOCITY_DIM: usize = 6;

/// Raw simulation state, as copied out of the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    pub positions: Vec<f32>,
    pub velocities: Vec<f32>,
    pub controls: Vec<f32>,
}

impl SimState {
    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.positions
            .iter()
            .chain(&self.velocities)
            .chain(&self.controls)
            .all(|v| v.is_finite())
    }
}

/// A steppable physics model with a floating torso.
///
/// Positions follow the free-joint convention: the first
/// [`ROOT_POSITION_DIM`] entries are the root position and orientation
/// quaternion (w, x, y, z), the rest are joint angles.
pub trait Simulation {
    /// Restore the initial pose (with any configured reset noise).
    fn reset(&mut self);

    /// Apply `controls` and advance the state by one timestep.
    fn step(&mut self, controls: &[f32]) -> Result<()>;

    fn positions(&self) -> &[f32];

    fn velocities(&self) -> &[f32];

    /// Controls applied during the last step, after clamping.
    fn controls(&self) -> &[f32];

    /// Number of actuators, which is the policy's action dimensionality.
    fn action_dim(&self) -> usize;

    /// Height of the torso above the ground.
    fn torso_height(&self) -> f32;

    /// Torso orientation quaternion (w, x, y, z).
    fn torso_orientation(&self) -> [f32; 4];

    /// Seconds of simulated time per step.
    fn timestep(&self) -> f32;

    fn snapshot(&self) -> SimState {
        SimState {
            positions: self.positions().to_vec(),
            velocities: self.velocities().to_vec(),
            controls: self.controls().to_vec(),
        }
    }

    /// Overwrite the current state with a snapshot taken from the same model.
    fn restore(&mut self, state: &SimState) -> Result<()>;
}
