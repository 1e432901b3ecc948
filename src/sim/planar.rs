//! Reduced-coordinate planar body.
//!
//! A serial chain of hinge joints standing on a pinned foot, with a torso on
//! top, moving in the sagittal plane. Each joint is driven by its actuator,
//! resisted by viscous damping, and pushed over by the weight of everything
//! it carries. There are no contacts: joint limits are the only constraints.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::model::ModelDescription;
use super::{ROOT_POSITION_DIM, ROOT_VELOCITY_DIM, SimState, Simulation};
use crate::error::{Error, Result};

pub struct PlanarBody {
    model: ModelDescription,
    rng: StdRng,
    /// Joint angles relative to the parent link
    q: Vec<f32>,
    /// Joint angular velocities
    qd: Vec<f32>,
    ctrl: Vec<f32>,
    positions: Vec<f32>,
    velocities: Vec<f32>,
    time: f32,
}

impl PlanarBody {
    pub fn new(model: ModelDescription) -> Self {
        let n = model.joints.len();
        let rng = StdRng::seed_from_u64(model.seed);
        let mut body = Self {
            rng,
            q: vec![0.0; n],
            qd: vec![0.0; n],
            ctrl: vec![0.0; n],
            positions: vec![0.0; ROOT_POSITION_DIM + n],
            velocities: vec![0.0; ROOT_VELOCITY_DIM + n],
            time: 0.0,
            model,
        };
        body.reset();
        body
    }

    pub fn model(&self) -> &ModelDescription {
        &self.model
    }

    /// Simulated seconds since the last reset.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Absolute link angles from vertical, one per joint plus the torso.
    fn absolute_angles(q: &[f32]) -> Vec<f32> {
        q.iter()
            .scan(0.0f32, |acc, &angle| {
                *acc += angle;
                Some(*acc)
            })
            .collect()
    }

    /// Base point of every link and the torso, in (x, z).
    pub fn joint_points(&self) -> Vec<[f32; 2]> {
        let angles = Self::absolute_angles(&self.q);
        let mut points = Vec::with_capacity(self.q.len() + 1);
        let (mut x, mut z) = (0.0f32, 0.0f32);
        points.push([x, z]);
        for (joint, angle) in self.model.joints.iter().zip(&angles) {
            x += joint.length * angle.sin();
            z += joint.length * angle.cos();
            points.push([x, z]);
        }
        points
    }

    /// Torso center (x, z) and pitch for joint angles `q`.
    fn torso_pose(&self, q: &[f32]) -> (f32, f32, f32) {
        let angles = Self::absolute_angles(q);
        let (mut x, mut z) = (0.0f32, 0.0f32);
        for (joint, angle) in self.model.joints.iter().zip(&angles) {
            x += joint.length * angle.sin();
            z += joint.length * angle.cos();
        }
        let pitch = angles.last().copied().unwrap_or(0.0);
        let half = 0.5 * self.model.torso.length;
        (x + half * pitch.sin(), z + half * pitch.cos(), pitch)
    }

    /// Toppling torque that gravity applies at each joint.
    fn gravity_torques(&self) -> Vec<f32> {
        let angles = Self::absolute_angles(&self.q);
        let points = self.joint_points();
        let n = self.q.len();

        // Mass and horizontal center of every body carried by the chain
        let mut bodies: Vec<(f32, f32)> = self
            .model
            .joints
            .iter()
            .zip(&angles)
            .zip(&points)
            .map(|((joint, angle), base)| (joint.mass, base[0] + 0.5 * joint.length * angle.sin()))
            .collect();
        let (torso_x, _, _) = self.torso_pose(&self.q);
        bodies.push((self.model.torso.mass, torso_x));

        (0..n)
            .map(|i| {
                let pivot = points[i][0];
                bodies[i..]
                    .iter()
                    .map(|(mass, x)| mass * self.model.gravity * (x - pivot))
                    .sum()
            })
            .collect()
    }

    fn sync_state(&mut self, previous: Option<(f32, f32, f32)>) {
        let (x, z, pitch) = self.torso_pose(&self.q);
        let (half_sin, half_cos) = (0.5 * pitch).sin_cos();
        self.positions[..ROOT_POSITION_DIM]
            .copy_from_slice(&[x, 0.0, z, half_cos, 0.0, half_sin, 0.0]);
        self.positions[ROOT_POSITION_DIM..].copy_from_slice(&self.q);

        let dt = self.model.timestep;
        let (vx, vz, wy) = match previous {
            Some((px, pz, ppitch)) => ((x - px) / dt, (z - pz) / dt, (pitch - ppitch) / dt),
            None => (0.0, 0.0, 0.0),
        };
        self.velocities[..ROOT_VELOCITY_DIM].copy_from_slice(&[vx, 0.0, vz, 0.0, wy, 0.0]);
        self.velocities[ROOT_VELOCITY_DIM..].copy_from_slice(&self.qd);
    }
}

impl Simulation for PlanarBody {
    fn reset(&mut self) {
        let noise = self.model.reset_noise;
        for (i, joint) in self.model.joints.iter().enumerate() {
            let jitter = if noise > 0.0 {
                self.rng.random_range(-noise..=noise)
            } else {
                0.0
            };
            self.q[i] = (joint.initial + jitter).clamp(joint.range[0], joint.range[1]);
            self.qd[i] = 0.0;
        }
        self.ctrl.iter_mut().for_each(|c| *c = 0.0);
        self.time = 0.0;
        self.sync_state(None);
    }

    fn step(&mut self, controls: &[f32]) -> Result<()> {
        if controls.len() != self.ctrl.len() {
            return Err(Error::ShapeMismatch {
                what: "controls",
                expected: self.ctrl.len(),
                actual: controls.len(),
            });
        }
        let [lo, hi] = self.model.ctrl_range;
        for (c, &u) in self.ctrl.iter_mut().zip(controls) {
            // NaN controls would poison the whole state
            *c = if u.is_finite() { u.clamp(lo, hi) } else { 0.0 };
        }

        let previous = self.torso_pose(&self.q);
        let gravity = self.gravity_torques();
        let dt = self.model.timestep;

        // Semi-implicit Euler: velocities first, then positions
        for (i, joint) in self.model.joints.iter().enumerate() {
            let torque = joint.gear * self.ctrl[i] + gravity[i] - self.model.damping * self.qd[i];
            self.qd[i] += dt * torque / joint.armature;
            self.q[i] += dt * self.qd[i];

            if self.q[i] <= joint.range[0] {
                self.q[i] = joint.range[0];
                self.qd[i] = self.qd[i].max(0.0);
            } else if self.q[i] >= joint.range[1] {
                self.q[i] = joint.range[1];
                self.qd[i] = self.qd[i].min(0.0);
            }
        }

        self.time += dt;
        self.sync_state(Some(previous));
        Ok(())
    }

    fn positions(&self) -> &[f32] {
        &self.positions
    }

    fn velocities(&self) -> &[f32] {
        &self.velocities
    }

    fn controls(&self) -> &[f32] {
        &self.ctrl
    }

    fn action_dim(&self) -> usize {
        self.ctrl.len()
    }

    fn torso_height(&self) -> f32 {
        self.positions[2]
    }

    fn torso_orientation(&self) -> [f32; 4] {
        [
            self.positions[3],
            self.positions[4],
            self.positions[5],
            self.positions[6],
        ]
    }

    fn timestep(&self) -> f32 {
        self.model.timestep
    }

    fn restore(&mut self, state: &SimState) -> Result<()> {
        let n = self.q.len();
        let checks = [
            ("positions", ROOT_POSITION_DIM + n, state.positions.len()),
            ("velocities", ROOT_VELOCITY_DIM + n, state.velocities.len()),
            ("controls", n, state.controls.len()),
        ];
        for (what, expected, actual) in checks {
            if expected != actual {
                return Err(Error::ShapeMismatch {
                    what,
                    expected,
                    actual,
                });
            }
        }
        self.q.copy_from_slice(&state.positions[ROOT_POSITION_DIM..]);
        self.qd.copy_from_slice(&state.velocities[ROOT_VELOCITY_DIM..]);
        self.ctrl.copy_from_slice(&state.controls);
        self.positions.copy_from_slice(&state.positions);
        self.velocities.copy_from_slice(&state.velocities);
        Ok(())
    }
}
