//! JSON body description consumed once at startup.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct ModelDescription {
    #[serde(default = "default_name")]
    pub name: String,
    /// Integration step in seconds
    pub timestep: f32,
    #[serde(default = "default_gravity")]
    pub gravity: f32,
    /// Viscous joint damping
    #[serde(default = "default_damping")]
    pub damping: f32,
    pub torso: TorsoDescription,
    /// Joints ordered from the ground contact upwards
    pub joints: Vec<JointDescription>,
    #[serde(default = "default_ctrl_range")]
    pub ctrl_range: [f32; 2],
    /// Half-width of the uniform noise added to joint angles on reset
    #[serde(default)]
    pub reset_noise: f32,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TorsoDescription {
    pub length: f32,
    pub mass: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JointDescription {
    pub name: String,
    /// Length of the link carried by this joint
    pub length: f32,
    pub mass: f32,
    /// Joint angle limits in radians
    pub range: [f32; 2],
    /// Torque per unit of control
    pub gear: f32,
    /// Effective rotational inertia
    #[serde(default = "default_armature")]
    pub armature: f32,
    #[serde(default)]
    pub initial: f32,
}

fn default_name() -> String {
    "body".to_string()
}

fn default_gravity() -> f32 {
    9.81
}

fn default_damping() -> f32 {
    1.0
}

fn default_ctrl_range() -> [f32; 2] {
    [-1.0, 1.0]
}

fn default_armature() -> f32 {
    1.0
}

impl ModelDescription {
    pub fn from_str(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json).map_err(Error::ModelParse)?;
        model.validate()?;
        Ok(model)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let model = Self::from_str(&json)?;
        tracing::info!(
            "Loaded model '{}' from {} ({} joints)",
            model.name,
            path.display(),
            model.joints.len()
        );
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidModel(msg));

        if !(self.timestep > 0.0) {
            return invalid(format!("timestep must be positive, got {}", self.timestep));
        }
        if self.joints.is_empty() {
            return invalid("model has no joints".to_string());
        }
        if !(self.torso.length > 0.0 && self.torso.mass > 0.0) {
            return invalid("torso length and mass must be positive".to_string());
        }
        if self.ctrl_range[0] >= self.ctrl_range[1] {
            return invalid(format!("empty ctrl range {:?}", self.ctrl_range));
        }
        for joint in &self.joints {
            if !(joint.length > 0.0 && joint.mass > 0.0 && joint.armature > 0.0) {
                return invalid(format!(
                    "joint '{}' needs positive length, mass and armature",
                    joint.name
                ));
            }
            if joint.range[0] >= joint.range[1] {
                return invalid(format!("joint '{}' has an empty range", joint.name));
            }
            if joint.initial < joint.range[0] || joint.initial > joint.range[1] {
                return invalid(format!(
                    "joint '{}' starts outside its range",
                    joint.name
                ));
            }
        }
        Ok(())
    }

    /// Torso height when every joint sits at its initial angle.
    pub fn initial_height(&self) -> f32 {
        let mut angle = 0.0f32;
        let mut height = 0.0f32;
        for joint in &self.joints {
            angle += joint.initial;
            height += joint.length * angle.cos();
        }
        height + 0.5 * self.torso.length * angle.cos()
    }
}
