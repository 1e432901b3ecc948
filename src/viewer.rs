//! Interactive viewer for a training session.
//!
//! Controls: left drag orbits the camera, Space pauses, R resets the episode,
//! Escape or Q quits. The session advances one tick per frame while running,
//! so a training pass holds the frame until it finishes.

use bevy::input::mouse::AccumulatedMouseMotion;
use bevy::math::Isometry3d;
use bevy::prelude::*;
use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;

use crate::rl::ActorCritic;
use crate::sim::{PlanarBody, Simulation};
use crate::task::Session;

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 720;
const ORBIT_SPEED: f32 = 0.005;
const MIN_ELEVATION: f32 = -1.4;
const MAX_ELEVATION: f32 = 1.4;

/// All interactive state the update systems read and write.
#[derive(Resource, Debug, Clone)]
pub struct InputState {
    pub paused: bool,
    pub reset_requested: bool,
    /// Horizontal camera angle (radians)
    pub azimuth: f32,
    /// Vertical camera angle (radians)
    pub elevation: f32,
    pub distance: f32,
    /// Point the camera looks at
    pub target: Vec3,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            paused: false,
            reset_requested: false,
            azimuth: std::f32::consts::FRAC_PI_2,
            elevation: 0.3,
            distance: 4.0,
            target: Vec3::new(0.0, 0.8, 0.0),
        }
    }
}

impl InputState {
    /// Apply a mouse drag delta in pixels.
    pub fn orbit(&mut self, delta: Vec2) {
        self.azimuth -= delta.x * ORBIT_SPEED;
        self.elevation = (self.elevation + delta.y * ORBIT_SPEED).clamp(MIN_ELEVATION, MAX_ELEVATION);
    }

    pub fn camera_position(&self) -> Vec3 {
        let x = self.distance * self.azimuth.cos() * self.elevation.cos();
        let y = self.distance * self.elevation.sin();
        let z = self.distance * self.azimuth.sin() * self.elevation.cos();
        self.target + Vec3::new(x, y, z)
    }
}

#[derive(Component)]
struct ViewerCamera;

/// Open a window and train interactively until the user quits.
pub fn run_viewer<B, O>(session: Session<PlanarBody, B, O>)
where
    B: AutodiffBackend + 'static,
    O: Optimizer<ActorCritic<B>, B> + 'static,
{
    tracing::info!("Starting viewer");

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "standup".to_string(),
                resolution: (WINDOW_WIDTH, WINDOW_HEIGHT).into(),
                ..default()
            }),
            ..default()
        }))
        .insert_resource(ClearColor(Color::srgb(0.1, 0.1, 0.15)))
        .insert_resource(InputState::default())
        .insert_non_send_resource(session)
        .add_systems(Startup, setup)
        .add_systems(
            Update,
            (
                handle_input,
                tick_session::<B, O>,
                update_camera,
                draw_body::<B, O>,
            )
                .chain(),
        )
        .run();
}

fn setup(mut commands: Commands, input: Res<InputState>) {
    let transform = Transform::from_translation(input.camera_position()).looking_at(input.target, Vec3::Y);
    commands.spawn((Camera3d::default(), transform, ViewerCamera));
}

fn handle_input(
    keys: Res<ButtonInput<KeyCode>>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    mouse_motion: Res<AccumulatedMouseMotion>,
    mut input: ResMut<InputState>,
    mut exit: MessageWriter<AppExit>,
) {
    if keys.just_pressed(KeyCode::Escape) || keys.just_pressed(KeyCode::KeyQ) {
        exit.write(AppExit::Success);
        return;
    }
    if keys.just_pressed(KeyCode::Space) {
        input.paused = !input.paused;
        tracing::info!("Simulation {}", if input.paused { "paused" } else { "resumed" });
    }
    if keys.just_pressed(KeyCode::KeyR) {
        input.reset_requested = true;
    }
    if mouse_button.pressed(MouseButton::Left) {
        input.orbit(mouse_motion.delta);
    }
}

fn tick_session<B, O>(
    mut session: NonSendMut<Session<PlanarBody, B, O>>,
    mut input: ResMut<InputState>,
    mut exit: MessageWriter<AppExit>,
) where
    B: AutodiffBackend + 'static,
    O: Optimizer<ActorCritic<B>, B> + 'static,
{
    if input.reset_requested {
        input.reset_requested = false;
        session.request_reset();
    }
    if input.paused {
        return;
    }
    if let Err(e) = session.tick() {
        tracing::error!("Training stopped: {}", e);
        exit.write(AppExit::error());
    }
}

fn update_camera(input: Res<InputState>, mut cameras: Query<&mut Transform, With<ViewerCamera>>) {
    for mut transform in &mut cameras {
        transform.translation = input.camera_position();
        transform.look_at(input.target, Vec3::Y);
    }
}

fn draw_body<B, O>(session: NonSend<Session<PlanarBody, B, O>>, mut gizmos: Gizmos)
where
    B: AutodiffBackend + 'static,
    O: Optimizer<ActorCritic<B>, B> + 'static,
{
    let body = session.sim();

    // Ground
    for i in -5..=5 {
        let offset = i as f32 * 0.5;
        let color = Color::srgb(0.3, 0.3, 0.35);
        gizmos.line(Vec3::new(offset, 0.0, -2.5), Vec3::new(offset, 0.0, 2.5), color);
        gizmos.line(Vec3::new(-2.5, 0.0, offset), Vec3::new(2.5, 0.0, offset), color);
    }

    let to_world = |[x, z]: [f32; 2]| Vec3::new(x, z, 0.0);
    let points: Vec<Vec3> = body.joint_points().into_iter().map(to_world).collect();
    let limb = Color::srgb(0.8, 0.8, 0.9);
    for pair in points.windows(2) {
        gizmos.line(pair[0], pair[1], limb);
    }
    for point in &points {
        gizmos.sphere(Isometry3d::from_translation(*point), 0.04, Color::srgb(0.9, 0.6, 0.2));
    }

    // Torso: from the last joint along the pitch encoded in the orientation
    if let Some(base) = points.last() {
        let [w, _, y, _] = body.torso_orientation();
        let pitch = 2.0 * y.atan2(w);
        let length = body.model().torso.length;
        let top = *base + Vec3::new(length * pitch.sin(), length * pitch.cos(), 0.0);
        let color = if session.task().steps() == 0 {
            Color::srgb(0.9, 0.3, 0.3)
        } else {
            Color::srgb(0.3, 0.8, 0.4)
        };
        gizmos.line(*base, top, color);
        gizmos.sphere(Isometry3d::from_translation(top), 0.08, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_position_at_zero_angles() {
        let input = InputState {
            azimuth: 0.0,
            elevation: 0.0,
            distance: 5.0,
            target: Vec3::ZERO,
            ..Default::default()
        };
        let pos = input.camera_position();
        assert!((pos.x - 5.0).abs() < 1e-4);
        assert!(pos.y.abs() < 1e-4);
        assert!(pos.z.abs() < 1e-4);
    }

    #[test]
    fn test_orbit_clamps_elevation() {
        let mut input = InputState::default();
        input.orbit(Vec2::new(0.0, 10_000.0));
        assert_eq!(input.elevation, MAX_ELEVATION);
        input.orbit(Vec2::new(0.0, -20_000.0));
        assert_eq!(input.elevation, MIN_ELEVATION);

        let azimuth = input.azimuth;
        input.orbit(Vec2::new(100.0, 0.0));
        assert!((input.azimuth - (azimuth - 0.5)).abs() < 1e-5);
    }
}
