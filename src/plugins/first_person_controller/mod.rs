//! This module contains the first person controller plugin.
//!
//! The player root node carries the physics body and the yaw, while the camera anchor child only
//! carries the pitch. Both angles live in [`FirstPersonController`], which is also what portals
//! rewrite when the player is teleported, independently of the body orientation.

use std::f32::consts::FRAC_PI_2;

use bevy::{prelude::*, reflect::FromReflect, render::camera::Projection};
use bevy_rapier3d::prelude::*;
use euclid::Angle;
use iyes_loopless::prelude::*;
use leafwing_input_manager::prelude::*;

use crate::plugins::{
    config::GameConfig,
    game::GameState,
    input::{default_input_map, Actions},
    physics::*,
    portal::{ControlRotation, PortalTeleport},
    trajectory::ProjectileLauncher,
};

#[derive(Debug)]
/// First person controller plugin, which registers the required systems to use the first person
/// controller also provided by this module.
pub struct FirstPersonControllerPlugin;

impl Plugin for FirstPersonControllerPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<FirstPersonCamera>()
            .add_system(spawn_controller.label(FirstPersonLabels::SpawnControllers))
            .add_system(
                process_controller_inputs
                    .run_in_state(GameState::Playing)
                    .label(FirstPersonLabels::ProcessInputs)
                    .after(FirstPersonLabels::SpawnControllers),
            )
            .add_system(
                apply_look_orientation
                    .label(FirstPersonLabels::ApplyLook)
                    .after(FirstPersonLabels::ProcessInputs),
            );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, SystemLabel)]
/// Labels for the first person controller systems.
pub enum FirstPersonLabels {
    SpawnControllers,
    ProcessInputs,
    ApplyLook,
}

#[derive(Debug, Component)]
/// First person controller component.
pub struct FirstPersonController {
    /// Yaw, counterclockwise around the vertical axis.
    pub theta: Angle<f32>,
    /// Pitch, positive when looking up.
    pub phi: Angle<f32>,
    pub camera_anchor: Entity,
}

impl FirstPersonController {
    pub fn new(camera_anchor: Entity) -> Self {
        FirstPersonController {
            theta: Angle::zero(),
            phi: Angle::zero(),
            camera_anchor,
        }
    }

    pub fn body_rotation(&self) -> Quat {
        Quat::from_rotation_y(self.theta.radians)
    }

    pub fn camera_rotation(&self) -> Quat {
        Quat::from_rotation_x(self.phi.radians)
    }
}

impl ControlRotation for FirstPersonController {
    fn control_rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.theta.radians, self.phi.radians, 0.)
    }

    fn set_control_rotation(&mut self, rotation: Quat) {
        // Roll is dropped: the player always stays upright after going through a tilted portal.
        let (yaw, pitch, _roll) = rotation.to_euler(EulerRot::YXZ);
        self.theta = Angle::radians(yaw).signed();
        self.phi = Angle::radians(pitch.clamp(-FRAC_PI_2, FRAC_PI_2));
    }
}

#[derive(Debug, Default, Component, Reflect, FromReflect)]
#[reflect(Component)]
/// Marker trait for first person cameras
pub struct FirstPersonCamera;

#[derive(Debug, Component, Default)]
pub struct FirstPersonControllerSpawner;

#[derive(Debug, Bundle, Default)]
pub struct FirstPersonControllerBundle {
    #[bundle]
    pub spatial: SpatialBundle,
    pub spawner: FirstPersonControllerSpawner,
}

const PLAYER_HEIGHT: f32 = 1.8;
const EYE_HEIGHT: f32 = 1.25;
const CAMERA_OFFSET: Vec3 = Vec3::new(0., EYE_HEIGHT - PLAYER_HEIGHT / 2., 0.);

fn spawn_controller(
    mut commands: Commands,
    config: Res<GameConfig>,
    spawners_query: Query<Entity, With<FirstPersonControllerSpawner>>,
) {
    for id in &spawners_query {
        let player_root = commands
            .entity(id)
            .insert(InputManagerBundle {
                action_state: ActionState::default(),
                input_map: default_input_map(),
            })
            .insert((
                RigidBody::Dynamic,
                Collider::capsule_y(PLAYER_HEIGHT / 2. - 0.4, 0.4),
                LockedAxes::ROTATION_LOCKED,
                Velocity::default(),
                Name::from("Player"),
                CollisionGroups::new(PLAYER_GROUP, ALL_GROUPS),
                ActiveEvents::COLLISION_EVENTS,
                PortalTeleport,
                ProjectileLauncher::default(),
            ))
            .id();

        let camera_anchor = commands
            .spawn(SpatialBundle::from(Transform::from_translation(
                CAMERA_OFFSET,
            )))
            .insert(Name::from("Camera anchor"))
            .id();

        let camera = commands
            .spawn(Camera3dBundle {
                projection: Projection::Perspective(PerspectiveProjection {
                    // Portal surfaces map screen pixels 1:1 onto the capture targets.
                    fov: config.portal.fov,
                    aspect_ratio: 16. / 9.,
                    near: 0.1,
                    far: 1000.,
                }),
                ..default()
            })
            .insert((Name::from("Player camera"), FirstPersonCamera))
            .id();

        commands.entity(camera_anchor).push_children(&[camera]);

        commands
            .entity(player_root)
            .add_child(camera_anchor)
            .insert(FirstPersonController::new(camera_anchor));

        commands.entity(id).remove::<FirstPersonControllerSpawner>();
        info!("Spawned first person controller {:?}", id);
    }
}

const PLAYER_SPEED: f32 = 3.;
const MOUSE_SENSITIVITY: f32 = 0.004;
const SPRINT_MULTIPLIER: f32 = 2.;

fn process_controller_inputs(
    mut player_query: Query<(
        &ActionState<Actions>,
        &mut FirstPersonController,
        &mut Velocity,
        &Transform,
    )>,
) {
    for (input_state, mut controller, mut velocity, transform) in &mut player_query {
        let k = if input_state.pressed(Actions::Sprint) {
            SPRINT_MULTIPLIER
        } else {
            1.
        };
        let mut direction = Vec3::ZERO;

        // Process movement on the forward axis
        match (
            input_state.pressed(Actions::Forward),
            input_state.pressed(Actions::Backwards),
        ) {
            (true, false) => direction += transform.forward(),
            (false, true) => direction -= transform.forward(),
            _ => {}
        }

        // Process movement on the lateral axis
        match (
            input_state.pressed(Actions::StrafeLeft),
            input_state.pressed(Actions::StrafeRight),
        ) {
            (true, false) => direction += transform.left(),
            (false, true) => direction -= transform.left(),
            _ => {}
        }

        // Only the horizontal velocity is driven, gravity keeps control of the vertical one.
        let horizontal = Vec3::new(direction.x, 0., direction.z).normalize_or_zero();
        velocity.linvel.x = PLAYER_SPEED * k * horizontal.x;
        velocity.linvel.z = PLAYER_SPEED * k * horizontal.z;

        if let Some(mouse_movement) = input_state.axis_pair(Actions::Aim) {
            controller.theta = (controller.theta
                - Angle::radians(mouse_movement.x() * MOUSE_SENSITIVITY))
            .signed();
            let pitch = controller.phi.radians - mouse_movement.y() * MOUSE_SENSITIVITY;
            controller.phi = Angle::radians(pitch.clamp(-FRAC_PI_2, FRAC_PI_2));
        }
    }
}

/// The yaw is applied to the player root node, the pitch to the camera anchor, which keeps the
/// root node upright.
fn apply_look_orientation(
    mut player_query: Query<
        (&FirstPersonController, &mut Transform),
        Changed<FirstPersonController>,
    >,
    mut anchor_query: Query<&mut Transform, Without<FirstPersonController>>,
) {
    for (controller, mut transform) in &mut player_query {
        transform.rotation = controller.body_rotation();
        if let Ok(mut anchor_transform) = anchor_query.get_mut(controller.camera_anchor) {
            anchor_transform.rotation = controller.camera_rotation();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_rotation_round_trips_through_angles() {
        let mut controller = FirstPersonController::new(Entity::from_raw(0));
        controller.theta = Angle::radians(0.7);
        controller.phi = Angle::radians(-0.3);
        let rotation = controller.control_rotation();

        let mut other = FirstPersonController::new(Entity::from_raw(0));
        other.set_control_rotation(rotation);
        assert!((other.theta.radians - 0.7).abs() < 1e-4);
        assert!((other.phi.radians + 0.3).abs() < 1e-4);
    }

    #[test]
    fn control_rotation_is_body_then_camera() {
        let mut controller = FirstPersonController::new(Entity::from_raw(0));
        controller.theta = Angle::radians(1.2);
        controller.phi = Angle::radians(0.4);
        let combined = controller.body_rotation() * controller.camera_rotation();
        assert!(combined.angle_between(controller.control_rotation()) < 1e-4);
    }

    #[test]
    fn half_turn_yaw_is_kept_in_range() {
        let mut controller = FirstPersonController::new(Entity::from_raw(0));
        controller.set_control_rotation(Quat::from_rotation_y(3. * FRAC_PI_2));
        assert!((controller.theta.radians + FRAC_PI_2).abs() < 1e-4);
        assert!(controller.phi.radians.abs() < 1e-4);
    }

    #[test]
    fn player_camera_uses_the_portal_field_of_view() {
        let mut world = World::new();
        let mut config = GameConfig::default();
        config.portal.fov = 1.1;
        world.insert_resource(config);
        world.spawn(FirstPersonControllerBundle::default());

        SystemStage::single(spawn_controller).run(&mut world);

        let projection = world
            .query_filtered::<&Projection, With<FirstPersonCamera>>()
            .single(&world);
        match projection {
            Projection::Perspective(perspective) => assert!((perspective.fov - 1.1).abs() < 1e-6),
            Projection::Orthographic(_) => panic!("player camera should use a perspective projection"),
        }
    }
}
