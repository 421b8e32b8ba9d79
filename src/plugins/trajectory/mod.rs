//! Projectile firing, and the trajectory preview shown while aiming.

use std::time::Duration;

use bevy::{prelude::*, utils::HashSet};
use bevy_prototype_debug_lines::DebugLines;
use bevy_rapier3d::prelude::*;
use iyes_loopless::prelude::*;
use leafwing_input_manager::prelude::ActionState;

pub mod simulation;
pub mod sweep;

use simulation::{ProjectileBody, TrajectoryPath, TrajectorySettings};
use sweep::RapierSweep;

use super::{
    config::{GameConfig, ProjectileConfig},
    first_person_controller::FirstPersonCamera,
    game::GameState,
    input::Actions,
    physics::*,
    portal::PortalTeleport,
};

#[derive(Debug)]
pub struct TrajectoryPlugin;

#[derive(Debug, Clone, PartialEq, Eq, Hash, SystemLabel)]
pub enum TrajectoryLabels {
    HandleInput,
    Predict,
    Draw,
}

impl Plugin for TrajectoryPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<ImpactMarker>()
            .add_startup_system(load_trajectory_assets)
            .add_enter_system(GameState::Paused, stop_predicting)
            .add_system(
                handle_launcher_input
                    .run_in_state(GameState::Playing)
                    .label(TrajectoryLabels::HandleInput),
            )
            .add_system(
                predict_trajectories
                    .label(TrajectoryLabels::Predict)
                    .after(TrajectoryLabels::HandleInput),
            )
            .add_system_set(
                SystemSet::new()
                    .label(TrajectoryLabels::Draw)
                    .after(TrajectoryLabels::Predict)
                    .with_system(draw_trajectory_previews)
                    .with_system(sync_impact_markers),
            )
            .add_system(expire_projectiles);
    }
}

/// Fires projectiles, and predicts where they would go while the player aims.
#[derive(Debug, Default, Component)]
pub struct ProjectileLauncher {
    predicting: bool,
    preview: TrajectoryPath,
    markers: Vec<Entity>,
}

impl ProjectileLauncher {
    pub fn is_predicting(&self) -> bool {
        self.predicting
    }

    /// Turning prediction off discards the preview.
    pub fn set_predicting(&mut self, predicting: bool) {
        self.predicting = predicting;
        if !predicting {
            self.clear_preview();
        }
    }

    pub fn preview(&self) -> &TrajectoryPath {
        &self.preview
    }

    pub fn preview_mut(&mut self) -> &mut TrajectoryPath {
        &mut self.preview
    }

    pub fn clear_preview(&mut self) {
        self.preview.clear();
    }
}

#[derive(Debug, Component)]
pub struct Projectile {
    lifetime: Timer,
}

impl Projectile {
    pub fn new(life_span: f32) -> Self {
        Projectile {
            lifetime: Timer::from_seconds(life_span, TimerMode::Once),
        }
    }

    /// Returns whether the projectile has run out of time.
    pub fn tick(&mut self, delta: Duration) -> bool {
        self.lifetime.tick(delta).finished()
    }
}

#[derive(Debug, Default, Component, Reflect)]
#[reflect(Component)]
pub struct ImpactMarker;

#[derive(Debug, Resource)]
pub struct TrajectoryResources {
    pub projectile_mesh: Handle<Mesh>,
    pub projectile_material: Handle<StandardMaterial>,
    pub marker_mesh: Handle<Mesh>,
    pub marker_material: Handle<StandardMaterial>,
}

/// Where a projectile fired from `camera` starts, and its initial velocity.
pub fn launch_state(camera: &GlobalTransform, config: &ProjectileConfig) -> (Vec3, Vec3) {
    let (_scale, rotation, translation) = camera.to_scale_rotation_translation();
    let origin = translation + rotation * config.muzzle_offset();
    let velocity = rotation * Vec3::NEG_Z * config.initial_speed;
    (origin, velocity)
}

fn load_trajectory_assets(
    mut commands: Commands,
    config: Res<GameConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let projectile_mesh = meshes.add(
        shape::UVSphere {
            radius: config.projectile.radius,
            sectors: 12,
            stacks: 12,
        }
        .into(),
    );
    let marker_mesh = meshes.add(
        shape::UVSphere {
            radius: config.projectile.radius * 1.5,
            sectors: 12,
            stacks: 12,
        }
        .into(),
    );
    commands.insert_resource(TrajectoryResources {
        projectile_mesh,
        projectile_material: materials.add(Color::ORANGE.into()),
        marker_mesh,
        marker_material: materials.add(StandardMaterial {
            base_color: Color::PURPLE,
            unlit: true,
            ..default()
        }),
    });
}

fn handle_launcher_input(
    mut commands: Commands,
    config: Res<GameConfig>,
    resources: Res<TrajectoryResources>,
    cameras: Query<&GlobalTransform, With<FirstPersonCamera>>,
    mut launchers: Query<(&ActionState<Actions>, &mut ProjectileLauncher)>,
) {
    for (input_state, mut launcher) in &mut launchers {
        if input_state.just_pressed(Actions::Predict) {
            launcher.set_predicting(true);
        } else if input_state.just_released(Actions::Predict) {
            launcher.set_predicting(false);
        }

        if !input_state.just_pressed(Actions::Fire) {
            continue;
        }
        let camera = match cameras.get_single() {
            Ok(camera) => camera,
            Err(_) => {
                debug!("No camera to fire from");
                continue;
            }
        };
        let (origin, velocity) = launch_state(camera, &config.projectile);
        let projectile = commands
            .spawn(PbrBundle {
                mesh: resources.projectile_mesh.clone(),
                material: resources.projectile_material.clone(),
                transform: Transform::from_translation(origin),
                ..default()
            })
            .insert((
                RigidBody::Dynamic,
                Collider::ball(config.projectile.radius),
                Friction::coefficient(config.projectile.friction),
                Restitution::coefficient(config.projectile.bounciness),
                Velocity::linear(velocity),
                Ccd::enabled(),
                CollisionGroups::new(PROJECTILE_GROUP, ALL_GROUPS),
                ActiveEvents::COLLISION_EVENTS,
                PortalTeleport,
                Projectile::new(config.projectile.life_span),
                Name::from("Projectile"),
            ))
            .id();
        debug!("Fired projectile {:?} from {}", projectile, origin);
    }
}

/// Input is not read while paused, so a prediction would outlive the release of its button.
fn stop_predicting(mut launchers: Query<&mut ProjectileLauncher>) {
    for mut launcher in &mut launchers {
        if launcher.is_predicting() {
            launcher.set_predicting(false);
        }
    }
}

fn predict_trajectories(
    config: Res<GameConfig>,
    rapier: Res<RapierContext>,
    rapier_config: Res<RapierConfiguration>,
    cameras: Query<&GlobalTransform, With<FirstPersonCamera>>,
    projectiles: Query<Entity, With<Projectile>>,
    mut launchers: Query<(Entity, &mut ProjectileLauncher)>,
) {
    let camera = match cameras.get_single() {
        Ok(camera) => camera,
        Err(_) => return,
    };
    let body = ProjectileBody::from(&config.projectile);
    let settings = TrajectorySettings::from(&config.trajectory);
    let (origin, velocity) = launch_state(camera, &config.projectile);

    for (entity, mut launcher) in &mut launchers {
        if !launcher.is_predicting() {
            continue;
        }
        let mut ignored: HashSet<Entity> = projectiles.iter().collect();
        ignored.insert(entity);
        let world = RapierSweep::new(&rapier, &ignored);
        simulation::predict(
            launcher.preview_mut(),
            &world,
            &body,
            &settings,
            origin,
            velocity,
            rapier_config.gravity,
        );
    }
}

fn draw_trajectory_previews(
    mut lines: ResMut<DebugLines>,
    launchers: Query<&ProjectileLauncher>,
) {
    for launcher in &launchers {
        if !launcher.is_predicting() {
            continue;
        }
        for segment in launcher.preview().segments() {
            lines.line_colored(segment.start, segment.end, 0., Color::YELLOW);
        }
    }
}

/// One marker per predicted bounce.
fn sync_impact_markers(
    mut commands: Commands,
    resources: Res<TrajectoryResources>,
    mut launchers: Query<&mut ProjectileLauncher, Changed<ProjectileLauncher>>,
    mut markers: Query<&mut Transform, With<ImpactMarker>>,
) {
    for mut launcher in &mut launchers {
        let launcher = &mut *launcher;
        let bounces = launcher.preview.bounces();

        while launcher.markers.len() > bounces.len() {
            if let Some(marker) = launcher.markers.pop() {
                commands.entity(marker).despawn_recursive();
            }
        }
        for (marker, bounce) in launcher.markers.iter().zip(bounces) {
            if let Ok(mut transform) = markers.get_mut(*marker) {
                transform.translation = bounce.location;
            }
        }
        for bounce in &bounces[launcher.markers.len()..] {
            let marker = commands
                .spawn(PbrBundle {
                    mesh: resources.marker_mesh.clone(),
                    material: resources.marker_material.clone(),
                    transform: Transform::from_translation(bounce.location),
                    ..default()
                })
                .insert((ImpactMarker, Name::from("Impact marker")))
                .id();
            launcher.markers.push(marker);
        }
    }
}

fn expire_projectiles(
    mut commands: Commands,
    time: Res<Time>,
    mut projectiles: Query<(Entity, &mut Projectile)>,
) {
    for (entity, mut projectile) in &mut projectiles {
        if projectile.tick(time.delta()) {
            debug!("Projectile {:?} expired", entity);
            commands.entity(entity).despawn_recursive();
        }
    }
}
