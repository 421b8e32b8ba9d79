use std::f32::consts::*;

use bevy::{log::LogPlugin, prelude::*};
use bevy_rapier3d::prelude::*;
use iyes_loopless::prelude::*;

use crate::{
    plugins::{
        config::{ConfigPlugin, GameConfig},
        first_person_controller::{FirstPersonControllerBundle, FirstPersonControllerPlugin},
        input::InputPlugin,
        physics::PhysicsPlugin,
        portal::{PortalEvent, PortalPlugin},
        trajectory::TrajectoryPlugin,
    },
    util::scenes::{spawn_crates, spawn_portal, Arena},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameState {
    Playing,
    Paused,
}

#[derive(Debug)]
/// Main game plugin, responsible for loading the other game plugins and bootstrapping the game.
pub struct GamePlugin;

impl Plugin for GamePlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    window: WindowDescriptor {
                        title: "Tower of Code".to_string(),
                        width: 1280.,
                        height: 720.,
                        ..default()
                    },
                    ..default()
                })
                .set(AssetPlugin {
                    watch_for_changes: true,
                    ..default()
                })
                .set(LogPlugin {
                    filter: "info,wgpu=error,naga=warn,tower_of_code=debug".to_string(),
                    ..default()
                }),
        );

        #[cfg(feature = "devel")]
        {
            app.add_plugins(super::debug::DeveloperPlugins);
        }

        app.add_loopless_state(GameState::Playing)
            .add_plugin(ConfigPlugin::default())
            .add_plugin(RapierPhysicsPlugin::<NoUserData>::default())
            .add_plugin(bevy_prototype_debug_lines::DebugLinesPlugin::default())
            .add_plugin(PhysicsPlugin)
            .add_plugin(InputPlugin)
            .add_plugin(FirstPersonControllerPlugin)
            .add_plugin(PortalPlugin)
            .add_plugin(TrajectoryPlugin)
            .add_startup_system(setup);
    }
}

const ARENA: Arena = Arena {
    length: 20.,
    height: 3.,
};

/// Perform game initialization
fn setup(
    mut commands: Commands,
    config: Res<GameConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut portal_events: EventWriter<PortalEvent>,
) {
    ARENA.spawn(&mut commands, &mut meshes, &mut materials);

    // Light
    commands.spawn(DirectionalLightBundle {
        directional_light: DirectionalLight {
            color: Color::ANTIQUE_WHITE,
            illuminance: 20_000.,
            shadows_enabled: true,
            ..default()
        },
        transform: Transform {
            translation: Vec3::Y * 5.,
            rotation: Quat::from_euler(EulerRot::YXZ, FRAC_PI_4, -FRAC_PI_4, 0.),
            scale: Vec3::ONE,
        },
        ..default()
    });

    // Two portals on perpendicular walls, at eye level.
    let elevation = config.portal.half_size().y + 0.5;
    let portal_a = spawn_portal(&mut commands, &config, 0, ARENA.portal_on_wall(0, -4., elevation));
    let portal_b = spawn_portal(&mut commands, &config, 1, ARENA.portal_on_wall(3, 3., elevation));
    portal_events.send(PortalEvent::Link(portal_a, portal_b));

    spawn_crates(
        &mut commands,
        &mut meshes,
        &mut materials,
        &[
            Vec3::new(-4., 0.25, -6.),
            Vec3::new(-3.2, 0.25, -6.5),
            Vec3::new(2., 0.25, 2.),
        ],
    );

    commands.spawn(FirstPersonControllerBundle {
        spatial: SpatialBundle::from_transform(Transform::from_xyz(0., 1., 5.)),
        ..default()
    });
}
