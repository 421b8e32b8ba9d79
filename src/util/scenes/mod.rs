use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::plugins::{
    config::GameConfig,
    physics::*,
    portal::{Portal, PortalBundle, PortalTeleport},
};

const WALL_THICKNESS: f32 = 1.;
/// Keeps portal surfaces off the wall they are placed on.
const Z_FIGHTING_OFFSET: f32 = 0.001;

/// A square room with four walls, a floor and a ceiling.
#[derive(Debug, Clone, Copy)]
pub struct Arena {
    pub length: f32,
    pub height: f32,
}

impl Arena {
    /// Wall `index` counts counterclockwise from the one at -Z, seen from above.
    pub fn wall_transform(&self, index: usize) -> Transform {
        let half_len = self.length / 2.;
        let mut transform =
            Transform::from_xyz(0., self.height / 2., -(half_len + WALL_THICKNESS / 2.));
        transform.rotate_around(
            Vec3::new(0., self.height / 2., 0.),
            Quat::from_axis_angle(Vec3::Y, index as f32 * FRAC_PI_2),
        );
        transform
    }

    /// Pose of a portal hanging on the inner face of wall `index`, facing the room, `offset` units
    /// to the right of the wall center as seen from the room.
    pub fn portal_on_wall(&self, index: usize, offset: f32, elevation: f32) -> Transform {
        let rotation = Quat::from_axis_angle(Vec3::Y, index as f32 * FRAC_PI_2);
        let inner_face = self.length / 2. - Z_FIGHTING_OFFSET;
        Transform {
            translation: rotation * Vec3::new(offset, elevation, -inner_face),
            rotation,
            ..default()
        }
    }

    pub fn spawn(
        &self,
        commands: &mut Commands,
        meshes: &mut Assets<Mesh>,
        materials: &mut Assets<StandardMaterial>,
    ) -> Entity {
        let walls_materials = [
            materials.add(StandardMaterial::from(Color::MAROON)),
            materials.add(StandardMaterial::from(Color::SEA_GREEN)),
            materials.add(StandardMaterial::from(Color::MIDNIGHT_BLUE)),
            materials.add(StandardMaterial::from(Color::BEIGE)),
        ];
        let ground_material = materials.add(StandardMaterial::from(Color::DARK_GRAY));

        let half_len = self.length / 2.;
        let slab = Vec3::new(half_len * 1.1, WALL_THICKNESS / 2., half_len * 1.1);
        let wall_mesh = meshes.add(
            shape::Box::new(self.length, self.height, WALL_THICKNESS).into(),
        );
        let slab_mesh = meshes.add(shape::Box::new(slab.x * 2., slab.y * 2., slab.z * 2.).into());

        let mut ground = commands.spawn(PbrBundle {
            mesh: slab_mesh.clone(),
            material: ground_material.clone(),
            transform: Transform::from_xyz(0., -WALL_THICKNESS / 2., 0.),
            ..default()
        });
        ground.insert((
            Name::from("Ground"),
            RigidBody::Fixed,
            Collider::cuboid(slab.x, slab.y, slab.z),
            CollisionGroups::new(GROUND_GROUP, ALL_GROUPS),
        ));

        let arena = *self;
        ground.with_children(|parent| {
            for (i, material) in walls_materials.into_iter().enumerate() {
                // Children are placed relative to the ground slab center.
                let mut transform = arena.wall_transform(i);
                transform.translation.y += WALL_THICKNESS / 2.;
                parent
                    .spawn(PbrBundle {
                        mesh: wall_mesh.clone(),
                        material,
                        transform,
                        ..default()
                    })
                    .insert((
                        Name::from(format!("Wall {}", i)),
                        RigidBody::Fixed,
                        Collider::cuboid(half_len, arena.height / 2., WALL_THICKNESS / 2.),
                        CollisionGroups::new(WALLS_GROUP, ALL_GROUPS),
                    ));
            }
            parent
                .spawn(PbrBundle {
                    mesh: slab_mesh,
                    material: ground_material,
                    transform: Transform::from_translation(Vec3::Y * (arena.height + WALL_THICKNESS)),
                    ..default()
                })
                .insert((
                    Name::from("Ceiling"),
                    RigidBody::Fixed,
                    Collider::cuboid(slab.x, slab.y, slab.z),
                    CollisionGroups::new(GROUND_GROUP, ALL_GROUPS),
                ));
        });
        ground.id()
    }
}

pub fn spawn_portal(
    commands: &mut Commands,
    config: &GameConfig,
    slot: u8,
    transform: Transform,
) -> Entity {
    let portal = Portal::new(slot).with_recursion_threshold(config.portal.recursion_threshold);
    commands
        .spawn(PortalBundle::new(portal, transform, config))
        .insert(Name::from(format!("Portal {}", slot)))
        .id()
}

/// Dynamic crates which can be pushed through the portals.
pub fn spawn_crates(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    positions: &[Vec3],
) {
    const CRATE_SIZE: f32 = 0.5;
    let mesh = meshes.add(shape::Cube::new(CRATE_SIZE).into());
    let material = materials.add(StandardMaterial::from(Color::OLIVE));
    for (i, position) in positions.iter().enumerate() {
        commands
            .spawn(PbrBundle {
                mesh: mesh.clone(),
                material: material.clone(),
                transform: Transform::from_translation(*position),
                ..default()
            })
            .insert((
                Name::from(format!("Crate {}", i)),
                RigidBody::Dynamic,
                Collider::cuboid(CRATE_SIZE / 2., CRATE_SIZE / 2., CRATE_SIZE / 2.),
                Velocity::zero(),
                CollisionGroups::new(PROPS_GROUP, ALL_GROUPS),
                ActiveEvents::COLLISION_EVENTS,
                PortalTeleport,
            ));
    }
}
