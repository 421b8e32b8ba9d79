//! Portals: linked pairs of planar gateways which render what lies behind their counterpart and
//! teleport whatever goes through them.

use bevy::{
    prelude::*,
    reflect::FromReflect,
    render::{camera::CameraProjectionPlugin, view::VisibilitySystems},
    transform::TransformSystem,
    utils::HashSet,
};
use bevy_rapier3d::prelude::*;
use iyes_loopless::prelude::*;
use leafwing_input_manager::prelude::ActionState;

pub mod camera_projection;
pub mod capture;
mod error;
pub mod material;
pub mod rig;
pub mod space;
pub mod teleport;

pub use error::PortalError;
pub use space::PortalSpace;
pub use teleport::ControlRotation;

use camera_projection::PortalCameraProjection;
use material::PortalMaterial;
use rig::MAX_RECURSION_DEPTH;
use space::{is_point_behind_portal, is_within_aperture, portal_normal};

use super::{
    config::GameConfig, first_person_controller::FirstPersonController, game::GameState,
    input::Actions, physics::*,
};

#[derive(Debug)]
pub struct PortalPlugin;

#[derive(Debug, Resource)]
pub struct PortalResources {
    pub mesh: Handle<Mesh>,
}

#[derive(Debug, Component, Reflect, FromReflect)]
#[reflect(Component)]
pub struct Portal {
    linked_portal: Option<Entity>,
    active: bool,
    recursion_threshold: u32,
    /// Index of the capture rig of this portal, which decides the render layers it uses.
    slot: u8,
}

impl Default for Portal {
    fn default() -> Self {
        Portal::new(0)
    }
}

impl Portal {
    pub fn new(slot: u8) -> Self {
        Portal {
            linked_portal: None,
            active: true,
            recursion_threshold: MAX_RECURSION_DEPTH,
            slot,
        }
    }

    pub fn with_recursion_threshold(mut self, threshold: u32) -> Self {
        self.set_recursion_threshold(threshold);
        self
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn link(&self) -> Option<Entity> {
        self.linked_portal
    }

    pub fn set_link(&mut self, link: Option<Entity>) {
        self.linked_portal = link;
    }

    /// The linked portal, `own` being the entity of this portal.
    pub fn linked(&self, own: Entity) -> Result<Entity, PortalError> {
        self.linked_portal.ok_or(PortalError::NoLink(own))
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn recursion_threshold(&self) -> u32 {
        self.recursion_threshold
    }

    /// Number of nested views rendered through this portal, between 1 and `MAX_RECURSION_DEPTH`.
    pub fn set_recursion_threshold(&mut self, threshold: u32) {
        let clamped = threshold.clamp(1, MAX_RECURSION_DEPTH);
        if clamped != threshold {
            warn!(
                "Recursion threshold {} out of range, using {}",
                threshold, clamped
            );
        }
        self.recursion_threshold = clamped;
    }

    /// Build the conversion from this portal, posed at `pose`, to its linked portal. `lookup`
    /// returns the pose of a portal entity, or `None` if the entity is not a portal.
    pub fn space<F>(&self, own: Entity, pose: Transform, lookup: F) -> Result<PortalSpace, PortalError>
    where
        F: FnOnce(Entity) -> Option<Transform>,
    {
        let link = self.linked(own)?;
        let target = lookup(link).ok_or(PortalError::DanglingLink { portal: own, link })?;
        Ok(PortalSpace::new(pose, target))
    }
}

/// Gameplay requests to rewire portals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalEvent {
    Link(Entity, Entity),
    Unlink(Entity),
    SetActive(Entity, bool),
}

/// Link two portals to each other.
pub fn link_portals(portals: &mut Query<&mut Portal>, a: Entity, b: Entity) -> Result<(), PortalError> {
    for (portal, link) in [(a, b), (b, a)] {
        if !portals.contains(portal) {
            return Err(PortalError::DanglingLink {
                portal: link,
                link: portal,
            });
        }
    }
    for (portal, link) in [(a, b), (b, a)] {
        if let Ok(mut portal) = portals.get_mut(portal) {
            portal.set_link(Some(link));
        }
    }
    Ok(())
}

/// Remove the link of a portal, and the link back from its counterpart.
pub fn unlink(portals: &mut Query<&mut Portal>, entity: Entity) {
    let link = match portals.get_mut(entity) {
        Ok(mut portal) => {
            let link = portal.link();
            portal.set_link(None);
            link
        }
        Err(_) => return,
    };
    if let Some(link) = link {
        if let Ok(mut other) = portals.get_mut(link) {
            if other.link() == Some(entity) {
                other.set_link(None);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, SystemLabel)]
pub enum PortalLabels {
    HandleEvents,
    CreateRigs,
    TeleportEntities,
    Capture,
    SyncCameras,
    ApplyVisibility,
}

/// Marker for entities which go through portals.
#[derive(Debug, Component, Clone, Default, Reflect, FromReflect)]
#[reflect(Component)]
pub struct PortalTeleport;

#[derive(Bundle)]
pub struct PortalBundle {
    #[bundle]
    pub spatial: SpatialBundle,
    pub portal: Portal,
    pub collider: Collider,
    pub active_events: ActiveEvents,
    pub sensor: Sensor,
    pub collision_groups: CollisionGroups,
}

impl Default for PortalBundle {
    fn default() -> Self {
        PortalBundle {
            spatial: SpatialBundle::default(),
            portal: Portal::default(),
            collider: Collider::cuboid(1., 1., 0.6),
            sensor: Sensor,
            active_events: ActiveEvents::COLLISION_EVENTS,
            collision_groups: CollisionGroups::new(
                PORTAL_GROUP,
                PLAYER_GROUP | PROPS_GROUP | PROJECTILE_GROUP,
            ),
        }
    }
}

impl PortalBundle {
    pub fn new(portal: Portal, transform: Transform, config: &GameConfig) -> Self {
        let half_size = config.portal.half_size();
        PortalBundle {
            spatial: SpatialBundle::from_transform(transform),
            portal,
            collider: Collider::cuboid(half_size.x, half_size.y, config.portal.trigger_depth),
            ..default()
        }
    }
}

impl Plugin for PortalPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugin(MaterialPlugin::<PortalMaterial>::default())
            .add_plugin(CameraProjectionPlugin::<PortalCameraProjection>::default())
            .add_event::<PortalEvent>()
            .register_type::<Portal>()
            .register_type::<PortalTeleport>()
            .register_type::<rig::PortalCullable>()
            .add_startup_system(load_portal_assets)
            .add_system(toggle_portals_from_input.run_in_state(GameState::Playing))
            .add_system(
                handle_portal_events
                    .label(PortalLabels::HandleEvents)
                    .after(toggle_portals_from_input),
            )
            .add_system_set(
                SystemSet::new()
                    .label(PortalLabels::CreateRigs)
                    .after(PortalLabels::HandleEvents)
                    .with_system(rig::create_capture_rigs)
                    .with_system(rig::register_main_camera)
                    .with_system(rig::make_actors_cullable),
            )
            .add_system(rig::resize_capture_targets.after(PortalLabels::CreateRigs))
            .add_system_set(
                SystemSet::new()
                    .label(PortalLabels::TeleportEntities)
                    .after(PortalLabels::HandleEvents)
                    .with_system(teleport_through_portals)
                    .with_system(toggle_wall_collisions),
            )
            .add_system_set_to_stage(
                CoreStage::PostUpdate,
                SystemSet::new()
                    .after(TransformSystem::TransformPropagate)
                    .before(VisibilitySystems::CheckVisibility)
                    .with_system(rig::update_portal_captures.label(PortalLabels::Capture))
                    .with_system(
                        rig::sync_capture_cameras
                            .label(PortalLabels::SyncCameras)
                            .after(PortalLabels::Capture),
                    )
                    .with_system(
                        rig::apply_capture_visibility
                            .label(PortalLabels::ApplyVisibility)
                            .after(PortalLabels::Capture),
                    )
                    .with_system(
                        bevy::render::view::update_frusta::<PortalCameraProjection>
                            .after(PortalLabels::SyncCameras),
                    ),
            );
    }
}

/// Load the assets required to render the portals.
fn load_portal_assets(
    mut commands: Commands,
    config: Res<GameConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    let portal_mesh = meshes.add(
        shape::Quad {
            size: config.portal.half_size() * 2.,
            flip: false,
        }
        .into(),
    );
    commands.insert_resource(PortalResources { mesh: portal_mesh });
}

fn handle_portal_events(mut events: EventReader<PortalEvent>, mut portals: Query<&mut Portal>) {
    for event in events.iter() {
        match *event {
            PortalEvent::Link(a, b) => match link_portals(&mut portals, a, b) {
                Ok(()) => info!("Linked portals {:?} and {:?}", a, b),
                Err(err) => warn!("Cannot link portals: {}", err),
            },
            PortalEvent::Unlink(portal) => {
                info!("Unlinking portal {:?}", portal);
                unlink(&mut portals, portal);
            }
            PortalEvent::SetActive(entity, active) => match portals.get_mut(entity) {
                Ok(mut portal) => portal.set_active(active),
                Err(_) => warn!("Cannot toggle {:?}, it is not a portal", entity),
            },
        }
    }
}

fn toggle_portals_from_input(
    actions: Query<&ActionState<Actions>>,
    portals: Query<(Entity, &Portal)>,
    mut events: EventWriter<PortalEvent>,
) {
    if !actions
        .iter()
        .any(|action_state| action_state.just_pressed(Actions::TogglePortals))
    {
        return;
    }
    for (entity, portal) in &portals {
        info!("Toggling portal {:?}", entity);
        events.send(PortalEvent::SetActive(entity, !portal.is_active()));
    }
}

/// Teleport travellers which crossed the plane of an active, linked portal through its aperture.
fn teleport_through_portals(
    config: Res<GameConfig>,
    portals: Query<(Entity, &Portal, &GlobalTransform), Without<PortalTeleport>>,
    mut travellers: Query<
        (
            Entity,
            &mut Transform,
            &mut Velocity,
            Option<&mut FirstPersonController>,
        ),
        With<PortalTeleport>,
    >,
) {
    let spaces: Vec<(Entity, PortalSpace)> = portals
        .iter()
        .filter(|(_, portal, _)| portal.is_active())
        .filter_map(|(entity, portal, transform)| {
            portal
                .space(entity, transform.compute_transform(), |link| {
                    portals
                        .get(link)
                        .ok()
                        .map(|(_, _, link_transform)| link_transform.compute_transform())
                })
                .map_err(|err| trace!("Portal {:?} cannot teleport: {}", entity, err))
                .ok()
                .map(|space| (entity, space))
        })
        .collect();
    if spaces.is_empty() {
        return;
    }

    let half_size = config.portal.half_size();
    let mut teleported = HashSet::default();
    for (entity, mut transform, mut velocity, mut controller) in &mut travellers {
        for (portal, space) in &spaces {
            if teleported.contains(&entity) {
                break;
            }
            let source = space.source();
            let normal = portal_normal(source);
            let position = transform.translation;
            if !is_within_aperture(source, position, half_size)
                || !is_point_behind_portal(position, source.translation, normal, 0.)
                || is_point_behind_portal(
                    position,
                    source.translation,
                    normal,
                    -config.portal.trigger_depth,
                )
            {
                continue;
            }

            info!("Teleporting {:?} through portal {:?}", entity, portal);
            teleport::teleport(
                space,
                -normal * config.portal.exit_offset,
                &mut transform,
                &mut velocity,
                controller.as_deref_mut(),
            );
            teleported.insert(entity);
        }
    }
}

/// While a traveller overlaps a portal sensor, let it sink into the wall the portal sits on.
fn toggle_wall_collisions(
    mut collisions: EventReader<CollisionEvent>,
    portals: Query<Entity, (With<Portal>, Without<PortalTeleport>)>,
    mut travellers: Query<&mut CollisionGroups, With<PortalTeleport>>,
) {
    for collision in collisions.iter() {
        let (collider_a, collider_b, filters) = match collision {
            CollisionEvent::Started(a, b, _flags) => (*a, *b, IN_PORTAL_GROUPS),
            CollisionEvent::Stopped(a, b, _flags) => (*a, *b, ALL_GROUPS),
        };
        let traveller = if portals.contains(collider_a) {
            collider_b
        } else if portals.contains(collider_b) {
            collider_a
        } else {
            continue;
        };
        if let Ok(mut groups) = travellers.get_mut(traveller) {
            debug!(
                "Traveller {:?} {} portal sensor zone",
                traveller,
                if filters == ALL_GROUPS { "left" } else { "entered" }
            );
            groups.filters = filters;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use bevy::ecs::system::SystemState;

    use super::*;

    #[test]
    fn new_portals_are_active_and_unlinked() {
        let portal = Portal::new(2);
        assert!(portal.is_active());
        assert_eq!(portal.link(), None);
        assert_eq!(portal.slot(), 2);
        assert_eq!(portal.recursion_threshold(), MAX_RECURSION_DEPTH);
        assert_eq!(
            portal.linked(Entity::from_raw(4)),
            Err(PortalError::NoLink(Entity::from_raw(4)))
        );
    }

    #[test]
    fn recursion_threshold_is_clamped() {
        let mut portal = Portal::new(0);
        portal.set_recursion_threshold(0);
        assert_eq!(portal.recursion_threshold(), 1);
        portal.set_recursion_threshold(3);
        assert_eq!(portal.recursion_threshold(), 3);
        portal.set_recursion_threshold(40);
        assert_eq!(portal.recursion_threshold(), MAX_RECURSION_DEPTH);
    }

    #[test]
    fn space_resolves_the_link() {
        let own = Entity::from_raw(1);
        let link = Entity::from_raw(2);
        let mut portal = Portal::new(0);
        let pose = Transform::from_xyz(1., 0., 0.);
        let link_pose = Transform::from_xyz(0., 0., 5.);

        assert_eq!(
            portal.space(own, pose, |_| Some(link_pose)),
            Err(PortalError::NoLink(own))
        );

        portal.set_link(Some(link));
        assert_eq!(
            portal.space(own, pose, |_| None),
            Err(PortalError::DanglingLink { portal: own, link })
        );

        let space = portal
            .space(own, pose, |entity| (entity == link).then_some(link_pose))
            .unwrap();
        assert_eq!(*space.source(), pose);
        assert_eq!(*space.target(), link_pose);
    }

    fn run_events(world: &mut World, events: &[PortalEvent]) {
        let mut queue = Events::<PortalEvent>::default();
        for event in events {
            queue.send(*event);
        }
        world.insert_resource(queue);
        SystemStage::single(handle_portal_events).run(world);
    }

    #[test]
    fn link_and_unlink_events() {
        let mut world = World::new();
        let a = world.spawn(Portal::new(0)).id();
        let b = world.spawn(Portal::new(1)).id();
        let c = world.spawn(Portal::new(2)).id();

        run_events(&mut world, &[PortalEvent::Link(a, b)]);
        assert_eq!(world.get::<Portal>(a).unwrap().link(), Some(b));
        assert_eq!(world.get::<Portal>(b).unwrap().link(), Some(a));

        // C points at A, but A does not point back.
        world.get_mut::<Portal>(c).unwrap().set_link(Some(a));
        run_events(&mut world, &[PortalEvent::Unlink(c)]);
        assert_eq!(world.get::<Portal>(c).unwrap().link(), None);
        assert_eq!(world.get::<Portal>(a).unwrap().link(), Some(b));

        run_events(&mut world, &[PortalEvent::Unlink(b)]);
        assert_eq!(world.get::<Portal>(a).unwrap().link(), None);
        assert_eq!(world.get::<Portal>(b).unwrap().link(), None);
    }

    #[test]
    fn linking_to_a_missing_portal_changes_nothing() {
        let mut world = World::new();
        let a = world.spawn(Portal::new(0)).id();
        let not_a_portal = world.spawn(Transform::default()).id();

        let mut state: SystemState<Query<&mut Portal>> = SystemState::new(&mut world);
        let mut portals = state.get_mut(&mut world);
        assert_eq!(
            link_portals(&mut portals, a, not_a_portal),
            Err(PortalError::DanglingLink {
                portal: a,
                link: not_a_portal
            })
        );
        assert_eq!(world.get::<Portal>(a).unwrap().link(), None);
    }

    #[test]
    fn set_active_event() {
        let mut world = World::new();
        let a = world.spawn(Portal::new(0)).id();
        run_events(&mut world, &[PortalEvent::SetActive(a, false)]);
        assert!(!world.get::<Portal>(a).unwrap().is_active());
    }

    fn teleport_world(active: bool) -> (World, Entity) {
        let mut world = World::new();
        world.insert_resource(GameConfig::default());
        let a_pose = Transform::from_xyz(0., 1., 0.);
        let b_pose = Transform::from_xyz(10., 1., 0.).with_rotation(Quat::from_rotation_y(FRAC_PI_2));
        let a = world
            .spawn((Portal::new(0), GlobalTransform::from(a_pose)))
            .id();
        let b = world
            .spawn((Portal::new(1), GlobalTransform::from(b_pose)))
            .id();
        world.get_mut::<Portal>(a).unwrap().set_link(Some(b));
        world.get_mut::<Portal>(a).unwrap().set_active(active);
        world.get_mut::<Portal>(b).unwrap().set_link(Some(a));

        let traveller = world
            .spawn((
                PortalTeleport,
                Transform::from_xyz(0.2, 1.1, -0.1),
                Velocity::linear(Vec3::new(0., 0., -2.)),
            ))
            .id();
        (world, traveller)
    }

    #[test]
    fn traveller_behind_the_portal_comes_out_of_its_link() {
        let (mut world, traveller) = teleport_world(true);
        SystemStage::single(teleport_through_portals).run(&mut world);

        let transform = world.get::<Transform>(traveller).unwrap();
        assert!(transform
            .translation
            .abs_diff_eq(Vec3::new(10.15, 1.1, 0.2), 1e-4));
        let velocity = world.get::<Velocity>(traveller).unwrap();
        assert!(velocity.linvel.abs_diff_eq(Vec3::new(2., 0., 0.), 1e-4));
    }

    #[test]
    fn inactive_portals_do_not_teleport() {
        let (mut world, traveller) = teleport_world(false);
        SystemStage::single(teleport_through_portals).run(&mut world);
        let transform = world.get::<Transform>(traveller).unwrap();
        assert!(transform
            .translation
            .abs_diff_eq(Vec3::new(0.2, 1.1, -0.1), 1e-6));
    }

    #[test]
    fn travellers_outside_the_aperture_stay() {
        let (mut world, traveller) = teleport_world(true);
        world.get_mut::<Transform>(traveller).unwrap().translation = Vec3::new(3., 1., -0.1);
        SystemStage::single(teleport_through_portals).run(&mut world);
        let transform = world.get::<Transform>(traveller).unwrap();
        assert!(transform.translation.abs_diff_eq(Vec3::new(3., 1., -0.1), 1e-6));
    }

    #[test]
    fn controller_look_follows_the_traveller() {
        let (mut world, traveller) = teleport_world(true);
        world
            .entity_mut(traveller)
            .insert(FirstPersonController::new(Entity::from_raw(99)));
        SystemStage::single(teleport_through_portals).run(&mut world);

        // Looking down -Z into A, the player looks down +X out of B.
        let controller = world.get::<FirstPersonController>(traveller).unwrap();
        assert!((controller.theta.radians + FRAC_PI_2).abs() < 1e-4);
        assert!(controller.phi.radians.abs() < 1e-4);
    }
}
