//! Rendering side of the portal captures.
//!
//! Every portal owns one capture camera and one render target per recursion level, plus one
//! surface quad per level showing that target. Render layers route what each camera sees:
//!
//! * layer 0 is the regular world, seen by the player camera,
//! * surface layers `1..=MAX_RECURSION_DEPTH` hold the portal surfaces of each level. The player
//!   camera sees the level 1 surfaces, the level `k` capture cameras see the level `k + 1` ones,
//! * each capture camera has its own capture layer. World actors are on every capture layer,
//!   and hiding an actor from a capture removes that capture layer from the actor.

use bevy::{
    prelude::*,
    render::{
        camera::{Projection, RenderTarget},
        primitives::Aabb,
        render_resource::{
            Extent3d, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages,
        },
        view::{Layer, RenderLayers},
    },
    utils::HashMap,
    window::{WindowId, WindowResized},
};

use super::{
    camera_projection::{view_space_plane, PortalCameraProjection},
    capture::{self, ActorBounds, CaptureDevice, CaptureOutcome},
    material::PortalMaterial,
    Portal, PortalError, PortalResources,
};
use crate::plugins::{
    config::{GameConfig, PortalConfig},
    first_person_controller::FirstPersonCamera,
};

pub const MAX_PORTALS: u8 = 4;
pub const MAX_RECURSION_DEPTH: u32 = 5;

pub const WORLD_LAYER: Layer = 0;

pub fn surface_layer(level: u32) -> Layer {
    debug_assert!((1..=MAX_RECURSION_DEPTH).contains(&level));
    level as Layer
}

pub fn capture_layer(slot: u8, level: u32) -> Layer {
    debug_assert!(slot < MAX_PORTALS);
    debug_assert!((1..=MAX_RECURSION_DEPTH).contains(&level));
    (1 + MAX_RECURSION_DEPTH + slot as u32 * MAX_RECURSION_DEPTH + level - 1) as Layer
}

/// Layers of a regular world actor: the player view and every capture.
pub fn world_layers() -> RenderLayers {
    let mut layers = RenderLayers::layer(WORLD_LAYER);
    for slot in 0..MAX_PORTALS {
        for level in 1..=MAX_RECURSION_DEPTH {
            layers = layers.with(capture_layer(slot, level));
        }
    }
    layers
}

/// Layers seen by the capture camera of a given slot and level.
pub fn capture_camera_layers(slot: u8, level: u32) -> RenderLayers {
    let layers = RenderLayers::layer(capture_layer(slot, level));
    if level < MAX_RECURSION_DEPTH {
        layers.with(surface_layer(level + 1))
    } else {
        layers
    }
}

/// Deeper levels get lower priorities, so they are rendered first.
pub fn capture_priority(slot: u8, level: u32) -> isize {
    -1 - (level as isize * MAX_PORTALS as isize + slot as isize)
}

/// World actors which are hidden from captures when they stand between a virtual camera and the
/// exit portal.
#[derive(Debug, Default, Component, Reflect)]
#[reflect(Component)]
pub struct PortalCullable;

#[derive(Debug, Component)]
pub struct PortalSurface {
    pub level: u32,
}

#[derive(Debug, Component)]
pub struct PortalCaptureCamera {
    pub portal: Entity,
    pub level: u32,
}

/// One capture recorded during the frame, applied to the level camera afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturePass {
    pub level: u32,
    pub view: Transform,
    pub clip_plane: Vec4,
    pub hidden: Vec<Entity>,
}

#[derive(Debug, Default, Component)]
pub struct PortalCaptureRig {
    cameras: Vec<Entity>,
    passes: Vec<CapturePass>,
    hidden: Vec<Entity>,
}

impl PortalCaptureRig {
    pub fn new(cameras: Vec<Entity>) -> Self {
        PortalCaptureRig {
            cameras,
            ..default()
        }
    }

    pub fn cameras(&self) -> &[Entity] {
        &self.cameras
    }

    pub fn passes(&self) -> &[CapturePass] {
        &self.passes
    }

    pub fn pass(&self, level: u32) -> Option<&CapturePass> {
        self.passes.iter().find(|pass| pass.level == level)
    }

    pub fn hidden(&self) -> &[Entity] {
        &self.hidden
    }

    /// Forget the captures of the previous frame.
    pub fn begin_frame(&mut self) {
        self.passes.clear();
        self.hidden.clear();
    }
}

impl CaptureDevice for PortalCaptureRig {
    type Actor = Entity;

    fn hide(&mut self, actor: Entity) {
        self.hidden.push(actor);
    }

    fn clear_hidden(&mut self) {
        self.hidden.clear();
    }

    fn capture(&mut self, level: u32, view: Transform, clip_plane: Vec4) {
        self.passes.push(CapturePass {
            level,
            view,
            clip_plane,
            hidden: self.hidden.clone(),
        });
    }
}

pub fn actor_bounds(entity: Entity, transform: &GlobalTransform, aabb: &Aabb) -> ActorBounds<Entity> {
    let (scale, _rotation, _translation) = transform.to_scale_rotation_translation();
    ActorBounds {
        actor: entity,
        origin: transform.transform_point(Vec3::from(aabb.center)),
        extent: (Vec3::from(aabb.half_extents) * scale).length(),
    }
}

pub fn capture_target_image(width: u32, height: u32) -> Image {
    let tex_size = Extent3d {
        width,
        height,
        ..default()
    };
    let mut image = Image {
        texture_descriptor: TextureDescriptor {
            label: None,
            size: tex_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Bgra8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING
                | TextureUsages::COPY_DST
                | TextureUsages::RENDER_ATTACHMENT,
        },
        ..default()
    };
    image.resize(tex_size);
    image
}

/// Portal surfaces sample their target with screen coordinates, so targets follow the size of the
/// primary window. The configured size is used until a window exists.
pub fn capture_target_size(window: Option<&Window>, config: &PortalConfig) -> [u32; 2] {
    match window {
        Some(window) if window.physical_width() > 0 && window.physical_height() > 0 => {
            [window.physical_width(), window.physical_height()]
        }
        _ => config.render_target_size,
    }
}

/// Spawn the capture cameras, render targets and surfaces of new portals.
pub(super) fn create_capture_rigs(
    mut commands: Commands,
    portals: Query<(Entity, &Portal), Without<PortalCaptureRig>>,
    portal_res: Res<PortalResources>,
    config: Res<GameConfig>,
    windows: Res<Windows>,
    mut images: ResMut<Assets<Image>>,
    mut materials: ResMut<Assets<PortalMaterial>>,
) {
    let [width, height] = capture_target_size(windows.get_primary(), &config.portal);
    for (entity, portal) in &portals {
        let slot = portal.slot();
        if slot >= MAX_PORTALS {
            error!(
                "Portal {:?} uses slot {}, only {} portals can be rendered",
                entity, slot, MAX_PORTALS
            );
            commands.entity(entity).insert(PortalCaptureRig::default());
            continue;
        }

        let mut cameras = Vec::with_capacity(MAX_RECURSION_DEPTH as usize);
        let mut surfaces = Vec::with_capacity(MAX_RECURSION_DEPTH as usize);
        for level in 1..=MAX_RECURSION_DEPTH {
            let target = images.add(capture_target_image(width, height));
            let camera = commands
                .spawn(Camera3dBundle {
                    camera: Camera {
                        priority: capture_priority(slot, level),
                        target: RenderTarget::Image(target.clone()),
                        is_active: false,
                        ..default()
                    },
                    ..default()
                })
                .insert(PortalCameraProjection {
                    fov: config.portal.fov,
                    aspect_ratio: width as f32 / height as f32,
                    ..default()
                })
                .remove::<Projection>()
                .insert((
                    capture_camera_layers(slot, level),
                    PortalCaptureCamera {
                        portal: entity,
                        level,
                    },
                    Name::from(format!("Portal {} capture camera {}", slot, level)),
                ))
                .id();
            cameras.push(camera);

            let surface = commands
                .spawn(MaterialMeshBundle {
                    mesh: portal_res.mesh.clone(),
                    material: materials.add(PortalMaterial { texture: target }),
                    ..default()
                })
                .insert((
                    RenderLayers::layer(surface_layer(level)),
                    PortalSurface { level },
                    Name::from(format!("Portal {} surface {}", slot, level)),
                ))
                .id();
            surfaces.push(surface);
        }

        info!(
            "Created {} capture levels for portal {:?} in slot {}",
            MAX_RECURSION_DEPTH, entity, slot
        );
        commands
            .entity(entity)
            .push_children(&surfaces)
            .insert(PortalCaptureRig::new(cameras));
    }
}

/// Follow primary window resizes. The projections pick up the new aspect ratio from the modified
/// images.
pub(super) fn resize_capture_targets(
    mut resized: EventReader<WindowResized>,
    windows: Res<Windows>,
    config: Res<GameConfig>,
    cameras: Query<&Camera, With<PortalCaptureCamera>>,
    mut images: ResMut<Assets<Image>>,
) {
    if !resized.iter().any(|event| event.id == WindowId::primary()) {
        return;
    }
    let [width, height] = capture_target_size(windows.get_primary(), &config.portal);
    let size = Extent3d {
        width,
        height,
        ..default()
    };
    for camera in &cameras {
        let RenderTarget::Image(handle) = &camera.target else {
            continue;
        };
        if images.get(handle).map(|image| image.texture_descriptor.size) == Some(size) {
            continue;
        }
        if let Some(image) = images.get_mut(handle) {
            image.resize(size);
        }
    }
    debug!("Resized portal capture targets to {}x{}", width, height);
}

/// Let the player camera see the first level of portal surfaces.
pub(super) fn register_main_camera(
    mut commands: Commands,
    cameras: Query<Entity, Added<FirstPersonCamera>>,
) {
    for entity in &cameras {
        info!("Updating main camera to entity {:?}", entity);
        commands
            .entity(entity)
            .insert(RenderLayers::layer(WORLD_LAYER).with(surface_layer(1)));
    }
}

/// Put every new mesh on the capture layers, so the capture cameras can see and hide it.
pub(super) fn make_actors_cullable(
    mut commands: Commands,
    meshes: Query<
        Entity,
        (
            Added<Handle<Mesh>>,
            Without<PortalSurface>,
            Without<RenderLayers>,
        ),
    >,
) {
    for entity in &meshes {
        commands
            .entity(entity)
            .insert((PortalCullable, world_layers()));
    }
}

/// Run the recursive capture of every active, linked portal.
pub(super) fn update_portal_captures(
    viewers: Query<&GlobalTransform, With<FirstPersonCamera>>,
    portals: Query<(Entity, &Portal, &GlobalTransform)>,
    mut rigs: Query<&mut PortalCaptureRig>,
    actors: Query<(Entity, &GlobalTransform, &Aabb), With<PortalCullable>>,
) {
    for mut rig in &mut rigs {
        rig.begin_frame();
    }

    let viewer = match viewers.get_single() {
        Ok(viewer) => viewer.compute_transform(),
        Err(_) => {
            debug!("Skipping portal captures: {}", PortalError::MissingViewer);
            return;
        }
    };

    let bounds: Vec<ActorBounds<Entity>> = actors
        .iter()
        .map(|(entity, transform, aabb)| actor_bounds(entity, transform, aabb))
        .collect();

    for (entity, portal, transform) in &portals {
        if !portal.is_active() {
            continue;
        }
        let space = match portal.space(entity, transform.compute_transform(), |link| {
            portals
                .get(link)
                .ok()
                .map(|(_, _, link_transform)| link_transform.compute_transform())
        }) {
            Ok(space) => space,
            Err(err) => {
                trace!("Not capturing portal {:?}: {}", entity, err);
                continue;
            }
        };
        if let Ok(mut rig) = rigs.get_mut(entity) {
            let outcome = capture::update_capture(
                &space,
                &viewer,
                portal.recursion_threshold(),
                &bounds,
                &mut *rig,
            );
            if outcome == CaptureOutcome::Skipped {
                trace!("Viewer looks away from portal {:?}", entity);
            }
        }
    }
}

/// Point the capture cameras at the views recorded this frame, and disable the unused ones.
pub(super) fn sync_capture_cameras(
    mut commands: Commands,
    rigs: Query<&PortalCaptureRig>,
    mut cameras: Query<(
        Entity,
        &mut Camera,
        &mut Transform,
        &mut GlobalTransform,
        &mut PortalCameraProjection,
        &PortalCaptureCamera,
    )>,
) {
    for (entity, mut camera, mut transform, mut global_transform, mut projection, capture_camera) in
        &mut cameras
    {
        let rig = match rigs.get(capture_camera.portal) {
            Ok(rig) => rig,
            Err(_) => {
                info!("Despawning orphan capture camera {:?}", entity);
                commands.entity(entity).despawn_recursive();
                continue;
            }
        };
        match rig.pass(capture_camera.level) {
            Some(pass) => {
                if !camera.is_active {
                    camera.is_active = true;
                }
                // Transforms were already propagated this frame.
                *transform = pass.view;
                *global_transform = GlobalTransform::from(pass.view);
                projection.near = view_space_plane(&pass.view, pass.clip_plane);
            }
            None => {
                if camera.is_active {
                    camera.is_active = false;
                }
            }
        }
    }
}

/// Rebuild the render layers of the world actors from the hidden sets of this frame captures.
pub(super) fn apply_capture_visibility(
    rigs: Query<(&Portal, &PortalCaptureRig)>,
    mut actors: Query<(Entity, &mut RenderLayers), With<PortalCullable>>,
) {
    let mut hidden_layers: HashMap<Entity, Vec<Layer>> = HashMap::default();
    for (portal, rig) in &rigs {
        if portal.slot() >= MAX_PORTALS {
            continue;
        }
        for pass in rig.passes() {
            let layer = capture_layer(portal.slot(), pass.level);
            for actor in &pass.hidden {
                hidden_layers.entry(*actor).or_default().push(layer);
            }
        }
    }

    let visible = world_layers();
    for (entity, mut layers) in &mut actors {
        let mut wanted = visible;
        if let Some(hidden) = hidden_layers.get(&entity) {
            for layer in hidden {
                wanted = wanted.without(*layer);
            }
        }
        if *layers != wanted {
            *layers = wanted;
        }
    }
}
