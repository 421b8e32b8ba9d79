//! Development helpers, only built with the `devel` feature.

pub mod draw;

use bevy::{app::PluginGroupBuilder, prelude::*};
use leafwing_input_manager::prelude::ActionState;

use crate::plugins::{
    input::Actions,
    portal::{camera_projection::PortalCameraProjection, rig::PortalCaptureCamera},
};

/// How far the capture camera frusta are drawn.
const FRUSTUM_DRAW_DEPTH: f32 = 5.;

#[derive(Debug)]
/// Development plugins intended for debug builds use.
pub struct DeveloperPlugins;

impl PluginGroup for DeveloperPlugins {
    fn build(self) -> PluginGroupBuilder {
        let group = PluginGroupBuilder::start::<Self>().add(DebugDrawPlugin);
        #[cfg(feature = "editor")]
        let group = group.add(bevy_editor_pls::prelude::EditorPlugin);
        group
    }
}

#[derive(Debug)]
pub struct DebugDrawPlugin;

impl Plugin for DebugDrawPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DebugDrawSettings>()
            .add_system(toggle_frusta)
            .add_system(draw_capture_frusta.after(toggle_frusta));
    }
}

#[derive(Debug, Default, Resource)]
pub struct DebugDrawSettings {
    pub capture_frusta: bool,
}

fn toggle_frusta(
    actions: Query<&ActionState<Actions>>,
    mut settings: ResMut<DebugDrawSettings>,
) {
    if actions
        .iter()
        .any(|action_state| action_state.just_pressed(Actions::ToggleFrusta))
    {
        settings.capture_frusta = !settings.capture_frusta;
        info!("Capture camera frusta drawing: {}", settings.capture_frusta);
    }
}

fn draw_capture_frusta(
    settings: Res<DebugDrawSettings>,
    mut lines: ResMut<bevy_prototype_debug_lines::DebugLines>,
    cameras: Query<(&Camera, &Transform, &PortalCameraProjection), With<PortalCaptureCamera>>,
) {
    if !settings.capture_frusta {
        return;
    }
    for (camera, transform, projection) in &cameras {
        if camera.is_active {
            draw::draw_camera_frustum(transform, projection, FRUSTUM_DRAW_DEPTH, &mut lines);
        }
    }
}
