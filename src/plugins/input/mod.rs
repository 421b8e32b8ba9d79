use bevy::{prelude::*, window::CursorGrabMode};
use iyes_loopless::prelude::*;
use leafwing_input_manager::prelude::*;

use super::game::GameState;

#[derive(Debug)]
pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugin(InputManagerPlugin::<Actions>::default())
            .add_startup_system(toggle_on_start)
            .add_system(toggle_mouse_capture);
    }
}

#[derive(Actionlike, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actions {
    Forward,
    Backwards,
    StrafeLeft,
    StrafeRight,
    Sprint,
    Aim,
    Fire,
    Predict,
    TogglePortals,
    TogglePause,
    ToggleFrusta,
}

pub fn default_input_map() -> InputMap<Actions> {
    let mut input_map = InputMap::new([
        (KeyCode::W, Actions::Forward),
        (KeyCode::S, Actions::Backwards),
        (KeyCode::A, Actions::StrafeLeft),
        (KeyCode::D, Actions::StrafeRight),
        (KeyCode::LShift, Actions::Sprint),
        (KeyCode::P, Actions::TogglePortals),
        (KeyCode::Tab, Actions::TogglePause),
        (KeyCode::F3, Actions::ToggleFrusta),
    ]);
    input_map
        .insert(MouseButton::Left, Actions::Fire)
        .insert(MouseButton::Right, Actions::Predict)
        .insert(DualAxis::mouse_motion(), Actions::Aim);
    input_map
}

fn toggle_on_start(mut windows: ResMut<Windows>) {
    if let Some(window) = windows.get_primary_mut() {
        window.set_cursor_visibility(false);
        window.set_cursor_grab_mode(CursorGrabMode::Locked);
    }
}

fn toggle_mouse_capture(
    mut commands: Commands,
    mut windows: ResMut<Windows>,
    actions: Query<&ActionState<Actions>>,
    state: Res<CurrentState<GameState>>,
) {
    if !actions
        .iter()
        .any(|action_state| action_state.just_pressed(Actions::TogglePause))
    {
        return;
    }
    let Some(window) = windows.get_primary_mut() else {
        return;
    };
    let next = match state.0 {
        GameState::Playing => {
            window.set_cursor_visibility(true);
            window.set_cursor_grab_mode(CursorGrabMode::None);
            GameState::Paused
        }
        GameState::Paused => {
            window.set_cursor_visibility(false);
            window.set_cursor_grab_mode(CursorGrabMode::Locked);
            GameState::Playing
        }
    };
    info!("Switching game state to {:?}", next);
    commands.insert_resource(NextState(next));
}
