//! Recursive portal view capture.
//!
//! Looking at a portal shows what a virtual camera placed behind the linked portal sees. When that
//! view contains the portal itself, the virtual camera has to be teleported once more, and so on
//! until the recursion threshold is reached. Levels are captured from the deepest one up, so each
//! level can show the image of the level below it on the portal surface.

use bevy::prelude::*;

use super::space::{portal_normal, PortalSpace};

/// Something which renders views of the world into a portal render target.
pub trait CaptureDevice {
    type Actor: Copy;

    /// Exclude an actor from the next capture.
    fn hide(&mut self, actor: Self::Actor);

    /// Make every hidden actor visible again.
    fn clear_hidden(&mut self);

    /// Render the world from `view`, discarding everything on the negative side of `clip_plane`.
    fn capture(&mut self, level: u32, view: Transform, clip_plane: Vec4);
}

/// Bounding sphere of an actor which may be hidden from portal captures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorBounds<A> {
    pub actor: A,
    pub origin: Vec3,
    pub extent: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The viewer looks away from the portal, nothing was captured.
    Skipped,
    Captured { levels: u32 },
}

/// Poses of the virtual cameras for recursion levels `1..=depth`, level 1 first.
pub fn virtual_views(space: &PortalSpace, viewer: &Transform, depth: u32) -> Vec<Transform> {
    let mut views = Vec::with_capacity(depth as usize);
    let mut view = *viewer;
    for _ in 0..depth {
        view = space.convert_transform(&view);
        views.push(view);
    }
    views
}

/// Whether an actor sits entirely behind the exit portal, where it would block the view of a
/// virtual camera placed there.
pub fn is_occluding<A>(exit_portal: &Transform, bounds: &ActorBounds<A>) -> bool {
    let distance = bounds.origin - exit_portal.translation;
    distance.length() > bounds.extent && portal_normal(exit_portal).dot(distance) < 0.
}

/// Capture every recursion level of the view through a portal, deepest level first.
///
/// The device hidden set is cleared after every level, so it is empty again when this returns.
pub fn update_capture<D: CaptureDevice>(
    space: &PortalSpace,
    viewer: &Transform,
    threshold: u32,
    actors: &[ActorBounds<D::Actor>],
    device: &mut D,
) -> CaptureOutcome {
    let relative = viewer.translation - space.source().translation;
    if relative.dot(viewer.forward()) > 0. {
        return CaptureOutcome::Skipped;
    }

    let views = virtual_views(space, viewer, threshold);
    let clip_plane = space.clip_plane();
    let occluders: Vec<D::Actor> = actors
        .iter()
        .filter(|bounds| is_occluding(space.target(), bounds))
        .map(|bounds| bounds.actor)
        .collect();

    for (index, view) in views.iter().enumerate().rev() {
        for actor in &occluders {
            device.hide(*actor);
        }
        device.capture(index as u32 + 1, *view, clip_plane);
        device.clear_hidden();
    }

    CaptureOutcome::Captured {
        levels: views.len() as u32,
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Hide(u32),
        Capture {
            level: u32,
            view: Transform,
            hidden: Vec<u32>,
        },
        Clear,
    }

    #[derive(Default)]
    struct RecordingDevice {
        hidden: Vec<u32>,
        calls: Vec<Call>,
    }

    impl RecordingDevice {
        fn captures(&self) -> Vec<(u32, Vec<u32>)> {
            self.calls
                .iter()
                .filter_map(|call| match call {
                    Call::Capture { level, hidden, .. } => Some((*level, hidden.clone())),
                    _ => None,
                })
                .collect()
        }
    }

    impl CaptureDevice for RecordingDevice {
        type Actor = u32;

        fn hide(&mut self, actor: u32) {
            self.hidden.push(actor);
            self.calls.push(Call::Hide(actor));
        }

        fn clear_hidden(&mut self) {
            self.hidden.clear();
            self.calls.push(Call::Clear);
        }

        fn capture(&mut self, level: u32, view: Transform, _clip_plane: Vec4) {
            self.calls.push(Call::Capture {
                level,
                view,
                hidden: self.hidden.clone(),
            });
        }
    }

    /// Portal A at the origin facing +Z, portal B ten units away facing -Z.
    fn corridor() -> PortalSpace {
        PortalSpace::new(
            Transform::IDENTITY,
            Transform::from_xyz(0., 0., -10.).with_rotation(Quat::from_rotation_y(PI)),
        )
    }

    fn viewer_facing_portal() -> Transform {
        Transform::from_xyz(0.5, 1., 4.).looking_at(Vec3::ZERO, Vec3::Y)
    }

    #[test]
    fn looking_away_skips_capture() {
        let mut device = RecordingDevice::default();
        let viewer = Transform::from_xyz(0., 1., 4.).looking_at(Vec3::new(0., 1., 10.), Vec3::Y);
        let outcome = update_capture(&corridor(), &viewer, 5, &[], &mut device);
        assert_eq!(outcome, CaptureOutcome::Skipped);
        assert!(device.calls.is_empty());
    }

    #[test]
    fn captures_exactly_threshold_levels_deepest_first() {
        for threshold in [1, 3, 5, 12] {
            let mut device = RecordingDevice::default();
            let outcome =
                update_capture(&corridor(), &viewer_facing_portal(), threshold, &[], &mut device);
            assert_eq!(outcome, CaptureOutcome::Captured { levels: threshold });
            let levels: Vec<u32> = device.captures().iter().map(|(level, _)| *level).collect();
            let expected: Vec<u32> = (1..=threshold).rev().collect();
            assert_eq!(levels, expected);
        }
    }

    #[test]
    fn first_level_is_the_converted_viewer() {
        let space = corridor();
        let viewer = viewer_facing_portal();
        let mut device = RecordingDevice::default();
        update_capture(&space, &viewer, 2, &[], &mut device);
        let level_one = device
            .calls
            .iter()
            .find_map(|call| match call {
                Call::Capture { level: 1, view, .. } => Some(*view),
                _ => None,
            })
            .unwrap();
        let expected = space.convert_transform(&viewer);
        assert!(level_one.translation.abs_diff_eq(expected.translation, 1e-4));
        assert!(level_one.rotation.angle_between(expected.rotation) < 1e-4);
    }

    #[test]
    fn virtual_views_chain_conversions() {
        let space = corridor();
        let viewer = viewer_facing_portal();
        let views = virtual_views(&space, &viewer, 3);
        assert_eq!(views.len(), 3);
        // In this corridor, every level moves the camera ten units further down -Z.
        for (depth, view) in views.iter().enumerate() {
            let expected = viewer.translation - Vec3::Z * 10. * (depth as f32 + 1.);
            assert!(view.translation.abs_diff_eq(expected, 1e-3));
        }
    }

    #[test]
    fn occluders_are_hidden_during_capture_only() {
        let space = corridor();
        let actors = [
            // Behind B, far enough from its plane.
            ActorBounds {
                actor: 1,
                origin: Vec3::new(0., 0., -7.),
                extent: 1.,
            },
            // In front of B.
            ActorBounds {
                actor: 2,
                origin: Vec3::new(0., 0., -13.),
                extent: 1.,
            },
            // Behind B, but its bounds reach the portal.
            ActorBounds {
                actor: 3,
                origin: Vec3::new(0., 0., -9.5),
                extent: 1.,
            },
        ];
        let mut device = RecordingDevice::default();
        update_capture(&space, &viewer_facing_portal(), 2, &actors, &mut device);

        for (_level, hidden) in device.captures() {
            assert_eq!(hidden, vec![1]);
        }
        assert!(device.hidden.is_empty());
        assert_eq!(device.calls.last(), Some(&Call::Clear));
        assert!(!device.calls.contains(&Call::Hide(2)));
    }

    #[test]
    fn occlusion_test() {
        let exit = Transform::IDENTITY;
        let behind = ActorBounds {
            actor: (),
            origin: Vec3::new(0., 0., -3.),
            extent: 2.,
        };
        let front = ActorBounds {
            actor: (),
            origin: Vec3::new(0., 0., 3.),
            extent: 2.,
        };
        let straddling = ActorBounds {
            actor: (),
            origin: Vec3::new(0., 0., -1.),
            extent: 2.,
        };
        assert!(is_occluding(&exit, &behind));
        assert!(!is_occluding(&exit, &front));
        assert!(!is_occluding(&exit, &straddling));
    }
}
