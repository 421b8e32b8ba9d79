use bevy::{math::Vec4Swizzles, prelude::*, render::camera::CameraProjection};
use bevy_prototype_debug_lines::DebugLines;

/// Corners of a camera frustum: the four near plane corners, then the four corners cut `depth`
/// units in front of the camera, in the same order.
///
/// Portal cameras use an infinite projection with a tilted near plane, so the far corners are
/// extrapolated along the corner rays rather than unprojected.
pub fn frustum_corners(view: &Transform, projection: Mat4, depth: f32) -> [Vec3; 8] {
    let inv_viewprojection = (projection * view.compute_matrix().inverse()).inverse();
    let origin = view.translation;
    let forward = view.forward();

    let mut corners = [Vec3::ZERO; 8];
    for (i, (x, y)) in [(-1., -1.), (1., -1.), (-1., 1.), (1., 1.)].into_iter().enumerate() {
        // Reverse Z: the near plane is at depth 1.
        let clip = inv_viewprojection * Vec4::new(x, y, 1., 1.);
        let near = clip.xyz() / clip.w;
        let ray = near - origin;
        corners[i] = near;
        corners[i + 4] = origin + ray * depth / ray.dot(forward);
    }
    corners
}

pub fn draw_camera_frustum<P: CameraProjection>(
    view: &Transform,
    projection: &P,
    depth: f32,
    lines: &mut DebugLines,
) {
    const NEAR_COLOR: Color = Color::BLACK;
    const FAR_COLOR: Color = Color::WHITE;

    let corners = frustum_corners(view, projection.get_projection_matrix(), depth);
    for i in 0..4 {
        lines.line_gradient(corners[i], corners[i + 4], 0., NEAR_COLOR, FAR_COLOR);
    }
    for (a, b) in [(0, 1), (0, 2), (1, 3), (2, 3)] {
        lines.line_colored(corners[a], corners[b], 0., NEAR_COLOR);
        lines.line_colored(corners[a + 4], corners[b + 4], 0., FAR_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::portal::camera_projection::PortalCameraProjection;

    #[test]
    fn corners_of_an_upright_camera() {
        let view = Transform::from_xyz(0., 1., 0.);
        let projection = PortalCameraProjection::default();
        let corners = frustum_corners(&view, projection.get_projection_matrix(), 5.);

        for near in &corners[..4] {
            assert!((near.z + 0.1).abs() < 1e-3);
        }
        for far in &corners[4..] {
            assert!((far.z + 5.).abs() < 1e-3);
        }
        // Bottom corners below the camera, top corners above it.
        assert!(corners[0].y < 1. && corners[2].y > 1.);
        assert!(corners[0].x < 0. && corners[1].x > 0.);
    }

    #[test]
    fn oblique_near_plane_tilts_the_near_corners() {
        let view = Transform::IDENTITY;
        let projection = PortalCameraProjection {
            // Plane through (0, 0, -1) facing the camera, tilted around the vertical axis.
            near: {
                let normal = Vec3::new(0.3, 0., -1.).normalize();
                Vec4::from((normal, -normal.dot(Vec3::new(0., 0., -1.))))
            },
            ..default()
        };
        let corners = frustum_corners(&view, projection.get_projection_matrix(), 5.);
        let normal = projection.near.xyz();
        for near in &corners[..4] {
            assert!((normal.dot(*near) + projection.near.w).abs() < 1e-2);
        }
        assert!((corners[0].z - corners[1].z).abs() > 1e-2);
    }
}
