use std::f32::consts::FRAC_PI_4;

use bevy::{math::Vec4Swizzles, prelude::*, render::camera::CameraProjection};

/// Camera projection which allows for an oblique near clipping plane, used for rendering portal virtual cameras.
///
/// The near plane is given in view space, in homogeneous coordinates, with the visible side
/// positive.
#[derive(Debug, Component, Clone, Reflect)]
#[reflect(Component)]
pub struct PortalCameraProjection {
    pub fov: f32,
    pub aspect_ratio: f32,
    pub far: f32,
    #[reflect(ignore)]
    pub near: Vec4,
}

const PERSPECTIVE_NEAR: f32 = 0.1;

impl Default for PortalCameraProjection {
    fn default() -> Self {
        PortalCameraProjection {
            fov: FRAC_PI_4,
            aspect_ratio: 16. / 9.,
            far: 1000.,
            near: Vec4::from((Vec3::NEG_Z, -PERSPECTIVE_NEAR)),
        }
    }
}

impl CameraProjection for PortalCameraProjection {
    fn get_projection_matrix(&self) -> Mat4 {
        // Math taken from https://www.terathon.com/lengyel/Lengyel-Oblique.pdf
        let proj_mat = Mat4::perspective_infinite_rh(self.fov, self.aspect_ratio, PERSPECTIVE_NEAR);
        let proj_mat_inv = proj_mat.inverse();
        let mut oblique_proj_mat = proj_mat;

        let c = self.near;
        let m4 = proj_mat.row(3);
        let qp = Vec4::new(c.x.signum(), c.y.signum(), 1., 1.);
        let q = proj_mat_inv * qp;
        let a = m4.dot(q) / c.dot(q);
        let new_m3 = a * c;
        // Depth is reversed afterwards: the clip plane maps to 1, like the near plane of the
        // regular 3D cameras.
        oblique_proj_mat.x_axis.z = m4.x - new_m3.x;
        oblique_proj_mat.y_axis.z = m4.y - new_m3.y;
        oblique_proj_mat.z_axis.z = m4.z - new_m3.z;
        oblique_proj_mat.w_axis.z = m4.w - new_m3.w;

        oblique_proj_mat
    }

    fn update(&mut self, width: f32, height: f32) {
        self.aspect_ratio = width / height;
    }

    fn far(&self) -> f32 {
        self.far
    }
}

/// Express a world space plane in the view space of a camera placed at `camera`.
pub fn view_space_plane(camera: &Transform, world_plane: Vec4) -> Vec4 {
    // Inverse transpose of the view matrix = inverse inverse transpose of camera matrix = transpose
    let plane = camera.compute_matrix().transpose() * world_plane;
    plane / plane.xyz().length()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_follows_the_camera() {
        let camera = Transform::from_xyz(0., 0., 5.);
        let plane = view_space_plane(&camera, Vec4::new(0., 0., 1., 0.));
        assert!(plane.abs_diff_eq(Vec4::new(0., 0., 1., 5.), 1e-5));
        // The world origin sits five units in front of the camera, on the plane.
        assert!(plane.dot(Vec4::new(0., 0., -5., 1.)).abs() < 1e-5);
    }

    #[test]
    fn default_near_plane_is_a_regular_projection() {
        let projection = PortalCameraProjection::default();
        let expected = Mat4::perspective_infinite_reverse_rh(
            projection.fov,
            projection.aspect_ratio,
            PERSPECTIVE_NEAR,
        );
        assert!(projection.get_projection_matrix().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn plane_is_normalized() {
        let camera = Transform::from_xyz(1., 2., 3.).looking_at(Vec3::new(4., 0., -2.), Vec3::Y);
        let plane = view_space_plane(&camera, Vec4::new(0., 3., 0., -6.));
        assert!((plane.xyz().length() - 1.).abs() < 1e-5);
        // World point (0, 2, 0) is on the plane y = 2.
        let view_point = camera.compute_matrix().inverse() * Vec4::new(0., 2., 0., 1.);
        assert!(plane.dot(view_point).abs() < 1e-4);
    }
}
