//! Conversions between the frames of two linked portals.
//!
//! A portal faces along its local +Z axis (`Transform::back`), which is the side travellers enter
//! from and the side its surface is drawn on. Going through a portal maps its front half-space onto
//! the front half-space of the linked portal, so the normal and right axes are mirrored while the
//! up axis is kept.

use std::f32::consts::PI;

use bevy::prelude::*;

/// Outward normal of a portal.
pub fn portal_normal(portal: &Transform) -> Vec3 {
    portal.back()
}

/// Whether `point` lies behind the plane through `portal_location` with normal `portal_normal`,
/// shifted by `offset` along the normal.
pub fn is_point_behind_portal(
    point: Vec3,
    portal_location: Vec3,
    portal_normal: Vec3,
    offset: f32,
) -> bool {
    portal_normal.dot(point - portal_location) < offset
}

/// Whether `point` projects onto the portal rectangle, whatever its distance to the portal plane.
pub fn is_within_aperture(portal: &Transform, point: Vec3, half_size: Vec2) -> bool {
    let relative = point - portal.translation;
    relative.dot(portal.right()).abs() <= half_size.x && relative.dot(portal.up()).abs() <= half_size.y
}

/// Maps positions and orientations expressed around a portal to the equivalent ones around its
/// linked portal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalSpace {
    source: Transform,
    target: Transform,
}

impl PortalSpace {
    pub fn new(source: Transform, target: Transform) -> Self {
        PortalSpace { source, target }
    }

    pub fn source(&self) -> &Transform {
        &self.source
    }

    pub fn target(&self) -> &Transform {
        &self.target
    }

    /// The conversion in the other direction, from the target portal back to the source.
    pub fn inverse(&self) -> PortalSpace {
        PortalSpace::new(self.target, self.source)
    }

    /// Convert a direction or an offset relative to the source portal.
    pub fn convert_vector(&self, vector: Vec3) -> Vec3 {
        let source_basis = Mat3::from_cols(
            portal_normal(&self.source),
            self.source.right(),
            self.source.up(),
        );
        let target_basis = Mat3::from_cols(
            -portal_normal(&self.target),
            -self.target.right(),
            self.target.up(),
        );
        let components = source_basis.inverse() * vector;
        target_basis * components
    }

    pub fn convert_rotation(&self, rotation: Quat) -> Quat {
        let delta = self.target.rotation * self.source.rotation.inverse();
        // Both portals face outwards, so the delta alone would leave the result looking backwards.
        let half_turn = Quat::from_axis_angle(self.target.up(), PI);
        (half_turn * delta * rotation).normalize()
    }

    /// Convert a world space location.
    pub fn convert_location(&self, location: Vec3) -> Vec3 {
        self.target.translation + self.convert_vector(location - self.source.translation)
    }

    pub fn convert_transform(&self, transform: &Transform) -> Transform {
        Transform {
            translation: self.convert_location(transform.translation),
            rotation: self.convert_rotation(transform.rotation),
            scale: transform.scale,
        }
    }

    /// World space plane of the target portal, in homogeneous coordinates. Points in front of the
    /// target portal are on the positive side.
    pub fn clip_plane(&self) -> Vec4 {
        let normal = portal_normal(&self.target);
        Vec4::from((normal, -normal.dot(self.target.translation)))
    }
}
