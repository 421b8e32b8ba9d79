use bevy::prelude::*;
use bevy_rapier3d::prelude::Velocity;

use super::space::PortalSpace;

/// An independent look direction, on top of the orientation of the body it controls.
pub trait ControlRotation {
    fn control_rotation(&self) -> Quat;
    fn set_control_rotation(&mut self, rotation: Quat);
}

/// Move a body through a portal.
///
/// The position relative to the source portal, the velocity and the orientation are converted to
/// the linked portal frame, as is `offset`, which is expressed around the source portal. When the
/// body has a controller, its look rotation is converted on its own.
pub fn teleport<C: ControlRotation + ?Sized>(
    space: &PortalSpace,
    offset: Vec3,
    transform: &mut Transform,
    velocity: &mut Velocity,
    controller: Option<&mut C>,
) {
    let relative = space.convert_vector(transform.translation - space.source().translation);
    let offset = space.convert_vector(offset);

    transform.rotation = space.convert_rotation(transform.rotation);
    transform.translation = space.target().translation + relative + offset;
    velocity.linvel = space.convert_vector(velocity.linvel);
    velocity.angvel = space.convert_vector(velocity.angvel);

    if let Some(controller) = controller {
        let rotation = space.convert_rotation(controller.control_rotation());
        controller.set_control_rotation(rotation);
    }
}
